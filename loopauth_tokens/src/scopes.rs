//! OAuth2 scope sets

use std::{convert::Infallible, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Scopes added to every request so that an ID token and a refresh token are issued
pub const RESERVED_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

/// An ordered set of OAuth2 scopes
///
/// Duplicates are dropped, comparing case-insensitively. Reserved OpenID
/// Connect scopes are tracked separately and never appear in the set itself.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Scopes(Vec<String>);

impl Scopes {
    /// Produces an empty scope set
    #[inline]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Adds a scope to the set
    pub fn insert(&mut self, scope: impl Into<String>) {
        let scope = scope.into();
        let is_reserved = RESERVED_SCOPES
            .iter()
            .any(|r| r.eq_ignore_ascii_case(&scope));
        if scope.is_empty() || is_reserved || self.contains(&scope) {
            return;
        }
        self.0.push(scope);
    }

    /// Adds a scope to the set and returns it
    #[must_use]
    pub fn and(mut self, scope: impl Into<String>) -> Self {
        self.insert(scope);
        self
    }

    /// Whether the set contains `scope`
    pub fn contains(&self, scope: &str) -> bool {
        self.0.iter().any(|s| s.eq_ignore_ascii_case(scope))
    }

    /// Iterates over the scopes in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `scope` parameter sent to the authority, including the reserved scopes
    pub fn to_request_string(&self) -> String {
        self.iter()
            .chain(RESERVED_SCOPES.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// A normalized key, stable across ordering and case, used to index cached access tokens
    pub fn cache_key(&self) -> String {
        let mut scopes: Vec<_> = self.0.iter().map(|s| s.to_ascii_lowercase()).collect();
        scopes.sort();
        scopes.join(" ")
    }
}

impl fmt::Debug for Scopes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.0.iter()).finish()
    }
}

impl fmt::Display for Scopes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

impl<S: Into<String>> FromIterator<S> for Scopes {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut scopes = Scopes::new();
        for s in iter {
            scopes.insert(s);
        }
        scopes
    }
}

impl FromStr for Scopes {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.split_whitespace().collect())
    }
}

impl From<String> for Scopes {
    fn from(s: String) -> Self {
        s.split_whitespace().collect()
    }
}

impl From<Scopes> for String {
    fn from(s: Scopes) -> Self {
        s.0.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_and_reserved_are_dropped() {
        let scopes: Scopes = "User.Read user.read openid Files.Read".parse().unwrap();
        assert_eq!(scopes.to_string(), "User.Read Files.Read");
    }

    #[test]
    fn request_string_appends_reserved_scopes() {
        let scopes = Scopes::new().and("User.Read").and("Files.Read");
        assert_eq!(
            scopes.to_request_string(),
            "User.Read Files.Read openid profile offline_access"
        );
    }

    #[test]
    fn cache_key_ignores_order_and_case() {
        let a: Scopes = "User.Read Files.Read".parse().unwrap();
        let b: Scopes = "files.read USER.READ".parse().unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
    }
}
