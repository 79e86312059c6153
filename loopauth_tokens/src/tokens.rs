use serde::{Deserialize, Serialize};

use crate::clock::{Clock, DurationSecs, UnixTime};
use crate::{AccessToken, AccessTokenRef};

/// An access token with the lifetime information computed when it was issued
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenWithLifetime {
    access_token: AccessToken,
    lifetime: DurationSecs,
    issued: UnixTime,
    stale: UnixTime,
    expiry: UnixTime,
}

/// A token's lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenStatus {
    /// The token is fresh and valid
    Fresh,
    /// The token is valid, but should be refreshed
    Stale,
    /// The token is no longer valid
    Expired,
}

impl TokenWithLifetime {
    /// Gets the access token
    #[inline]
    pub fn access_token(&self) -> &AccessTokenRef {
        &self.access_token
    }

    /// Consumes the value, returning the owned access token
    #[inline]
    pub fn into_access_token(self) -> AccessToken {
        self.access_token
    }

    /// Gets the token's lifetime
    #[inline]
    pub fn lifetime(&self) -> DurationSecs {
        self.lifetime
    }

    /// Gets the time that the token was issued
    #[inline]
    pub fn issued(&self) -> UnixTime {
        self.issued
    }

    /// Gets the time that the token will become stale
    #[inline]
    pub fn stale(&self) -> UnixTime {
        self.stale
    }

    /// Gets the time that the token will expire
    #[inline]
    pub fn expiry(&self) -> UnixTime {
        self.expiry
    }

    /// Gets the token's lifetime status as reported by the provided clock
    #[inline]
    pub fn token_status_with_clock<C: Clock + ?Sized>(&self, clock: &C) -> TokenStatus {
        self.token_status_at(clock.now())
    }

    /// Gets the token's lifetime status as of the provided time
    #[inline]
    pub fn token_status_at(&self, time: UnixTime) -> TokenStatus {
        if time < self.stale {
            TokenStatus::Fresh
        } else if time < self.expiry {
            TokenStatus::Stale
        } else {
            TokenStatus::Expired
        }
    }

    /// Gets a duration for how much longer the token would be valid as of the
    /// provided time
    #[inline]
    pub fn until_expired_at(&self, time: UnixTime) -> DurationSecs {
        if time < self.expiry {
            self.expiry - time
        } else {
            DurationSecs(0)
        }
    }
}

/// Configuration for determining how long a token should be considered fresh
///
/// Silent acquisition hands out a cached access token only while it is fresh;
/// once stale, the refresh token is redeemed even though the old access token
/// would still be accepted for a while.
#[derive(Clone, Copy, Debug)]
pub struct TokenLifetimeConfig {
    freshness_period: f64,
    min_staleness_period: DurationSecs,
}

impl Default for TokenLifetimeConfig {
    /// Uses a freshness period of 75%, with a minimum stale period of 5 minutes
    fn default() -> Self {
        Self {
            freshness_period: 0.75,
            min_staleness_period: DurationSecs(300),
        }
    }
}

impl TokenLifetimeConfig {
    /// Constructs a new lifetime configuration
    ///
    /// A token using this configuration will be considered stale when the `freshness_period`
    /// (a ratio of the token's lifetime) has passed, and always with at least
    /// `min_staleness_period` remaining before expiry.
    pub fn new(freshness_period: f64, min_staleness_period: DurationSecs) -> Self {
        Self {
            freshness_period,
            min_staleness_period,
        }
    }

    fn time_to_stale(&self, issued: UnixTime, valid_duration: DurationSecs) -> UnixTime {
        let fresh_for = valid_duration * self.freshness_period;
        let latest = DurationSecs(valid_duration.0.saturating_sub(self.min_staleness_period.0));
        issued + fresh_for.min(latest)
    }

    /// Given an access token and its lifetime, constructs a token issued at `issued`
    pub fn create_token(
        &self,
        access_token: AccessToken,
        issued: UnixTime,
        valid_duration: DurationSecs,
    ) -> TokenWithLifetime {
        TokenWithLifetime {
            access_token,
            lifetime: valid_duration,
            issued,
            stale: self.time_to_stale(issued, valid_duration),
            expiry: issued + valid_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(lifetime: u64) -> TokenWithLifetime {
        TokenLifetimeConfig::default().create_token(
            AccessToken::from_static("at"),
            UnixTime(1_000),
            DurationSecs(lifetime),
        )
    }

    #[test]
    fn hour_long_token_goes_stale_at_three_quarters() {
        let t = token(3_600);
        assert_eq!(t.stale(), UnixTime(1_000 + 2_700));
        assert_eq!(t.expiry(), UnixTime(1_000 + 3_600));
    }

    #[test]
    fn short_token_keeps_minimum_stale_window() {
        let t = token(600);
        assert_eq!(t.stale(), UnixTime(1_000 + 300));
    }

    #[test]
    fn status_moves_through_lifecycle() {
        let t = token(3_600);
        assert_eq!(t.token_status_at(UnixTime(1_000)), TokenStatus::Fresh);
        assert_eq!(t.token_status_at(UnixTime(3_700)), TokenStatus::Stale);
        assert_eq!(t.token_status_at(UnixTime(4_600)), TokenStatus::Expired);
        assert_eq!(t.until_expired_at(UnixTime(4_000)), DurationSecs(600));
    }
}
