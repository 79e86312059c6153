//! Opening the user's browser

use std::io;

/// Sends the user's browser to a URL
pub trait BrowserLauncher: Send + Sync {
    /// Opens `url`, returning once the browser has been asked to navigate
    fn open(&self, url: &str) -> io::Result<()>;
}

/// The system's default browser
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> io::Result<()> {
        webbrowser::open(url)
    }
}

impl<F> BrowserLauncher for F
where
    F: Fn(&str) -> io::Result<()> + Send + Sync,
{
    fn open(&self, url: &str) -> io::Result<()> {
        self(url)
    }
}
