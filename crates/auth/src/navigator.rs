//! Current location access.

use std::sync::Mutex;

/// Reads and changes the application's current URL (path, query and fragment).
pub trait Navigator: Send + Sync {
    fn url(&self) -> String;

    fn set_url(&self, url: &str);
}

/// Navigator that only remembers where it has been.
#[derive(Debug)]
pub struct InMemoryNavigator {
    history: Mutex<Vec<String>>,
}

impl InMemoryNavigator {
    pub fn new(start: impl Into<String>) -> Self {
        Self {
            history: Mutex::new(vec![start.into()]),
        }
    }

    /// Every URL visited, oldest first, starting with the initial one.
    pub fn history(&self) -> Vec<String> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

impl Default for InMemoryNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for InMemoryNavigator {
    fn url(&self) -> String {
        self.history
            .lock()
            .ok()
            .and_then(|h| h.last().cloned())
            .unwrap_or_default()
    }

    fn set_url(&self, url: &str) {
        if let Ok(mut history) = self.history.lock() {
            history.push(url.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remembers_every_visit() {
        let navigator = InMemoryNavigator::default();
        navigator.set_url("/about");
        navigator.set_url("/notauthenticated");

        assert_eq!(navigator.url(), "/notauthenticated");
        assert_eq!(navigator.history(), vec!["/", "/about", "/notauthenticated"]);
    }
}
