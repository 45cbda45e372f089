//! Cookie presence checks.

use std::sync::RwLock;

/// Source of the raw `Cookie` header string (`a=1; b=2`).
pub trait CookieReader: Send + Sync {
    fn raw_cookies(&self) -> String;
}

/// True unless some `;`-separated segment is `<key>=<non-empty value>`.
///
/// A cookie that is present but empty counts as missing: that is how
/// servers delete cookies.
pub fn is_cookie_missing(raw: &str, key: &str) -> bool {
    let prefix = format!("{key}=");
    !raw
        .split(';')
        .map(str::trim)
        .any(|cookie| cookie.len() > prefix.len() && cookie.starts_with(&prefix))
}

/// Mutable in-memory cookie jar.
#[derive(Debug, Default)]
pub struct InMemoryCookies {
    raw: RwLock<String>,
}

impl InMemoryCookies {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: RwLock::new(raw.into()),
        }
    }

    pub fn set_raw(&self, raw: impl Into<String>) {
        if let Ok(mut current) = self.raw.write() {
            *current = raw.into();
        }
    }

    /// Set (or replace) a single cookie.
    pub fn set(&self, name: &str, value: &str) {
        self.rewrite(name, Some(value));
    }

    pub fn remove(&self, name: &str) {
        self.rewrite(name, None);
    }

    fn rewrite(&self, name: &str, value: Option<&str>) {
        let Ok(mut current) = self.raw.write() else {
            return;
        };
        let prefix = format!("{name}=");
        let mut cookies: Vec<String> = current
            .split(';')
            .map(str::trim)
            .filter(|c| !c.is_empty() && !c.starts_with(&prefix))
            .map(str::to_string)
            .collect();
        if let Some(value) = value {
            cookies.push(format!("{prefix}{value}"));
        }
        *current = cookies.join("; ");
    }
}

impl CookieReader for InMemoryCookies {
    fn raw_cookies(&self) -> String {
        self.raw.read().map(|raw| raw.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_when_absent() {
        assert!(is_cookie_missing("", "AUTH-COOKIE"));
        assert!(is_cookie_missing("PRE-AUTH-COOKIE=x; POST-AUTH-COOKIE=y", "AUTH-COOKIE"));
    }

    #[test]
    fn present_among_other_cookies() {
        assert!(!is_cookie_missing("AUTH-COOKIE=Authorized", "AUTH-COOKIE"));
        assert!(!is_cookie_missing(
            "PRE-AUTH-COOKIE=Not Authorized; AUTH-COOKIE=Authorized; POST-AUTH-COOKIE=Not Authorized",
            "AUTH-COOKIE"
        ));
    }

    #[test]
    fn empty_value_counts_as_missing() {
        assert!(is_cookie_missing("AUTH-COOKIE=", "AUTH-COOKIE"));
        assert!(is_cookie_missing("a=1;  AUTH-COOKIE=  ;b=2", "AUTH-COOKIE"));
    }

    #[test]
    fn jar_set_replace_remove() {
        let jar = InMemoryCookies::new("a=1");
        jar.set("AUTH", "x");
        jar.set("AUTH", "y");
        assert_eq!(jar.raw_cookies(), "a=1; AUTH=y");

        jar.remove("AUTH");
        assert_eq!(jar.raw_cookies(), "a=1");
    }
}
