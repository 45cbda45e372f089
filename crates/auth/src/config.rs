//! Engine configuration: defaults, option overlays and pluggable strategies.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use gatehouse_core::{Profile, Role};

use crate::roles::{any_role_matches, roles_from_profile};

/// Extracts the role set from the current profile.
pub type RolesFunction = Arc<dyn Fn(Option<&Profile>, &Configuration) -> Vec<Role> + Send + Sync>;

/// Decides whether the user's roles (first) satisfy the requested roles (second).
pub type ValidationFunction = Arc<dyn Fn(&[Role], &[Role]) -> bool + Send + Sync>;

/// Periodic reauthentication callback.
pub type ReauthenticationFunction = Arc<dyn Fn() + Send + Sync>;

pub const DEFAULT_PROFILE_STORAGE_KEY: &str = "$authentication.user-profile";
pub const DEFAULT_LAST_ATTEMPTED_URL_STORAGE_KEY: &str = "$authentication.last-attempted-url";
pub const DEFAULT_REAUTHENTICATION_TIMEOUT: Duration = Duration::from_millis(1_200_000);

/// Names the engine broadcasts its events under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventNames {
    pub login_confirmed: String,
    pub login_required: String,
    pub logout_confirmed: String,
    pub not_authenticated: String,
    pub not_authorized: String,
}

impl Default for EventNames {
    fn default() -> Self {
        Self {
            login_confirmed: "event:auth-loginConfirmed".to_string(),
            login_required: "event:auth-loginRequired".to_string(),
            logout_confirmed: "event:auth-logoutConfirmed".to_string(),
            not_authenticated: "event:auth-notAuthenticated".to_string(),
            not_authorized: "event:auth-notAuthorized".to_string(),
        }
    }
}

/// Periodic reauthentication settings.
#[derive(Clone)]
pub struct Reauthentication {
    pub function: ReauthenticationFunction,
    pub timeout: Duration,
}

impl Default for Reauthentication {
    fn default() -> Self {
        Self {
            function: Arc::new(|| {}),
            timeout: DEFAULT_REAUTHENTICATION_TIMEOUT,
        }
    }
}

impl core::fmt::Debug for Reauthentication {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Reauthentication")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Resolved engine configuration.
///
/// Redirect URLs are optional: `None` means "stay where you are".
#[derive(Clone)]
pub struct Configuration {
    pub profile_storage_key: String,
    pub last_attempted_url_storage_key: String,
    /// When set, a session additionally requires this cookie to be present.
    pub auth_cookie_key: Option<String>,
    /// When set, the profile property holding the session expiration.
    pub expiration_property: Option<String>,
    /// Profile property read by the default roles function.
    pub user_roles_property: String,
    pub on_login_redirect_url: Option<String>,
    pub on_logout_redirect_url: Option<String>,
    pub not_authorized_redirect_url: Option<String>,
    pub not_authenticated_redirect_url: Option<String>,
    /// Replay the last attempted URL after login/logout.
    pub track_last_attempted_url: bool,
    /// Forget the last attempted URL once login has navigated to it.
    pub clear_last_attempted_url_on_login: bool,
    pub events: EventNames,
    pub roles_function: RolesFunction,
    pub validation_function: ValidationFunction,
    pub reauthentication: Reauthentication,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            profile_storage_key: DEFAULT_PROFILE_STORAGE_KEY.to_string(),
            last_attempted_url_storage_key: DEFAULT_LAST_ATTEMPTED_URL_STORAGE_KEY.to_string(),
            auth_cookie_key: None,
            expiration_property: None,
            user_roles_property: "roles".to_string(),
            on_login_redirect_url: Some("/".to_string()),
            on_logout_redirect_url: Some("/".to_string()),
            not_authorized_redirect_url: Some("/".to_string()),
            not_authenticated_redirect_url: Some("/".to_string()),
            track_last_attempted_url: true,
            clear_last_attempted_url_on_login: false,
            events: EventNames::default(),
            roles_function: Arc::new(roles_from_profile),
            validation_function: Arc::new(any_role_matches),
            reauthentication: Reauthentication::default(),
        }
    }
}

impl core::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Configuration")
            .field("profile_storage_key", &self.profile_storage_key)
            .field("last_attempted_url_storage_key", &self.last_attempted_url_storage_key)
            .field("auth_cookie_key", &self.auth_cookie_key)
            .field("expiration_property", &self.expiration_property)
            .field("user_roles_property", &self.user_roles_property)
            .field("on_login_redirect_url", &self.on_login_redirect_url)
            .field("on_logout_redirect_url", &self.on_logout_redirect_url)
            .field("not_authorized_redirect_url", &self.not_authorized_redirect_url)
            .field("not_authenticated_redirect_url", &self.not_authenticated_redirect_url)
            .field("track_last_attempted_url", &self.track_last_attempted_url)
            .field("clear_last_attempted_url_on_login", &self.clear_last_attempted_url_on_login)
            .field("events", &self.events)
            .field("reauthentication", &self.reauthentication)
            .finish_non_exhaustive()
    }
}

impl Configuration {
    /// Defaults overlaid with `options`.
    pub fn with_options(options: Options) -> Self {
        let mut configuration = Self::default();
        configuration.merge(options);
        configuration
    }

    /// Shallow merge: every option that is set replaces the current value.
    pub fn merge(&mut self, options: Options) {
        let Options {
            profile_storage_key,
            last_attempted_url_storage_key,
            auth_cookie_key,
            expiration_property,
            user_roles_property,
            on_login_redirect_url,
            on_logout_redirect_url,
            not_authorized_redirect_url,
            not_authenticated_redirect_url,
            track_last_attempted_url,
            clear_last_attempted_url_on_login,
            events,
            reauthentication_timeout_ms,
        } = options;

        if let Some(v) = profile_storage_key {
            self.profile_storage_key = v;
        }
        if let Some(v) = last_attempted_url_storage_key {
            self.last_attempted_url_storage_key = v;
        }
        if let Some(v) = auth_cookie_key {
            self.auth_cookie_key = v;
        }
        if let Some(v) = expiration_property {
            self.expiration_property = v;
        }
        if let Some(v) = user_roles_property {
            self.user_roles_property = v;
        }
        if let Some(v) = on_login_redirect_url {
            self.on_login_redirect_url = v;
        }
        if let Some(v) = on_logout_redirect_url {
            self.on_logout_redirect_url = v;
        }
        if let Some(v) = not_authorized_redirect_url {
            self.not_authorized_redirect_url = v;
        }
        if let Some(v) = not_authenticated_redirect_url {
            self.not_authenticated_redirect_url = v;
        }
        if let Some(v) = track_last_attempted_url {
            self.track_last_attempted_url = v;
        }
        if let Some(v) = clear_last_attempted_url_on_login {
            self.clear_last_attempted_url_on_login = v;
        }
        if let Some(v) = events {
            self.events = v;
        }
        if let Some(ms) = reauthentication_timeout_ms {
            self.reauthentication.timeout = Duration::from_millis(ms);
        }
    }

    pub fn with_roles_function<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&Profile>, &Configuration) -> Vec<Role> + Send + Sync + 'static,
    {
        self.roles_function = Arc::new(f);
        self
    }

    pub fn with_validation_function<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Role], &[Role]) -> bool + Send + Sync + 'static,
    {
        self.validation_function = Arc::new(f);
        self
    }

    pub fn with_reauthentication<F>(mut self, f: F, timeout: Duration) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.reauthentication = Reauthentication {
            function: Arc::new(f),
            timeout,
        };
        self
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("malformed options document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Data-only configuration overlay.
///
/// Every field is optional; unset fields keep whatever the configuration
/// already holds. Settings that may be switched off (the cookie key, the
/// expiration property and the redirect URLs) take `Some(None)` to clear
/// them: an explicit `null` in JSON, an empty value in the environment.
/// Strategies (functions) are not data and are set on [`Configuration`]
/// directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    pub profile_storage_key: Option<String>,
    pub last_attempted_url_storage_key: Option<String>,
    #[serde(default, deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub auth_cookie_key: Option<Option<String>>,
    #[serde(default, deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub expiration_property: Option<Option<String>>,
    pub user_roles_property: Option<String>,
    #[serde(default, deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub on_login_redirect_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub on_logout_redirect_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub not_authorized_redirect_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub not_authenticated_redirect_url: Option<Option<String>>,
    pub track_last_attempted_url: Option<bool>,
    pub clear_last_attempted_url_on_login: Option<bool>,
    pub events: Option<EventNames>,
    pub reauthentication_timeout_ms: Option<u64>,
}

fn clearable<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl Options {
    /// Parse options from a JSON document.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(document)?)
    }

    /// Read options from `GATEHOUSE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        fn flag(var: &'static str, value: Option<String>) -> Result<Option<bool>, ConfigError> {
            value
                .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => Ok(true),
                    "0" | "false" | "no" | "off" => Ok(false),
                    _ => Err(ConfigError::InvalidValue { var, value: raw }),
                })
                .transpose()
        }

        fn empty_clears(value: Option<String>) -> Option<Option<String>> {
            value.map(|raw| Some(raw).filter(|v| !v.trim().is_empty()))
        }

        const TIMEOUT_VAR: &str = "GATEHOUSE_REAUTHENTICATION_TIMEOUT_MS";
        let reauthentication_timeout_ms = lookup(TIMEOUT_VAR)
            .map(|raw| {
                raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                    var: TIMEOUT_VAR,
                    value: raw,
                })
            })
            .transpose()?;

        Ok(Self {
            profile_storage_key: lookup("GATEHOUSE_PROFILE_STORAGE_KEY"),
            last_attempted_url_storage_key: lookup("GATEHOUSE_LAST_ATTEMPTED_URL_STORAGE_KEY"),
            auth_cookie_key: empty_clears(lookup("GATEHOUSE_AUTH_COOKIE_KEY")),
            expiration_property: empty_clears(lookup("GATEHOUSE_EXPIRATION_PROPERTY")),
            user_roles_property: lookup("GATEHOUSE_USER_ROLES_PROPERTY"),
            on_login_redirect_url: empty_clears(lookup("GATEHOUSE_ON_LOGIN_REDIRECT_URL")),
            on_logout_redirect_url: empty_clears(lookup("GATEHOUSE_ON_LOGOUT_REDIRECT_URL")),
            not_authorized_redirect_url: empty_clears(lookup("GATEHOUSE_NOT_AUTHORIZED_REDIRECT_URL")),
            not_authenticated_redirect_url: empty_clears(lookup("GATEHOUSE_NOT_AUTHENTICATED_REDIRECT_URL")),
            track_last_attempted_url: flag(
                "GATEHOUSE_TRACK_LAST_ATTEMPTED_URL",
                lookup("GATEHOUSE_TRACK_LAST_ATTEMPTED_URL"),
            )?,
            clear_last_attempted_url_on_login: None,
            events: None,
            reauthentication_timeout_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let c = Configuration::default();
        assert_eq!(c.profile_storage_key, "$authentication.user-profile");
        assert_eq!(c.last_attempted_url_storage_key, "$authentication.last-attempted-url");
        assert!(c.auth_cookie_key.is_none());
        assert!(c.expiration_property.is_none());
        assert_eq!(c.user_roles_property, "roles");
        assert_eq!(c.on_login_redirect_url.as_deref(), Some("/"));
        assert_eq!(c.not_authenticated_redirect_url.as_deref(), Some("/"));
        assert!(c.track_last_attempted_url);
        assert!(!c.clear_last_attempted_url_on_login);
        assert_eq!(c.events.logout_confirmed, "event:auth-logoutConfirmed");
        assert_eq!(c.reauthentication.timeout, Duration::from_millis(1_200_000));
    }

    #[test]
    fn merge_is_shallow_and_keeps_unset_fields() {
        let c = Configuration::with_options(Options {
            on_login_redirect_url: Some(Some("/dashboard".into())),
            on_logout_redirect_url: Some(Some("/home".into())),
            auth_cookie_key: Some(Some("AUTH-COOKIE".into())),
            reauthentication_timeout_ms: Some(100),
            ..Options::default()
        });

        assert_eq!(c.on_login_redirect_url.as_deref(), Some("/dashboard"));
        assert_eq!(c.on_logout_redirect_url.as_deref(), Some("/home"));
        assert_eq!(c.auth_cookie_key.as_deref(), Some("AUTH-COOKIE"));
        assert_eq!(c.reauthentication.timeout, Duration::from_millis(100));
        assert_eq!(c.profile_storage_key, DEFAULT_PROFILE_STORAGE_KEY);
        assert_eq!(c.not_authorized_redirect_url.as_deref(), Some("/"));
    }

    #[test]
    fn options_from_json() {
        let options = Options::from_json(
            r#"{ "profile_storage_key": "foo", "track_last_attempted_url": false,
                 "events": { "login_confirmed": "login" } }"#,
        )
        .unwrap();

        let c = Configuration::with_options(options);
        assert_eq!(c.profile_storage_key, "foo");
        assert!(!c.track_last_attempted_url);
        assert_eq!(c.events.login_confirmed, "login");
        assert_eq!(c.events.login_required, "event:auth-loginRequired");
    }

    #[test]
    fn options_from_json_rejects_unknown_fields() {
        let err = Options::from_json(r#"{ "profileStorageKey": "foo" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed(_)));
    }

    #[test]
    fn options_from_environment() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GATEHOUSE_AUTH_COOKIE_KEY", "SESSION"),
            ("GATEHOUSE_TRACK_LAST_ATTEMPTED_URL", "off"),
            ("GATEHOUSE_REAUTHENTICATION_TIMEOUT_MS", "5000"),
        ]);
        let options = Options::from_lookup(|var| env.get(var).map(|v| v.to_string())).unwrap();

        assert_eq!(options.auth_cookie_key, Some(Some("SESSION".to_string())));
        assert_eq!(options.track_last_attempted_url, Some(false));
        assert_eq!(options.reauthentication_timeout_ms, Some(5000));
        assert!(options.profile_storage_key.is_none());
    }

    #[test]
    fn options_from_environment_rejects_bad_values() {
        let err = Options::from_lookup(|var| {
            (var == "GATEHOUSE_TRACK_LAST_ATTEMPTED_URL").then(|| "maybe".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: "GATEHOUSE_TRACK_LAST_ATTEMPTED_URL", .. }));

        let err = Options::from_lookup(|var| {
            (var == "GATEHOUSE_REAUTHENTICATION_TIMEOUT_MS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn custom_strategies_replace_defaults() {
        let c = Configuration::default()
            .with_validation_function(|held, wanted| wanted.iter().all(|r| held.contains(r)))
            .with_roles_function(|_, _| vec![Role::new("root")]);

        assert_eq!((c.roles_function)(None, &c), vec![Role::new("root")]);
        assert!(!(c.validation_function)(&[Role::new("a")], &[Role::new("a"), Role::new("b")]));
    }

    #[test]
    fn explicit_null_clears_a_setting() {
        let mut c = Configuration::with_options(Options {
            auth_cookie_key: Some(Some("AUTH-COOKIE".into())),
            ..Options::default()
        });

        c.merge(
            Options::from_json(r#"{ "not_authorized_redirect_url": null, "auth_cookie_key": null }"#)
                .unwrap(),
        );
        assert!(c.not_authorized_redirect_url.is_none());
        assert!(c.auth_cookie_key.is_none());
        assert_eq!(c.on_login_redirect_url.as_deref(), Some("/"));

        c.merge(Options::from_json(r#"{ "on_logout_redirect_url": "/bye" }"#).unwrap());
        assert_eq!(c.on_logout_redirect_url.as_deref(), Some("/bye"));
    }

    #[test]
    fn empty_environment_value_clears_a_setting() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GATEHOUSE_ON_LOGIN_REDIRECT_URL", ""),
            ("GATEHOUSE_EXPIRATION_PROPERTY", "expires_at"),
        ]);
        let options = Options::from_lookup(|var| env.get(var).map(|v| v.to_string())).unwrap();

        assert_eq!(options.on_login_redirect_url, Some(None));
        assert_eq!(options.expiration_property, Some(Some("expires_at".to_string())));
        assert_eq!(options.on_logout_redirect_url, None);

        let c = Configuration::with_options(options);
        assert!(c.on_login_redirect_url.is_none());
        assert_eq!(c.expiration_property.as_deref(), Some("expires_at"));
    }
}
