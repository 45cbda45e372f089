//! Events broadcast by the authenticator.

use serde::Serialize;

use gatehouse_core::{Profile, RoleRequest};

use crate::config::EventNames;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum AuthEvent {
    /// A session started (or was re-announced); carries the stored profile.
    LoginConfirmed(Profile),
    LoginRequired,
    LogoutConfirmed,
    /// Access was refused to an anonymous user; carries the request as made.
    NotAuthenticated(Vec<RoleRequest>),
    /// Access was refused to an authenticated user; carries the request as made.
    NotAuthorized(Vec<RoleRequest>),
}

impl AuthEvent {
    /// The configured name this event is broadcast under.
    pub fn name<'a>(&self, names: &'a EventNames) -> &'a str {
        match self {
            AuthEvent::LoginConfirmed(_) => &names.login_confirmed,
            AuthEvent::LoginRequired => &names.login_required,
            AuthEvent::LogoutConfirmed => &names.logout_confirmed,
            AuthEvent::NotAuthenticated(_) => &names.not_authenticated,
            AuthEvent::NotAuthorized(_) => &names.not_authorized,
        }
    }
}
