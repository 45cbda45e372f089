//! `gatehouse-auth`: client-side session tracking and role-based access checks.
//!
//! The engine is decoupled from any UI framework: storage, cookies,
//! navigation, events and timers are collaborators behind traits.

pub mod authenticator;
pub mod config;
pub mod cookies;
pub mod events;
pub mod navigator;
pub mod roles;
pub mod scheduler;
pub mod store;

pub use authenticator::{Authenticator, LogoutRedirect};
pub use config::{
    ConfigError, Configuration, EventNames, Options, Reauthentication, ReauthenticationFunction,
    RolesFunction, ValidationFunction,
};
pub use cookies::{CookieReader, InMemoryCookies, is_cookie_missing};
pub use events::AuthEvent;
pub use navigator::{InMemoryNavigator, Navigator};
pub use roles::{any_role_matches, roles_from_profile};
pub use scheduler::{ManualScheduler, Scheduler, Task, ThreadScheduler, TimerHandle};
pub use store::{FileStore, InMemoryStore, KeyValueStore, StoreError};

pub use gatehouse_core::{Profile, Role, RoleRequest, roles};
