//! The authentication/authorization engine.
//!
//! One [`Authenticator`] per application session. It owns the configuration
//! and the reauthentication timer and drives the collaborators:
//!
//! ```text
//! caller ──► Authenticator ──► KeyValueStore   (profile, last attempted URL)
//!                          ├─► CookieReader    (auth cookie presence)
//!                          ├─► EventBus        (session notifications)
//!                          ├─► Navigator       (redirects)
//!                          └─► Scheduler       (reauthentication timer)
//! ```
//!
//! Within `login_confirmed`/`logout_confirmed` the store is updated before
//! the event is broadcast, and the event is broadcast before navigating, so
//! handlers always observe the new session state.
//!
//! Decision functions never fail: collaborator errors are logged and the
//! failing call is treated as a no-op.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use serde_json::Value;

use gatehouse_core::{Profile, Role, RoleRequest, SubscriptionId, distinct_count, intersection};
use gatehouse_events::{EventBus, InMemoryEventBus};

use crate::config::{Configuration, Options};
use crate::cookies::{CookieReader, InMemoryCookies, is_cookie_missing};
use crate::events::AuthEvent;
use crate::navigator::{InMemoryNavigator, Navigator};
use crate::scheduler::{Scheduler, ThreadScheduler, TimerHandle};
use crate::store::{InMemoryStore, KeyValueStore};

/// Whether `logout_confirmed` navigates afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutRedirect {
    /// Navigate to the last attempted URL (when tracked) or the logout URL.
    Follow,
    /// Stay on the current URL.
    Suppress,
}

pub struct Authenticator<B = InMemoryEventBus<AuthEvent>>
where
    B: EventBus<AuthEvent>,
{
    configuration: RwLock<Configuration>,
    store: Arc<dyn KeyValueStore>,
    cookies: Arc<dyn CookieReader>,
    navigator: Arc<dyn Navigator>,
    scheduler: Arc<dyn Scheduler>,
    bus: B,
    timer: Mutex<Option<TimerHandle>>,
}

impl Authenticator<InMemoryEventBus<AuthEvent>> {
    /// Engine wired to in-process collaborators only.
    pub fn in_memory(configuration: Configuration) -> Self {
        Self::new(configuration, InMemoryEventBus::new())
    }
}

impl<B> Authenticator<B>
where
    B: EventBus<AuthEvent>,
{
    /// Create an engine broadcasting on `bus`.
    ///
    /// Store, cookies and navigator start as in-memory adapters and timers
    /// run on background threads; replace them with the `with_*` methods.
    pub fn new(configuration: Configuration, bus: B) -> Self {
        Self {
            configuration: RwLock::new(configuration),
            store: Arc::new(InMemoryStore::new()),
            cookies: Arc::new(InMemoryCookies::default()),
            navigator: Arc::new(InMemoryNavigator::default()),
            scheduler: Arc::new(ThreadScheduler),
            bus,
            timer: Mutex::new(None),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_cookies(mut self, cookies: Arc<dyn CookieReader>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    // ─────────────────────────────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────────────────────────────

    /// Snapshot of the live configuration.
    pub fn configuration(&self) -> Configuration {
        self.configuration
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Mutate the live configuration; later calls see the change.
    ///
    /// `update` works on a copy that is swapped in afterwards, so it may call
    /// back into the engine.
    pub fn configure(&self, update: impl FnOnce(&mut Configuration)) {
        let mut next = self.configuration();
        update(&mut next);
        *self
            .configuration
            .write()
            .unwrap_or_else(PoisonError::into_inner) = next;
    }

    pub fn merge_options(&self, options: Options) {
        self.configure(|c| c.merge(options));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Authentication state
    // ─────────────────────────────────────────────────────────────────────

    /// True when a profile is stored and the session is still consistent
    /// with the auth cookie and the profile expiration.
    ///
    /// An inconsistent session is purged on the spot: the profile is removed
    /// and a logout is broadcast (without navigating).
    pub fn is_authenticated(&self) -> bool {
        let configuration = self.configuration();
        let has_profile = self.contains(&configuration.profile_storage_key);

        if has_profile
            && (self.cookie_missing(&configuration) || self.profile_expired(&configuration))
        {
            tracing::info!("stored session is stale; logging out");
            self.logout_confirmed(LogoutRedirect::Suppress);
            return false;
        }

        has_profile
    }

    /// True when an auth cookie is required but absent or empty.
    pub fn is_auth_cookie_missing(&self) -> bool {
        self.cookie_missing(&self.configuration())
    }

    /// True when the profile carries an expiration in the past.
    pub fn is_profile_expired(&self) -> bool {
        self.profile_expired(&self.configuration())
    }

    fn cookie_missing(&self, configuration: &Configuration) -> bool {
        match configuration.auth_cookie_key.as_deref() {
            Some(key) if !key.is_empty() => is_cookie_missing(&self.cookies.raw_cookies(), key),
            _ => false,
        }
    }

    fn profile_expired(&self, configuration: &Configuration) -> bool {
        let Some(property) = configuration.expiration_property.as_deref() else {
            return false;
        };
        self.load_profile(configuration)
            .is_some_and(|profile| profile.is_expired_at(property, Utc::now()))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Profile & roles
    // ─────────────────────────────────────────────────────────────────────

    pub fn profile(&self) -> Option<Profile> {
        self.load_profile(&self.configuration())
    }

    /// Store `data` as the profile (a JSON `null` is ignored) and return
    /// what is stored afterwards.
    pub fn set_profile(&self, data: impl Into<Profile>) -> Option<Profile> {
        let data = data.into();
        let configuration = self.configuration();
        if !data.is_null() {
            self.write(&configuration.profile_storage_key, data.into_value());
        }
        self.load_profile(&configuration)
    }

    fn load_profile(&self, configuration: &Configuration) -> Option<Profile> {
        self.read(&configuration.profile_storage_key)
            .filter(|value| !value.is_null())
            .map(Profile::new)
    }

    pub fn roles(&self) -> Vec<Role> {
        let configuration = self.configuration();
        self.roles_with(&configuration)
    }

    fn roles_with(&self, configuration: &Configuration) -> Vec<Role> {
        let profile = self.load_profile(configuration);
        (configuration.roles_function)(profile.as_ref(), configuration)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Permission evaluation
    // ─────────────────────────────────────────────────────────────────────

    /// Decide whether the current user satisfies `request`.
    ///
    /// A request that flattens to the single name `ALL` is granted to any
    /// authenticated user, `ANONYMOUS` to any unauthenticated one (both case
    /// insensitive). Otherwise the user must be authenticated and the
    /// configured validation function decides.
    pub fn allowed(&self, request: impl Into<RoleRequest>) -> bool {
        let requested = request.into().flatten();
        let authenticated = self.is_authenticated();

        if let [only] = requested.as_slice() {
            if only.is_keyword(Role::ALL) {
                return authenticated;
            }
            if only.is_keyword(Role::ANONYMOUS) {
                return !authenticated;
            }
        }

        if requested.is_empty() || !authenticated {
            return false;
        }

        let configuration = self.configuration();
        let held = self.roles_with(&configuration);
        let granted = (configuration.validation_function)(&held, &requested);
        tracing::debug!(?requested, ?held, granted, "role check");
        granted
    }

    /// True when every requested role is held (an empty request is false).
    pub fn is_in_all_roles(&self, request: impl Into<RoleRequest>) -> bool {
        let needles = request.into().flatten();
        if needles.is_empty() {
            return false;
        }
        let held = self.roles();
        intersection(&held, &needles).len() == distinct_count(&needles)
    }

    /// True when at least one requested role is held.
    pub fn is_in_any_roles(&self, request: impl Into<RoleRequest>) -> bool {
        let needles = request.into().flatten();
        let held = self.roles();
        !intersection(&held, &needles).is_empty()
    }

    /// Check `request` and redirect when it is refused.
    ///
    /// The current URL is recorded as the last attempted URL first, whatever
    /// the outcome. On refusal the user is sent to the not-authenticated or
    /// not-authorized URL and the matching event is broadcast with the
    /// request's top-level arguments. Returns whether access was granted.
    pub fn permit(&self, request: impl Into<RoleRequest>) -> bool {
        let request = request.into();
        let configuration = self.configuration();

        let current = self.navigator.url();
        self.write(&configuration.last_attempted_url_storage_key, Value::String(current));

        if self.allowed(&request) {
            return true;
        }

        let arguments = request.arguments();
        let (target, event) = if self.is_authenticated() {
            (
                configuration.not_authorized_redirect_url.as_deref(),
                AuthEvent::NotAuthorized(arguments),
            )
        } else {
            (
                configuration.not_authenticated_redirect_url.as_deref(),
                AuthEvent::NotAuthenticated(arguments),
            )
        };

        tracing::info!(?target, event = event.name(&configuration.events), "access refused");
        if let Some(url) = target {
            self.navigator.set_url(url);
        }
        self.emit(&configuration, event);
        false
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Start a session for `profile`.
    pub fn login_confirmed(&self, profile: impl Into<Profile>) {
        let profile = profile.into();
        let configuration = self.configuration();
        let last_attempted = self.last_attempted_url_with(&configuration);

        self.write(&configuration.profile_storage_key, profile.as_value().clone());
        self.arm_timer(&configuration);
        tracing::info!("login confirmed");
        self.emit(&configuration, AuthEvent::LoginConfirmed(profile));

        match last_attempted.filter(|_| configuration.track_last_attempted_url) {
            Some(url) => {
                self.navigator.set_url(&url);
                if configuration.clear_last_attempted_url_on_login {
                    self.delete(&configuration.last_attempted_url_storage_key);
                }
            }
            None => {
                if let Some(url) = configuration.on_login_redirect_url.as_deref() {
                    self.navigator.set_url(url);
                }
            }
        }
    }

    /// End the current session.
    pub fn logout_confirmed(&self, redirect: LogoutRedirect) {
        let configuration = self.configuration();

        self.delete(&configuration.profile_storage_key);
        self.disarm_timer();
        tracing::info!(?redirect, "logout confirmed");
        self.emit(&configuration, AuthEvent::LogoutConfirmed);

        if redirect == LogoutRedirect::Suppress {
            return;
        }

        let target = self
            .last_attempted_url_with(&configuration)
            .filter(|_| configuration.track_last_attempted_url)
            .or_else(|| configuration.on_logout_redirect_url.clone());
        if let Some(url) = target {
            self.navigator.set_url(&url);
        }
    }

    /// Re-announce an existing session, e.g. at startup.
    pub fn check_and_broadcast_login_confirmed(&self) {
        if !self.is_authenticated() {
            return;
        }
        let configuration = self.configuration();
        if let Some(profile) = self.load_profile(&configuration) {
            self.emit(&configuration, AuthEvent::LoginConfirmed(profile));
        }
    }

    pub fn login_required(&self) {
        let configuration = self.configuration();
        self.emit(&configuration, AuthEvent::LoginRequired);
    }

    /// Run the reauthentication callback now and re-arm its timer.
    /// Does nothing without an authenticated session.
    pub fn reauthenticate(&self) {
        if !self.is_authenticated() {
            tracing::debug!("reauthentication skipped: not authenticated");
            return;
        }
        let configuration = self.configuration();
        (configuration.reauthentication.function)();
        self.arm_timer(&configuration);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Last attempted URL
    // ─────────────────────────────────────────────────────────────────────

    pub fn last_attempted_url(&self) -> Option<String> {
        self.last_attempted_url_with(&self.configuration())
    }

    pub fn clear_last_attempted_url(&self) {
        let configuration = self.configuration();
        self.delete(&configuration.last_attempted_url_storage_key);
    }

    fn last_attempted_url_with(&self, configuration: &Configuration) -> Option<String> {
        match self.read(&configuration.last_attempted_url_storage_key)? {
            Value::String(url) => Some(url),
            _ => None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reauthentication timer
    // ─────────────────────────────────────────────────────────────────────

    /// True while a reauthentication timer is armed.
    pub fn has_active_timer(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn arm_timer(&self, configuration: &Configuration) {
        let mut slot = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.take() {
            previous.cancel();
        }
        let reauthentication = &configuration.reauthentication;
        let handle = self.scheduler.schedule_repeating(
            reauthentication.timeout,
            Arc::clone(&reauthentication.function),
        );
        tracing::debug!(timer = %handle.id(), interval = ?reauthentication.timeout, "reauthentication timer armed");
        *slot = Some(handle);
    }

    fn disarm_timer(&self) {
        let previous = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = previous {
            tracing::debug!(timer = %handle.id(), "reauthentication timer cancelled");
            handle.cancel();
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Subscriptions
    // ─────────────────────────────────────────────────────────────────────

    pub fn on_login_confirmed(&self, handler: impl Fn(&AuthEvent) + Send + Sync + 'static) -> SubscriptionId {
        let name = self.configuration().events.login_confirmed;
        self.bus.on(&name, Box::new(handler))
    }

    pub fn on_login_required(&self, handler: impl Fn(&AuthEvent) + Send + Sync + 'static) -> SubscriptionId {
        let name = self.configuration().events.login_required;
        self.bus.on(&name, Box::new(handler))
    }

    pub fn on_logout_confirmed(&self, handler: impl Fn(&AuthEvent) + Send + Sync + 'static) -> SubscriptionId {
        let name = self.configuration().events.logout_confirmed;
        self.bus.on(&name, Box::new(handler))
    }

    pub fn on_not_authenticated(&self, handler: impl Fn(&AuthEvent) + Send + Sync + 'static) -> SubscriptionId {
        let name = self.configuration().events.not_authenticated;
        self.bus.on(&name, Box::new(handler))
    }

    pub fn on_not_authorized(&self, handler: impl Fn(&AuthEvent) + Send + Sync + 'static) -> SubscriptionId {
        let name = self.configuration().events.not_authorized;
        self.bus.on(&name, Box::new(handler))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Collaborator plumbing
    // ─────────────────────────────────────────────────────────────────────

    fn emit(&self, configuration: &Configuration, event: AuthEvent) {
        let name = event.name(&configuration.events);
        if let Err(err) = self.bus.broadcast(name, event) {
            tracing::warn!(event = name, %err, "event broadcast failed");
        }
    }

    fn read(&self, key: &str) -> Option<Value> {
        self.store.get(key).unwrap_or_else(|err| {
            tracing::error!(key, %err, "store read failed; treating as empty");
            None
        })
    }

    fn contains(&self, key: &str) -> bool {
        self.store.has(key).unwrap_or_else(|err| {
            tracing::error!(key, %err, "store lookup failed; treating as empty");
            false
        })
    }

    fn write(&self, key: &str, value: Value) {
        if let Err(err) = self.store.set(key, value) {
            tracing::error!(key, %err, "store write failed; ignoring");
        }
    }

    fn delete(&self, key: &str) {
        if let Err(err) = self.store.remove(key) {
            tracing::error!(key, %err, "store remove failed; ignoring");
        }
    }
}
