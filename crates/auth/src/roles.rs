//! Default role strategies.

use serde_json::Value;

use gatehouse_core::{Profile, Role};

use crate::config::Configuration;

/// Read the roles stored under `user_roles_property`.
///
/// An array yields its role-like items, a scalar yields a single role, and a
/// missing property (or missing profile) yields no roles. Values that cannot
/// be roles (objects, booleans, fractions) are skipped.
pub fn roles_from_profile(profile: Option<&Profile>, configuration: &Configuration) -> Vec<Role> {
    let Some(value) = profile.and_then(|p| p.property(&configuration.user_roles_property)) else {
        return Vec::new();
    };

    match value {
        Value::Array(items) => items.iter().filter_map(role_or_skip).collect(),
        Value::Null => Vec::new(),
        scalar => role_or_skip(scalar).into_iter().collect(),
    }
}

fn role_or_skip(value: &Value) -> Option<Role> {
    match Role::from_json(value) {
        Ok(role) => Some(role),
        Err(err) => {
            tracing::debug!(%err, "skipping profile role");
            None
        }
    }
}

/// Granted when both sides are non-empty and at least one requested role is held.
pub fn any_role_matches(user_roles: &[Role], allowed_roles: &[Role]) -> bool {
    !user_roles.is_empty()
        && !allowed_roles.is_empty()
        && allowed_roles.iter().any(|role| user_roles.contains(role))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roles_of(value: Value) -> Vec<Role> {
        roles_from_profile(Some(&Profile::new(value)), &Configuration::default())
    }

    #[test]
    fn reads_role_arrays() {
        assert_eq!(roles_of(json!({ "roles": ["a", "b"] })), vec![Role::new("a"), Role::new("b")]);
    }

    #[test]
    fn wraps_scalar_role() {
        assert_eq!(roles_of(json!({ "roles": 1 })), vec![Role::Number(1)]);
        assert_eq!(roles_of(json!({ "roles": "admin" })), vec![Role::new("admin")]);
    }

    #[test]
    fn missing_roles_are_empty() {
        assert!(roles_of(json!({})).is_empty());
        assert!(roles_of(json!({ "roles": null })).is_empty());
        assert!(roles_of(json!("foo")).is_empty());
        assert!(roles_from_profile(None, &Configuration::default()).is_empty());
    }

    #[test]
    fn skips_values_that_are_not_roles() {
        assert_eq!(roles_of(json!({ "roles": ["a", {}, true, 2.5, 7] })), vec![Role::new("a"), Role::Number(7)]);
    }

    #[test]
    fn honours_configured_property() {
        let configuration = Configuration {
            user_roles_property: "groups".to_string(),
            ..Configuration::default()
        };
        let profile = Profile::new(json!({ "roles": ["a"], "groups": ["g"] }));
        assert_eq!(roles_from_profile(Some(&profile), &configuration), vec![Role::new("g")]);
    }

    #[test]
    fn any_role_matches_needs_both_sides() {
        let held = [Role::new("a"), Role::new("b")];
        assert!(any_role_matches(&held, &[Role::new("x"), Role::new("b")]));
        assert!(!any_role_matches(&held, &[Role::new("x")]));
        assert!(!any_role_matches(&held, &[]));
        assert!(!any_role_matches(&[], &[Role::new("a")]));
        assert!(!any_role_matches(&held, &[Role::new("A")]));
    }
}
