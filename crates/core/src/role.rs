//! Role identifiers and nested role requests.

use std::borrow::Cow;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};

/// Role identifier used for RBAC.
///
/// Roles are usually names (`"admin"`), but profiles issued by some identity
/// providers carry numeric role ids, so integers are accepted as well.
/// Comparison is exact: `"Admin"` and `"admin"` are different roles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Role {
    Name(Cow<'static, str>),
    Number(i64),
}

impl Role {
    /// Request keyword matching every authenticated user.
    pub const ALL: &'static str = "ALL";

    /// Request keyword matching only unauthenticated users.
    pub const ANONYMOUS: &'static str = "ANONYMOUS";

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Name(name.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Role::Name(name) => Some(name),
            Role::Number(_) => None,
        }
    }

    /// True if this is a name equal to `keyword`, ignoring ASCII case.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.as_str().is_some_and(|name| name.eq_ignore_ascii_case(keyword))
    }

    /// Interpret a JSON scalar as a role.
    ///
    /// Strings become names and integers become numeric roles; anything else
    /// is rejected.
    pub fn from_json(value: &Value) -> CoreResult<Self> {
        match value {
            Value::String(s) => Ok(Self::Name(Cow::Owned(s.clone()))),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Number)
                .ok_or_else(|| CoreError::invalid_role(format!("non-integer number {n}"))),
            other => Err(CoreError::invalid_role(format!("unsupported value {other}"))),
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Role::Name(name) => f.write_str(name),
            Role::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Self::Name(Cow::Owned(value.to_string()))
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Self::Name(Cow::Owned(value))
    }
}

impl From<i64> for Role {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for Role {
    fn from(value: i32) -> Self {
        Self::Number(i64::from(value))
    }
}

/// A requested set of roles as callers write it: single roles mixed with
/// arbitrarily nested lists.
///
/// Evaluation never looks at the nesting; it works on [`RoleRequest::flatten`].
/// The nested form is kept so that notifications can report the request
/// exactly as it was made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleRequest {
    One(Role),
    Many(Vec<RoleRequest>),
}

impl RoleRequest {
    /// The empty request (matches nothing).
    pub fn empty() -> Self {
        Self::Many(Vec::new())
    }

    /// Depth-first, order-preserving flattening into plain roles.
    pub fn flatten(&self) -> Vec<Role> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<Role>) {
        match self {
            RoleRequest::One(role) => out.push(role.clone()),
            RoleRequest::Many(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
        }
    }

    /// Top-level arguments of the request, nesting below the first level intact.
    pub fn arguments(&self) -> Vec<RoleRequest> {
        match self {
            RoleRequest::One(_) => vec![self.clone()],
            RoleRequest::Many(items) => items.clone(),
        }
    }
}

impl Default for RoleRequest {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Role> for RoleRequest {
    fn from(value: Role) -> Self {
        Self::One(value)
    }
}

impl From<&Role> for RoleRequest {
    fn from(value: &Role) -> Self {
        Self::One(value.clone())
    }
}

impl From<&RoleRequest> for RoleRequest {
    fn from(value: &RoleRequest) -> Self {
        value.clone()
    }
}

impl From<&str> for RoleRequest {
    fn from(value: &str) -> Self {
        Self::One(Role::from(value))
    }
}

impl From<String> for RoleRequest {
    fn from(value: String) -> Self {
        Self::One(Role::from(value))
    }
}

impl From<i64> for RoleRequest {
    fn from(value: i64) -> Self {
        Self::One(Role::from(value))
    }
}

impl From<i32> for RoleRequest {
    fn from(value: i32) -> Self {
        Self::One(Role::from(value))
    }
}

impl<T: Into<RoleRequest>> From<Vec<T>> for RoleRequest {
    fn from(value: Vec<T>) -> Self {
        Self::Many(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<RoleRequest>, const N: usize> From<[T; N]> for RoleRequest {
    fn from(value: [T; N]) -> Self {
        Self::Many(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Clone + Into<RoleRequest>> From<&[T]> for RoleRequest {
    fn from(value: &[T]) -> Self {
        Self::Many(value.iter().cloned().map(Into::into).collect())
    }
}

/// Build a [`RoleRequest`] from a variadic, arbitrarily nested list.
///
/// Items are literals, identifiers, parenthesized expressions, or bracketed
/// sub-lists:
///
/// ```
/// use gatehouse_core::{roles, Role};
///
/// let request = roles!["x", ["y", ["z", "a"]]];
/// assert_eq!(request.flatten().len(), 4);
/// assert_eq!(request.flatten()[3], Role::new("a"));
/// ```
#[macro_export]
macro_rules! roles {
    (@item [$($inner:tt),* $(,)?]) => {
        $crate::roles![$($inner),*]
    };
    (@item $item:tt) => {
        $crate::RoleRequest::from($item)
    };
    () => {
        $crate::RoleRequest::empty()
    };
    ($($item:tt),+ $(,)?) => {
        $crate::RoleRequest::Many(vec![$($crate::roles!(@item $item)),+])
    };
}

/// Distinct roles present in both `held` and `requested`, in `requested` order.
pub fn intersection<'a>(held: &[Role], requested: &'a [Role]) -> Vec<&'a Role> {
    let held: HashSet<&Role> = held.iter().collect();
    let mut seen: HashSet<&Role> = HashSet::new();
    requested
        .iter()
        .filter(|role| held.contains(role) && seen.insert(*role))
        .collect()
}

/// Number of distinct roles in `roles`.
pub fn distinct_count(roles: &[Role]) -> usize {
    roles.iter().collect::<HashSet<_>>().len()
}
