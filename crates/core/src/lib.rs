//! `gatehouse-core`: authorization primitives shared by the other crates.
//!
//! This crate is pure data: no IO, no clocks other than the ones callers pass in.

pub mod error;
pub mod id;
pub mod profile;
pub mod role;

pub use error::{CoreError, CoreResult};
pub use id::{SubscriptionId, TimerId};
pub use profile::{Profile, parse_instant};
pub use role::{Role, RoleRequest, distinct_count, intersection};
