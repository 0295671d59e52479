//! Domain model of cluster accounting: allocations, associations, usage
//! snapshots and the quota scopes they roll up into.

pub mod exception;
#[cfg(feature = "mock")]
pub mod mock;
pub mod model;
pub mod repository;
pub mod service;
