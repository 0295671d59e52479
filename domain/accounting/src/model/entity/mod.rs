pub mod allocation;
pub mod allocation_usage;
pub mod association;
pub mod scope;
pub mod user;

#[rustfmt::skip]
pub use {
    allocation::Allocation,
    allocation_usage::{AllocationUsage, AllocationUserUsage},
    association::Association,
    scope::{Organization, Project},
    user::User,
};
