//! Domain types and pure transformations for purge forwarding.

pub mod bypass;
pub mod purge;
