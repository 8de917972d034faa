//! Application services: orchestration between the HTTP surface and adapters.

pub mod error;
pub mod purge;
