//! Infrastructure adapters and runtime bootstrap.

pub mod akamai;
pub mod cache_warmer;
pub mod error;
pub mod http;
pub mod signing;
pub mod telemetry;
