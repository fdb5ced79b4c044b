//! Shepherd - Proxy Pool Maintenance
//!
//! Keeps a fleet of outbound proxies healthy for scrapers that run as
//! short-lived, independently scheduled CI jobs.
//!
//! ## Features
//!
//! - Candidate sourcing from static files and provider HTTP APIs
//! - Concurrent validation with per-attempt timeouts, retries and an
//!   overall operation deadline
//! - Five maintenance operations (update, validate, clean, rebuild,
//!   recover) with threshold-driven fallback signalling via exit codes
//! - Atomic JSON snapshot persistence across process boundaries
//! - Round-robin and weighted rotation with post-use feedback

pub mod cli;
pub mod config;
pub mod error;
pub mod manager;
pub mod models;
pub mod rotation;
pub mod source;
pub mod store;
pub mod validator;

pub use config::Config;
pub use error::{Result, ShepherdError};
pub use manager::{Operation, OperationReport, PoolManager};
pub use rotation::Rotator;
pub use store::PoolStore;
