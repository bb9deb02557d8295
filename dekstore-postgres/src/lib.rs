//! DEKSTORE PostgreSQL Backend
//!
//! Durable store adapter over a `deadpool-postgres` pool, its configuration,
//! and tracing setup shared by the `dekstore` binary.

pub mod config;
pub mod store;
pub mod telemetry;

pub use config::{validate_table_name, PgConfig, DEFAULT_TABLE};
pub use store::PgDurableStore;
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig, TelemetryError};
