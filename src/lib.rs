//! Read-only BI/KPI layer over the clinical appointments database.
//!
//! The library holds the metric queries, the GraphQL schema and the HTTP
//! router; `main.rs` wires them to the CLI and the integration tests drive
//! them directly.

pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod models;
pub mod report;
pub mod schema;
pub mod server;
pub mod service;
