pub mod config;
pub mod domain;
pub mod error;
pub mod explain;
pub mod logging;
pub mod pipeline;
pub mod server;

// Layered boundaries for application and infrastructure
pub mod app;
pub mod infra;

pub mod observability;
