//! REST API module for external integrations
//!
//! Provides read-only HTTP endpoints for health, metrics and the Etcds the
//! custodian manages.

mod dto;
mod handlers;
mod server;

pub use dto::{ErrorResponse, EtcdListResponse, EtcdSummary, HealthResponse};
pub use server::{router, run_server};
