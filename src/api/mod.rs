//! HTTP boundary.
//!
//! Serves the single-page frontend and the prediction API. Handlers depend
//! only on [`DiagnosisService`](crate::pipeline::DiagnosisService), so the
//! router can be exercised without a trained checkpoint.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_server, ApiServer};
pub use types::ApiContext;
