//! Order Gateway
//!
//! Accepts orders over HTTP, forwards them to the matching engine over the
//! bus and returns the engine's confirmation (or a timeout) to the caller.
//!
//! ```text
//! POST /v1/orders ──► validate ──► Correlator.submit ──► bus (order.request)
//!                                        │
//!        caller ◄── PendingConfirmation ◄┤◄── consumer ◄── bus (order.conf)
//!                                        │
//!                                     reaper (deadlines)
//! ```

pub mod auth;
pub mod config;
pub mod consumer;
pub mod correlator;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;
pub mod validation;

pub use config::GatewayConfig;
pub use consumer::run_confirmation_consumer;
pub use correlator::{Correlator, CorrelatorConfig, PendingConfirmation};
pub use error::{AppError, CorrelatorError};
pub use router::create_router;
pub use state::AppState;
