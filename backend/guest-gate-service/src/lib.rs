/// Guest Gate Service Library
///
/// Phone-OTP verification gate for the VIP booking flow. Only numbers on the
/// VIP list that have not booked yet can request a code; a verified code is
/// exchanged for a phone-bound access/refresh token pair.
///
/// ## Modules
///
/// - `config`: Service configuration
/// - `db`: VIP directory and OTP attempt repositories (PostgreSQL)
/// - `error`: Error types and their HTTP response shapes
/// - `http`: axum router and handlers
/// - `models`: Data models
/// - `phone`: Saudi mobile number canonicalization
/// - `services`: Directory gate, OTP channels, throttles, sessions, booking webhook
/// - `validators`: Input validation
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod models;
pub mod phone;
pub mod services;
pub mod validators;

// Re-export commonly used types
pub use error::{GateError, Result};
pub use http::{build_router, HttpServerState};
pub use phone::PhoneNumber;
