//! Meeting scheduling negotiation service for Microsoft Graph
//!
//! This library implements an auto-scheduling workflow on top of the
//! Microsoft Graph API: it finds candidate meeting times for a set of
//! attendees, proposes them over Teams chat cards, collects accept and
//! decline responses through a webhook, retries with the next candidate
//! when anyone declines, and creates the real calendar event once a
//! candidate sticks.
//!
//! # Modules
//!
//! - `client`: GraphClient and the `GraphApi` trait for API operations
//! - `models`: negotiation aggregate and HTTP request/response types
//! - `services`: slot finding, state machine, store, notification and polling
//! - `handlers` / `routes`: the axum HTTP surface

pub mod client;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

#[cfg(test)]
pub mod client_mock;

// Re-export the main types for ease of use
pub use client::{GraphApi, GraphClient};
pub use handlers::api::AppState;
pub use routes::create_router;
