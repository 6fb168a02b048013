//! HTTP Module
//!
//! The `/v1/{key}` REST surface over the engine.
//!
//! ## Routes
//! - `PUT /v1/{key}`: body is the value; 201 on success
//! - `GET /v1/{key}`: 200 with the value, 404 if absent
//! - `DELETE /v1/{key}`: 200
//! - anything else under `/v1`: 405
//!
//! Engine calls may block (the store lock, a full write queue), so handlers
//! run them on the blocking pool.

mod handlers;
mod server;

pub use handlers::ApiError;
pub use server::{app, serve, AppState};
