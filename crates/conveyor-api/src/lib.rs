//! HTTP API for Conveyor.
//!
//! Exposes the collaborator interfaces: job creation and lifecycle (used
//! identically by external schedulers and the event dispatcher), retention
//! job reports, and operational visibility into sources.

pub mod error;
pub mod routes;
pub mod state;

pub use state::AppState;
