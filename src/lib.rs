//! Medicine identification scan service
//!
//! Accepts photos of medicine packaging, deduplicates them by content hash,
//! runs identification on a leased worker pool and serves the results for
//! polling, together with detail records for the identified medicines.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
