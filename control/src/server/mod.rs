//! HTTP API surface: callback ingestion and operator endpoints

pub mod auth;
pub mod handlers;
pub mod serve;
pub mod state;
