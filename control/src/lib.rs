//! Caravel Control Plane
//!
//! Core modules for the Caravel deployment control plane: the deployment
//! state machine, edge service clients, publishing engines and the HTTP
//! API surface.

pub mod app;
pub mod config;
pub mod edge;
pub mod errors;
pub mod logs;
pub mod models;
pub mod publish;
pub mod registry;
pub mod server;
pub mod utils;
pub mod workers;
