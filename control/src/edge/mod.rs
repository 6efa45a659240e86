//! Typed clients for the independently-failing external systems the
//! control plane coordinates: the edge key-value routing store, the
//! serverless function platform, the DNS provider, edge-hostname
//! provisioning and artifact object storage.
//!
//! Each client is a trait with an HTTP implementation and an in-memory
//! double; the publish logic only ever sees the trait.

pub mod artifacts;
pub mod dns;
pub mod functions;
pub mod hostnames;
pub mod routing;

use std::sync::{Arc, Mutex};

/// Shared call recorder for the in-memory doubles.
///
/// Ordering-sensitive publish steps (DNS record before custom-domain
/// binding) are asserted against this log in tests.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: impl Into<String>) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call.into());
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Index of the first call starting with `prefix`
    pub fn position_of(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.starts_with(prefix))
    }
}
