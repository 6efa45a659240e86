//! Server state

use std::sync::Arc;

use secrecy::SecretString;

use crate::publish::domains::DomainProvisioner;
use crate::publish::rollback::RollbackEngine;
use crate::registry::Registry;

/// Server state shared across handlers
pub struct ServerState {
    pub registry: Arc<dyn Registry>,
    pub rollback: Arc<RollbackEngine>,
    pub provisioner: Arc<DomainProvisioner>,
    pub callback_secret: SecretString,
}

impl ServerState {
    pub fn new(
        registry: Arc<dyn Registry>,
        rollback: Arc<RollbackEngine>,
        provisioner: Arc<DomainProvisioner>,
        callback_secret: SecretString,
    ) -> Self {
        Self {
            registry,
            rollback,
            provisioner,
            callback_secret,
        }
    }
}
