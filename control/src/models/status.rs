//! Deployment status state machine

use serde::{Deserialize, Serialize};

use crate::errors::ControlError;

/// Deployment lifecycle status
///
/// `QUEUED -> CLONING -> BUILDING -> UPLOADING -> DEPLOYING -> DEPLOYED`,
/// with `FAILED` and `CANCELLED` reachable from any non-terminal state and
/// `PURGED` reachable only from `DEPLOYED` (artifact reclaimed, the deploy
/// itself still counts as having succeeded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    /// Created, waiting for the build system to pick it up
    Queued,

    /// Build system is fetching the source revision
    Cloning,

    /// Build in progress
    Building,

    /// Artifact upload in progress
    Uploading,

    /// Upload confirmed, awaiting finalize
    Deploying,

    /// Published and routable (success terminal)
    Deployed,

    /// Build or publish failed
    Failed,

    /// Explicitly cancelled by an operator
    Cancelled,

    /// Artifact storage reclaimed by garbage collection
    Purged,
}

impl DeploymentStatus {
    /// Position in the forward chain; terminal side-states have no rank.
    fn rank(self) -> Option<u8> {
        match self {
            DeploymentStatus::Queued => Some(0),
            DeploymentStatus::Cloning => Some(1),
            DeploymentStatus::Building => Some(2),
            DeploymentStatus::Uploading => Some(3),
            DeploymentStatus::Deploying => Some(4),
            DeploymentStatus::Deployed => Some(5),
            DeploymentStatus::Failed | DeploymentStatus::Cancelled | DeploymentStatus::Purged => {
                None
            }
        }
    }

    /// Whether no further lifecycle transitions are expected
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeploymentStatus::Deployed
                | DeploymentStatus::Failed
                | DeploymentStatus::Cancelled
                | DeploymentStatus::Purged
        )
    }

    /// The one non-failure terminal state
    pub fn is_success_terminal(self) -> bool {
        self == DeploymentStatus::Deployed
    }

    /// Whether `self -> to` follows the directed transition graph
    pub fn can_transition_to(self, to: DeploymentStatus) -> bool {
        match (self, to) {
            // GC reclaims artifacts of successful deployments only
            (DeploymentStatus::Deployed, DeploymentStatus::Purged) => true,
            (DeploymentStatus::Deployed, _) => false,
            (DeploymentStatus::Failed | DeploymentStatus::Cancelled | DeploymentStatus::Purged, _) => {
                false
            }
            // Any non-terminal state may fail or be cancelled
            (_, DeploymentStatus::Failed | DeploymentStatus::Cancelled) => true,
            (_, DeploymentStatus::Purged) => false,
            // Forward-only along the chain
            (from, to) => match (from.rank(), to.rank()) {
                (Some(f), Some(t)) => t > f,
                _ => false,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentStatus::Queued => "queued",
            DeploymentStatus::Cloning => "cloning",
            DeploymentStatus::Building => "building",
            DeploymentStatus::Uploading => "uploading",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Deployed => "deployed",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Cancelled => "cancelled",
            DeploymentStatus::Purged => "purged",
        }
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status label carried by a build callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackStatus {
    Cloning,
    Building,
    Uploading,
    Uploaded,
    Failed,
}

impl CallbackStatus {
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "cloning" => Some(CallbackStatus::Cloning),
            "building" => Some(CallbackStatus::Building),
            "uploading" => Some(CallbackStatus::Uploading),
            "uploaded" => Some(CallbackStatus::Uploaded),
            "failed" => Some(CallbackStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallbackStatus::Cloning => "cloning",
            CallbackStatus::Building => "building",
            CallbackStatus::Uploading => "uploading",
            CallbackStatus::Uploaded => "uploaded",
            CallbackStatus::Failed => "failed",
        }
    }
}

/// Outcome of applying a callback label to a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The status changed to the contained value
    Advanced(DeploymentStatus),

    /// Redelivered signal; acknowledged without any state change
    Noop,
}

/// Apply a build-callback label to the current status.
///
/// Redelivery of an already-applied label is a `Noop`; in particular a
/// duplicate `uploaded` on a deployment that is already `DEPLOYING` or
/// `DEPLOYED` must not re-run finalize. The callback sender retries, so
/// this guard is load-bearing.
pub fn apply_callback(
    current: DeploymentStatus,
    label: CallbackStatus,
) -> Result<Transition, ControlError> {
    let target = match label {
        CallbackStatus::Cloning => DeploymentStatus::Cloning,
        CallbackStatus::Building => DeploymentStatus::Building,
        CallbackStatus::Uploading => DeploymentStatus::Uploading,
        CallbackStatus::Uploaded => DeploymentStatus::Deploying,
        CallbackStatus::Failed => DeploymentStatus::Failed,
    };

    if current == target {
        return Ok(Transition::Noop);
    }

    // Idempotency guard for the terminal upload signal
    if label == CallbackStatus::Uploaded
        && matches!(
            current,
            DeploymentStatus::Deploying | DeploymentStatus::Deployed
        )
    {
        return Ok(Transition::Noop);
    }

    if current.can_transition_to(target) {
        Ok(Transition::Advanced(target))
    } else {
        Err(ControlError::InvalidTransition {
            from: current.to_string(),
            label: label.as_str().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_chain() {
        use DeploymentStatus::*;
        assert!(Queued.can_transition_to(Cloning));
        assert!(Cloning.can_transition_to(Building));
        assert!(Building.can_transition_to(Uploading));
        assert!(Uploading.can_transition_to(Deploying));
        assert!(Deploying.can_transition_to(Deployed));
        // skips forward are allowed, backwards never
        assert!(Queued.can_transition_to(Building));
        assert!(!Building.can_transition_to(Cloning));
    }

    #[test]
    fn test_terminal_states_reject() {
        use DeploymentStatus::*;
        for terminal in [Failed, Cancelled, Purged] {
            for target in [Queued, Cloning, Building, Uploading, Deploying, Deployed, Failed] {
                assert!(!terminal.can_transition_to(target));
            }
        }
        assert!(Deployed.can_transition_to(Purged));
        assert!(!Deployed.can_transition_to(Failed));
        assert!(!Deploying.can_transition_to(Purged));
    }

    #[test]
    fn test_uploaded_is_idempotent() {
        let t = apply_callback(DeploymentStatus::Uploading, CallbackStatus::Uploaded).unwrap();
        assert_eq!(t, Transition::Advanced(DeploymentStatus::Deploying));

        let t = apply_callback(DeploymentStatus::Deploying, CallbackStatus::Uploaded).unwrap();
        assert_eq!(t, Transition::Noop);

        let t = apply_callback(DeploymentStatus::Deployed, CallbackStatus::Uploaded).unwrap();
        assert_eq!(t, Transition::Noop);
    }

    #[test]
    fn test_callback_from_terminal_rejected() {
        let err = apply_callback(DeploymentStatus::Failed, CallbackStatus::Building).unwrap_err();
        assert!(matches!(err, ControlError::InvalidTransition { .. }));

        let err = apply_callback(DeploymentStatus::Cancelled, CallbackStatus::Uploaded).unwrap_err();
        assert!(matches!(err, ControlError::InvalidTransition { .. }));
    }

    #[test]
    fn test_unknown_label_rejected() {
        assert!(CallbackStatus::parse("exploded").is_none());
        assert_eq!(CallbackStatus::parse("uploaded"), Some(CallbackStatus::Uploaded));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let s = serde_json::to_string(&DeploymentStatus::Deploying).unwrap();
        assert_eq!(s, "\"deploying\"");
        let s: DeploymentStatus = serde_json::from_str("\"purged\"").unwrap();
        assert_eq!(s, DeploymentStatus::Purged);
    }
}
