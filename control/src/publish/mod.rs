//! Publishing primitives shared by the finalizer, rollback engine,
//! garbage collector and domain provisioner

pub mod domains;
pub mod finalizer;
pub mod gc;
pub mod rollback;

pub use domains::DomainProvisioner;
pub use finalizer::Finalizer;
pub use gc::GarbageCollector;
pub use rollback::RollbackEngine;

use std::future::Future;
use std::sync::Mutex;

use chrono::Utc;
use tracing::warn;

use crate::edge::routing::RoutingRecord;
use crate::errors::ControlError;
use crate::models::deployment::Deployment;
use crate::models::project::{Project, ProjectType};
use crate::models::Environment;

/// Injected sink for deployment-scoped log lines.
///
/// Publish logic appends here instead of going to a global logger so it
/// stays unit-testable without a log backend; callers persist the buffer
/// onto the deployment record.
pub trait LogSink: Send + Sync {
    fn append(&self, line: &str);
}

/// Buffering sink; contents are flushed to the deployment record
#[derive(Debug, Default)]
pub struct BufferSink {
    lines: Mutex<Vec<String>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let lines = self.lines.lock().map(|l| l.clone()).unwrap_or_default();
        if lines.is_empty() {
            String::new()
        } else {
            format!("{}\n", lines.join("\n"))
        }
    }
}

impl LogSink for BufferSink {
    fn append(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}

/// Sink that drops everything; for callers with no deployment record
#[derive(Debug, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn append(&self, _line: &str) {}
}

/// Per-deployment artifact path for static projects. Never the mutable
/// "latest" path: superseded versions stay independently addressable so
/// pinned domains and rollbacks keep working.
pub fn static_artifact_path(slug: &str, deployment: &Deployment) -> String {
    format!("sites/{}/{}", slug, deployment.id)
}

/// Storage prefix reclaimed when a deployment is purged
pub fn artifact_prefix(project: &Project, deployment: &Deployment) -> String {
    match project.project_type {
        ProjectType::Static => static_artifact_path(&project.slug, deployment),
        ProjectType::BackendPython | ProjectType::BackendNode => deployment
            .artifact_key
            .clone()
            .unwrap_or_else(|| format!("packages/{}/{}", project.slug, deployment.id)),
    }
}

/// Build the routing record for serving `deployment` of `project`.
///
/// `endpoint` is required for backend projects (the function invocation
/// URL); ignored for static ones.
pub fn routing_record(
    project: &Project,
    deployment: &Deployment,
    endpoint: Option<&str>,
) -> Result<RoutingRecord, ControlError> {
    let record = match project.project_type {
        ProjectType::Static => RoutingRecord::Static {
            artifact_path: static_artifact_path(&project.slug, deployment),
            is_spa: project.build.spa_fallback,
            deployment_id: deployment.id.clone(),
            revision: deployment.revision.commit_id.clone(),
            updated_at: Utc::now(),
            password_hash: if deployment.is_staging {
                project.staging_password_hash.clone()
            } else {
                None
            },
        },
        ProjectType::BackendPython | ProjectType::BackendNode => RoutingRecord::Backend {
            endpoint: endpoint
                .ok_or_else(|| {
                    ControlError::Internal(format!(
                        "no endpoint for backend deployment {}",
                        deployment.id
                    ))
                })?
                .to_string(),
            deployment_id: deployment.id.clone(),
            revision: deployment.revision.commit_id.clone(),
            updated_at: Utc::now(),
        },
    };
    Ok(record)
}

/// Default start command when the project does not declare one
pub fn default_start_command(project_type: ProjectType) -> &'static str {
    match project_type {
        ProjectType::BackendPython => "python app.py",
        ProjectType::BackendNode => "node server.js",
        ProjectType::Static => "",
    }
}

/// Run a best-effort publish step: failure is logged per item and never
/// aborts or fails the surrounding operation. Hard-ordered steps must not
/// go through this.
pub async fn best_effort<F>(log: &dyn LogSink, what: &str, fut: F)
where
    F: Future<Output = Result<(), ControlError>>,
{
    if let Err(e) = fut.await {
        warn!("best-effort step '{}' failed: {}", what, e);
        log.append(&format!("warning: {} failed: {}", what, e));
    }
}

/// Hostname a deployment is served from
pub fn platform_hostname(project: &Project, environment: Environment, apex: &str) -> String {
    environment.hostname(&project.slug, apex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::deployment::Revision;

    #[test]
    fn test_static_artifact_path_is_per_deployment() {
        let project = Project::new("blog", ProjectType::Static);
        let d1 = Deployment::new(project.id.clone(), Revision::default(), false);
        let d2 = Deployment::new(project.id.clone(), Revision::default(), false);
        assert_ne!(
            static_artifact_path(&project.slug, &d1),
            static_artifact_path(&project.slug, &d2)
        );
        assert!(static_artifact_path(&project.slug, &d1).starts_with("sites/blog/"));
    }

    #[test]
    fn test_staging_record_carries_password_hash() {
        let mut project = Project::new("blog", ProjectType::Static);
        project.staging_password_hash = Some("h4sh".to_string());

        let staging = Deployment::new(project.id.clone(), Revision::default(), true);
        match routing_record(&project, &staging, None).unwrap() {
            RoutingRecord::Static { password_hash, .. } => {
                assert_eq!(password_hash, Some("h4sh".to_string()));
            }
            _ => panic!("expected static record"),
        }

        let production = Deployment::new(project.id.clone(), Revision::default(), false);
        match routing_record(&project, &production, None).unwrap() {
            RoutingRecord::Static { password_hash, .. } => assert!(password_hash.is_none()),
            _ => panic!("expected static record"),
        }
    }

    #[test]
    fn test_backend_record_requires_endpoint() {
        let project = Project::new("api", ProjectType::BackendNode);
        let d = Deployment::new(project.id.clone(), Revision::default(), false);
        assert!(routing_record(&project, &d, None).is_err());
        assert!(routing_record(&project, &d, Some("https://x")).is_ok());
    }

    #[test]
    fn test_buffer_sink_accumulates() {
        let sink = BufferSink::new();
        sink.append("one");
        sink.append("two");
        assert_eq!(sink.contents(), "one\ntwo\n");
    }
}
