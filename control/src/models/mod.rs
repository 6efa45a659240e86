//! Persisted data model: deployments, projects, custom domains

pub mod deployment;
pub mod domain;
pub mod project;
pub mod status;

use serde::{Deserialize, Serialize};

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Staging,
}

impl Environment {
    pub fn from_staging_flag(is_staging: bool) -> Self {
        if is_staging {
            Environment::Staging
        } else {
            Environment::Production
        }
    }

    pub fn is_staging(self) -> bool {
        self == Environment::Staging
    }

    /// Platform hostname for a project in this environment
    pub fn hostname(self, slug: &str, apex: &str) -> String {
        match self {
            Environment::Production => format!("{}.{}", slug, apex),
            Environment::Staging => format!("{}.stage.{}", slug, apex),
        }
    }

    /// Stable function name: derived from project + environment only, so a
    /// backend publish is an in-place update rather than a cutover.
    pub fn function_name(self, slug: &str) -> String {
        match self {
            Environment::Production => format!("fn-{}", slug),
            Environment::Staging => format!("fn-{}-stage", slug),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Production => f.write_str("production"),
            Environment::Staging => f.write_str("staging"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostnames() {
        assert_eq!(
            Environment::Production.hostname("blog", "caravel.app"),
            "blog.caravel.app"
        );
        assert_eq!(
            Environment::Staging.hostname("blog", "caravel.app"),
            "blog.stage.caravel.app"
        );
    }

    #[test]
    fn test_function_names_stable_per_environment() {
        assert_eq!(Environment::Production.function_name("shop"), "fn-shop");
        assert_eq!(Environment::Staging.function_name("shop"), "fn-shop-stage");
    }
}
