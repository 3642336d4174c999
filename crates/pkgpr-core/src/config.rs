//! Reconciliation configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default trunk branch every package branch starts from and merges into.
pub const DEFAULT_TRUNK: &str = "main";
/// Label applied once to newly created pull requests.
pub const DEFAULT_LABEL: &str = "package";
/// Commit status context the validation result is reported under.
pub const DEFAULT_STATUS_CONTEXT: &str = "pkgpr/metadata";
/// Validator invoked on the metadata tree.
pub const DEFAULT_VALIDATOR: &str = "python lint/src/lint.py";

const GITHUB_SERVER: &str = "https://github.com";

/// Engine settings for one batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    pub trunk: String,
    pub remote: String,
    pub label: String,
    pub status_context: String,
    /// Path handed to the validator, relative to the tree root.
    pub validate_path: PathBuf,
    /// Validator command line; the validate path is appended.
    pub validator: String,
    /// Link to the run, attached to every commit status.
    pub run_url: Option<String>,
    /// Web URL of the repository, used to link PRs in notifications.
    pub repo_url: Option<String>,
    /// CI run id, or a generated local id.
    pub run_id: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        ReconcileConfig {
            trunk: DEFAULT_TRUNK.to_string(),
            remote: "origin".to_string(),
            label: DEFAULT_LABEL.to_string(),
            status_context: DEFAULT_STATUS_CONTEXT.to_string(),
            validate_path: PathBuf::from("src/yaml"),
            validator: DEFAULT_VALIDATOR.to_string(),
            run_url: None,
            repo_url: None,
            run_id: format!("local-{}", uuid::Uuid::new_v4()),
        }
    }
}

impl ReconcileConfig {
    /// Defaults overridden by `PKGPR_*` and GitHub Actions variables.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let mut config = Self::default();
        if let Some(trunk) = var("PKGPR_TRUNK") {
            config.trunk = trunk;
        }
        if let Some(remote) = var("PKGPR_REMOTE") {
            config.remote = remote;
        }
        if let Some(label) = var("PKGPR_LABEL") {
            config.label = label;
        }
        if let Some(context) = var("PKGPR_STATUS_CONTEXT") {
            config.status_context = context;
        }
        if let Some(path) = var("PKGPR_VALIDATE_PATH") {
            config.validate_path = PathBuf::from(path);
        }
        if let Some(validator) = var("PKGPR_VALIDATOR") {
            config.validator = validator;
        }
        if let Some(repository) = var("GITHUB_REPOSITORY") {
            let server = var("GITHUB_SERVER_URL").unwrap_or_else(|| GITHUB_SERVER.to_string());
            config.repo_url = Some(format!(
                "{}/{}",
                server.trim_end_matches('/'),
                repository.trim_matches('/')
            ));
        }
        if let Some(run_id) = var("GITHUB_RUN_ID") {
            config.run_url = actions_run_url(
                var("GITHUB_SERVER_URL").as_deref(),
                var("GITHUB_REPOSITORY").as_deref(),
                &run_id,
            );
            config.run_id = run_id;
        }
        config
    }

    pub fn with_trunk(mut self, trunk: &str) -> Self {
        self.trunk = trunk.to_string();
        self
    }

    pub fn with_remote(mut self, remote: &str) -> Self {
        self.remote = remote.to_string();
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn with_status_context(mut self, context: &str) -> Self {
        self.status_context = context.to_string();
        self
    }

    pub fn with_validate_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.validate_path = path.into();
        self
    }

    pub fn with_validator(mut self, command: &str) -> Self {
        self.validator = command.to_string();
        self
    }

    pub fn with_run_url(mut self, url: &str) -> Self {
        self.run_url = Some(url.to_string());
        self
    }

    pub fn with_repo_url(mut self, url: &str) -> Self {
        self.repo_url = Some(url.trim_end_matches('/').to_string());
        self
    }
}

/// `<server>/<owner>/<repo>/actions/runs/<run id>`, when all parts are known.
pub fn actions_run_url(
    server: Option<&str>,
    repository: Option<&str>,
    run_id: &str,
) -> Option<String> {
    let server = server.unwrap_or(GITHUB_SERVER).trim_end_matches('/');
    let repository = repository?.trim_matches('/');
    if repository.is_empty() || run_id.is_empty() {
        return None;
    }
    Some(format!("{server}/{repository}/actions/runs/{run_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReconcileConfig::default();
        assert_eq!(config.trunk, "main");
        assert_eq!(config.remote, "origin");
        assert_eq!(config.label, "package");
        assert_eq!(config.validate_path, PathBuf::from("src/yaml"));
        assert!(config.run_id.starts_with("local-"));
        assert!(config.run_url.is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let config = ReconcileConfig::default()
            .with_trunk("trunk")
            .with_label("pkg")
            .with_validator("true")
            .with_run_url("https://ci.example/runs/1");
        assert_eq!(config.trunk, "trunk");
        assert_eq!(config.label, "pkg");
        assert_eq!(config.validator, "true");
        assert_eq!(config.run_url.as_deref(), Some("https://ci.example/runs/1"));
    }

    #[test]
    fn test_actions_run_url() {
        assert_eq!(
            actions_run_url(Some("https://github.com/"), Some("memo33/sc4pac"), "42").as_deref(),
            Some("https://github.com/memo33/sc4pac/actions/runs/42")
        );
        assert_eq!(
            actions_run_url(None, Some("o/r"), "7").as_deref(),
            Some("https://github.com/o/r/actions/runs/7")
        );
        assert!(actions_run_url(None, None, "7").is_none());
        assert!(actions_run_url(None, Some("o/r"), "").is_none());
    }
}
