//! # Environment validation before startup.
//!
//! Runs once at the beginning of `start()`:
//! - service keys must be unique;
//! - declared working directories must exist (fatal for required services,
//!   a warning for optional ones);
//! - every [`EnvironmentCheck`] supplied by the embedder runs; a failing
//!   required check is fatal, a failing optional one is a warning.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::OrchestratorError;
use crate::services::ServiceDescriptor;

type Predicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Named predicate about the host, e.g. "container engine available".
#[derive(Clone)]
pub struct EnvironmentCheck {
    name: String,
    required: bool,
    check: Predicate,
}

impl EnvironmentCheck {
    /// Check whose failure aborts `start()`.
    pub fn required<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            required: true,
            check: Arc::new(check),
        }
    }

    /// Check whose failure only records a warning.
    pub fn optional<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            required: false,
            check: Arc::new(check),
        }
    }

    /// Passes if `program` resolves to a file on `PATH`.
    pub fn program_on_path(program: impl Into<String>, required: bool) -> Self {
        let program = program.into();
        let name = format!("{program} available");
        let check: Predicate = Arc::new(move || find_on_path(&program, std::env::var_os("PATH").as_deref()));
        Self {
            name,
            required,
            check,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn run(&self) -> bool {
        (self.check)()
    }
}

impl fmt::Debug for EnvironmentCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentCheck")
            .field("name", &self.name)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

fn find_on_path(program: &str, path: Option<&OsStr>) -> bool {
    if program.contains(std::path::MAIN_SEPARATOR) {
        return Path::new(program).is_file();
    }
    path.map(|p| std::env::split_paths(p).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

/// Validates the host and the descriptor list; returns the warnings to record.
pub(crate) fn validate(
    checks: &[EnvironmentCheck],
    descriptors: &[ServiceDescriptor],
) -> Result<Vec<String>, OrchestratorError> {
    let mut warnings = Vec::new();

    let mut seen = HashSet::with_capacity(descriptors.len());
    for desc in descriptors {
        if !seen.insert(desc.key()) {
            return Err(OrchestratorError::Environment {
                check: "unique service keys".into(),
                reason: format!("service key '{}' is declared more than once", desc.key()),
            });
        }
    }

    for desc in descriptors {
        let Some(dir) = desc.working_dir() else {
            continue;
        };
        if dir.is_dir() {
            continue;
        }
        let reason = format!(
            "working directory {} of service '{}' does not exist",
            dir.display(),
            desc.key()
        );
        if desc.required() {
            return Err(OrchestratorError::Environment {
                check: "working directories".into(),
                reason,
            });
        }
        warnings.push(reason);
    }

    for check in checks {
        if check.run() {
            tracing::debug!(check = %check.name(), "environment check passed");
            continue;
        }
        if check.is_required() {
            return Err(OrchestratorError::Environment {
                check: check.name().to_string(),
                reason: "required capability is unavailable".into(),
            });
        }
        warnings.push(format!("optional capability '{}' is unavailable", check.name()));
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_failures_become_warnings() {
        let checks = [
            EnvironmentCheck::required("always", || true),
            EnvironmentCheck::optional("docker", || false),
        ];
        let warnings = validate(&checks, &[]).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("docker"));
    }

    #[test]
    fn required_failure_is_fatal() {
        let checks = [EnvironmentCheck::required("docker", || false)];
        let err = validate(&checks, &[]).unwrap_err();
        assert!(matches!(err, OrchestratorError::Environment { ref check, .. } if check == "docker"));
    }

    #[test]
    fn missing_working_dir_depends_on_required_flag() {
        let missing = std::env::temp_dir().join("stackvisor-does-not-exist-7f3a");
        let optional = ServiceDescriptor::new("ai", "ollama")
            .with_working_dir(&missing)
            .with_required(false);
        let warnings = validate(&[], &[optional]).unwrap();
        assert_eq!(warnings.len(), 1);

        let required = ServiceDescriptor::new("api", "uvicorn").with_working_dir(&missing);
        assert!(validate(&[], &[required]).is_err());
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let descs = [
            ServiceDescriptor::new("api", "a"),
            ServiceDescriptor::new("api", "b"),
        ];
        let err = validate(&[], &descs).unwrap_err();
        assert_eq!(err.as_label(), "environment_check_failed");
    }

    #[cfg(unix)]
    #[test]
    fn finds_programs_on_path() {
        let path = std::env::join_paths(["/nonexistent", "/bin", "/usr/bin"]).unwrap();
        assert!(find_on_path("sh", Some(path.as_os_str())));
        assert!(!find_on_path("definitely-not-installed-xyz", Some(path.as_os_str())));
        assert!(!find_on_path("sh", None));
    }
}
