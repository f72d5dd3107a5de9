use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::Path;
use tracing::debug;

/// Resolves executables against `PATH` (or an explicit search path).
#[derive(Debug, Clone, Default)]
pub struct ToolAvailabilityChecker {
    search_path: Option<OsString>,
}

impl ToolAvailabilityChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve against `search_path` instead of the process `PATH`.
    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
        }
    }

    pub fn is_available(&self, name: &str) -> bool {
        let path = Path::new(name);
        if path.components().count() > 1 {
            return path.is_file();
        }

        let found = match &self.search_path {
            Some(search_path) => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| ".".into());
                which::which_in(name, Some(search_path), cwd).is_ok()
            }
            None => which::which(name).is_ok(),
        };
        debug!("Tool {} available: {}", name, found);
        found
    }

    /// Names from `names` that cannot be resolved. Empty when everything is present.
    pub fn check_tools<I, S>(&self, names: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter(|name| !self.is_available(name.as_ref()))
            .map(|name| name.as_ref().to_string())
            .collect()
    }
}

/// Check `names` against the process `PATH`.
pub fn check_tools<I, S>(names: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    ToolAvailabilityChecker::new().check_tools(names)
}
