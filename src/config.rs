use std::path::PathBuf;

pub const LOG_ENV: &str = "CURRICULUMD_LOG";
pub const WORKSPACE_ENV: &str = "CURRICULUMD_WORKSPACE";
const DEFAULT_LOG_FILTER: &str = "info";

/// Process settings read once at startup. Workspace policy lives in the
/// workspace database instead (see `settings`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub log_filter: String,
    pub workspace: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::var(LOG_ENV).ok(), std::env::var(WORKSPACE_ENV).ok())
    }

    fn from_vars(log: Option<String>, workspace: Option<String>) -> Self {
        let log_filter = log
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        let workspace = workspace
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        Self {
            log_filter,
            workspace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let cfg = Config::from_vars(Some("  ".into()), Some("".into()));
        assert_eq!(cfg.log_filter, "info");
        assert_eq!(cfg.workspace, None);
    }

    #[test]
    fn values_are_trimmed() {
        let cfg = Config::from_vars(
            Some(" curriculumd=debug ".into()),
            Some(" /tmp/ws ".into()),
        );
        assert_eq!(cfg.log_filter, "curriculumd=debug");
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/ws")));
    }
}
