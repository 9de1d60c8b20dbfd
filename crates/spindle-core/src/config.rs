use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpindleError};

/// Runner settings, loaded from `<project>/.spindle/settings.toml`.
/// A missing file means defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSettings {
    /// Timeout for one subprocess unit, in seconds.
    #[serde(default = "default_subprocess_timeout")]
    pub subprocess_timeout_secs: u64,
    /// Override for the tracing env filter.
    #[serde(default)]
    pub log_filter: Option<String>,
}

fn default_subprocess_timeout() -> u64 {
    120
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            subprocess_timeout_secs: default_subprocess_timeout(),
            log_filter: None,
        }
    }
}

impl RunnerSettings {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| SpindleError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_missing() {
        let settings = RunnerSettings::load(Path::new("/nonexistent/settings.toml")).unwrap();
        assert_eq!(settings.subprocess_timeout_secs, 120);
        assert!(settings.log_filter.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "subprocess_timeout_secs = 5\nlog_filter = \"spindle=debug\"").unwrap();
        let settings = RunnerSettings::load(tmp.path()).unwrap();
        assert_eq!(settings.subprocess_timeout_secs, 5);
        assert_eq!(settings.log_filter.as_deref(), Some("spindle=debug"));
    }
}
