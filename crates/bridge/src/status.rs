//! Build status reported by the sandbox.

use serde::{Deserialize, Serialize};

/// Lifecycle of the sandboxed build/preview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    #[default]
    Idle,
    Installing,
    Building,
    Running,
    Error,
}

impl BuildStatus {
    /// Whether a build is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, BuildStatus::Installing | BuildStatus::Building)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Idle => "idle",
            BuildStatus::Installing => "installing",
            BuildStatus::Building => "building",
            BuildStatus::Running => "running",
            BuildStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_are_snake_case() {
        assert_eq!(serde_json::to_string(&BuildStatus::Installing).unwrap(), "\"installing\"");
        let parsed: BuildStatus = serde_json::from_str("\"running\"").unwrap();
        assert_eq!(parsed, BuildStatus::Running);
        assert_eq!(BuildStatus::Error.to_string(), "error");
    }

    #[test]
    fn busy_states() {
        assert!(BuildStatus::Building.is_busy());
        assert!(BuildStatus::Installing.is_busy());
        assert!(!BuildStatus::Running.is_busy());
        assert!(!BuildStatus::default().is_busy());
    }
}
