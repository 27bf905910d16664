use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Visibility of the host application as reported by the platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum HostState {
    #[default]
    Active,
    Background,
    /// Transitional (e.g. a system overlay on top of the app); neither leaves
    /// nor regains the foreground.
    Inactive,
    Unknown,
}

impl HostState {
    pub fn is_foreground(self) -> bool {
        self == HostState::Active
    }

    /// Only an explicit move to the background puts a stake at risk.
    pub fn has_left_foreground(self) -> bool {
        self == HostState::Background
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HostState::Active => "active",
            HostState::Background => "background",
            HostState::Inactive => "inactive",
            HostState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostState {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "active" | "foreground" => Ok(HostState::Active),
            "background" => Ok(HostState::Background),
            "inactive" => Ok(HostState::Inactive),
            "unknown" => Ok(HostState::Unknown),
            other => Err(format!("unknown host state '{other}'")),
        }
    }
}
