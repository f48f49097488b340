use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating systems the gateway knows executable layouts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    Windows,
    Macos,
    Linux,
}

impl OperatingSystem {
    /// The OS this binary was built for.
    pub fn current() -> Self {
        Self::from_name(std::env::consts::OS)
    }

    /// Map an OS name (as reported by the platform) to a known layout.
    pub fn from_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.starts_with("windows") {
            Self::Windows
        } else if name.starts_with("mac") || name == "darwin" {
            Self::Macos
        } else {
            Self::Linux
        }
    }
}

impl fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Windows => "windows",
            Self::Macos => "macos",
            Self::Linux => "linux",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_from_name() {
        assert_eq!(OperatingSystem::from_name("windows"), OperatingSystem::Windows);
        assert_eq!(OperatingSystem::from_name("Windows 11"), OperatingSystem::Windows);
        assert_eq!(OperatingSystem::from_name("macos"), OperatingSystem::Macos);
        assert_eq!(OperatingSystem::from_name("Mac OS X"), OperatingSystem::Macos);
        assert_eq!(OperatingSystem::from_name("freebsd"), OperatingSystem::Linux);
    }
}
