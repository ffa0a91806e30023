//! ---
//! cnd_section: "01-core-functionality"
//! cnd_subsection: "module"
//! cnd_type: "source"
//! cnd_scope: "code"
//! cnd_description: "Shared primitives and utilities for the Conductor runtime."
//! cnd_version: "v0.1.0"
//! cnd_owner: "tbd"
//! ---
use std::fmt;

/// Build-time version metadata surfaced by the binaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    version: &'static str,
    profile: &'static str,
}

impl VersionInfo {
    /// Capture the metadata for the currently compiled workspace.
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            profile: if cfg!(debug_assertions) {
                "debug"
            } else {
                "release"
            },
        }
    }

    /// Semantic version string.
    pub fn version(&self) -> &'static str {
        self.version
    }

    /// Build profile the binary was compiled with.
    pub fn profile(&self) -> &'static str {
        self.profile
    }

    /// Compact form used in CLI banners.
    pub fn cli_string(&self) -> String {
        format!("conductor {}", self.version)
    }

    /// Extended multi-line form for `--version` output.
    pub fn extended(&self) -> String {
        format!("conductor {} ({} build)", self.version, self.profile)
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cli_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_mentions_version() {
        let info = VersionInfo::current();
        assert!(info.extended().contains(info.version()));
    }
}
