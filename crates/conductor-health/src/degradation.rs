//! ---
//! cnd_section: "04-health-resilience"
//! cnd_subsection: "module"
//! cnd_type: "source"
//! cnd_scope: "code"
//! cnd_description: "Health probing and reconciliation."
//! cnd_version: "v0.1.0"
//! cnd_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};

/// Aggregate severity of one monitoring sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DegradationLevel {
    /// Every observed subsystem is operating normally.
    Healthy,
    /// At least one subsystem is degraded or was reconciled this sweep.
    Degraded,
    /// At least one subsystem was abandoned or terminated fatally.
    Critical,
}

impl DegradationLevel {
    /// Static label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            DegradationLevel::Healthy => "healthy",
            DegradationLevel::Degraded => "degraded",
            DegradationLevel::Critical => "critical",
        }
    }

    /// The more severe of the two levels.
    pub fn max(self, other: DegradationLevel) -> DegradationLevel {
        std::cmp::max(self, other)
    }
}

impl fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(DegradationLevel::Healthy < DegradationLevel::Degraded);
        assert!(DegradationLevel::Degraded < DegradationLevel::Critical);
        assert_eq!(
            DegradationLevel::Healthy.max(DegradationLevel::Critical),
            DegradationLevel::Critical
        );
    }
}
