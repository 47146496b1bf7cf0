use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::placeholders::{CORES_PLACEHOLDER, INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER};

/// Type of an external program invocation.
///
/// Every variant knows its default program and argument template; the rest of a task's
/// properties (cores, modules, retry policy) come from the `[kinds.<tag>]` configuration.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    /// Electronic structure calculation (Gaussian).
    Gaussian,
    /// Topological integration of a wavefunction (AIMAll).
    Aimall,
    /// Model training (FEREBUS).
    Ferebus,
    /// Re-invocation of the orchestrator itself.
    Orchestrator,
    /// Arbitrary shell command.
    #[default]
    Shell,
}

impl CommandKind {
    pub const ALL: [CommandKind; 5] = [
        CommandKind::Gaussian,
        CommandKind::Aimall,
        CommandKind::Ferebus,
        CommandKind::Orchestrator,
        CommandKind::Shell,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            CommandKind::Gaussian => "gaussian",
            CommandKind::Aimall => "aimall",
            CommandKind::Ferebus => "ferebus",
            CommandKind::Orchestrator => "orchestrator",
            CommandKind::Shell => "shell",
        }
    }

    pub fn default_program(&self) -> &'static str {
        match self {
            CommandKind::Gaussian => "g16",
            CommandKind::Aimall => "aimqb.ish",
            CommandKind::Ferebus => "ferebus",
            CommandKind::Orchestrator => "qchain",
            CommandKind::Shell => "bash",
        }
    }

    pub fn default_arguments(&self) -> Vec<String> {
        let placeholder = |name: &str| format!("%{{{name}}}");
        match self {
            CommandKind::Gaussian => vec![placeholder(INPUT_PLACEHOLDER), placeholder(OUTPUT_PLACEHOLDER)],
            CommandKind::Aimall => vec![
                "-nogui".to_string(),
                "-usetwoe=0".to_string(),
                "-atoms=all".to_string(),
                format!("-nproc={}", placeholder(CORES_PLACEHOLDER)),
                "-naat=1".to_string(),
                "-encomp=3".to_string(),
                "-boaq=gs30".to_string(),
                "-iasmesh=fine".to_string(),
                placeholder(INPUT_PLACEHOLDER),
            ],
            CommandKind::Ferebus => vec![],
            CommandKind::Orchestrator => vec![],
            CommandKind::Shell => vec![placeholder(INPUT_PLACEHOLDER)],
        }
    }

    /// Self-recursive re-invocations must never be batched together with siblings.
    pub fn is_groupable(&self) -> bool {
        !matches!(self, CommandKind::Orchestrator)
    }
}

impl Display for CommandKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for CommandKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandKind::ALL
            .into_iter()
            .find(|kind| kind.tag() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown command kind `{s}`"))
    }
}

#[cfg(test)]
mod tests {
    use super::CommandKind;
    use std::str::FromStr;

    #[test]
    fn test_tag_roundtrip() {
        for kind in CommandKind::ALL {
            assert_eq!(CommandKind::from_str(kind.tag()).unwrap(), kind);
        }
        assert!(CommandKind::from_str("orca").is_err());
    }

    #[test]
    fn test_orchestrator_is_not_groupable() {
        assert!(!CommandKind::Orchestrator.is_groupable());
        assert!(CommandKind::Gaussian.is_groupable());
    }
}
