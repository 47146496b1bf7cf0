use std::fmt::{Display, Formatter};

use crate::Map;
use crate::common::error::QchainError;

/// Identity of the machine the orchestrator runs on.
/// Resolved once at startup and passed around explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Machine {
    /// Machine listed in the configuration (by name or host name fragment).
    Known(String),
    /// Host that could not be matched to any configured machine.
    Unknown(String),
}

impl Machine {
    /// Resolves the machine from an explicit name, falling back to the host name.
    pub fn resolve(name: Option<&str>, machines: &Map<String, String>) -> Machine {
        match name {
            Some(name) => Machine::Known(name.to_string()),
            None => {
                let hostname = gethostname::gethostname().to_string_lossy().into_owned();
                Self::from_hostname(&hostname, machines)
            }
        }
    }

    /// Matches `hostname` against `machines`, a map of machine name to host name fragment.
    pub fn from_hostname(hostname: &str, machines: &Map<String, String>) -> Machine {
        let lowercase = hostname.to_lowercase();
        machines
            .iter()
            .find(|(_, fragment)| lowercase.contains(&fragment.to_lowercase()))
            .map(|(name, _)| Machine::Known(name.clone()))
            .unwrap_or_else(|| {
                log::debug!("Host name {hostname} does not match any known machine");
                Machine::Unknown(hostname.to_string())
            })
    }

    pub fn name(&self) -> &str {
        match self {
            Machine::Known(name) | Machine::Unknown(name) => name,
        }
    }

    /// Returns the machine name or [`QchainError::MachineNotFound`] if it was not resolved.
    pub fn require_known(&self) -> crate::Result<&str> {
        match self {
            Machine::Known(name) => Ok(name),
            Machine::Unknown(hostname) => Err(QchainError::MachineNotFound(hostname.clone())),
        }
    }
}

impl Display for Machine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::Machine;
    use crate::Map;
    use crate::common::error::QchainError;

    fn machines() -> Map<String, String> {
        [("csf3", "csf3."), ("ffluxlab", "ffluxlab")]
            .into_iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_from_hostname() {
        assert_eq!(
            Machine::from_hostname("login1.CSF3.itservices.manchester.ac.uk", &machines()),
            Machine::Known("csf3".to_string())
        );
        assert_eq!(
            Machine::from_hostname("ffluxlab-node3", &machines()),
            Machine::Known("ffluxlab".to_string())
        );
    }

    #[test]
    fn test_unknown_machine() {
        let machine = Machine::from_hostname("laptop", &machines());
        assert_eq!(machine, Machine::Unknown("laptop".to_string()));
        assert!(matches!(
            machine.require_known(),
            Err(QchainError::MachineNotFound(name)) if name == "laptop"
        ));
    }

    #[test]
    fn test_explicit_name_wins() {
        assert_eq!(
            Machine::resolve(Some("local"), &machines()),
            Machine::Known("local".to_string())
        );
    }
}
