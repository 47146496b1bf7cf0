use serde::{Deserialize, Serialize};

use crate::Map;
use crate::common::error::QchainError;
use crate::common::machine::Machine;

/// Parallel environment of a machine that accepts jobs within a range of core counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelEnvironment {
    pub name: String,
    pub min_cores: u32,
    pub max_cores: u32,
}

impl ParallelEnvironment {
    pub fn new(name: &str, min_cores: u32, max_cores: u32) -> Self {
        Self {
            name: name.to_string(),
            min_cores,
            max_cores,
        }
    }

    pub fn accepts(&self, cores: u32) -> bool {
        self.min_cores <= cores && cores <= self.max_cores
    }
}

pub type ParallelEnvironments = Map<String, Vec<ParallelEnvironment>>;

pub fn default_parallel_environments() -> ParallelEnvironments {
    let mut table = ParallelEnvironments::new();
    table.insert(
        "csf3".to_string(),
        vec![
            ParallelEnvironment::new("smp.pe", 2, 32),
            ParallelEnvironment::new("amd.pe", 33, 168),
        ],
    );
    table.insert(
        "csf4".to_string(),
        vec![ParallelEnvironment::new("smp.pe", 2, 40)],
    );
    table.insert(
        "ffluxlab".to_string(),
        vec![ParallelEnvironment::new("smp", 2, 44)],
    );
    table.insert(
        "local".to_string(),
        vec![ParallelEnvironment::new("smp", 2, u32::MAX)],
    );
    table
}

/// Finds the first parallel environment of `machine` that accepts `cores`.
pub fn lookup_parallel_environment<'a>(
    table: &'a ParallelEnvironments,
    machine: &Machine,
    cores: u32,
) -> crate::Result<&'a ParallelEnvironment> {
    let name = machine.require_known()?;
    let environments = table
        .get(name)
        .ok_or_else(|| QchainError::MachineNotFound(name.to_string()))?;
    environments
        .iter()
        .find(|env| env.accepts(cores))
        .ok_or_else(|| QchainError::ParallelEnvironmentNotFound {
            machine: name.to_string(),
            cores,
        })
}

#[cfg(test)]
mod tests {
    use super::{default_parallel_environments, lookup_parallel_environment};
    use crate::common::error::QchainError;
    use crate::common::machine::Machine;

    #[test]
    fn test_lookup_by_range() {
        let table = default_parallel_environments();
        let machine = Machine::Known("csf3".to_string());
        assert_eq!(
            lookup_parallel_environment(&table, &machine, 8).unwrap().name,
            "smp.pe"
        );
        assert_eq!(
            lookup_parallel_environment(&table, &machine, 64).unwrap().name,
            "amd.pe"
        );
    }

    #[test]
    fn test_lookup_out_of_range() {
        let table = default_parallel_environments();
        let machine = Machine::Known("csf3".to_string());
        assert!(matches!(
            lookup_parallel_environment(&table, &machine, 500),
            Err(QchainError::ParallelEnvironmentNotFound { cores: 500, .. })
        ));
    }

    #[test]
    fn test_lookup_missing_machine() {
        let table = default_parallel_environments();
        assert!(matches!(
            lookup_parallel_environment(&table, &Machine::Known("archer".to_string()), 4),
            Err(QchainError::MachineNotFound(_))
        ));
        assert!(matches!(
            lookup_parallel_environment(&table, &Machine::Unknown("laptop".to_string()), 4),
            Err(QchainError::MachineNotFound(_))
        ));
    }
}
