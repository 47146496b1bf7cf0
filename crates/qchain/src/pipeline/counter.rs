use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::common::error::QchainError;
use crate::common::utils::fs::write_atomic;

/// Persisted progress of an automatic run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum CounterState {
    /// Neither the counter nor its terminal marker exists.
    NotStarted,
    Running { current: u32, max: u32 },
    /// All iterations were counted; only the terminal marker remains.
    Finished { max: u32 },
}

/// Iteration counter stored as two lines (`current` and `max`).
///
/// The counter file is removed once `current` reaches `max`; a `<counter>.done` marker holding
/// `max` is written at the same moment, so a finished run is distinguishable from one that never
/// started.
pub struct IterationCounter {
    path: PathBuf,
}

impl IterationCounter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn done_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".done");
        PathBuf::from(name)
    }

    /// Starts a new run of `max` iterations, forgetting a previous terminal marker.
    pub fn start(&self, max: u32) -> crate::Result<CounterState> {
        remove_if_exists(&self.done_path())?;
        self.write(0, max)
    }

    /// Puts the counter back into a previously read state.
    pub fn restore(&self, state: CounterState) -> crate::Result<()> {
        match state {
            CounterState::NotStarted => {
                remove_if_exists(&self.path)?;
                remove_if_exists(&self.done_path())?;
            }
            CounterState::Running { current, max } => {
                self.write(current, max)?;
            }
            CounterState::Finished { max } => {
                write_atomic(&self.done_path(), format!("{max}\n").as_bytes())?;
                remove_if_exists(&self.path)?;
            }
        }
        Ok(())
    }

    pub fn write(&self, current: u32, max: u32) -> crate::Result<CounterState> {
        if current > max {
            return Err(QchainError::GenericError(format!(
                "Iteration {current} is past the last iteration {max}"
            )));
        }
        if current == max {
            write_atomic(&self.done_path(), format!("{max}\n").as_bytes())?;
            remove_if_exists(&self.path)?;
            log::info!("All {max} iteration(s) finished");
            return Ok(CounterState::Finished { max });
        }
        write_atomic(&self.path, format!("{current}\n{max}\n").as_bytes())?;
        remove_if_exists(&self.done_path())?;
        Ok(CounterState::Running { current, max })
    }

    pub fn read(&self) -> crate::Result<CounterState> {
        if self.path.exists() {
            let content = std::fs::read_to_string(&self.path)?;
            let (current, max) = parse_counter(&content).ok_or_else(|| {
                QchainError::DeserializationError(format!(
                    "Invalid iteration counter {}",
                    self.path.display()
                ))
            })?;
            return Ok(CounterState::Running { current, max });
        }
        let done = self.done_path();
        if done.exists() {
            let content = std::fs::read_to_string(&done)?;
            let max = content.trim().parse().unwrap_or(0);
            return Ok(CounterState::Finished { max });
        }
        Ok(CounterState::NotStarted)
    }

    /// Returns `(current, max)` of a running counter.
    pub fn read_counter(&self) -> crate::Result<Option<(u32, u32)>> {
        Ok(match self.read()? {
            CounterState::Running { current, max } => Some((current, max)),
            _ => None,
        })
    }

    pub fn increment(&self) -> crate::Result<CounterState> {
        match self.read()? {
            CounterState::Running { current, max } => {
                log::info!("Iteration {} of {max} finished", current + 1);
                self.write(current + 1, max)
            }
            state => Err(QchainError::GenericError(format!(
                "Cannot increment iteration counter {} in state {state:?}",
                self.path.display()
            ))),
        }
    }
}

fn parse_counter(content: &str) -> Option<(u32, u32)> {
    let mut lines = content.lines().map(str::trim).filter(|line| !line.is_empty());
    let current = lines.next()?.parse().ok()?;
    let max = lines.next()?.parse().ok()?;
    Some((current, max))
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(error) if error.kind() != std::io::ErrorKind::NotFound => Err(error),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{CounterState, IterationCounter};
    use tempfile::TempDir;

    #[test]
    fn test_counter_lifecycle() {
        let dir = TempDir::with_prefix("qchain").unwrap();
        let counter = IterationCounter::new(dir.path().join("counter"));
        assert_eq!(counter.read().unwrap(), CounterState::NotStarted);

        counter.write(0, 3).unwrap();
        assert_eq!(counter.read_counter().unwrap(), Some((0, 3)));
        assert_eq!(
            std::fs::read_to_string(counter.path()).unwrap(),
            "0\n3\n"
        );

        counter.increment().unwrap();
        counter.increment().unwrap();
        assert_eq!(counter.read_counter().unwrap(), Some((2, 3)));
        counter.increment().unwrap();

        assert!(!counter.path().exists());
        assert_eq!(counter.read().unwrap(), CounterState::Finished { max: 3 });
        assert_eq!(counter.read_counter().unwrap(), None);
    }

    #[test]
    fn test_increment_finished_counter() {
        let dir = TempDir::with_prefix("qchain").unwrap();
        let counter = IterationCounter::new(dir.path().join("counter"));
        counter.write(1, 1).unwrap();
        assert!(counter.increment().is_err());
    }

    #[test]
    fn test_start_clears_terminal_marker() {
        let dir = TempDir::with_prefix("qchain").unwrap();
        let counter = IterationCounter::new(dir.path().join("counter"));
        counter.write(2, 2).unwrap();
        assert!(counter.done_path().exists());

        counter.start(4).unwrap();
        assert!(!counter.done_path().exists());
        assert_eq!(counter.read().unwrap(), CounterState::Running { current: 0, max: 4 });
    }

    #[test]
    fn test_restore() {
        let dir = TempDir::with_prefix("qchain").unwrap();
        let counter = IterationCounter::new(dir.path().join("counter"));

        counter.start(3).unwrap();
        counter.restore(CounterState::NotStarted).unwrap();
        assert_eq!(counter.read().unwrap(), CounterState::NotStarted);
        assert!(!counter.done_path().exists());

        counter.start(3).unwrap();
        counter.restore(CounterState::Finished { max: 2 }).unwrap();
        assert_eq!(counter.read().unwrap(), CounterState::Finished { max: 2 });
    }

    #[test]
    fn test_current_past_max() {
        let dir = TempDir::with_prefix("qchain").unwrap();
        let counter = IterationCounter::new(dir.path().join("counter"));
        assert!(counter.write(4, 3).is_err());
    }

    #[test]
    fn test_invalid_counter() {
        let dir = TempDir::with_prefix("qchain").unwrap();
        let counter = IterationCounter::new(dir.path().join("counter"));
        std::fs::write(counter.path(), "abc\n").unwrap();
        assert!(counter.read().is_err());
    }
}
