use std::fmt::{Display, Formatter};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const AUDIT_LOG_NAME: &str = "quarantine.jsonl";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum QuarantineReason {
    /// The task did not produce a complete output within its attempts.
    NonTermination,
    /// The error metric of the output exceeded the threshold.
    ErrorThreshold { value: f64, threshold: f64 },
}

impl Display for QuarantineReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            QuarantineReason::NonTermination => f.write_str("non-termination"),
            QuarantineReason::ErrorThreshold { value, threshold } => {
                write!(f, "error threshold exceeded ({value} > {threshold})")
            }
        }
    }
}

/// Line of the quarantine audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub unit: Option<PathBuf>,
    /// Where the unit was moved; `None` for failures that were not relocated.
    pub destination: Option<PathBuf>,
    pub reason: QuarantineReason,
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

/// Files of a single task that are moved into quarantine together.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkUnit {
    /// Directory dedicated to the task, named after the stem of its input.
    Directory(PathBuf),
    /// Files named after the stem of the task input inside directories shared with other tasks.
    Stem {
        stem: String,
        directories: Vec<PathBuf>,
    },
}

impl WorkUnit {
    /// Unit of the task reading `input` and writing `output`.
    ///
    /// `points/WATER0001/WATER0001.gjf` yields the directory `points/WATER0001`;
    /// `points/p1.gjf` yields the files `p1.*` of `points/` and of the output directory.
    pub fn for_task(input: &Path, output: Option<&Path>) -> Option<WorkUnit> {
        let stem = input.file_stem()?.to_str()?.to_string();
        let parent = input.parent().filter(|parent| !parent.as_os_str().is_empty())?;
        if parent.file_name().and_then(|name| name.to_str()) == Some(stem.as_str()) {
            return Some(WorkUnit::Directory(parent.to_path_buf()));
        }
        let mut directories = vec![parent.to_path_buf()];
        if let Some(directory) = output
            .and_then(Path::parent)
            .filter(|directory| !directory.as_os_str().is_empty())
        {
            if !directories.iter().any(|known| known == directory) {
                directories.push(directory.to_path_buf());
            }
        }
        Some(WorkUnit::Stem { stem, directories })
    }

    pub fn name(&self) -> String {
        match self {
            WorkUnit::Directory(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "unit".to_string()),
            WorkUnit::Stem { stem, .. } => stem.clone(),
        }
    }

    /// Path identifying the unit in the audit log.
    pub fn path(&self) -> PathBuf {
        match self {
            WorkUnit::Directory(path) => path.clone(),
            WorkUnit::Stem { stem, directories } => directories[0].join(stem),
        }
    }

    pub fn exists(&self) -> crate::Result<bool> {
        Ok(match self {
            WorkUnit::Directory(path) => path.is_dir(),
            WorkUnit::Stem { .. } => !self.files()?.is_empty(),
        })
    }

    /// Files of a stem unit, sorted by path.
    fn files(&self) -> crate::Result<Vec<PathBuf>> {
        let WorkUnit::Stem { stem, directories } = self else {
            return Ok(vec![]);
        };
        let mut files = vec![];
        for directory in directories {
            let entries = match std::fs::read_dir(directory) {
                Ok(entries) => entries,
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => continue,
                Err(error) => return Err(error.into()),
            };
            for entry in entries {
                let path = entry?.path();
                if path.is_file() && path.file_stem().and_then(|s| s.to_str()) == Some(stem.as_str()) {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Directory holding units of work that failed persistently.
pub struct QuarantineArea {
    directory: PathBuf,
}

impl QuarantineArea {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn audit_log(&self) -> PathBuf {
        self.directory.join(AUDIT_LOG_NAME)
    }

    /// Free destination for a unit called `name`; colliding names get a numeric suffix.
    fn destination(&self, name: &str) -> PathBuf {
        let mut destination = self.directory.join(name);
        let mut suffix = 1;
        while destination.exists() {
            destination = self.directory.join(format!("{name}.{suffix}"));
            suffix += 1;
        }
        destination
    }

    /// Moves the files of `unit` into their own directory of the quarantine area.
    /// Files of other tasks are never touched.
    pub fn relocate(&self, unit: &WorkUnit, reason: &QuarantineReason) -> crate::Result<PathBuf> {
        std::fs::create_dir_all(&self.directory)?;
        let destination = self.destination(&unit.name());
        match unit {
            WorkUnit::Directory(path) => std::fs::rename(path, &destination)?,
            WorkUnit::Stem { .. } => {
                let files = unit.files()?;
                std::fs::create_dir_all(&destination)?;
                for file in files {
                    if let Some(name) = file.file_name() {
                        std::fs::rename(&file, destination.join(name))?;
                    }
                }
            }
        }
        log::warn!(
            "Quarantined {} into {}, reason: {reason}",
            unit.path().display(),
            destination.display()
        );
        Ok(destination)
    }

    pub fn record(&self, entry: &AuditEntry) -> crate::Result<()> {
        std::fs::create_dir_all(&self.directory)?;
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.audit_log())?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    pub fn read_audit_log(&self) -> crate::Result<Vec<AuditEntry>> {
        let path = self.audit_log();
        if !path.exists() {
            return Ok(vec![]);
        }
        std::fs::read_to_string(path)?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| Ok(serde_json::from_str::<AuditEntry>(line)?))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{AuditEntry, QuarantineArea, QuarantineReason, WorkUnit};
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn test_relocate_with_collision() {
        let dir = TempDir::with_prefix("qchain").unwrap();
        let area = QuarantineArea::new(dir.path().join("quarantine"));
        let reason = QuarantineReason::NonTermination;

        let first = dir.path().join("set-a/WATER0001");
        let second = dir.path().join("set-b/WATER0001");
        for unit in [&first, &second] {
            std::fs::create_dir_all(unit).unwrap();
            std::fs::write(unit.join("WATER0001.gjf"), "").unwrap();
        }

        let a = area
            .relocate(&WorkUnit::Directory(first.clone()), &reason)
            .unwrap();
        let b = area
            .relocate(&WorkUnit::Directory(second.clone()), &reason)
            .unwrap();
        assert_eq!(a, dir.path().join("quarantine/WATER0001"));
        assert_eq!(b, dir.path().join("quarantine/WATER0001.1"));
        assert!(b.join("WATER0001.gjf").is_file());
        assert!(!first.exists());
        assert!(!second.exists());
    }

    #[test]
    fn test_unit_of_task() {
        assert_eq!(
            WorkUnit::for_task(Path::new("/w/points/W1/W1.gjf"), None),
            Some(WorkUnit::Directory("/w/points/W1".into()))
        );
        assert_eq!(
            WorkUnit::for_task(Path::new("/w/points/p1.gjf"), Some(Path::new("/w/wfn/p1.wfn"))),
            Some(WorkUnit::Stem {
                stem: "p1".to_string(),
                directories: vec!["/w/points".into(), "/w/wfn".into()],
            })
        );
        assert_eq!(
            WorkUnit::for_task(Path::new("/w/points/p1.gjf"), Some(Path::new("/w/points/p1.gau"))),
            Some(WorkUnit::Stem {
                stem: "p1".to_string(),
                directories: vec!["/w/points".into()],
            })
        );
        assert_eq!(WorkUnit::for_task(Path::new(""), None), None);
    }

    #[test]
    fn test_relocate_keeps_other_tasks() {
        let dir = TempDir::with_prefix("qchain").unwrap();
        let area = QuarantineArea::new(dir.path().join("quarantine"));
        let points = dir.path().join("points");
        std::fs::create_dir_all(&points).unwrap();
        for name in ["p1.gjf", "p1.gau", "p10.gjf", "p2.gjf"] {
            std::fs::write(points.join(name), "").unwrap();
        }

        let input = points.join("p1.gjf");
        let output = points.join("p1.gau");
        let unit = WorkUnit::for_task(&input, Some(output.as_path())).unwrap();
        assert!(unit.exists().unwrap());
        let destination = area
            .relocate(&unit, &QuarantineReason::NonTermination)
            .unwrap();
        assert_eq!(destination, dir.path().join("quarantine/p1"));
        assert!(destination.join("p1.gjf").is_file());
        assert!(destination.join("p1.gau").is_file());
        assert!(points.join("p10.gjf").is_file());
        assert!(points.join("p2.gjf").is_file());
        assert!(!points.join("p1.gjf").exists());
        assert!(!unit.exists().unwrap());
    }

    #[test]
    fn test_audit_log() {
        let dir = TempDir::with_prefix("qchain").unwrap();
        let area = QuarantineArea::new(dir.path().join("quarantine"));
        let entry = AuditEntry {
            unit: Some(dir.path().join("p1")),
            destination: None,
            reason: QuarantineReason::ErrorThreshold {
                value: 0.5,
                threshold: 0.1,
            },
            attempts: 2,
            timestamp: chrono::Utc::now(),
        };
        area.record(&entry).unwrap();
        area.record(&entry).unwrap();
        assert_eq!(area.read_audit_log().unwrap(), vec![entry.clone(), entry]);
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(QuarantineReason::NonTermination.to_string(), "non-termination");
        assert_eq!(
            QuarantineReason::ErrorThreshold {
                value: 0.5,
                threshold: 0.1
            }
            .to_string(),
            "error threshold exceeded (0.5 > 0.1)"
        );
    }
}
