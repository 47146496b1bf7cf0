pub mod compiler;
pub mod datafile;
pub mod parallel_env;

use std::path::PathBuf;

use itertools::Itertools;

use crate::task::{TaskDescriptor, TaskGroup, group_tasks};

/// Directories shared by all tasks of a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOptions {
    pub working_dir: PathBuf,
    pub stdout_dir: PathBuf,
    pub stderr_dir: PathBuf,
}

/// Script to be compiled into `path` and submitted as one (array) job.
#[derive(Debug, Clone)]
pub struct SubmissionScript {
    pub path: PathBuf,
    pub groups: Vec<TaskGroup>,
    pub options: ScriptOptions,
}

impl SubmissionScript {
    pub fn new(path: PathBuf, groups: Vec<TaskGroup>, options: ScriptOptions) -> Self {
        Self {
            path,
            groups,
            options,
        }
    }

    pub fn from_tasks(path: PathBuf, tasks: Vec<TaskDescriptor>, options: ScriptOptions) -> Self {
        Self::new(path, group_tasks(tasks), options)
    }

    /// Cores requested by the job: the largest requirement of any group.
    pub fn core_count(&self) -> u32 {
        self.groups
            .iter()
            .map(|group| group.core_count())
            .max()
            .unwrap_or(1)
    }

    /// Size of the array job: the cardinality of the largest group.
    pub fn array_size(&self) -> usize {
        self.groups
            .iter()
            .map(|group| group.task_count())
            .max()
            .unwrap_or(0)
    }

    /// Modules of all groups, in order of first appearance.
    pub fn modules(&self) -> Vec<&str> {
        self.groups
            .iter()
            .flat_map(|group| group.first().modules())
            .map(|module| module.as_str())
            .unique()
            .collect()
    }

    pub fn task_count(&self) -> usize {
        self.groups.iter().map(|group| group.task_count()).sum()
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "script".to_string())
    }
}
