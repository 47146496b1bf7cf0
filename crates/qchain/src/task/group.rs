use std::path::PathBuf;

use crate::task::descriptor::TaskDescriptor;

/// Per-task data of a group whose datafile is only written once its inputs exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingData {
    /// Number of tasks reserved in the array job.
    pub count: usize,
    /// Number of input/output pairs per task.
    pub pairs: usize,
}

/// Homogeneous tasks submitted together as one array job.
///
/// Command, cores, modules and options of the group are those of its first member.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskGroup {
    tasks: Vec<TaskDescriptor>,
    pending: Option<PendingData>,
}

impl TaskGroup {
    /// Returns `None` for an empty task list.
    pub fn new(tasks: Vec<TaskDescriptor>) -> Option<Self> {
        if tasks.is_empty() {
            return None;
        }
        Some(Self {
            tasks,
            pending: None,
        })
    }

    /// Group of `count` tasks built from `template`, reading data that does not exist yet.
    pub fn pending(template: TaskDescriptor, count: usize) -> Self {
        let pairs = template.data().len().max(1);
        Self {
            tasks: vec![template],
            pending: Some(PendingData { count, pairs }),
        }
    }

    pub fn first(&self) -> &TaskDescriptor {
        &self.tasks[0]
    }

    pub fn tasks(&self) -> &[TaskDescriptor] {
        &self.tasks
    }

    pub fn into_tasks(self) -> Vec<TaskDescriptor> {
        self.tasks
    }

    pub fn pending_data(&self) -> Option<&PendingData> {
        self.pending.as_ref()
    }

    pub fn task_count(&self) -> usize {
        match &self.pending {
            Some(pending) => pending.count,
            None => self.tasks.len(),
        }
    }

    pub fn core_count(&self) -> u32 {
        self.first().core_count()
    }

    /// Number of input/output pairs of each task.
    pub fn pair_count(&self) -> usize {
        match &self.pending {
            Some(pending) => pending.pairs,
            None => self.tasks.iter().map(|t| t.data().len()).max().unwrap_or(0),
        }
    }

    pub fn has_data(&self) -> bool {
        self.pair_count() > 0
    }

    /// Datafile rows: inputs followed by outputs of every task.
    /// Tasks with fewer pairs than the group are padded with empty columns.
    pub fn data_rows(&self) -> Vec<Vec<PathBuf>> {
        let pairs = self.pair_count();
        self.tasks
            .iter()
            .map(|task| {
                let mut row = vec![PathBuf::new(); pairs * 2];
                for (index, pair) in task.data().iter().enumerate() {
                    row[index] = pair.input.clone();
                    row[pairs + index] = pair.output.clone();
                }
                row
            })
            .collect()
    }
}

/// Partitions `tasks` into groups in a single ordered pass.
///
/// A new group starts whenever a task is not compatible with the first task of the current group
/// (different kind or program) or either of them is not groupable.
/// Concatenating the resulting groups yields the original list.
pub fn group_tasks(tasks: Vec<TaskDescriptor>) -> Vec<TaskGroup> {
    let mut groups: Vec<TaskGroup> = vec![];
    for task in tasks {
        match groups.last_mut() {
            Some(group) if group.pending.is_none() && group.first().is_compatible_with(&task) => {
                group.tasks.push(task);
            }
            _ => groups.push(TaskGroup {
                tasks: vec![task],
                pending: None,
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::{TaskGroup, group_tasks};
    use crate::task::descriptor::{DataPair, TaskDescriptor, TaskDescriptorBuilder};
    use crate::task::kind::CommandKind;
    use std::path::PathBuf;

    fn task(kind: CommandKind, command: &str, input: &str) -> TaskDescriptor {
        TaskDescriptorBuilder::default()
            .kind(kind)
            .command(command)
            .data(vec![DataPair::new(input, format!("{input}.out"))])
            .build()
            .unwrap()
    }

    fn concat(groups: Vec<TaskGroup>) -> Vec<TaskDescriptor> {
        groups.into_iter().flat_map(|g| g.into_tasks()).collect()
    }

    #[test]
    fn test_group_empty() {
        assert!(group_tasks(vec![]).is_empty());
        assert!(TaskGroup::new(vec![]).is_none());
    }

    #[test]
    fn test_group_by_kind_boundaries() {
        let tasks = vec![
            task(CommandKind::Gaussian, "g16", "/a"),
            task(CommandKind::Gaussian, "g16", "/b"),
            task(CommandKind::Aimall, "aimqb.ish", "/c"),
            task(CommandKind::Gaussian, "g16", "/d"),
            task(CommandKind::Gaussian, "g09", "/e"),
        ];
        let groups = group_tasks(tasks.clone());
        assert_eq!(
            groups.iter().map(|g| g.task_count()).collect::<Vec<_>>(),
            vec![2, 1, 1, 1]
        );
        assert_eq!(concat(groups), tasks);
    }

    #[test]
    fn test_non_groupable_tasks_are_isolated() {
        let tasks = vec![
            task(CommandKind::Orchestrator, "qchain", "/a"),
            task(CommandKind::Orchestrator, "qchain", "/b"),
            task(CommandKind::Shell, "bash", "/c"),
            TaskDescriptorBuilder::default()
                .kind(CommandKind::Shell)
                .command("bash")
                .groupable(false)
                .build()
                .unwrap(),
            task(CommandKind::Shell, "bash", "/d"),
        ];
        let groups = group_tasks(tasks.clone());
        assert_eq!(groups.len(), 5);
        assert_eq!(concat(groups), tasks);
    }

    #[test]
    fn test_concat_preserves_order_for_mixed_lists() {
        let kinds = [CommandKind::Gaussian, CommandKind::Aimall, CommandKind::Orchestrator];
        for seed in 0..64usize {
            let tasks: Vec<TaskDescriptor> = (0..(seed % 9))
                .map(|i| {
                    let kind = kinds[(seed >> (i % 5)) % kinds.len()];
                    task(kind, kind.default_program(), &format!("/t{i}"))
                })
                .collect();
            let groups = group_tasks(tasks.clone());
            assert!(groups.iter().all(|g| g.task_count() > 0));
            assert_eq!(concat(groups), tasks);
        }
    }

    #[test]
    fn test_data_rows_are_padded() {
        let wide = TaskDescriptorBuilder::default()
            .kind(CommandKind::Shell)
            .command("bash")
            .data(vec![DataPair::new("/i0", "/o0"), DataPair::new("/i1", "/o1")])
            .build()
            .unwrap();
        let narrow = task(CommandKind::Shell, "bash", "/j0");
        let group = TaskGroup::new(vec![wide, narrow]).unwrap();
        assert_eq!(group.pair_count(), 2);
        let rows = group.data_rows();
        assert_eq!(
            rows[0],
            ["/i0", "/i1", "/o0", "/o1"].map(PathBuf::from).to_vec()
        );
        assert_eq!(
            rows[1],
            ["/j0", "", "/j0.out", ""].map(PathBuf::from).to_vec()
        );
    }

    #[test]
    fn test_pending_group() {
        let template = task(CommandKind::Aimall, "aimqb.ish", "/placeholder");
        let group = TaskGroup::pending(template, 12);
        assert_eq!(group.task_count(), 12);
        assert!(group.has_data());
        assert_eq!(group.pending_data().unwrap().pairs, 1);
    }
}
