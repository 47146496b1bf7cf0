use std::path::PathBuf;

use derive_builder::Builder;

use crate::common::config::KindConfig;
use crate::common::placeholders::{
    CORES_PLACEHOLDER, DataPlaceholder, Substitution, TASK_ID_PLACEHOLDER, render_shell_word,
    shell_quote,
};
use crate::task::kind::CommandKind;

/// Input/output path pair of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPair {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl DataPair {
    pub fn new<I: Into<PathBuf>, O: Into<PathBuf>>(input: I, output: O) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub max_tries: u32,
}

impl RetryPolicy {
    /// Number of attempts the wrapper may make.
    pub fn attempts(&self) -> u32 {
        if self.enabled { self.max_tries.max(1) } else { 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuarantinePolicy {
    pub error_threshold: f64,
}

/// One invocation of an external program.
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(pattern = "owned", build_fn(error = "crate::Error"))]
pub struct TaskDescriptor {
    kind: CommandKind,
    #[builder(setter(into))]
    command: String,
    /// Argument templates, possibly containing placeholders.
    #[builder(default)]
    arguments: Vec<String>,
    #[builder(default)]
    data: Vec<DataPair>,
    #[builder(default = "1")]
    cores: u32,
    #[builder(default)]
    modules: Vec<String>,
    #[builder(default, setter(strip_option))]
    working_dir: Option<PathBuf>,
    #[builder(default, setter(strip_option))]
    retry: Option<RetryPolicy>,
    #[builder(default, setter(strip_option))]
    quarantine: Option<QuarantinePolicy>,
    #[builder(default = "true")]
    groupable: bool,
}

impl TaskDescriptor {
    /// Prepares a builder with the program, arguments, resources and policies of `kind`.
    pub fn builder_for_kind(kind: CommandKind, config: &KindConfig) -> TaskDescriptorBuilder {
        let mut builder = TaskDescriptorBuilder::default()
            .kind(kind)
            .command(
                config
                    .program
                    .clone()
                    .unwrap_or_else(|| kind.default_program().to_string()),
            )
            .arguments(
                config
                    .arguments
                    .clone()
                    .unwrap_or_else(|| kind.default_arguments()),
            )
            .cores(config.cores.max(1))
            .modules(config.modules.clone())
            .groupable(kind.is_groupable());
        if config.max_tries > 1 {
            builder = builder.retry(RetryPolicy {
                enabled: true,
                max_tries: config.max_tries,
            });
        }
        if let Some(error_threshold) = config.error_threshold {
            builder = builder.quarantine(QuarantinePolicy { error_threshold });
        }
        builder
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn data(&self) -> &[DataPair] {
        &self.data
    }

    pub fn core_count(&self) -> u32 {
        self.cores
    }

    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    pub fn retry(&self) -> Option<&RetryPolicy> {
        self.retry.as_ref()
    }

    pub fn quarantine(&self) -> Option<&QuarantinePolicy> {
        self.quarantine.as_ref()
    }

    pub fn is_groupable(&self) -> bool {
        self.groupable && self.kind.is_groupable()
    }

    /// True if the invocation has to run under the retry/quarantine wrapper.
    pub fn needs_wrapper(&self) -> bool {
        self.retry.is_some_and(|retry| retry.attempts() > 1) || self.quarantine.is_some()
    }

    /// Two tasks can share an array job if they run the same program of the same kind.
    pub fn is_compatible_with(&self, other: &TaskDescriptor) -> bool {
        self.is_groupable()
            && other.is_groupable()
            && self.kind == other.kind
            && self.command == other.command
    }

    /// Renders the command line as shell words.
    ///
    /// `task_index` is the shell variable holding the 1-based task index and `data` resolves
    /// `%{INPUT<n>}`/`%{OUTPUT<n>}` placeholders.
    pub fn render<F>(&self, task_index: &str, data: F) -> Vec<String>
    where
        F: Fn(DataPlaceholder) -> Option<Substitution>,
    {
        let cores = self.cores.to_string();
        let resolve = |name: &str| match name {
            CORES_PLACEHOLDER => Some(Substitution::Literal(cores.clone())),
            TASK_ID_PLACEHOLDER => Some(Substitution::Expansion(format!("${{{task_index}}}"))),
            name => DataPlaceholder::parse(name).and_then(&data),
        };

        let mut words = Vec::with_capacity(self.arguments.len() + 1);
        words.push(shell_quote(&self.command));
        words.extend(
            self.arguments
                .iter()
                .map(|argument| render_shell_word(argument, &resolve)),
        );
        words
    }
}

#[cfg(test)]
mod tests {
    use super::{DataPair, RetryPolicy, TaskDescriptor, TaskDescriptorBuilder};
    use crate::common::config::KindConfig;
    use crate::common::placeholders::{DataPlaceholder, Substitution};
    use crate::task::kind::CommandKind;

    #[test]
    fn test_builder_requires_command() {
        assert!(
            TaskDescriptorBuilder::default()
                .kind(CommandKind::Shell)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_builder_for_kind() {
        let config = KindConfig {
            cores: 4,
            max_tries: 3,
            error_threshold: Some(0.5),
            ..Default::default()
        };
        let task = TaskDescriptor::builder_for_kind(CommandKind::Gaussian, &config)
            .data(vec![DataPair::new("/a/p.gjf", "/a/p.gau")])
            .build()
            .unwrap();
        assert_eq!(task.command(), "g16");
        assert_eq!(task.core_count(), 4);
        assert_eq!(task.retry().unwrap().attempts(), 3);
        assert!(task.needs_wrapper());
    }

    #[test]
    fn test_single_try_does_not_need_wrapper() {
        let task = TaskDescriptor::builder_for_kind(CommandKind::Shell, &KindConfig::default())
            .build()
            .unwrap();
        assert!(task.retry().is_none());
        assert!(!task.needs_wrapper());
        let disabled = RetryPolicy {
            enabled: false,
            max_tries: 5,
        };
        assert_eq!(disabled.attempts(), 1);
    }

    #[test]
    fn test_render() {
        let task = TaskDescriptorBuilder::default()
            .kind(CommandKind::Aimall)
            .command("aimqb.ish")
            .arguments(vec![
                "-nproc=%{CORES}".to_string(),
                "%{INPUT}".to_string(),
                "task-%{TASK_ID}".to_string(),
            ])
            .cores(2)
            .build()
            .unwrap();
        let words = task.render("qchain_task", |placeholder| match placeholder {
            DataPlaceholder::Input(0) => Some(Substitution::Expansion("${in[0]}".to_string())),
            _ => None,
        });
        assert_eq!(
            words,
            vec!["aimqb.ish", "-nproc=2", "\"${in[0]}\"", "\"task-${qchain_task}\""]
        );
    }

    #[test]
    fn test_orchestrator_is_never_compatible() {
        let task = |kind| {
            TaskDescriptorBuilder::default()
                .kind(kind)
                .command("qchain")
                .build()
                .unwrap()
        };
        assert!(!task(CommandKind::Orchestrator).is_compatible_with(&task(CommandKind::Orchestrator)));
        assert!(task(CommandKind::Shell).is_compatible_with(&task(CommandKind::Shell)));
    }
}
