use std::fmt::Write;
use std::path::{Path, PathBuf};

use crate::batch::BatchSystem;
use crate::common::env::QCHAIN_SUBMITTED;
use crate::common::machine::Machine;
use crate::common::placeholders::{DataPlaceholder, Substitution, shell_quote};
use crate::datalock::DataLock;
use crate::script::SubmissionScript;
use crate::script::datafile::{datafile_path, write_datafile};
use crate::script::parallel_env::{ParallelEnvironments, lookup_parallel_environment};
use crate::task::TaskGroup;

/// Shell variable holding the 1-based task index inside generated scripts.
pub const TASK_VAR: &str = "qchain_task";
const INDEX_VAR: &str = "qchain_idx";
const ROW_VAR: &str = "qchain_row";

fn column_var(group_index: usize, column: usize) -> String {
    format!("qchain_g{group_index}_{column}")
}

fn column_expansion(group_index: usize, column: usize) -> String {
    format!("${{{}[${INDEX_VAR}]}}", column_var(group_index, column))
}

/// Compiles submission scripts for one batch system.
pub struct ScriptCompiler<'a> {
    system: &'a dyn BatchSystem,
    machine: &'a Machine,
    environments: &'a ParallelEnvironments,
    datafiles_dir: PathBuf,
    datalock: &'a DataLock,
    /// `<exe> -c <config> -u <run-id>` used to wrap tasks with a retry/quarantine policy.
    reinvocation: Vec<String>,
}

impl<'a> ScriptCompiler<'a> {
    pub fn new(
        system: &'a dyn BatchSystem,
        machine: &'a Machine,
        environments: &'a ParallelEnvironments,
        datafiles_dir: PathBuf,
        datalock: &'a DataLock,
        reinvocation: Vec<String>,
    ) -> Self {
        Self {
            system,
            machine,
            environments,
            datafiles_dir,
            datalock,
            reinvocation,
        }
    }

    pub fn datafile_path(&self, script: &SubmissionScript, group_index: usize) -> PathBuf {
        datafile_path(&self.datafiles_dir, &script.file_name(), group_index)
    }

    /// Compiles the script text, creating output directories and datafiles on the way.
    pub fn compile(&self, script: &SubmissionScript) -> crate::Result<String> {
        let mut text = self.compile_header(script)?;

        for (index, group) in script.groups.iter().enumerate() {
            let group_index = index + 1;
            let datafile = if group.has_data() {
                let path = self.datafile_path(script, group_index);
                if group.pending_data().is_none() {
                    self.write_group_datafile(&path, group)?;
                } else {
                    self.clear_pending_datafile(&path)?;
                }
                Some(path)
            } else {
                None
            };
            self.compile_group(&mut text, group_index, group, datafile.as_deref());
        }
        Ok(text)
    }

    /// Compiles the script and writes it to its path.
    pub fn write(&self, script: &SubmissionScript) -> crate::Result<()> {
        let text = self.compile(script)?;
        crate::common::utils::fs::write_atomic(&script.path, text.as_bytes())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script.path, std::fs::Permissions::from_mode(0o755))?;
        }
        log::debug!(
            "Written script {} with {} task(s)",
            script.path.display(),
            script.task_count()
        );
        Ok(())
    }

    fn write_group_datafile(&self, path: &Path, group: &TaskGroup) -> crate::Result<()> {
        if self.datalock.is_locked() && path.exists() {
            log::debug!(
                "Datafile {} is locked, keeping its content",
                path.display()
            );
            return Ok(());
        }
        write_datafile(path, &group.data_rows())
    }

    /// The datafile of a pending group is written by a job at run time;
    /// one left over from an earlier script of the same name is removed.
    fn clear_pending_datafile(&self, path: &Path) -> crate::Result<()> {
        if self.datalock.is_locked() {
            return Ok(());
        }
        match std::fs::remove_file(path) {
            Ok(()) => {
                log::debug!("Removed stale datafile {}", path.display());
                Ok(())
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    fn compile_header(&self, script: &SubmissionScript) -> crate::Result<String> {
        let system = self.system;
        let prefix = system.directive_prefix();
        let options = &script.options;

        for directory in [&options.working_dir, &options.stdout_dir, &options.stderr_dir] {
            std::fs::create_dir_all(directory)?;
        }

        let mut text = String::from("#!/bin/bash -l\n");
        writeln!(text, "{prefix} {}", system.working_dir_flag(&options.working_dir)).unwrap();
        writeln!(text, "{prefix} {}", system.stdout_flag(&options.stdout_dir)).unwrap();
        writeln!(text, "{prefix} {}", system.stderr_flag(&options.stderr_dir)).unwrap();

        let cores = script.core_count();
        if cores > 1 {
            let environment = lookup_parallel_environment(self.environments, self.machine, cores)?;
            writeln!(
                text,
                "{prefix} {}",
                system.parallel_environment_flag(&environment.name, cores)
            )
            .unwrap();
        }
        writeln!(
            text,
            "{prefix} {}",
            system.array_flag(script.array_size().max(1))
        )
        .unwrap();

        text.push('\n');
        for module in script.modules() {
            writeln!(text, "module load {module}").unwrap();
        }
        writeln!(text, "export {QCHAIN_SUBMITTED}=true").unwrap();
        writeln!(text, "{TASK_VAR}=\"${{{}:-1}}\"", system.task_index_var()).unwrap();
        Ok(text)
    }

    fn compile_group(
        &self,
        text: &mut String,
        group_index: usize,
        group: &TaskGroup,
        datafile: Option<&Path>,
    ) {
        let first = group.first();
        writeln!(
            text,
            "\n# {} ({} task(s))",
            first.kind(),
            group.task_count()
        )
        .unwrap();
        writeln!(text, "if [ \"${TASK_VAR}\" -le {} ]; then", group.task_count()).unwrap();
        writeln!(text, "    {INDEX_VAR}=$(({TASK_VAR} - 1))").unwrap();

        let pairs = group.pair_count();
        let mut indent = "    ";
        if let Some(datafile) = datafile {
            let columns = pairs * 2;
            for column in 0..columns {
                writeln!(text, "    {}=()", column_var(group_index, column)).unwrap();
            }
            writeln!(text, "    while IFS=',' read -r -a {ROW_VAR}; do").unwrap();
            for column in 0..columns {
                writeln!(
                    text,
                    "        {}+=(\"${{{ROW_VAR}[{column}]}}\")",
                    column_var(group_index, column)
                )
                .unwrap();
            }
            writeln!(
                text,
                "    done < {}",
                shell_quote(&datafile.display().to_string())
            )
            .unwrap();
            writeln!(
                text,
                "    if [ -n \"{}\" ]; then",
                column_expansion(group_index, 0)
            )
            .unwrap();
            indent = "        ";
        }

        if let Some(working_dir) = first.working_dir() {
            writeln!(
                text,
                "{indent}cd {}",
                shell_quote(&working_dir.display().to_string())
            )
            .unwrap();
        }

        let resolve = |placeholder: DataPlaceholder| {
            (datafile.is_some() && placeholder.index() < pairs).then(|| {
                Substitution::Expansion(column_expansion(group_index, placeholder.column(pairs)))
            })
        };
        let mut words = first.render(TASK_VAR, &resolve);
        if first.needs_wrapper() {
            let data_word = |placeholder: DataPlaceholder| match resolve(placeholder) {
                Some(Substitution::Expansion(expansion)) => format!("\"{expansion}\""),
                _ => shell_quote(""),
            };
            let mut wrapped: Vec<String> = self.reinvocation.iter().map(|w| shell_quote(w)).collect();
            wrapped.extend([
                "-f".to_string(),
                "run-task".to_string(),
                first.kind().tag().to_string(),
                data_word(DataPlaceholder::Input(0)),
                data_word(DataPlaceholder::Output(0)),
                "--".to_string(),
            ]);
            wrapped.append(&mut words);
            words = wrapped;
        }
        writeln!(text, "{indent}{}", words.join(" ")).unwrap();

        if datafile.is_some() {
            writeln!(text, "    fi").unwrap();
        }
        writeln!(text, "fi").unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::ScriptCompiler;
    use crate::batch::local::LocalBatchSystem;
    use crate::batch::sge::SgeBatchSystem;
    use crate::common::error::QchainError;
    use crate::common::machine::Machine;
    use crate::datalock::DataLock;
    use crate::script::datafile::parse_datafile;
    use crate::script::parallel_env::default_parallel_environments;
    use crate::script::{ScriptOptions, SubmissionScript};
    use crate::task::descriptor::{QuarantinePolicy, RetryPolicy};
    use crate::task::{CommandKind, DataPair, TaskDescriptor, TaskDescriptorBuilder, TaskGroup};
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn options(dir: &Path) -> ScriptOptions {
        ScriptOptions {
            working_dir: dir.to_path_buf(),
            stdout_dir: dir.join("out"),
            stderr_dir: dir.join("err"),
        }
    }

    fn gaussian(dir: &Path, name: &str) -> TaskDescriptor {
        TaskDescriptorBuilder::default()
            .kind(CommandKind::Gaussian)
            .command("g16")
            .arguments(vec!["%{INPUT}".to_string(), "%{OUTPUT}".to_string()])
            .data(vec![DataPair::new(
                dir.join(format!("{name}.gjf")),
                dir.join(format!("{name}.gau")),
            )])
            .cores(4)
            .modules(vec!["apps/gaussian/g16".to_string()])
            .build()
            .unwrap()
    }

    fn reinvocation() -> Vec<String> {
        ["/bin/qchain", "-c", "/w/qchain.toml", "-u", "run-1"]
            .map(String::from)
            .to_vec()
    }

    #[test]
    fn test_compile_array_script() {
        let dir = TempDir::with_prefix("qchain").unwrap();
        let machine = Machine::Known("csf3".to_string());
        let environments = default_parallel_environments();
        let lock = DataLock::default();
        let system = SgeBatchSystem;
        let compiler = ScriptCompiler::new(
            &system,
            &machine,
            &environments,
            dir.path().join("data"),
            &lock,
            reinvocation(),
        );
        let script = SubmissionScript::from_tasks(
            dir.path().join("run.sh"),
            vec![gaussian(dir.path(), "p1"), gaussian(dir.path(), "p2")],
            options(dir.path()),
        );
        let text = compiler.compile(&script).unwrap();

        assert!(text.starts_with("#!/bin/bash -l\n"));
        assert!(text.contains("#$ -pe smp.pe 4\n"));
        assert!(text.contains("#$ -t 1-2\n"));
        assert!(text.contains("module load apps/gaussian/g16\n"));
        assert!(text.contains("export QCHAIN_SUBMITTED=true\n"));
        assert!(text.contains("qchain_task=\"${SGE_TASK_ID:-1}\"\n"));
        assert!(text.contains("g16 \"${qchain_g1_0[$qchain_idx]}\" \"${qchain_g1_1[$qchain_idx]}\""));
        assert!(dir.path().join("out").is_dir());
        assert!(dir.path().join("err").is_dir());

        let datafile = std::fs::read_to_string(dir.path().join("data/run.sh.g1")).unwrap();
        assert_eq!(datafile.lines().count(), 2);
    }

    #[test]
    fn test_compile_is_idempotent() {
        let dir = TempDir::with_prefix("qchain").unwrap();
        let machine = Machine::Known("csf3".to_string());
        let environments = default_parallel_environments();
        let lock = DataLock::default();
        let system = SgeBatchSystem;
        let compiler = ScriptCompiler::new(
            &system,
            &machine,
            &environments,
            dir.path().join("data"),
            &lock,
            reinvocation(),
        );
        let script = SubmissionScript::from_tasks(
            dir.path().join("run.sh"),
            vec![gaussian(dir.path(), "p1"), gaussian(dir.path(), "p2")],
            options(dir.path()),
        );
        let first = compiler.compile(&script).unwrap();
        let datafile = std::fs::read(dir.path().join("data/run.sh.g1")).unwrap();
        let second = compiler.compile(&script).unwrap();
        assert_eq!(first, second);
        assert_eq!(datafile, std::fs::read(dir.path().join("data/run.sh.g1")).unwrap());
    }

    #[test]
    fn test_missing_parallel_environment_is_fatal() {
        let dir = TempDir::with_prefix("qchain").unwrap();
        let machine = Machine::Known("csf4".to_string());
        let environments = default_parallel_environments();
        let lock = DataLock::default();
        let system = SgeBatchSystem;
        let compiler = ScriptCompiler::new(
            &system,
            &machine,
            &environments,
            dir.path().join("data"),
            &lock,
            vec![],
        );
        let task = TaskDescriptorBuilder::default()
            .kind(CommandKind::Shell)
            .command("bash")
            .cores(64)
            .build()
            .unwrap();
        let script =
            SubmissionScript::from_tasks(dir.path().join("run.sh"), vec![task], options(dir.path()));
        assert!(matches!(
            compiler.compile(&script),
            Err(QchainError::ParallelEnvironmentNotFound { cores: 64, .. })
        ));
    }

    #[test]
    fn test_single_core_script_has_no_parallel_environment() {
        let dir = TempDir::with_prefix("qchain").unwrap();
        let machine = Machine::Unknown("laptop".to_string());
        let environments = default_parallel_environments();
        let lock = DataLock::default();
        let system = LocalBatchSystem;
        let compiler = ScriptCompiler::new(
            &system,
            &machine,
            &environments,
            dir.path().join("data"),
            &lock,
            vec![],
        );
        let task = TaskDescriptorBuilder::default()
            .kind(CommandKind::Shell)
            .command("echo")
            .arguments(vec!["hello world".to_string()])
            .build()
            .unwrap();
        let script =
            SubmissionScript::from_tasks(dir.path().join("run.sh"), vec![task], options(dir.path()));
        let text = compiler.compile(&script).unwrap();
        assert!(!text.contains("-pe"));
        assert!(text.contains("#LOCAL -t 1-1\n"));
        assert!(text.contains("    echo 'hello world'\n"));
        assert!(!dir.path().join("data").exists());
    }

    #[test]
    fn test_wrapped_task() {
        let dir = TempDir::with_prefix("qchain").unwrap();
        let machine = Machine::Known("local".to_string());
        let environments = default_parallel_environments();
        let lock = DataLock::default();
        let system = LocalBatchSystem;
        let compiler = ScriptCompiler::new(
            &system,
            &machine,
            &environments,
            dir.path().join("data"),
            &lock,
            reinvocation(),
        );
        let task = TaskDescriptorBuilder::default()
            .kind(CommandKind::Aimall)
            .command("aimqb.ish")
            .arguments(vec!["%{INPUT}".to_string()])
            .data(vec![DataPair::new("/p/p1.wfn", "/p/p1.int")])
            .retry(RetryPolicy {
                enabled: true,
                max_tries: 3,
            })
            .quarantine(QuarantinePolicy {
                error_threshold: 0.001,
            })
            .build()
            .unwrap();
        let script =
            SubmissionScript::from_tasks(dir.path().join("aim.sh"), vec![task], options(dir.path()));
        let text = compiler.compile(&script).unwrap();
        assert!(text.contains(
            "/bin/qchain -c /w/qchain.toml -u run-1 -f run-task aimall \
            \"${qchain_g1_0[$qchain_idx]}\" \"${qchain_g1_1[$qchain_idx]}\" -- \
            aimqb.ish \"${qchain_g1_0[$qchain_idx]}\"\n"
        ));
    }

    #[test]
    fn test_locked_datafile_is_kept() {
        let dir = TempDir::with_prefix("qchain").unwrap();
        let machine = Machine::Known("csf3".to_string());
        let environments = default_parallel_environments();
        let lock = DataLock::default();
        let system = SgeBatchSystem;
        let compiler = ScriptCompiler::new(
            &system,
            &machine,
            &environments,
            dir.path().join("data"),
            &lock,
            vec![],
        );
        let path = dir.path().join("run.sh");
        let first =
            SubmissionScript::from_tasks(path.clone(), vec![gaussian(dir.path(), "p1")], options(dir.path()));
        compiler.compile(&first).unwrap();

        let second =
            SubmissionScript::from_tasks(path, vec![gaussian(dir.path(), "p9")], options(dir.path()));
        {
            let _guard = lock.enter();
            compiler.compile(&second).unwrap();
        }
        let datafile = std::fs::read_to_string(dir.path().join("data/run.sh.g1")).unwrap();
        assert!(datafile.contains("p1.gjf"));

        compiler.compile(&second).unwrap();
        let datafile = std::fs::read_to_string(dir.path().join("data/run.sh.g1")).unwrap();
        assert!(datafile.contains("p9.gjf"));
    }

    #[test]
    fn test_pending_group_does_not_write_datafile() {
        let dir = TempDir::with_prefix("qchain").unwrap();
        let machine = Machine::Known("csf3".to_string());
        let environments = default_parallel_environments();
        let lock = DataLock::default();
        let system = SgeBatchSystem;
        let compiler = ScriptCompiler::new(
            &system,
            &machine,
            &environments,
            dir.path().join("data"),
            &lock,
            vec![],
        );
        let script = SubmissionScript::new(
            dir.path().join("run.sh"),
            vec![TaskGroup::pending(gaussian(dir.path(), "template"), 10)],
            options(dir.path()),
        );
        let text = compiler.compile(&script).unwrap();
        assert!(text.contains("#$ -t 1-10\n"));
        assert!(text.contains("run.sh.g1"));
        assert!(!dir.path().join("data/run.sh.g1").exists());
    }

    /// Runs the generated script with bash and checks that every task sees its own data.
    #[test]
    fn test_datafile_roundtrip_through_shell() {
        let Ok(bash) = which::which("bash") else {
            return;
        };
        let dir = TempDir::with_prefix("qchain").unwrap();
        let machine = Machine::Known("local".to_string());
        let environments = default_parallel_environments();
        let lock = DataLock::default();
        let system = LocalBatchSystem;
        let compiler = ScriptCompiler::new(
            &system,
            &machine,
            &environments,
            dir.path().join("data"),
            &lock,
            vec![],
        );
        let pairs: Vec<(PathBuf, PathBuf)> = (1..=3)
            .map(|i| {
                (
                    dir.path().join(format!("dir {i}/p{i}.gjf")),
                    dir.path().join(format!("dir {i}/p{i}.gau")),
                )
            })
            .collect();
        let tasks = pairs
            .iter()
            .map(|(input, output)| {
                TaskDescriptorBuilder::default()
                    .kind(CommandKind::Shell)
                    .command("printf")
                    .arguments(vec!["%s|%s".to_string(), "%{INPUT}".to_string(), "%{OUTPUT}".to_string()])
                    .data(vec![DataPair::new(input, output)])
                    .build()
                    .unwrap()
            })
            .collect();
        let script = SubmissionScript::from_tasks(dir.path().join("run.sh"), tasks, options(dir.path()));
        let text = compiler.compile(&script).unwrap();
        let datafile = std::fs::read_to_string(compiler.datafile_path(&script, 1)).unwrap();
        assert_eq!(parse_datafile(&datafile, 2).len(), 3);

        // The header is only valid for a login shell, run the body with a plain bash.
        let body = text.replacen("#!/bin/bash -l", "", 1);
        for (index, (input, output)) in pairs.iter().enumerate() {
            let result = std::process::Command::new(&bash)
                .arg("-c")
                .arg(body.replace("module load", "true"))
                .env("QCHAIN_TASK_ID", (index + 1).to_string())
                .output()
                .unwrap();
            assert_eq!(
                String::from_utf8(result.stdout).unwrap(),
                format!("{}|{}", input.display(), output.display())
            );
        }
    }
}
