use std::path::PathBuf;
use std::str::FromStr;

use crate::common::error::QchainError;
use crate::task::kind::CommandKind;

pub const FUNCTION_FLAG: &str = "-f";
pub const FUNCTION_FLAG_LONG: &str = "--function";

/// Work that a generated script asks the orchestrator to perform inside a compute job.
///
/// Encoded on the command line as `qchain -c <config> -u <run-id> -f <name> <args>...`.
#[derive(Debug, Clone, PartialEq)]
pub enum Continuation {
    /// Runs one task under the retry/quarantine wrapper.
    RunTask {
        kind: CommandKind,
        input: PathBuf,
        output: PathBuf,
        command: Vec<String>,
    },
    /// Writes the datafile of a deferred stage once its inputs exist.
    WriteDatafile { stage: String, datafile: PathBuf },
    /// Advances the iteration counter of an automatic run.
    IncrementCounter,
}

impl Continuation {
    pub fn name(&self) -> &'static str {
        match self {
            Continuation::RunTask { .. } => "run-task",
            Continuation::WriteDatafile { .. } => "write-datafile",
            Continuation::IncrementCounter => "increment-counter",
        }
    }

    /// Arguments following the function flag.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![FUNCTION_FLAG.to_string(), self.name().to_string()];
        match self {
            Continuation::RunTask {
                kind,
                input,
                output,
                command,
            } => {
                args.push(kind.tag().to_string());
                args.push(input.display().to_string());
                args.push(output.display().to_string());
                args.push("--".to_string());
                args.extend(command.iter().cloned());
            }
            Continuation::WriteDatafile { stage, datafile } => {
                args.push(stage.clone());
                args.push(datafile.display().to_string());
            }
            Continuation::IncrementCounter => {}
        }
        args
    }

    /// Parses the arguments following the function flag.
    pub fn parse(args: &[String]) -> crate::Result<Continuation> {
        let invalid = |message: String| QchainError::ContinuationError(message);
        let (name, rest) = args
            .split_first()
            .ok_or_else(|| invalid("missing function name".to_string()))?;
        match name.as_str() {
            "run-task" => {
                let separator = rest
                    .iter()
                    .position(|arg| arg == "--")
                    .ok_or_else(|| invalid("run-task: missing `--` before the command".into()))?;
                let (head, command) = (&rest[..separator], &rest[separator + 1..]);
                let [kind, input, output] = head else {
                    return Err(invalid(format!(
                        "run-task expects <kind> <input> <output>, got {} argument(s)",
                        head.len()
                    )));
                };
                if command.is_empty() {
                    return Err(invalid("run-task: empty command".to_string()));
                }
                Ok(Continuation::RunTask {
                    kind: CommandKind::from_str(kind).map_err(|e| invalid(e.to_string()))?,
                    input: PathBuf::from(input),
                    output: PathBuf::from(output),
                    command: command.to_vec(),
                })
            }
            "write-datafile" => match rest {
                [stage, datafile] => Ok(Continuation::WriteDatafile {
                    stage: stage.clone(),
                    datafile: PathBuf::from(datafile),
                }),
                _ => Err(invalid(
                    "write-datafile expects <stage> <datafile>".to_string(),
                )),
            },
            "increment-counter" if rest.is_empty() => Ok(Continuation::IncrementCounter),
            "increment-counter" => Err(invalid(
                "increment-counter takes no arguments".to_string(),
            )),
            name => Err(invalid(format!("unknown function `{name}`"))),
        }
    }
}

/// Splits the command line at the function flag.
/// Everything after it belongs to the continuation and is not seen by the option parser.
pub fn split_continuation_args(args: Vec<String>) -> (Vec<String>, Option<Vec<String>>) {
    match args
        .iter()
        .position(|arg| arg == FUNCTION_FLAG || arg == FUNCTION_FLAG_LONG)
    {
        Some(position) => {
            let mut head = args;
            let tail = head.split_off(position);
            (head, Some(tail[1..].to_vec()))
        }
        None => (args, None),
    }
}

#[cfg(test)]
mod tests {
    use super::{Continuation, split_continuation_args};
    use crate::task::kind::CommandKind;
    use std::path::PathBuf;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_run_task_args() {
        let continuation = Continuation::RunTask {
            kind: CommandKind::Gaussian,
            input: PathBuf::from("/data/p1/p1.gjf"),
            output: PathBuf::from("/data/p1/p1.gau"),
            command: strings(&["g16", "/data/p1/p1.gjf", "--", "x"]),
        };
        let args = continuation.to_args();
        assert_eq!(args[..2], strings(&["-f", "run-task"]));
        assert_eq!(Continuation::parse(&args[1..]).unwrap(), continuation);
    }

    #[test]
    fn test_parse_errors() {
        assert!(Continuation::parse(&[]).is_err());
        assert!(Continuation::parse(&strings(&["run-task", "gaussian", "a", "b"])).is_err());
        assert!(Continuation::parse(&strings(&["run-task", "gaussian", "a", "--", "g16"])).is_err());
        assert!(Continuation::parse(&strings(&["run-task", "orca", "a", "b", "--", "x"])).is_err());
        assert!(Continuation::parse(&strings(&["increment-counter", "1"])).is_err());
        assert!(Continuation::parse(&strings(&["launch"])).is_err());
    }

    #[test]
    fn test_parse_simple_functions() {
        assert_eq!(
            Continuation::parse(&strings(&["increment-counter"])).unwrap(),
            Continuation::IncrementCounter
        );
        assert_eq!(
            Continuation::parse(&strings(&["write-datafile", "aimall", "/d/x.g1"])).unwrap(),
            Continuation::WriteDatafile {
                stage: "aimall".to_string(),
                datafile: PathBuf::from("/d/x.g1")
            }
        );
    }

    #[test]
    fn test_split_continuation_args() {
        let (head, tail) = split_continuation_args(strings(&[
            "qchain", "-c", "a.toml", "-f", "run-task", "shell", "a", "b", "--", "-c", "x",
        ]));
        assert_eq!(head, strings(&["qchain", "-c", "a.toml"]));
        assert_eq!(
            tail.unwrap(),
            strings(&["run-task", "shell", "a", "b", "--", "-c", "x"])
        );

        let (head, tail) = split_continuation_args(strings(&["qchain", "status"]));
        assert_eq!(head.len(), 2);
        assert!(tail.is_none());
    }
}
