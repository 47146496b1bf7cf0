use nom::bytes::complete::{tag, take_until};
use nom::sequence::delimited;

use crate::common::parser::NomResult;

pub const INPUT_PLACEHOLDER: &str = "INPUT";
pub const OUTPUT_PLACEHOLDER: &str = "OUTPUT";
pub const CORES_PLACEHOLDER: &str = "CORES";
pub const TASK_ID_PLACEHOLDER: &str = "TASK_ID";

/// Placeholder referring to one column of the per-task data.
/// `%{INPUT}` is the first input, `%{INPUT2}` the third one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataPlaceholder {
    Input(usize),
    Output(usize),
}

impl DataPlaceholder {
    pub fn parse(name: &str) -> Option<DataPlaceholder> {
        let (index, constructor): (&str, fn(usize) -> DataPlaceholder) =
            if let Some(rest) = name.strip_prefix(INPUT_PLACEHOLDER) {
                (rest, DataPlaceholder::Input)
            } else if let Some(rest) = name.strip_prefix(OUTPUT_PLACEHOLDER) {
                (rest, DataPlaceholder::Output)
            } else {
                return None;
            };
        if index.is_empty() {
            Some(constructor(0))
        } else {
            index.parse::<usize>().ok().map(constructor)
        }
    }

    /// Column of the datafile that holds the value, given the number of data pairs per task.
    pub fn column(&self, pairs: usize) -> usize {
        match self {
            DataPlaceholder::Input(index) => *index,
            DataPlaceholder::Output(index) => pairs + index,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            DataPlaceholder::Input(index) | DataPlaceholder::Output(index) => *index,
        }
    }
}

/// Value of a resolved placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Substitution {
    /// Literal text, quoted for the shell when rendered.
    Literal(String),
    /// Shell expansion (e.g. `${arr[$i]}`), emitted inside double quotes.
    Expansion(String),
}

#[derive(Debug, Eq, PartialEq)]
pub enum StringPart<'a> {
    Verbatim(&'a str),
    Placeholder(&'a str),
}

fn parse_placeholder(data: &str) -> NomResult<&str> {
    delimited(tag("%{"), take_until("}"), tag("}"))(data)
}

/// Parses strings containing placeholders.
///
/// # Example
/// ```rust
/// use qchain::common::placeholders::{parse_resolvable_string, StringPart};
///
/// assert_eq!(parse_resolvable_string("a%{b}c"), vec![
///     StringPart::Verbatim("a"),
///     StringPart::Placeholder("b"),
///     StringPart::Verbatim("c"),
/// ]);
/// ```
pub fn parse_resolvable_string(data: &str) -> Vec<StringPart<'_>> {
    let mut parts = vec![];
    let mut start = 0;
    let mut input = data;

    while start < input.len() {
        if let Ok((rest, placeholder)) = parse_placeholder(&input[start..]) {
            if start > 0 {
                parts.push(StringPart::Verbatim(&input[..start]));
            }
            input = rest;
            parts.push(StringPart::Placeholder(placeholder));
            start = 0;
        } else {
            start += input[start..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
        }
    }

    if start > 0 {
        parts.push(StringPart::Verbatim(&input[..start]));
    }

    parts
}

/// Renders `input` as a single shell word, resolving placeholders with `resolve`.
/// Unknown placeholders are kept verbatim.
pub fn render_shell_word<F>(input: &str, mut resolve: F) -> String
where
    F: FnMut(&str) -> Option<Substitution>,
{
    let mut resolved = Vec::new();
    for part in parse_resolvable_string(input) {
        match part {
            StringPart::Verbatim(data) => resolved.push(Substitution::Literal(data.to_string())),
            StringPart::Placeholder(name) => match resolve(name) {
                Some(substitution) => resolved.push(substitution),
                None => {
                    log::warn!("Encountered an unknown placeholder `{name}` in `{input}`");
                    resolved.push(Substitution::Literal(format!("%{{{name}}}")));
                }
            },
        }
    }

    if resolved
        .iter()
        .all(|part| matches!(part, Substitution::Literal(_)))
    {
        let literal: String = resolved
            .into_iter()
            .map(|part| match part {
                Substitution::Literal(value) | Substitution::Expansion(value) => value,
            })
            .collect();
        return shell_quote(&literal);
    }

    let mut word = String::with_capacity(input.len() + 2);
    word.push('"');
    for part in resolved {
        match part {
            Substitution::Literal(value) => word.push_str(&escape_double_quoted(&value)),
            Substitution::Expansion(value) => word.push_str(&value),
        }
    }
    word.push('"');
    word
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "_-./=:,+@%".contains(c)
}

/// Quotes `value` so that the shell treats it as one literal word.
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty() && value.chars().all(is_shell_safe) {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

fn escape_double_quoted(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '"' | '$' | '`' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
