use std::path::PathBuf;

use bstr::ByteSlice;

/// Decides whether an attempt of a task produced a complete result.
pub trait CompletionCheck {
    fn is_complete(&self, exit_success: bool) -> bool;
}

/// Numeric quality measure of a finished task, compared against the quarantine threshold.
pub trait ErrorMetric {
    /// Returns `None` if the metric is not present in the output.
    fn value(&self) -> crate::Result<Option<f64>>;
}

/// A task is complete if its output exists, is non-empty and contains the optional marker.
/// Tasks without an output are complete when the command succeeds.
pub struct OutputCheck {
    output: Option<PathBuf>,
    marker: Option<String>,
}

impl OutputCheck {
    pub fn new(output: Option<PathBuf>, marker: Option<String>) -> Self {
        Self {
            output: output.filter(|path| !path.as_os_str().is_empty()),
            marker,
        }
    }
}

impl CompletionCheck for OutputCheck {
    fn is_complete(&self, exit_success: bool) -> bool {
        let Some(output) = &self.output else {
            return exit_success;
        };
        let content = match std::fs::read(output) {
            Ok(content) => content,
            Err(error) => {
                log::debug!("Output {} is not readable: {error}", output.display());
                return false;
            }
        };
        if content.is_empty() {
            return false;
        }
        match &self.marker {
            Some(marker) => content.contains_str(marker),
            None => true,
        }
    }
}

/// Reads the largest `<key> <value>`, `<key> = <value>` or `<key>: <value>` entry of a file.
pub struct KeyValueMetric {
    path: PathBuf,
    key: String,
}

impl KeyValueMetric {
    pub fn new(path: PathBuf, key: String) -> Self {
        Self { path, key }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Position right after the first occurrence of `key` that forms a whole word of `line`.
fn find_key(line: &str, key: &str) -> Option<usize> {
    if key.is_empty() {
        return None;
    }
    let mut offset = 0;
    while let Some(position) = line[offset..].find(key) {
        let start = offset + position;
        let end = start + key.len();
        let separated_before = line[..start].chars().next_back().is_none_or(|c| !is_word_char(c));
        let separated_after = line[end..].chars().next().is_none_or(|c| !is_word_char(c));
        if separated_before && separated_after {
            return Some(end);
        }
        offset = end;
    }
    None
}

fn parse_metric_line(line: &str, key: &str) -> Option<f64> {
    let rest = &line[find_key(line, key)?..];
    let rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '=' || c == ':');
    let token = rest.split_whitespace().next()?;
    // Fortran style exponents (1.0D-03)
    token.replace(['D', 'd'], "E").parse::<f64>().ok()
}

impl ErrorMetric for KeyValueMetric {
    fn value(&self) -> crate::Result<Option<f64>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read(&self.path)?;
        Ok(content
            .to_str_lossy()
            .lines()
            .filter_map(|line| parse_metric_line(line, &self.key))
            .map(f64::abs)
            .reduce(f64::max))
    }
}
