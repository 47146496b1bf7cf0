//! Datafiles list the per-task paths of an array job.
//!
//! One line per task, comma separated paths: all inputs followed by all outputs.
//! The generated script reads the file with `IFS=',' read -r -a`, so paths must not contain
//! commas or newlines.

use std::path::{Path, PathBuf};

use crate::common::error::error;
use crate::common::utils::fs::{absolute_path, write_atomic};

pub const DATAFILE_SEPARATOR: char = ',';

/// Datafile of the `group_index`-th (1-based) group of a script.
pub fn datafile_path(datafiles_dir: &Path, script_name: &str, group_index: usize) -> PathBuf {
    datafiles_dir.join(format!("{script_name}.g{group_index}"))
}

fn format_path(path: &Path) -> crate::Result<String> {
    if path.as_os_str().is_empty() {
        return Ok(String::new());
    }
    let path = absolute_path(path)?;
    let Some(value) = path.to_str() else {
        return error(format!("Path {} is not valid UTF-8", path.display()));
    };
    if value.contains(DATAFILE_SEPARATOR) || value.contains('\n') || value.contains('\r') {
        return error(format!(
            "Path `{value}` contains a comma or a newline and cannot be written to a datafile"
        ));
    }
    Ok(value.to_string())
}

/// Formats datafile rows, making every path absolute.
pub fn format_datafile(rows: &[Vec<PathBuf>]) -> crate::Result<String> {
    let mut content = String::new();
    for row in rows {
        let fields = row
            .iter()
            .map(|path| format_path(path))
            .collect::<crate::Result<Vec<_>>>()?;
        content.push_str(&fields.join(","));
        content.push('\n');
    }
    Ok(content)
}

pub fn write_datafile(path: &Path, rows: &[Vec<PathBuf>]) -> crate::Result<()> {
    let content = format_datafile(rows)?;
    write_atomic(path, content.as_bytes())?;
    log::debug!("Written datafile {} ({} rows)", path.display(), rows.len());
    Ok(())
}

/// Parses datafile content into `columns` values per row, the way the generated script does.
/// Missing trailing fields are empty.
pub fn parse_datafile(content: &str, columns: usize) -> Vec<Vec<String>> {
    content
        .lines()
        .map(|line| {
            let mut fields: Vec<String> = line
                .split(DATAFILE_SEPARATOR)
                .map(|field| field.to_string())
                .collect();
            fields.resize(columns.max(fields.len()), String::new());
            fields.truncate(columns);
            fields
        })
        .collect()
}
