macro_rules! create_qchain_env {
    ($name: literal) => {
        concat!("QCHAIN_", $name)
    };
}

/// Known environment variables
pub const QCHAIN_CONFIG: &str = create_qchain_env!("CONFIG");
pub const QCHAIN_DEBUG: &str = create_qchain_env!("DEBUG");
/// Set to `true` by every generated script, so that an orchestrator running inside a compute job
/// never submits the same work a second time.
pub const QCHAIN_SUBMITTED: &str = create_qchain_env!("SUBMITTED");
/// Task index/count variables of the local batch system.
pub const QCHAIN_TASK_ID: &str = create_qchain_env!("TASK_ID");
pub const QCHAIN_TASK_LAST: &str = create_qchain_env!("TASK_LAST");

pub fn is_submitted_value(value: Option<&str>) -> bool {
    value.map(|v| v.trim().eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// Returns true if the current process runs inside a job submitted by the orchestrator.
pub fn running_inside_job() -> bool {
    is_submitted_value(std::env::var(QCHAIN_SUBMITTED).ok().as_deref())
}
