use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::batch::{BatchFuture, BatchSystem, BatchSystemKind, JobId, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub script: PathBuf,
    pub hold: Option<String>,
    pub id: JobId,
}

#[derive(Default)]
struct TestBatchState {
    next_id: u32,
    submissions: Vec<Submission>,
    listing: Vec<TaskStatus>,
    deleted: Vec<JobId>,
    undeletable: Vec<JobId>,
    fail_submit: bool,
}

/// Batch system that records submissions and hands out sequential ids (`1`, `2`, ...).
/// Clones share the same state, so a test can keep one and pass another to the code under test.
#[derive(Clone, Default)]
pub struct TestBatchSystem {
    state: Rc<RefCell<TestBatchState>>,
}

impl TestBatchSystem {
    pub fn boxed(&self) -> Box<dyn BatchSystem> {
        Box::new(self.clone())
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.borrow().submissions.clone()
    }

    pub fn deleted(&self) -> Vec<JobId> {
        self.state.borrow().deleted.clone()
    }

    pub fn set_listing(&self, listing: Vec<TaskStatus>) {
        self.state.borrow_mut().listing = listing;
    }

    pub fn fail_submissions(&self) {
        self.state.borrow_mut().fail_submit = true;
    }

    /// Makes every deletion of `job_id` fail.
    pub fn refuse_deletion(&self, job_id: &str) {
        self.state.borrow_mut().undeletable.push(job_id.to_string());
    }
}

impl BatchSystem for TestBatchSystem {
    fn kind(&self) -> BatchSystemKind {
        BatchSystemKind::Local
    }

    fn directive_prefix(&self) -> &'static str {
        "#TEST"
    }

    fn task_index_var(&self) -> &'static str {
        "TEST_TASK_ID"
    }

    fn task_count_var(&self) -> &'static str {
        "TEST_TASK_LAST"
    }

    fn working_dir_flag(&self, directory: &Path) -> String {
        format!("-wd {}", directory.display())
    }

    fn stdout_flag(&self, directory: &Path) -> String {
        format!("-o {}", directory.display())
    }

    fn stderr_flag(&self, directory: &Path) -> String {
        format!("-e {}", directory.display())
    }

    fn parallel_environment_flag(&self, environment: &str, cores: u32) -> String {
        format!("-pe {environment} {cores}")
    }

    fn array_flag(&self, task_count: usize) -> String {
        format!("-t 1-{task_count}")
    }

    fn hold_args(&self, job_id: &str) -> Vec<String> {
        vec!["-hold".to_string(), job_id.to_string()]
    }

    fn submit(&self, script: &Path, hold: Option<&str>) -> BatchFuture<JobId> {
        let state = self.state.clone();
        let script = script.to_path_buf();
        let hold = hold.map(|id| id.to_string());
        Box::pin(async move {
            let mut state = state.borrow_mut();
            if state.fail_submit {
                return Err(anyhow::anyhow!("Missing job id in test output"));
            }
            state.next_id += 1;
            let id = state.next_id.to_string();
            state.submissions.push(Submission {
                script,
                hold,
                id: id.clone(),
            });
            Ok(id)
        })
    }

    fn delete(&self, job_id: &str) -> BatchFuture<()> {
        let state = self.state.clone();
        let job_id = job_id.to_string();
        Box::pin(async move {
            let mut state = state.borrow_mut();
            if state.undeletable.contains(&job_id) {
                return Err(anyhow::anyhow!("Job {job_id} cannot be deleted"));
            }
            state.deleted.push(job_id);
            Ok(())
        })
    }

    fn status(&self) -> BatchFuture<Vec<TaskStatus>> {
        let listing = self.state.borrow().listing.clone();
        Box::pin(async move { Ok(listing) })
    }
}
