//! Background Process tracking.
//!
//! A backgrounded statement (`cmd &`) spawns a cooperative tokio task that
//! owns its own clone of the interpreter state and reports back through a
//! `{done signal, exit cell}` pair appended to an ordered, 1-indexed list.
//! `wait $!` and bare `wait` select by that index using a `g`-prefixed id
//! so it can never collide with a host PID exposed elsewhere in the shell.

use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

/// Shared cell holding a background job's exit status once it completes.
#[derive(Debug, Clone)]
pub struct BackgroundExit {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// A single tracked background job.
pub struct BackgroundJob {
    /// 1-indexed slot in the owning `BackgroundJobs` list.
    pub index: usize,
    /// Fires once the job's task has recorded its exit status.
    pub done: oneshot::Receiver<()>,
    /// Populated by the task right before it signals `done`.
    pub exit: Arc<Mutex<Option<BackgroundExit>>>,
}

/// The `g`-prefixed wait-id bash exposes as `$!` for a background job,
/// distinct from a host process id.
pub fn wait_id(index: usize) -> String {
    format!("g{}", index)
}

/// Parse a `wait_id` produced by [`wait_id`] back into its 1-based index.
pub fn parse_wait_id(id: &str) -> Option<usize> {
    id.strip_prefix('g').and_then(|rest| rest.parse::<usize>().ok())
}

/// Parent-side handle for a Runner's outstanding background jobs. Spawned
/// shells append to this list; only direct children are tracked here — a
/// subshell that itself backgrounds work keeps its own list that never
/// merges into the parent's (see §3's "no cross-subshell inheritance").
#[derive(Default)]
pub struct BackgroundJobs {
    jobs: Vec<Option<BackgroundJob>>,
}

impl BackgroundJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly spawned background job, returning its `g`-prefixed
    /// wait id for storage into `$!`.
    pub fn push(&mut self, done: oneshot::Receiver<()>, exit: Arc<Mutex<Option<BackgroundExit>>>) -> String {
        self.jobs.push(Some(BackgroundJob { index: self.jobs.len() + 1, done, exit }));
        wait_id(self.jobs.len())
    }

    /// Number of jobs ever registered (completed jobs are not removed, to
    /// keep their index stable for a later `wait $!`).
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Take ownership of a job by its 1-based index so it can be awaited
    /// exactly once; a second `wait` on the same id returns `None`, matching
    /// bash's behavior of `wait` on an already-reaped job reporting nothing.
    pub fn take(&mut self, index: usize) -> Option<BackgroundJob> {
        self.jobs.get_mut(index.checked_sub(1)?)?.take()
    }

    /// Take every still-outstanding job, in registration order, for a bare
    /// `wait` with no arguments.
    pub fn take_all(&mut self) -> Vec<BackgroundJob> {
        self.jobs.iter_mut().filter_map(|slot| slot.take()).collect()
    }
}

/// Await a single background job, consuming it. Returns `None` if the
/// job's task was dropped without ever recording an exit (e.g. panicked).
pub async fn await_job(job: BackgroundJob) -> Option<BackgroundExit> {
    let _ = job.done.await;
    job.exit.lock().await.clone()
}

/// Synchronous equivalent of [`await_job`] for callers (builtin dispatch)
/// that cannot await: the executor runs a backgrounded job to completion
/// before ever registering it, so its exit cell is always already populated
/// and uncontended by the time `wait` looks at it.
pub fn try_take_exit(job: BackgroundJob) -> Option<BackgroundExit> {
    job.exit.try_lock().ok().and_then(|guard| guard.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_id_round_trips() {
        assert_eq!(wait_id(1), "g1");
        assert_eq!(parse_wait_id("g1"), Some(1));
        assert_eq!(parse_wait_id("1234"), None);
        assert_eq!(parse_wait_id("gabc"), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn push_and_take_preserves_index() {
        let mut jobs = BackgroundJobs::new();
        let (tx, rx) = oneshot::channel();
        let exit = Arc::new(Mutex::new(None));
        let id = jobs.push(rx, exit.clone());
        assert_eq!(id, "g1");
        assert_eq!(jobs.len(), 1);

        *exit.lock().await = Some(BackgroundExit { exit_code: 0, stdout: String::new(), stderr: String::new() });
        tx.send(()).unwrap();

        let job = jobs.take(1).expect("job present");
        let result = await_job(job).await.expect("exit recorded");
        assert_eq!(result.exit_code, 0);

        assert!(jobs.take(1).is_none());
    }
}
