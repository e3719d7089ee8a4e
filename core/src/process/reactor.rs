//! Process reactor task
//!
//! The reactor is the single task that owns a started executor. It drains
//! handle requests one at a time, enforces the optional deadline, and
//! drives the child to termination. All externally visible state
//! transitions happen here, which is what lets handle queries read without
//! locks: state is either answered by the reactor or read from the final
//! snapshot it publishes.

use super::{CompletedProcess, ProcessRequest, ProcessTrigger};
use crate::executor::Executor;
use crate::Result;
use schema::ProcessInfo;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Events the reactor loop selects over
enum Event {
    /// The executor's wait returned: natural exit or cancellation kill
    Exited(Result<()>),
    /// The configured deadline expired
    Deadline,
    /// A handle request arrived, or the request channel closed
    Request(Option<ProcessRequest>),
}

/// The state machine owning one executor from start to completion
pub(crate) struct ProcessReactor {
    info: ProcessInfo,
    exec: Box<dyn Executor>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    ops: mpsc::Receiver<ProcessRequest>,
    completed: watch::Sender<Option<CompletedProcess>>,
    triggers: Vec<ProcessTrigger>,
}

impl ProcessReactor {
    pub(crate) fn new(
        info: ProcessInfo,
        exec: Box<dyn Executor>,
        cancel: CancellationToken,
        deadline: Option<Instant>,
        ops: mpsc::Receiver<ProcessRequest>,
        completed: watch::Sender<Option<CompletedProcess>>,
    ) -> Self {
        Self {
            info,
            exec,
            cancel,
            deadline,
            ops,
            completed,
            triggers: Vec::new(),
        }
    }

    /// Run the reactor to completion.
    ///
    /// Cancellation of the owning token reaches the executor's own wait,
    /// which kills the child and reports the synthetic SIGKILL attribution,
    /// so the loop only ever exits through the termination event.
    pub(crate) async fn run(self) {
        let ProcessReactor {
            mut info,
            mut exec,
            cancel,
            deadline,
            mut ops,
            completed,
            mut triggers,
        } = self;

        let mut deadline_armed = deadline.is_some();
        let mut ops_open = true;

        let outcome = loop {
            let wake_at = deadline.unwrap_or_else(far_future);
            let event = tokio::select! {
                result = exec.wait() => Event::Exited(result),
                () = sleep_until(wake_at), if deadline_armed => Event::Deadline,
                request = ops.recv(), if ops_open => Event::Request(request),
            };

            match event {
                Event::Exited(result) => break result,
                Event::Deadline => {
                    debug!("deadline expired for process '{}', killing it", info.id);
                    deadline_armed = false;
                    info.timeout_triggered = true;
                    cancel.cancel();
                }
                Event::Request(None) => ops_open = false,
                Event::Request(Some(request)) => {
                    handle_request(request, &info, exec.as_mut(), &mut triggers);
                }
            }
        };

        let error = match outcome {
            Ok(()) => None,
            Err(err) => Some(err.to_string()),
        };

        info.complete = true;
        info.is_running = false;
        info.successful = exec.success();
        info.exit_code = exec.exit_code();
        info.pid = exec.pid();

        // Triggers run before the completion broadcast so that completion
        // observers see their side effects.
        for trigger in triggers.drain(..) {
            let snapshot = info.clone();
            if catch_unwind(AssertUnwindSafe(move || trigger(snapshot))).is_err() {
                warn!("trigger for process '{}' panicked", info.id);
            }
        }

        debug!(
            "process '{}' complete (exit code {}, successful: {})",
            info.id, info.exit_code, info.successful
        );
        let _ = completed.send(Some(CompletedProcess { info, error }));

        if let Err(err) = exec.close() {
            warn!("failed to close executor: {}", err);
        }
    }
}

fn handle_request(
    request: ProcessRequest,
    info: &ProcessInfo,
    exec: &mut dyn Executor,
    triggers: &mut Vec<ProcessTrigger>,
) {
    match request {
        ProcessRequest::GetInfo { reply } => {
            let _ = reply.send(info.clone());
        }
        ProcessRequest::GetRunning { reply } => {
            let _ = reply.send(info.pid > 0 && !info.complete);
        }
        ProcessRequest::Signal { signal, reply } => {
            let _ = reply.send(exec.signal(signal));
        }
        ProcessRequest::RegisterTrigger { trigger, reply } => {
            triggers.push(trigger);
            let _ = reply.send(Ok(()));
        }
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(60 * 60 * 24 * 365)
}
