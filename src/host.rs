use crate::ack::AcceptHook;
use crate::error::ModuleError;
use crate::item::Batch;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Severity of a condition reported through [`ModuleHost::notify_error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Transient; the stage keeps running
    Warning,
    /// The current batch is lost; the stage keeps running
    DataLoss,
    /// The host should stop calling the stage
    FatalError,
}

/// Services a stage uses to pull input and push output.
///
/// Implemented by the surrounding host runtime. Any method may be called from
/// whichever thread is currently running a stage entry point.
pub trait ModuleHost: Send + Sync {
    /// Schedule the next delivery to this stage. Called at most once per
    /// completed batch.
    fn request_next(&self);

    /// Hand a batch downstream. When `on_accepted` is supplied the host fires it
    /// once the downstream stage has accepted the batch.
    fn post_output(&self, batch: Batch, on_accepted: Option<AcceptHook>);

    /// `count` input items were discarded as malformed
    fn notify_dropped(&self, count: usize);

    /// Report a condition that does not by itself unload the stage
    fn notify_error(&self, severity: ErrorSeverity, error: &ModuleError);
}

/// One observed call into a [`RecordingHost`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    RequestNext,
    Posted { batch: Batch, hooked: bool },
    Dropped(usize),
    Error { severity: ErrorSeverity, message: String },
}

/// An in-memory host that records every call made to it.
///
/// Acceptance hooks are either queued until [`RecordingHost::accept_next`]
/// fires them, or fired synchronously from inside `post_output` when built
/// with [`RecordingHost::auto_accepting`].
#[derive(Default)]
pub struct RecordingHost {
    calls: Mutex<Vec<HostCall>>,
    pending: Mutex<VecDeque<AcceptHook>>,
    auto_accept: bool,
}

impl RecordingHost {
    /// Create a host that holds acceptance hooks until told to fire them
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a host whose downstream accepts every post immediately
    pub fn auto_accepting() -> Self {
        Self {
            auto_accept: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().clone()
    }

    pub fn requests(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, HostCall::RequestNext))
            .count()
    }

    /// Posted batches in posting order
    pub fn posted(&self) -> Vec<Batch> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                HostCall::Posted { batch, .. } => Some(batch.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every drop notification, in order
    pub fn drop_notices(&self) -> Vec<usize> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                HostCall::Dropped(count) => Some(*count),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<(ErrorSeverity, String)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                HostCall::Error { severity, message } => Some((*severity, message.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn pending_hooks(&self) -> usize {
        self.pending.lock().len()
    }

    /// Fire the oldest queued acceptance hook. Returns false if none is queued.
    pub fn accept_next(&self) -> bool {
        // The hook re-enters the stage, which calls back into this host.
        let hook = self.pending.lock().pop_front();
        match hook {
            Some(hook) => {
                hook.accept();
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: HostCall) {
        self.calls.lock().push(call);
    }
}

impl ModuleHost for RecordingHost {
    fn request_next(&self) {
        self.record(HostCall::RequestNext);
    }

    fn post_output(&self, batch: Batch, on_accepted: Option<AcceptHook>) {
        self.record(HostCall::Posted {
            batch,
            hooked: on_accepted.is_some(),
        });
        if let Some(hook) = on_accepted {
            if self.auto_accept {
                hook.accept();
            } else {
                self.pending.lock().push_back(hook);
            }
        }
    }

    fn notify_dropped(&self, count: usize) {
        self.record(HostCall::Dropped(count));
    }

    fn notify_error(&self, severity: ErrorSeverity, error: &ModuleError) {
        self.record(HostCall::Error {
            severity,
            message: error.to_string(),
        });
    }
}
