use crate::ack::AcceptHook;
use crate::error::{ModuleError, Result};
use crate::host::{ErrorSeverity, ModuleHost};
use crate::item::{Batch, DataItem};
use crate::metrics::StageMetrics;
use crate::shutdown::{Lifecycle, ShutdownLatch};
use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Trait for a stage that produces one item per timer tick
pub trait Source: Send + Sync + 'static {
    fn produce(&self) -> Result<DataItem>;

    /// Interval between ticks; the first tick fires on start
    fn period(&self) -> Duration;

    fn name(&self) -> &str {
        "source"
    }
}

/// Drives a [`Source`] from its own timer thread
pub struct SourceRunner<S: Source> {
    inner: Arc<SourceInner<S>>,
}

struct SourceInner<S> {
    source: S,
    host: Arc<dyn ModuleHost>,
    latch: ShutdownLatch,
    metrics: StageMetrics,
    timer: Mutex<Option<Timer>>,
}

struct Timer {
    // Dropping the sender disconnects the timer thread's stop channel.
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl<S: Source> Clone for SourceRunner<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Source> SourceRunner<S> {
    pub fn new(source: S, host: Arc<dyn ModuleHost>) -> Self {
        Self {
            inner: Arc::new(SourceInner {
                source,
                host,
                latch: ShutdownLatch::new(),
                metrics: StageMetrics::new(),
                timer: Mutex::new(None),
            }),
        }
    }

    pub fn source(&self) -> &S {
        &self.inner.source
    }

    pub fn metrics(&self) -> &StageMetrics {
        &self.inner.metrics
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.latch.lifecycle()
    }

    /// Arm the timer. A no-op once shut down.
    pub fn start(&self) -> Result<()> {
        let inner = &self.inner;
        let Some(active) = inner.latch.begin_start()? else {
            trace!(stage = inner.source.name(), "start after shutdown ignored");
            return Ok(());
        };

        let (stop, stopped) = channel::bounded(0);
        let weak = Arc::downgrade(inner);
        let period = inner.source.period();
        let handle = thread::Builder::new()
            .name(format!("{}-timer", inner.source.name()))
            .spawn(move || run_timer(weak, period, stopped))
            .map_err(ModuleError::Spawn)?;

        *inner.timer.lock() = Some(Timer { stop, handle });
        active.mark_started();
        info!(stage = inner.source.name(), ?period, "source started");
        Ok(())
    }

    /// Produce and post one item now, exactly as a timer tick would
    pub fn trigger(&self) {
        self.inner.tick();
    }

    /// Make the source terminal and dispose of its timer
    pub fn shutdown(&self) -> Result<()> {
        let inner = &self.inner;
        if let Err(err) = inner.latch.shut_down() {
            error!(stage = inner.source.name(), "source shut down twice");
            return Err(err);
        }

        let timer = inner.timer.lock().take();
        if let Some(Timer { stop, handle }) = timer {
            drop(stop);
            // A host may call shutdown from inside a tick on the timer thread.
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!(stage = inner.source.name(), "timer thread panicked");
            }
        }
        info!(stage = inner.source.name(), "source shut down");
        Ok(())
    }
}

impl<S: Source> SourceInner<S> {
    fn tick(&self) {
        // The timer may fire after shutdown but before it is disposed.
        let Some(active) = self.latch.enter() else {
            trace!(stage = self.source.name(), "tick after shutdown ignored");
            return;
        };

        match self.source.produce() {
            Ok(item) => {
                if active.is_shut_down() {
                    return;
                }
                let name = self.source.name().to_owned();
                let hook = AcceptHook::new(move || {
                    trace!(stage = %name, "produced item accepted downstream");
                });
                debug!(stage = self.source.name(), "posting produced item");
                self.metrics.record_posted(1);
                self.host.post_output(Batch::single(item), Some(hook));
            }
            Err(err) => {
                warn!(stage = self.source.name(), error = %err, "failed to produce item");
                self.metrics.record_error();
                self.host.notify_error(ErrorSeverity::Warning, &err);
            }
        }
    }
}

fn run_timer<S: Source>(source: Weak<SourceInner<S>>, period: Duration, stopped: Receiver<()>) {
    let ticker = channel::tick(period);
    loop {
        match source.upgrade() {
            Some(inner) => inner.tick(),
            None => break,
        }
        select! {
            recv(stopped) -> _ => break,
            recv(ticker) -> _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RecordingHost;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    struct Counter {
        produced: AtomicUsize,
        period: Duration,
    }

    impl Source for Counter {
        fn produce(&self) -> Result<DataItem> {
            let n = self.produced.fetch_add(1, Ordering::SeqCst);
            Ok(DataItem::sample(n.to_string()))
        }

        fn period(&self) -> Duration {
            self.period
        }
    }

    fn counter(period: Duration) -> Counter {
        Counter {
            produced: AtomicUsize::new(0),
            period,
        }
    }

    #[test]
    fn test_trigger_posts_with_hook() {
        let host = Arc::new(RecordingHost::new());
        let runner = SourceRunner::new(counter(Duration::from_secs(60)), host.clone());
        runner.trigger();
        assert_eq!(host.posted(), vec![Batch::single(DataItem::sample("0"))]);
        assert_eq!(host.pending_hooks(), 1);
        assert!(host.accept_next());
        assert_eq!(host.requests(), 0);
    }

    #[test]
    fn test_trigger_after_shutdown_is_noop() {
        let host = Arc::new(RecordingHost::new());
        let runner = SourceRunner::new(counter(Duration::from_secs(60)), host.clone());
        runner.shutdown().unwrap();
        runner.trigger();
        assert!(host.calls().is_empty());
        assert_eq!(runner.source().produced.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_timer_fires_on_start_and_stops_on_shutdown() {
        let host = Arc::new(RecordingHost::auto_accepting());
        let runner = SourceRunner::new(counter(Duration::from_millis(10)), host.clone());
        runner.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while host.posted().len() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        runner.shutdown().unwrap();
        let after_shutdown = host.posted().len();
        assert!(after_shutdown >= 3);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(host.posted().len(), after_shutdown);
        assert!(matches!(
            runner.shutdown(),
            Err(ModuleError::AlreadyShutdown)
        ));
    }

    #[test]
    fn test_started_only_once_timer_is_armed() {
        let host = Arc::new(RecordingHost::auto_accepting());
        let runner = SourceRunner::new(counter(Duration::from_secs(60)), host.clone());
        assert_eq!(runner.lifecycle(), Lifecycle::Created);
        runner.start().unwrap();
        assert_eq!(runner.lifecycle(), Lifecycle::Started);
        assert!(runner.inner.timer.lock().is_some());
        assert!(matches!(runner.start(), Err(ModuleError::AlreadyStarted)));
        runner.shutdown().unwrap();
    }
}
