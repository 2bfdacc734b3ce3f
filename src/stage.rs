use crate::ack::{AcceptHook, AckCallback, Obligation};
use crate::error::{MalformedItem, ModuleError, Result};
use crate::host::{ErrorSeverity, ModuleHost};
use crate::item::{Batch, DataItem};
use crate::metrics::StageMetrics;
use crate::shutdown::{Active, Lifecycle, ShutdownLatch};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// What the runner does with a batch once the stage has handled it
#[derive(Debug)]
pub enum Disposition {
    /// Post downstream. An inbound obligation is fulfilled only after the
    /// downstream side accepts, and only then is the next batch requested.
    Forward(Batch),
    /// The stage's side effect is done: fulfil the inbound obligation, post the
    /// optional notice batch without acknowledgement, request the next batch.
    Complete(Option<Batch>),
    /// Post the notice batch without acknowledgement, then fulfil the inbound
    /// obligation and request the next batch.
    Notify(Batch),
    /// Nothing to forward: fulfil the inbound obligation and request the next batch
    Discard,
    /// A fatal condition was reported to the host. No acknowledgement, no request.
    Halt,
}

/// Trait for a processing stage that receives batches from the host
pub trait Stage: Send + Sync + 'static {
    /// Handle one delivered batch. Per-item failures are reported through `cx`
    /// and never escape; an `Err` is a stage-level failure for the host.
    fn handle(&self, batch: Batch, cx: &StageContext<'_>) -> Result<Disposition>;

    /// Get a human-readable name for this stage
    fn name(&self) -> &str {
        "stage"
    }
}

/// Host access for a stage while it handles a batch
pub struct StageContext<'a> {
    name: &'a str,
    host: &'a dyn ModuleHost,
    metrics: &'a StageMetrics,
}

impl<'a> StageContext<'a> {
    pub fn new(name: &'a str, host: &'a dyn ModuleHost, metrics: &'a StageMetrics) -> Self {
        Self {
            name,
            host,
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// Tell the host `count` items were discarded
    pub fn drop_items(&self, count: usize, reason: &MalformedItem) {
        warn!(stage = self.name, count, %reason, "dropping malformed data items");
        self.metrics.record_dropped(count);
        self.host.notify_dropped(count);
    }

    /// Report a condition to the host without unwinding
    pub fn report(&self, severity: ErrorSeverity, err: &ModuleError) {
        match severity {
            ErrorSeverity::FatalError => {
                error!(stage = self.name, ?severity, error = %err, "reporting error to host")
            }
            ErrorSeverity::Warning | ErrorSeverity::DataLoss => {
                warn!(stage = self.name, ?severity, error = %err, "reporting error to host")
            }
        }
        self.metrics.record_error();
        self.host.notify_error(severity, err);
    }

    /// Apply `f` to every item in order.
    ///
    /// A failed item in a logical set drops the whole set (the host hears about
    /// every item of it) and yields `None`. Otherwise failed items are dropped
    /// one at a time and the survivors keep their relative order.
    pub fn collect<T, F>(&self, batch: &Batch, mut f: F) -> Option<Vec<T>>
    where
        F: FnMut(&DataItem) -> std::result::Result<T, MalformedItem>,
    {
        let mut out = Vec::with_capacity(batch.len());
        for item in batch {
            match f(item) {
                Ok(value) => out.push(value),
                Err(reason) if batch.is_logical_set() => {
                    self.drop_items(batch.len(), &reason);
                    return None;
                }
                Err(reason) => self.drop_items(1, &reason),
            }
        }
        Some(out)
    }
}

/// Drives one stage instance through the pull/push protocol.
///
/// Clones share the same stage, lock and metrics.
pub struct StageRunner<S: Stage> {
    inner: Arc<Inner<S>>,
}

struct Inner<S> {
    stage: S,
    host: Arc<dyn ModuleHost>,
    latch: ShutdownLatch,
    metrics: StageMetrics,
}

impl<S: Stage> Clone for StageRunner<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Stage> StageRunner<S> {
    /// Create a new stage runner
    pub fn new(stage: S, host: Arc<dyn ModuleHost>) -> Self {
        Self {
            inner: Arc::new(Inner {
                stage,
                host,
                latch: ShutdownLatch::new(),
                metrics: StageMetrics::new(),
            }),
        }
    }

    pub fn stage(&self) -> &S {
        &self.inner.stage
    }

    /// Get a reference to the metrics
    pub fn metrics(&self) -> &StageMetrics {
        &self.inner.metrics
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.latch.lifecycle()
    }

    /// Issue the first pull. A no-op once shut down.
    pub fn start(&self) -> Result<()> {
        let inner = &self.inner;
        let Some(active) = inner.latch.start()? else {
            trace!(stage = inner.stage.name(), "start after shutdown ignored");
            return Ok(());
        };
        info!(stage = inner.stage.name(), "stage started");
        inner.request_next(&active);
        Ok(())
    }

    /// Make the stage terminal. Obligations still in flight are abandoned.
    pub fn shutdown(&self) -> Result<()> {
        let inner = &self.inner;
        if let Err(err) = inner.latch.shut_down() {
            error!(stage = inner.stage.name(), "stage shut down twice");
            return Err(err);
        }
        info!(stage = inner.stage.name(), "stage shut down");
        Ok(())
    }

    /// Deliver a batch. `accepted` and `completed` must be both present or
    /// both absent.
    pub fn on_data(
        &self,
        batch: Batch,
        accepted: Option<AckCallback>,
        completed: Option<AckCallback>,
    ) -> Result<()> {
        let inner = &self.inner;
        let name = inner.stage.name();
        let obligation = match Obligation::pair(accepted, completed) {
            Ok(obligation) => obligation,
            Err(err) => {
                error!(stage = name, error = %err, "rejecting delivery");
                return Err(err);
            }
        };

        let Some(active) = inner.latch.enter() else {
            trace!(stage = name, "delivery after shutdown ignored");
            return Ok(());
        };

        let started = Instant::now();
        inner.metrics.record_batch();
        debug!(
            stage = name,
            items = batch.len(),
            logical_set = batch.is_logical_set(),
            ack = obligation.is_some(),
            "batch received"
        );

        let cx = StageContext::new(name, &*inner.host, &inner.metrics);
        let disposition = match inner.stage.handle(batch, &cx) {
            Ok(disposition) => disposition,
            Err(err) => {
                inner.metrics.record_error();
                error!(stage = name, error = %err, "batch handling failed");
                return Err(err);
            }
        };

        match disposition {
            Disposition::Forward(output) if !output.is_empty() => match obligation {
                Some(obligation) => {
                    let hook = inner.chain(obligation);
                    inner.post(&active, output, Some(hook));
                }
                None => {
                    inner.post(&active, output, None);
                    inner.request_next(&active);
                }
            },
            Disposition::Forward(_) | Disposition::Discard => {
                inner.fulfil(&active, obligation);
                inner.request_next(&active);
            }
            Disposition::Complete(notice) => {
                inner.fulfil(&active, obligation);
                if let Some(notice) = notice {
                    inner.post(&active, notice, None);
                }
                inner.request_next(&active);
            }
            Disposition::Notify(notice) => {
                inner.post(&active, notice, None);
                inner.fulfil(&active, obligation);
                inner.request_next(&active);
            }
            Disposition::Halt => {
                warn!(stage = name, "stage halted, awaiting teardown");
            }
        }

        inner
            .metrics
            .record_latency(started.elapsed().as_nanos() as u64);
        Ok(())
    }
}

impl<S: Stage> Inner<S> {
    /// Hook that fulfils `obligation` once downstream has accepted our output
    fn chain(self: &Arc<Self>, obligation: Obligation) -> AcceptHook {
        let weak = Arc::downgrade(self);
        AcceptHook::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.downstream_accepted(obligation);
            }
        })
    }

    fn downstream_accepted(&self, obligation: Obligation) {
        let Some(active) = self.latch.enter() else {
            debug!(
                stage = self.stage.name(),
                "downstream accepted after shutdown, obligation abandoned"
            );
            return;
        };
        self.fulfil(&active, Some(obligation));
        self.request_next(&active);
    }

    fn fulfil(&self, active: &Active<'_>, obligation: Option<Obligation>) {
        if active.is_shut_down() {
            if obligation.is_some() {
                debug!(stage = self.stage.name(), "shut down while handling, obligation abandoned");
            }
            return;
        }
        if let Some(obligation) = obligation {
            obligation.fulfil();
            self.metrics.record_fulfilled();
            debug!(stage = self.stage.name(), "inbound batch acknowledged");
        }
    }

    fn post(&self, active: &Active<'_>, batch: Batch, hook: Option<AcceptHook>) {
        if active.is_shut_down() {
            return;
        }
        debug!(
            stage = self.stage.name(),
            items = batch.len(),
            hooked = hook.is_some(),
            "posting output"
        );
        self.metrics.record_posted(batch.len());
        self.host.post_output(batch, hook);
    }

    fn request_next(&self, active: &Active<'_>) {
        if active.is_shut_down() {
            trace!(stage = self.stage.name(), "shut down while handling, not requesting");
            return;
        }
        debug!(stage = self.stage.name(), "requesting next batch");
        self.metrics.record_request();
        self.host.request_next();
    }
}

/// Single-item operation of a transforming stage
pub trait ItemTransform: Send + Sync + 'static {
    /// Build a new output item from `item`, or say why it must be dropped
    fn transform(&self, item: &DataItem) -> std::result::Result<DataItem, MalformedItem>;

    fn name(&self) -> &str {
        "transform"
    }
}

/// A stage that maps every item and forwards the survivors downstream
pub struct TransformStage<T> {
    transform: T,
}

impl<T: ItemTransform> TransformStage<T> {
    pub fn new(transform: T) -> Self {
        Self { transform }
    }

    pub fn transform(&self) -> &T {
        &self.transform
    }
}

impl<T: ItemTransform> Stage for TransformStage<T> {
    fn handle(&self, batch: Batch, cx: &StageContext<'_>) -> Result<Disposition> {
        let transform = &self.transform;
        Ok(match cx.collect(&batch, |item| transform.transform(item)) {
            Some(items) => Disposition::Forward(batch.with_items(items)),
            None => Disposition::Discard,
        })
    }

    fn name(&self) -> &str {
        self.transform.name()
    }
}

/// An item transform built from a closure
pub struct MapTransform<F> {
    name: String,
    mapper: F,
}

impl<F> MapTransform<F>
where
    F: Fn(&DataItem) -> std::result::Result<DataItem, MalformedItem> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, mapper: F) -> Self {
        Self {
            name: name.into(),
            mapper,
        }
    }
}

impl<F> ItemTransform for MapTransform<F>
where
    F: Fn(&DataItem) -> std::result::Result<DataItem, MalformedItem> + Send + Sync + 'static,
{
    fn transform(&self, item: &DataItem) -> std::result::Result<DataItem, MalformedItem> {
        (self.mapper)(item)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
