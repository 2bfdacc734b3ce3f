//! Watches a scratch folder and logs its size to a report file.
//!
//! event source -> folder probe -> append string -> write items to file
//!
//! Run with `RUST_LOG=debug cargo run --example folder_report` to see the
//! protocol traffic.

use pipeline_modules::{
    AcceptHook, AckCallback, AppendString, Batch, ErrorSeverity, EventSource, FolderSizeProbe,
    ModuleError, ModuleHost, Stage, StageRunner, WriteItemsToFile,
};
use pipeline_modules::config::{EventSourceConfig, FolderSizeConfig, WriteItemsConfig};
use pipeline_modules::SourceRunner;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Hands every post of one stage straight to the next one. The acceptance hook
/// fires when the downstream stage completes the delivery.
struct Link<S: Stage> {
    name: &'static str,
    next: OnceLock<StageRunner<S>>,
}

impl<S: Stage> Link<S> {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            next: OnceLock::new(),
        })
    }

    fn connect(&self, next: StageRunner<S>) {
        if self.next.set(next).is_err() {
            warn!(link = self.name, "link already connected");
        }
    }
}

impl<S: Stage> ModuleHost for Link<S> {
    fn request_next(&self) {}

    fn post_output(&self, batch: Batch, on_accepted: Option<AcceptHook>) {
        let Some(next) = self.next.get() else {
            warn!(link = self.name, "post on unconnected link dropped");
            return;
        };
        let (accepted, completed) = match on_accepted {
            Some(hook) => (
                Some(AckCallback::from_fn(|| {})),
                Some(AckCallback::from_fn(move || hook.accept())),
            ),
            None => (None, None),
        };
        if let Err(err) = next.on_data(batch, accepted, completed) {
            warn!(link = self.name, error = %err, "downstream stage failed");
        }
    }

    fn notify_dropped(&self, count: usize) {
        warn!(link = self.name, count, "items dropped");
    }

    fn notify_error(&self, severity: ErrorSeverity, error: &ModuleError) {
        warn!(link = self.name, ?severity, %error, "stage reported error");
    }
}

fn main() -> pipeline_modules::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let scratch = tempfile::tempdir()?;
    let watched = scratch.path().join("watched");
    std::fs::create_dir(&watched)?;
    let report = scratch.path().join("report.log");

    let sink = StageRunner::new(
        WriteItemsToFile::new(WriteItemsConfig {
            file_name: report.clone(),
        })?,
        Link::<WriteItemsToFile>::new("sink"),
    );

    let to_sink = Link::new("append->sink");
    to_sink.connect(sink.clone());
    let append = StageRunner::new(
        AppendString::from_config(r#"string_to_append = " (watched)""#)?.into_stage(),
        to_sink,
    );

    let to_append = Link::new("probe->append");
    to_append.connect(append.clone());
    let probe = StageRunner::new(
        FolderSizeProbe::new(FolderSizeConfig {
            folder_name: watched.clone(),
        })?,
        to_append,
    );

    let to_probe = Link::new("source->probe");
    to_probe.connect(probe.clone());
    let source = SourceRunner::new(
        EventSource::new(EventSourceConfig {
            timer_frequency: 1,
            managed_entity_id: Uuid::new_v4(),
        })?
        .with_period(Duration::from_millis(100)),
        to_probe,
    );

    sink.start()?;
    append.start()?;
    probe.start()?;
    source.start()?;

    for i in 0..5u8 {
        std::fs::write(watched.join(format!("file-{}.bin", i)), vec![i; 256])?;
        std::thread::sleep(Duration::from_millis(120));
    }

    source.shutdown()?;
    probe.shutdown()?;
    append.shutdown()?;
    sink.shutdown()?;

    info!(
        probe = %probe.metrics().snapshot().format(),
        sink = %sink.metrics().snapshot().format(),
        "pipeline stopped"
    );
    println!("{}", std::fs::read_to_string(&report)?);
    Ok(())
}
