//! Pipeline stages for a monitoring host, built on one pull-based protocol.
//!
//! Every stage is driven by its host through three mutually exclusive entry
//! points: `start`, a batch delivery and `shutdown`. A stage asks for exactly
//! one batch at a time. When the upstream caller wants an acknowledgement, the
//! stage forwards it only after its own output has been accepted downstream,
//! and only then asks for the next batch.
//!
//! # Features
//!
//! - Chained accepted/completed acknowledgements with end-to-end backpressure
//! - Logical sets that are forwarded or dropped as a whole
//! - A re-entrant per-stage lock so shutdown never races delivery or acknowledgement
//! - Timer-driven sources that honour shutdown between ticks
//! - Per-stage metrics: batches, posts, drops, requests, latency percentiles
//! - TOML stage configuration validated at construction
//!
//! # Example
//!
//! ```ignore
//! use pipeline_modules::{AppendString, Batch, DataItem, RecordingHost, StageRunner};
//! use std::sync::Arc;
//!
//! let host = Arc::new(RecordingHost::new());
//! let stage = AppendString::from_config(r#"string_to_append = "!!""#)?.into_stage();
//! let runner = StageRunner::new(stage, host.clone());
//!
//! runner.start()?;
//! runner.on_data(Batch::single(DataItem::sample("hi")), None, None)?;
//! runner.shutdown()?;
//! ```

pub mod ack;
pub mod config;
pub mod error;
pub mod host;
pub mod item;
pub mod metrics;
pub mod modules;
pub mod shutdown;
pub mod source;
pub mod stage;

// Re-exports for convenience
pub use ack::{AcceptHook, AckCallback, AckState, Obligation};
pub use error::{FailureClass, MalformedItem, ModuleError, Result};
pub use host::{ErrorSeverity, HostCall, ModuleHost, RecordingHost};
pub use item::{Batch, DataItem, EventRecord, EVENT_DATA, SAMPLE_DATA};
pub use metrics::{MetricsSnapshot, StageMetrics};
pub use modules::{
    AppendString, AppendStringStage, EventSource, FolderSizeProbe, WriteItemsToFile,
    WriteStringToFile,
};
pub use shutdown::{Lifecycle, ShutdownLatch};
pub use source::{Source, SourceRunner};
pub use stage::{
    Disposition, ItemTransform, MapTransform, Stage, StageContext, StageRunner, TransformStage,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
