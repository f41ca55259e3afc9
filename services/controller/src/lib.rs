//! kube-start-stop schedule controller library.
//!
//! The controller scales workloads up and down on a weekly calendar. Each
//! Schedule declares items of the form "between Friday 20:10 and Monday 10:10
//! run `web` with 1 replica"; whenever a window is active the controller sets
//! the target's replica count.
//!
//! ## Architecture
//!
//! ```text
//! ScheduleSource ──► Informer ──► ScheduleCache
//!                        │              ▲
//!                   WatchEvent          │ get
//!                        ▼              │
//!                   Controller ──► WorkQueue ──► workers ──► ScheduleReconciler ──► Scaler
//! ```
//!
//! ## Modules
//!
//! - `cache`: local Schedule index read by the reconciler
//! - `informer`: list-and-diff loop producing typed watch events
//! - `manifest`: Schedule manifests on disk
//! - `reconciler`: per-Schedule window evaluation and scaling
//! - `controller`: worker pool, event pump and resync
//! - `scale`: scale subresource client and in-memory scaler
//! - `recorder`: event recording

pub mod cache;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod informer;
pub mod manifest;
pub mod reconciler;
pub mod recorder;
pub mod scale;

pub use cache::{ScheduleCache, ScheduleLister};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use controller::{Controller, ControllerConfig};
pub use error::ReconcileError;
pub use informer::{Informer, ScheduleSource, StaticSource, WatchEvent};
pub use manifest::{
    load_manifests, load_schedules, parse_manifest, InvalidObject, Manifest, ManifestSource,
};
pub use reconciler::{ReconcileOutcome, ScheduleReconciler, SyncReport};
pub use recorder::{EventKind, MemoryRecorder, RecordedEvent, Recorder, TracingRecorder};
pub use scale::{InMemoryScaler, KubeScaleClient, ScaleCall, ScaleError, Scaler};
