//! # eoka-guide
//!
//! Guided-tour playback. Takes a recorded sequence of interactions, finds the
//! matching elements in the page as it is rendered *now*, and walks the user
//! through them one step at a time, checking that each step was really done.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use eoka_guide::{
//!     Collaborators, DirSource, Engine, EngineConfig, MemoryDocument, MemoryStore, Snapshot,
//!     TracingPresenter,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> eoka_guide::Result<()> {
//! let snapshot = Snapshot::load("page.json")?;
//! let document = Arc::new(MemoryDocument::from_snapshot(snapshot));
//! let engine = Engine::new(
//!     Collaborators {
//!         document: document.clone(),
//!         source: Arc::new(DirSource::new("recordings")),
//!         presenter: Arc::new(TracingPresenter),
//!         store: Arc::new(MemoryStore::new()),
//!     },
//!     EngineConfig::default(),
//! );
//! let outcome = engine.start("onboarding").await;
//! println!("{}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod dom;
pub mod engine;
pub mod location;
pub mod ports;
pub mod recording;
pub mod resolve;

pub use config::{EngineConfig, TieBreak};
pub use dom::{Document, Locator, MemoryDocument, NodeId, Rect, Snapshot, SnapshotNode, Viewport};
pub use engine::{
    Engine, EventKind, InteractionEvent, NavigationKind, Outcome, Phase, PlaybackState,
    StopReason, WatchHandle,
};
pub use location::Location;
pub use ports::{
    Collaborators, DirSource, MemorySource, MemoryStore, Notice, NoticeLevel, PlaybackStore,
    Presenter, RecordingSource, Recovery, TracingPresenter,
};
pub use recording::{
    Action, Interaction, LoadedRecording, PageInfo, Recording, RecordingSummary, Step,
};
pub use resolve::{Candidate, Mode, Resolver, Validator};

/// Result type for eoka-guide operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading recordings, configs and snapshots.
///
/// Playback itself never returns these; engine entry points report an
/// [`Outcome`] instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("invalid recording: {0}")]
    InvalidRecording(String),

    #[error("recording not found: {0}")]
    RecordingNotFound(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("invalid locator: {0}")]
    Locator(String),
}
