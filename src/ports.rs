//! Collaborators the engine talks to but does not own.
//!
//! The engine reads the page through [`Document`], fetches recordings from a
//! [`RecordingSource`], renders guidance through a [`Presenter`] and hands
//! snapshots of its state to a [`PlaybackStore`].

use crate::dom::{Document, NodeId};
use crate::engine::PlaybackState;
use crate::recording::{Recording, RecordingSummary, Step};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Where recordings come from.
#[async_trait]
pub trait RecordingSource: Send + Sync {
    async fn recording(&self, id: &str) -> Result<Recording>;

    async fn recordings(&self) -> Result<Vec<RecordingSummary>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A one-line message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Choices offered when a step's target cannot be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Retry,
    Skip,
    Abort,
}

impl fmt::Display for Recovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Retry => "retry",
            Self::Skip => "skip",
            Self::Abort => "abort",
        })
    }
}

/// Renders guidance. Owns every visual the engine asks for.
pub trait Presenter: Send + Sync {
    /// Point the cursor, highlight and popup at `target`.
    fn show_step(&self, step: &Step, target: NodeId, revisit: bool);

    fn notify(&self, notice: Notice);

    /// Tell the user the next step lives on another page.
    fn redirect(&self, url: &str, message: &str);

    fn offer_recovery(&self, step: &Step, choices: &[Recovery]);

    /// Remove guidance visuals. Called on every step change and terminal transition.
    fn cleanup(&self, keep_cursor: bool, keep_notifications: bool);
}

/// Persists playback across reloads.
///
/// The engine only hands over copies; it never assumes a write landed.
pub trait PlaybackStore: Send + Sync {
    fn restore(&self) -> Option<PlaybackState>;

    fn save(&self, state: &PlaybackState);

    /// Coalesce frequent writes. `immediate` flushes now.
    fn save_debounced(&self, state: &PlaybackState, immediate: bool);

    fn clear(&self);

    fn set_session_active(&self);

    fn is_session_active(&self) -> bool;

    fn clear_session(&self);
}

/// Everything an [`Engine`](crate::Engine) needs from its host.
#[derive(Clone)]
pub struct Collaborators {
    pub document: Arc<dyn Document>,
    pub source: Arc<dyn RecordingSource>,
    pub presenter: Arc<dyn Presenter>,
    pub store: Arc<dyn PlaybackStore>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Recordings held in memory.
#[derive(Debug, Default)]
pub struct MemorySource {
    recordings: Mutex<BTreeMap<String, Recording>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(recordings: impl IntoIterator<Item = Recording>) -> Self {
        let source = Self::new();
        for r in recordings {
            source.insert(r);
        }
        source
    }

    pub fn insert(&self, recording: Recording) {
        lock(&self.recordings).insert(recording.id.clone(), recording);
    }
}

#[async_trait]
impl RecordingSource for MemorySource {
    async fn recording(&self, id: &str) -> Result<Recording> {
        lock(&self.recordings)
            .get(id)
            .cloned()
            .ok_or_else(|| Error::RecordingNotFound(id.to_string()))
    }

    async fn recordings(&self) -> Result<Vec<RecordingSummary>> {
        Ok(lock(&self.recordings).values().map(Recording::summary).collect())
    }
}

const RECORDING_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

/// One recording per file in a directory, named `<id>.json`, `.yaml` or `.yml`.
#[derive(Debug, Clone)]
pub struct DirSource {
    dir: PathBuf,
}

impl DirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read(path: &Path) -> Result<Recording> {
        let content = tokio::fs::read_to_string(path).await?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if ext.eq_ignore_ascii_case("json") {
            Recording::parse_json(&content)
        } else {
            Recording::parse_yaml(&content)
        }
    }
}

#[async_trait]
impl RecordingSource for DirSource {
    async fn recording(&self, id: &str) -> Result<Recording> {
        if id.is_empty() || id.contains(&['/', '\\'][..]) || id.starts_with('.') {
            return Err(Error::RecordingNotFound(id.to_string()));
        }
        for ext in RECORDING_EXTENSIONS {
            let path = self.dir.join(format!("{}.{}", id, ext));
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                continue;
            }
            debug!("Loading recording {}", path.display());
            let recording = Self::read(&path).await?;
            if recording.id != id {
                return Err(Error::InvalidRecording(format!(
                    "{} declares id '{}'",
                    path.display(),
                    recording.id
                )));
            }
            return Ok(recording);
        }
        Err(Error::RecordingNotFound(id.to_string()))
    }

    async fn recordings(&self) -> Result<Vec<RecordingSummary>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let known = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| RECORDING_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)));
            if !known {
                continue;
            }
            match Self::read(&path).await {
                Ok(r) => out.push(r.summary()),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }
}

/// Keeps the last saved state in memory. Debounced saves are written through.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Option<PlaybackState>>,
    session: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `state` in an active session, as after a reload.
    pub fn with_state(state: PlaybackState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            session: Mutex::new(true),
        }
    }

    /// The last saved state.
    pub fn saved(&self) -> Option<PlaybackState> {
        lock(&self.state).clone()
    }
}

impl PlaybackStore for MemoryStore {
    fn restore(&self) -> Option<PlaybackState> {
        lock(&self.state).clone()
    }

    fn save(&self, state: &PlaybackState) {
        *lock(&self.state) = Some(state.clone());
    }

    fn save_debounced(&self, state: &PlaybackState, _immediate: bool) {
        self.save(state);
    }

    fn clear(&self) {
        *lock(&self.state) = None;
    }

    fn set_session_active(&self) {
        *lock(&self.session) = true;
    }

    fn is_session_active(&self) -> bool {
        *lock(&self.session)
    }

    fn clear_session(&self) {
        *lock(&self.session) = false;
    }
}

/// Renders guidance as log lines. Used by the CLI and headless hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPresenter;

impl Presenter for TracingPresenter {
    fn show_step(&self, step: &Step, target: NodeId, revisit: bool) {
        if revisit {
            info!("[step {}] (done) {} -> {}", step.position, step.annotation, target);
        } else {
            info!("[step {}] {} -> {}", step.position, step.annotation, target);
        }
    }

    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info | NoticeLevel::Success => info!("{}", notice),
            NoticeLevel::Warning => warn!("{}", notice),
            NoticeLevel::Error => error!("{}", notice),
        }
    }

    fn redirect(&self, url: &str, message: &str) {
        info!("{} ({})", message, url);
    }

    fn offer_recovery(&self, step: &Step, choices: &[Recovery]) {
        let names: Vec<String> = choices.iter().map(|c| c.to_string()).collect();
        warn!(
            "[step {}] target not found; choose: {}",
            step.position,
            names.join(" / ")
        );
    }

    fn cleanup(&self, keep_cursor: bool, keep_notifications: bool) {
        debug!(
            "cleanup (keep_cursor={}, keep_notifications={})",
            keep_cursor, keep_notifications
        );
    }
}
