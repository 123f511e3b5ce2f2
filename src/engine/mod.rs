//! Step scheduling and playback.
//!
//! [`Engine`] owns the playback state and decides which step is active. It
//! binds each step to a live node through the resolver and validator, waits
//! for the user to act on it and follows the user across pages.
//!
//! Async entry points may overlap. Each top-level operation (start, restore,
//! retry, skip, stop) mints an [`OperationToken`]; continuations re-check
//! their token after every await and give up quietly with
//! [`Outcome::Superseded`] when a newer operation has started.

mod completion;
mod navigation;
mod state;
mod token;
mod watch;

pub use completion::{EventKind, InteractionEvent, NavigationKind};
pub use state::{Outcome, Phase, PlaybackState, StopReason};
pub use token::OperationToken;
pub use watch::WatchHandle;

use crate::config::EngineConfig;
use crate::dom::{Document, NodeId};
use crate::ports::{Collaborators, Notice, NoticeLevel, Recovery};
use crate::recording::{LoadedRecording, RecordingSummary};
use crate::resolve::{Mode, Resolver, ValidationCache, Validator};
use crate::Result;
use navigation::{step_url, Plan};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use token::Generation;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use watch::RateLimit;

const RECOVERY_CHOICES: &[Recovery] = &[Recovery::Retry, Recovery::Skip, Recovery::Abort];

#[derive(Debug, Clone, Copy)]
struct Binding {
    index: usize,
    node: NodeId,
    revisit: bool,
}

struct Inner {
    generation: Generation,
    phase: Phase,
    state: PlaybackState,
    recording: Option<Arc<LoadedRecording>>,
    binding: Option<Binding>,
    /// Step whose target was not found, waiting for retry/skip/abort.
    pending_recovery: Option<usize>,
    /// Step whose target was absent because it leads elsewhere. Arriving
    /// where it leads completes it.
    expecting_navigation: Option<usize>,
    cache: ValidationCache,
    previous_target: Option<NodeId>,
    checks: RateLimit,
    invalidating: bool,
    navigating: bool,
    watch: Option<WatchHandle>,
}

impl Inner {
    fn unbind(&mut self) {
        self.binding = None;
        self.watch = None;
    }

    fn reset_pending(&mut self) {
        self.pending_recovery = None;
        self.expecting_navigation = None;
    }
}

struct Shared {
    ports: Collaborators,
    config: EngineConfig,
    inner: Mutex<Inner>,
}

/// Guided playback engine.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

/// Holds the navigation in-flight flag; clears it on drop.
struct NavigationGuard<'a> {
    engine: &'a Engine,
}

impl<'a> NavigationGuard<'a> {
    fn acquire(engine: &'a Engine) -> Option<Self> {
        let mut inner = engine.lock();
        if inner.navigating {
            return None;
        }
        inner.navigating = true;
        Some(Self { engine })
    }
}

impl Drop for NavigationGuard<'_> {
    fn drop(&mut self) {
        self.engine.lock().navigating = false;
    }
}

impl Engine {
    pub fn new(ports: Collaborators, config: EngineConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!("{}, zero intervals run at 1ms", e);
        }
        let checks = RateLimit::new(config.check_interval());
        Self {
            shared: Arc::new(Shared {
                ports,
                config,
                inner: Mutex::new(Inner {
                    generation: Generation::default(),
                    phase: Phase::Idle,
                    state: PlaybackState::default(),
                    recording: None,
                    binding: None,
                    pending_recovery: None,
                    expecting_navigation: None,
                    cache: ValidationCache::new(),
                    previous_target: None,
                    checks,
                    invalidating: false,
                    navigating: false,
                    watch: None,
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_current(&self, token: OperationToken) -> bool {
        self.lock().generation.is_current(token)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase.clone()
    }

    /// Copy of the playback state.
    pub fn state(&self) -> PlaybackState {
        self.lock().state.clone()
    }

    /// Node the active step is bound to.
    pub fn bound_target(&self) -> Option<NodeId> {
        self.lock().binding.map(|b| b.node)
    }

    pub fn recording(&self) -> Option<Arc<LoadedRecording>> {
        self.lock().recording.clone()
    }

    pub fn current_token(&self) -> OperationToken {
        self.lock().generation.current()
    }

    pub async fn list(&self) -> Result<Vec<RecordingSummary>> {
        self.shared.ports.source.recordings().await
    }

    /// Start a guide from its first step.
    ///
    /// If the first step lives on another page the user is redirected and
    /// the step activates on arrival.
    pub async fn start(&self, recording_id: &str) -> Outcome {
        let token = {
            let mut inner = self.lock();
            let token = inner.generation.mint();
            inner.unbind();
            inner.reset_pending();
            inner.invalidating = false;
            inner.previous_target = None;
            inner.recording = None;
            inner.state = PlaybackState::default();
            inner.phase = Phase::Resolving;
            token
        };
        self.shared.ports.presenter.cleanup(false, false);
        info!("Starting guide '{}' ({})", recording_id, token);

        let fetched = self.shared.ports.source.recording(recording_id).await;
        if !self.is_current(token) {
            debug!("{} superseded while fetching '{}'", token, recording_id);
            return Outcome::Superseded;
        }
        let recording = match fetched {
            Ok(r) => Arc::new(LoadedRecording::new(r)),
            Err(e) => return self.halt(token, StopReason::FetchFailed(e.to_string())),
        };

        let state = {
            let mut inner = self.lock();
            if !inner.generation.is_current(token) {
                return Outcome::Superseded;
            }
            inner.state = PlaybackState::started(recording.id());
            inner.recording = Some(recording.clone());
            inner.state.clone()
        };
        let store = &self.shared.ports.store;
        store.set_session_active();
        store.save(&state);
        debug!("Loaded '{}' with {} steps", recording.id(), recording.len());

        self.proceed(token, None)
    }

    /// Resume after a reload from what the store kept.
    pub async fn restore(&self) -> Outcome {
        let store = &self.shared.ports.store;
        if !store.is_session_active() {
            return Outcome::Ignored;
        }
        let Some(saved) = store.restore() else {
            return Outcome::Ignored;
        };
        let Some(id) = saved.recording_id.clone().filter(|_| saved.is_playing) else {
            return Outcome::Ignored;
        };

        let token = {
            let mut inner = self.lock();
            let token = inner.generation.mint();
            inner.unbind();
            inner.reset_pending();
            inner.invalidating = false;
            inner.recording = None;
            inner.phase = Phase::Resolving;
            token
        };
        info!("Restoring guide '{}' ({})", id, token);

        let fetched = self.shared.ports.source.recording(&id).await;
        if !self.is_current(token) {
            debug!("{} superseded while restoring '{}'", token, id);
            return Outcome::Superseded;
        }
        let recording = match fetched {
            Ok(r) => Arc::new(LoadedRecording::new(r)),
            Err(e) => return self.halt(token, StopReason::FetchFailed(e.to_string())),
        };

        {
            let mut inner = self.lock();
            if !inner.generation.is_current(token) {
                return Outcome::Superseded;
            }
            let mut state = saved;
            state.is_playing = true;
            state.current_step = state.current_step.filter(|i| *i < recording.len());
            state.touch();
            inner.state = state;
            inner.recording = Some(recording);
        }
        self.persist(true);
        self.handle_navigation(token)
    }

    /// Stop playback at the user's request.
    pub fn stop(&self) -> Outcome {
        let token = {
            let mut inner = self.lock();
            if inner.phase == Phase::Idle || inner.phase.is_terminal() {
                return Outcome::Ignored;
            }
            inner.generation.mint()
        };
        self.halt(token, StopReason::Aborted)
    }

    /// Look for the missing target again.
    pub fn retry(&self) -> Outcome {
        let (token, index) = {
            let mut inner = self.lock();
            let Some(index) = inner.pending_recovery else {
                return Outcome::Ignored;
            };
            (inner.generation.mint(), index)
        };
        debug!("Retrying step index {}", index);
        self.activate(token, index, false)
    }

    /// Mark the missing step done and move on.
    pub fn skip(&self) -> Outcome {
        let (token, index) = {
            let mut inner = self.lock();
            let Some(index) = inner.pending_recovery.take() else {
                return Outcome::Ignored;
            };
            let Some(position) = inner
                .recording
                .as_ref()
                .and_then(|r| r.get(index))
                .map(|s| s.position)
            else {
                return Outcome::Ignored;
            };
            inner.state.mark_completed(position);
            info!("Skipped step {}", position);
            (inner.generation.mint(), index)
        };
        self.persist(false);
        self.proceed(token, Some(index))
    }

    /// Give up on the missing step and stop.
    pub fn abort(&self) -> Outcome {
        let token = {
            let mut inner = self.lock();
            if inner.pending_recovery.is_none() {
                return Outcome::Ignored;
            }
            inner.generation.mint()
        };
        self.halt(token, StopReason::Aborted)
    }

    /// History changed: push, replace, back/forward or reload.
    ///
    /// Waits for the page to settle, then decides which step belongs here.
    /// Calls arriving while one is already in flight are dropped; the one in
    /// flight reads the location after settling anyway.
    pub async fn on_navigation(&self, kind: NavigationKind) -> Outcome {
        {
            let inner = self.lock();
            if !inner.state.is_playing || inner.recording.is_none() {
                return Outcome::Ignored;
            }
        }
        let Some(_guard) = NavigationGuard::acquire(self) else {
            debug!("Navigation ({}) already being handled", kind);
            return Outcome::Ignored;
        };
        let token = self.current_token();
        debug!("Navigation ({}), settling", kind);

        settle(self.shared.config.navigation_debounce()).await;
        if !self.is_current(token) {
            debug!("{} superseded during navigation", token);
            return Outcome::Superseded;
        }
        self.handle_navigation(token)
    }

    /// The armed interaction listener.
    pub async fn on_interaction(&self, event: InteractionEvent) -> Outcome {
        let doc = self.shared.ports.document.clone();
        let (token, index, step, before) = {
            let mut inner = self.lock();
            let Some(binding) = inner.binding else {
                return Outcome::Ignored;
            };
            if inner.phase != Phase::AwaitingInteraction {
                return Outcome::Ignored;
            }
            let Some(step) = inner
                .recording
                .as_ref()
                .and_then(|r| r.get(binding.index))
                .cloned()
            else {
                return Outcome::Ignored;
            };
            if !completion::accepts(&step.interaction.action, &event, doc.as_ref(), binding.node) {
                debug!(
                    "{} on {} does not complete step {}",
                    event.kind, event.target, step.position
                );
                return Outcome::Ignored;
            }
            if !inner.state.mark_completed(step.position) {
                debug!("Step {} was already complete", step.position);
            }
            inner.unbind();
            inner.phase = Phase::Advancing;
            (inner.generation.current(), binding.index, step, doc.location())
        };
        info!("Step {} completed", step.position);
        self.persist(false);
        self.shared.ports.presenter.cleanup(true, false);

        settle(self.shared.config.settle_delay()).await;
        if !self.is_current(token) {
            debug!("{} superseded after step {}", token, step.position);
            return Outcome::Superseded;
        }

        let here = doc.location();
        if !here.matches(&before) {
            debug!("Step {} moved the page to {}", step.position, here);
            let Some(_guard) = NavigationGuard::acquire(self) else {
                return Outcome::AwaitingNavigation {
                    url: here.as_str().to_string(),
                };
            };
            return self.handle_navigation(token);
        }
        if step.interaction.action.is_navigation() {
            let url = self
                .recording()
                .and_then(|r| r.get(index + 1).map(step_url))
                .unwrap_or_default();
            return Outcome::AwaitingNavigation { url };
        }
        self.proceed(token, Some(index))
    }

    /// One validation loop frame.
    ///
    /// Rate-limited to the configured check interval. Returns
    /// [`Outcome::Stopped`] on the tick that invalidates the step and
    /// [`Outcome::Ignored`] otherwise.
    pub fn tick(&self, now: Instant) -> Outcome {
        let doc = self.shared.ports.document.clone();
        let (token, node) = {
            let mut inner = self.lock();
            let Some(binding) = inner.binding else {
                return Outcome::Ignored;
            };
            if inner.phase != Phase::AwaitingInteraction || inner.invalidating {
                return Outcome::Ignored;
            }
            if !inner.checks.ready(now) {
                return Outcome::Ignored;
            }

            let valid = if !doc.is_attached(binding.node) {
                false
            } else if watch::near_viewport(doc.as_ref(), binding.node, self.shared.config.viewport_margin_px)
                == Some(true)
            {
                true
            } else {
                match inner.recording.as_ref().and_then(|r| r.get(binding.index)) {
                    Some(step) => Validator::new(doc.as_ref()).validate(
                        binding.node,
                        &step.interaction,
                        Mode::Relaxed,
                    ),
                    None => false,
                }
            };
            if valid {
                return Outcome::Ignored;
            }
            inner.invalidating = true;
            (inner.generation.current(), binding.node)
        };
        warn!("Bound target {} is no longer valid", node);
        self.halt(token, StopReason::Invalidated)
    }

    /// Decide which step belongs on the current page and act on it.
    fn handle_navigation(&self, token: OperationToken) -> Outcome {
        let doc = self.shared.ports.document.clone();
        let here = doc.location();
        let (recording, completed, binding) = {
            let mut inner = self.lock();
            if !inner.generation.is_current(token) {
                return Outcome::Superseded;
            }
            let Some(recording) = inner.recording.clone() else {
                drop(inner);
                return self.halt(token, StopReason::Failed("no recording loaded".into()));
            };
            if let Some(index) = inner.expecting_navigation.take() {
                match recording.get(index) {
                    Some(step) if step.location().matches(&here) => {
                        inner.expecting_navigation = Some(index);
                    }
                    Some(step) if navigation::arrived(recording.steps(), index, &here) => {
                        debug!("Step {} led to {}, counting it done", step.position, here);
                        inner.state.mark_completed(step.position);
                    }
                    Some(step) => {
                        debug!("Left step {} for {} without following it", step.position, here);
                    }
                    None => {}
                }
            }
            (recording, inner.state.completed_steps.clone(), inner.binding)
        };

        match navigation::plan(recording.steps(), &completed, &here) {
            Plan::Activate { index, revisit } => {
                if let Some(b) = binding.filter(|b| b.index == index) {
                    if doc.is_attached(b.node) {
                        debug!("Step index {} already bound to {}", index, b.node);
                        let position = recording.get(index).map_or(0, |s| s.position);
                        return Outcome::Active {
                            index,
                            position,
                            revisit: b.revisit,
                        };
                    }
                }
                self.activate(token, index, revisit)
            }
            Plan::Prerequisite { position, url } => {
                warn!("Reached {} before completing step {}", here, position);
                self.halt(token, StopReason::PrerequisiteViolation { position, url })
            }
            Plan::Completed => self.complete(token),
            Plan::OffPath => self.halt(
                token,
                StopReason::OffPath {
                    location: here.to_string(),
                },
            ),
        }
    }

    /// Activate the next uncompleted step after `after`, or redirect to it.
    fn proceed(&self, token: OperationToken, after: Option<usize>) -> Outcome {
        let (recording, next) = {
            let inner = self.lock();
            if !inner.generation.is_current(token) {
                return Outcome::Superseded;
            }
            let Some(recording) = inner.recording.clone() else {
                drop(inner);
                return self.halt(token, StopReason::Failed("no recording loaded".into()));
            };
            let next = next_uncompleted(&recording, &inner.state, after);
            (recording, next)
        };
        let Some(index) = next else {
            return self.complete(token);
        };
        let Some(step) = recording.get(index) else {
            return self.halt(token, StopReason::Failed(format!("no step at index {}", index)));
        };

        let here = self.shared.ports.document.location();
        if step.location().matches(&here) {
            return self.activate(token, index, false);
        }

        {
            let mut inner = self.lock();
            if !inner.generation.is_current(token) {
                return Outcome::Superseded;
            }
            inner.phase = Phase::Advancing;
            inner.state.current_step = Some(index);
            inner.state.touch();
        }
        self.persist(false);
        let url = step_url(step);
        info!("Step {} is on {}, redirecting", step.position, url);
        self.shared.ports.presenter.redirect(
            &url,
            &format!("Go to {} to continue: {}", url, step.annotation),
        );
        Outcome::AwaitingNavigation { url }
    }

    /// Resolve and bind step `index`.
    fn activate(&self, token: OperationToken, index: usize, revisit: bool) -> Outcome {
        let doc = self.shared.ports.document.clone();
        let mut inner = self.lock();
        if !inner.generation.is_current(token) {
            debug!("{} superseded before activating step index {}", token, index);
            return Outcome::Superseded;
        }
        let Some(recording) = inner.recording.clone() else {
            drop(inner);
            return self.halt(token, StopReason::Failed("no recording loaded".into()));
        };
        let Some(step) = recording.get(index).cloned() else {
            drop(inner);
            return self.halt(token, StopReason::Failed(format!("no step at index {}", index)));
        };

        inner.unbind();
        inner.cache.clear();
        inner.checks.reset();
        inner.reset_pending();
        inner.invalidating = false;
        inner.phase = Phase::Resolving;
        inner.state.current_step = Some(index);
        inner.state.touch();

        let candidates = Resolver::new(doc.as_ref()).find_candidates(&step.interaction);
        let previous = inner.previous_target;
        let selection = Validator::new(doc.as_ref()).select(
            &candidates,
            &step.interaction,
            &mut inner.cache,
            self.shared.config.tie_break,
            previous,
        );
        let presenter = self.shared.ports.presenter.clone();

        if let Some(selection) = selection {
            inner.binding = Some(Binding {
                index,
                node: selection.node,
                revisit,
            });
            inner.previous_target = Some(selection.node);
            inner.phase = Phase::AwaitingInteraction;
            if self.shared.config.auto_watch {
                inner.watch = self.spawn_watch(selection.node);
            }
            drop(inner);

            info!(
                "Step {} bound to {}{}",
                step.position,
                selection.node,
                if revisit { " (revisit)" } else { "" }
            );
            self.persist(false);
            presenter.cleanup(true, false);
            presenter.show_step(&step, selection.node, revisit);
            return Outcome::Active {
                index,
                position: step.position,
                revisit,
            };
        }

        let here = doc.location();
        if step.interaction.expects_navigation(&here) {
            inner.phase = Phase::Advancing;
            inner.expecting_navigation = Some(index);
            drop(inner);
            debug!(
                "Target for step {} absent, navigation expected",
                step.position
            );
            self.persist(false);
            let url = match step.interaction.attributes.get("href") {
                Some(_) => navigation::destinations(recording.steps(), index)
                    .first()
                    .map(|d| d.as_str().to_string()),
                None => recording.get(index + 1).map(step_url),
            }
            .unwrap_or_else(|| step_url(&step));
            return Outcome::AwaitingNavigation { url };
        }

        inner.pending_recovery = Some(index);
        inner.phase = Phase::AwaitingRecovery;
        drop(inner);
        warn!("No target found for step {} ({})", step.position, step.interaction);
        self.persist(false);
        presenter.cleanup(false, false);
        presenter.notify(Notice::new(
            NoticeLevel::Warning,
            format!("Could not find the element for step {}", step.position),
        ));
        presenter.offer_recovery(&step, RECOVERY_CHOICES);
        Outcome::Recoverable {
            index,
            position: step.position,
        }
    }

    fn complete(&self, token: OperationToken) -> Outcome {
        if !self.finish(token, Phase::Completed) {
            return Outcome::Superseded;
        }
        info!("Guide completed");
        self.shared
            .ports
            .presenter
            .notify(Notice::new(NoticeLevel::Success, "Guide complete"));
        Outcome::Completed
    }

    fn halt(&self, token: OperationToken, reason: StopReason) -> Outcome {
        if !self.finish(token, Phase::Stopped(reason.clone())) {
            return Outcome::Superseded;
        }
        let level = match reason {
            StopReason::Aborted => NoticeLevel::Info,
            StopReason::FetchFailed(_) | StopReason::Failed(_) => NoticeLevel::Error,
            _ => NoticeLevel::Warning,
        };
        info!("Playback stopped: {}", reason);
        self.shared
            .ports
            .presenter
            .notify(Notice::new(level, reason.to_string()));
        Outcome::Stopped(reason)
    }

    /// Terminal transition. The in-memory state keeps the final progress for
    /// inspection; the persisted copy and the session are cleared.
    fn finish(&self, token: OperationToken, end: Phase) -> bool {
        {
            let mut inner = self.lock();
            if !inner.generation.is_current(token) {
                debug!("{} superseded before finishing", token);
                return false;
            }
            inner.generation.mint();
            inner.unbind();
            inner.reset_pending();
            inner.state.is_playing = false;
            inner.state.touch();
            inner.phase = end;
        }
        let ports = &self.shared.ports;
        ports.store.clear();
        ports.store.clear_session();
        ports.presenter.cleanup(false, true);
        true
    }

    fn persist(&self, immediate: bool) {
        let state = {
            let inner = self.lock();
            if !inner.state.is_playing {
                return;
            }
            inner.state.clone()
        };
        self.shared.ports.store.save_debounced(&state, immediate);
    }

    /// Spawn the validation loop for `node`. Needs a tokio runtime; without
    /// one the host drives [`Engine::tick`] itself.
    fn spawn_watch(&self, node: NodeId) -> Option<WatchHandle> {
        if tokio::runtime::Handle::try_current().is_err() {
            debug!("No runtime, validation loop left to the host");
            return None;
        }
        let shared = Arc::downgrade(&self.shared);
        let frame = self.shared.config.frame_interval();
        Some(WatchHandle::spawn(async move {
            let mut frames = tokio::time::interval(frame);
            frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                frames.tick().await;
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                let engine = Engine { shared };
                if engine.bound_target() != Some(node) {
                    break;
                }
                if let Outcome::Stopped(_) = engine.tick(Instant::now()) {
                    break;
                }
            }
        }))
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Engine")
            .field("phase", &inner.phase)
            .field("state", &inner.state)
            .field("token", &inner.generation.current())
            .finish_non_exhaustive()
    }
}

async fn settle(delay: Duration) {
    if delay.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(delay).await;
    }
}

fn next_uncompleted(
    recording: &LoadedRecording,
    state: &PlaybackState,
    after: Option<usize>,
) -> Option<usize> {
    let steps = recording.steps();
    let start = after.map_or(0, |i| i + 1).min(steps.len());
    (start..steps.len())
        .chain(0..start)
        .find(|&i| !state.is_completed(steps[i].position))
}
