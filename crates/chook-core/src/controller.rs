//! Roast session controller.
//!
//! [`RoastSessionController`] is a single tokio task that owns the
//! [`Session`]. It processes user [`Command`]s and internal signals from
//! helper tasks (debounce timers, the roast stream reader, the save call)
//! one at a time, so session state needs no locks. Every mutation publishes
//! a fresh snapshot on a `watch` channel followed by a [`SessionEvent`] on a
//! `broadcast` channel.

use std::fmt;
use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use typed_builder::TypedBuilder;

use crate::classifier::{HeuristicClassifier, LanguageClassifier, detect_language};
use crate::config::{ChookConfig, STORAGE_MISSING_MESSAGE};
use crate::debounce::DebounceScheduler;
use crate::error::CoreError;
use crate::events::{Command, SessionEvent};
use crate::generation::{GeminiStreamer, RoastRequest, RoastStreamer};
use crate::session::{RequestToken, Session};
use crate::storage::{NewRoast, RoastStore, SupabaseStore};

const EVENT_CAPACITY: usize = 1024;

/// Message shown when a save fails without a usable reason.
const SAVE_FAILED_FALLBACK: &str = "Failed to save roast.";

/// Collaborators used by the controller.
#[derive(TypedBuilder)]
pub struct SessionDeps {
    classifier: Arc<dyn LanguageClassifier>,
    streamer: Arc<dyn RoastStreamer>,
    #[builder(default, setter(strip_option))]
    store: Option<Arc<dyn RoastStore>>,
}

impl SessionDeps {
    /// Production collaborators: the heuristic classifier, the Gemini
    /// streamer and, when storage is configured, the Supabase store.
    ///
    /// # Errors
    ///
    /// Returns an error if the classifier rules or prompt templates fail
    /// to load.
    pub fn from_config(config: &ChookConfig) -> Result<Self, CoreError> {
        let store = config
            .storage()
            .map(|storage| Arc::new(SupabaseStore::new(storage.clone())) as Arc<dyn RoastStore>);
        Ok(Self {
            classifier: Arc::new(HeuristicClassifier::new()?),
            streamer: Arc::new(GeminiStreamer::new(config)?),
            store,
        })
    }
}

impl fmt::Debug for SessionDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionDeps")
            .field("store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TimerKey {
    Classify,
    SaveFailureReset,
}

/// Reports from helper tasks back to the controller.
#[derive(Debug)]
enum Signal {
    ClassifyDue {
        generation: u64,
    },
    Fragment {
        token: RequestToken,
        text: String,
    },
    StreamEnded {
        token: RequestToken,
    },
    StreamFailed {
        token: RequestToken,
        error: CoreError,
    },
    SaveFinished {
        token: RequestToken,
        result: Result<(), CoreError>,
    },
    SaveFailureExpired {
        token: RequestToken,
    },
}

/// Owns one [`Session`] and drives it from commands and collaborator
/// results. Construct with [`RoastSessionController::spawn`].
pub struct RoastSessionController {
    config: ChookConfig,
    deps: SessionDeps,
    session: Session,
    timers: DebounceScheduler<TimerKey>,
    /// Bumped on every source edit; a classification signal from an older
    /// edit is dropped.
    classify_generation: u64,
    stream_task: Option<JoinHandle<()>>,
    commands: mpsc::UnboundedReceiver<Command>,
    signal_tx: mpsc::UnboundedSender<Signal>,
    signal_rx: mpsc::UnboundedReceiver<Signal>,
    state: watch::Sender<Session>,
    events: broadcast::Sender<SessionEvent>,
}

impl RoastSessionController {
    /// Start a controller task and return a handle to it.
    ///
    /// Must be called from within a tokio runtime. The task stops on
    /// [`SessionHandle::dispose`] or when every handle is dropped.
    pub fn spawn(config: ChookConfig, deps: SessionDeps) -> SessionHandle {
        let session = Session::new(config.fallback_language());
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(session.clone());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let handle = SessionHandle {
            commands: command_tx,
            state: state_rx,
            events: events.clone(),
        };
        let controller = Self {
            config,
            deps,
            session,
            timers: DebounceScheduler::new(),
            classify_generation: 0,
            stream_task: None,
            commands,
            signal_tx,
            signal_rx,
            state,
            events,
        };
        tokio::spawn(controller.run());
        handle
    }

    async fn run(mut self) {
        debug!("session controller started");
        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Dispose) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(signal) = self.signal_rx.recv() => self.handle_signal(signal),
            }
        }
        self.teardown();
        debug!("session controller stopped");
    }

    fn teardown(&mut self) {
        self.timers.cancel_all();
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::EditSource(text) => self.edit_source(text),
            Command::EditContext(text) => {
                self.session.edit_context(text);
                self.publish();
            }
            Command::SubmitRoast { viewport_width } => self.submit_roast(viewport_width),
            Command::Save => self.save(),
            Command::Dispose => {}
        }
    }

    fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::ClassifyDue { generation } => {
                if generation == self.classify_generation {
                    self.classify();
                } else {
                    debug!(
                        generation,
                        current = self.classify_generation,
                        "stale classification dropped"
                    );
                }
            }
            Signal::Fragment { token, text } => {
                if self.session.apply_fragment(token, &text) {
                    self.publish();
                    self.emit(SessionEvent::Fragment { token, text });
                }
            }
            Signal::StreamEnded { token } => {
                if self.session.finish_roast(token) {
                    info!(%token, len = self.session.roast_buffer().len(), "roast complete");
                    self.stream_task = None;
                    self.publish();
                    self.emit(SessionEvent::RoastCompleted { token });
                }
            }
            Signal::StreamFailed { token, error } => {
                if self.session.fail_roast(token, &error) {
                    warn!(%token, error = %error, "roast failed");
                    self.stream_task = None;
                    self.publish();
                    let message = self.session.error_message().unwrap_or_default().to_owned();
                    self.emit(SessionEvent::RoastFailed { token, message });
                }
            }
            Signal::SaveFinished { token, result } => self.finish_save(token, result),
            Signal::SaveFailureExpired { token } => {
                if self.session.clear_save_failure(token) {
                    self.publish();
                    self.emit(SessionEvent::SaveReset);
                }
            }
        }
    }

    // ── Classification ───────────────────────────────────────

    fn edit_source(&mut self, text: String) {
        let before = self.session.detected_language().to_owned();
        self.classify_generation += 1;
        if self.session.edit_source(text) {
            let signals = self.signal_tx.clone();
            let generation = self.classify_generation;
            self.timers
                .schedule(TimerKey::Classify, self.config.debounce(), move || {
                    signals.send(Signal::ClassifyDue { generation }).ok();
                });
            self.publish();
        } else {
            self.timers.cancel(&TimerKey::Classify);
            self.publish();
            if self.session.detected_language() != before {
                self.emit_language();
            }
        }
    }

    #[instrument(skip(self), fields(len = self.session.source_text().len()))]
    fn classify(&mut self) {
        let text = self.session.source_text();
        if text.trim().is_empty() {
            return;
        }
        let language = detect_language(self.deps.classifier.as_ref(), text);
        debug!(?language, "classification pass");
        if self.session.apply_classification(language) {
            self.publish();
            self.emit_language();
        }
        self.emit(SessionEvent::ClassificationSettled {
            language: self.session.detected_language().to_owned(),
        });
    }

    fn emit_language(&self) {
        self.emit(SessionEvent::LanguageDetected {
            language: self.session.detected_language().to_owned(),
        });
    }

    // ── Roasting ─────────────────────────────────────────────

    fn submit_roast(&mut self, viewport_width: Option<u32>) {
        let (token, request) = match self.session.begin_roast() {
            Ok(started) => started,
            Err(e) => {
                debug!(error = %e, "roast rejected");
                self.publish();
                self.emit(SessionEvent::ValidationFailed {
                    message: e.to_string(),
                });
                return;
            }
        };

        self.timers.cancel(&TimerKey::SaveFailureReset);
        if let Some(previous) = self.stream_task.take() {
            previous.abort();
        }
        info!(%token, language = %request.detected_language, "roast started");
        self.stream_task = Some(self.spawn_stream(token, request));

        self.publish();
        self.emit(SessionEvent::RoastStarted { token });
        if viewport_width.is_some_and(|w| w < self.config.narrow_viewport_breakpoint()) {
            self.emit(SessionEvent::NarrowViewportRoastStarted { token });
        }
    }

    fn spawn_stream(&self, token: RequestToken, request: RoastRequest) -> JoinHandle<()> {
        let streamer = Arc::clone(&self.deps.streamer);
        let signals = self.signal_tx.clone();
        tokio::spawn(async move {
            let mut stream = match streamer.stream_roast(&request).await {
                Ok(stream) => stream,
                Err(error) => {
                    signals.send(Signal::StreamFailed { token, error }).ok();
                    return;
                }
            };
            while let Some(item) = stream.next().await {
                let signal = match item {
                    Ok(text) => Signal::Fragment { token, text },
                    Err(error) => {
                        signals.send(Signal::StreamFailed { token, error }).ok();
                        return;
                    }
                };
                if signals.send(signal).is_err() {
                    return;
                }
            }
            signals.send(Signal::StreamEnded { token }).ok();
        })
    }

    // ── Saving ───────────────────────────────────────────────

    fn save(&mut self) {
        let Some((token, record)) = self.session.begin_save() else {
            debug!(
                phase = ?self.session.phase(),
                save_state = ?self.session.save_state(),
                "save ignored"
            );
            return;
        };
        self.publish();

        match self.deps.store.as_ref() {
            Some(store) => self.spawn_save(Arc::clone(store), token, record),
            None => {
                let error = CoreError::Configuration(STORAGE_MISSING_MESSAGE.to_owned());
                self.finish_save(token, Err(error));
            }
        }
    }

    fn spawn_save(&self, store: Arc<dyn RoastStore>, token: RequestToken, record: NewRoast) {
        let signals = self.signal_tx.clone();
        tokio::spawn(async move {
            let result = store.save(&record).await;
            signals.send(Signal::SaveFinished { token, result }).ok();
        });
    }

    fn finish_save(&mut self, token: RequestToken, result: Result<(), CoreError>) {
        match result {
            Ok(()) => {
                if self.session.mark_saved(token) {
                    info!(%token, "roast saved");
                    self.publish();
                    self.emit(SessionEvent::Saved);
                }
            }
            Err(error) => {
                let message = save_failure_message(&error);
                if self.session.mark_save_failed(token, message.clone()) {
                    warn!(%token, error = %error, "save failed");
                    let signals = self.signal_tx.clone();
                    self.timers.schedule(
                        TimerKey::SaveFailureReset,
                        self.config.save_failure_reset(),
                        move || {
                            signals.send(Signal::SaveFailureExpired { token }).ok();
                        },
                    );
                    self.publish();
                    self.emit(SessionEvent::SaveFailed { message });
                }
            }
        }
    }

    // ── Publishing ───────────────────────────────────────────

    fn publish(&self) {
        self.state.send_replace(self.session.clone());
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine; snapshots carry the same state.
        self.events.send(event).ok();
    }
}

impl fmt::Debug for RoastSessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoastSessionController")
            .field("session", &self.session)
            .field("timers", &self.timers)
            .finish_non_exhaustive()
    }
}

fn save_failure_message(error: &CoreError) -> String {
    let message = match error {
        CoreError::Storage(m) | CoreError::Configuration(m) => m.clone(),
        other => other.to_string(),
    };
    if message.trim().is_empty() {
        SAVE_FAILED_FALLBACK.to_owned()
    } else {
        message
    }
}

// ── Handle ───────────────────────────────────────────────────

/// Cloneable front-end handle to a running controller.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<Session>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Send a raw command.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Other` if the controller has stopped.
    pub fn send(&self, command: Command) -> Result<(), CoreError> {
        self.commands
            .send(command)
            .map_err(|_| CoreError::Other(anyhow::anyhow!("session controller has stopped")))
    }

    /// Replace the source text.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Other` if the controller has stopped.
    pub fn edit_source(&self, text: impl Into<String>) -> Result<(), CoreError> {
        self.send(Command::EditSource(text.into()))
    }

    /// Replace the context note.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Other` if the controller has stopped.
    pub fn edit_context(&self, text: impl Into<String>) -> Result<(), CoreError> {
        self.send(Command::EditContext(text.into()))
    }

    /// Request a roast of the current inputs.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Other` if the controller has stopped.
    pub fn submit_roast(&self, viewport_width: Option<u32>) -> Result<(), CoreError> {
        self.send(Command::SubmitRoast { viewport_width })
    }

    /// Persist the current roast.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Other` if the controller has stopped.
    pub fn save(&self) -> Result<(), CoreError> {
        self.send(Command::Save)
    }

    /// Stop the controller. Does nothing if it has already stopped.
    pub fn dispose(&self) {
        self.commands.send(Command::Dispose).ok();
    }

    /// Resolves once the controller task has stopped.
    pub async fn closed(&self) {
        self.commands.closed().await;
    }

    /// Latest published session state.
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// A receiver of session snapshots.
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.state.clone()
    }

    /// Subscribe to events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Wait until a published snapshot satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Other` if the controller stops first.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<Session, CoreError>
    where
        F: FnMut(&Session) -> bool,
    {
        let mut rx = self.state.clone();
        let session = rx
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| CoreError::Other(anyhow::anyhow!("session controller has stopped")))?;
        Ok(session.clone())
    }
}
