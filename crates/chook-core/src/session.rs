//! Roast session state.
//!
//! [`Session`] holds everything one user interaction owns: the editor text,
//! the detected language, the streamed roast and the save status. Every
//! transition is a plain method so the state machine can be tested without
//! a runtime; the controller drives these methods from its event loop.
//!
//! Signals produced by a roast request carry the [`RequestToken`] issued
//! when that request started. Only the latest token may mutate the roast
//! buffer or save status.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreError;
use crate::generation::RoastRequest;
use crate::storage::NewRoast;

/// Message shown when a roast is requested with an empty editor.
pub const VALIDATION_MESSAGE: &str = "Abeg, write something first before I chook eye.";

/// Prefix for roast failures, separating service breakage from user mistakes.
pub const ROAST_FAILURE_PREFIX: &str = "Omo, gbege! The thing cast. Error: ";

/// Lifecycle of the current roast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Streaming,
    Complete,
    Errored,
}

impl Phase {
    /// Whether a roast stream is open.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Loading | Self::Streaming)
    }
}

/// Persistence status of the current roast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SaveState {
    #[default]
    Unsaved,
    Saved,
    SaveFailed,
}

/// Monotonic sequence number identifying one roast request.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RequestToken(u64);

impl RequestToken {
    fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RequestToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Full mutable state of one roast interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    source_text: String,
    context_note: String,
    detected_language: String,
    roast_buffer: String,
    phase: Phase,
    error_message: Option<String>,
    save_state: SaveState,
    save_error: Option<String>,
    saving: bool,
    active_request: RequestToken,
    submission: Option<RoastRequest>,
    fallback_language: String,
}

impl Session {
    /// Create an idle session whose language starts at `fallback_language`.
    pub fn new(fallback_language: impl Into<String>) -> Self {
        let fallback_language = fallback_language.into();
        Self {
            source_text: String::new(),
            context_note: String::new(),
            detected_language: fallback_language.clone(),
            roast_buffer: String::new(),
            phase: Phase::Idle,
            error_message: None,
            save_state: SaveState::Unsaved,
            save_error: None,
            saving: false,
            active_request: RequestToken::default(),
            submission: None,
            fallback_language,
        }
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn context_note(&self) -> &str {
        &self.context_note
    }

    pub fn detected_language(&self) -> &str {
        &self.detected_language
    }

    pub fn roast_buffer(&self) -> &str {
        &self.roast_buffer
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn save_state(&self) -> SaveState {
        self.save_state
    }

    /// Message from the last failed save, while it is still displayed.
    pub fn save_error(&self) -> Option<&str> {
        self.save_error.as_deref()
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn active_request(&self) -> RequestToken {
        self.active_request
    }

    /// Inputs captured when the latest roast started.
    pub fn submission(&self) -> Option<&RoastRequest> {
        self.submission.as_ref()
    }

    // ── Editing ──────────────────────────────────────────────

    /// Replace the source text.
    ///
    /// Returns `true` when a classification pass should be scheduled. When
    /// the trimmed text is empty the language resets to the fallback
    /// immediately and `false` is returned.
    pub fn edit_source(&mut self, text: String) -> bool {
        self.source_text = text;
        if self.source_text.trim().is_empty() {
            self.detected_language.clone_from(&self.fallback_language);
            false
        } else {
            true
        }
    }

    pub fn edit_context(&mut self, text: String) {
        self.context_note = text;
    }

    /// Apply a classification result. `None` leaves the language unchanged.
    ///
    /// Returns `true` if the detected language changed.
    pub fn apply_classification(&mut self, language: Option<String>) -> bool {
        match language {
            Some(language) if language != self.detected_language => {
                self.detected_language = language;
                true
            }
            _ => false,
        }
    }

    // ── Roast lifecycle ──────────────────────────────────────

    /// Start a new roast request, superseding any request in flight.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` when the source text is blank. The
    /// phase is left unchanged and the validation message is recorded.
    pub fn begin_roast(&mut self) -> Result<(RequestToken, RoastRequest), CoreError> {
        if self.source_text.trim().is_empty() {
            self.error_message = Some(VALIDATION_MESSAGE.to_owned());
            return Err(CoreError::Validation(VALIDATION_MESSAGE.to_owned()));
        }

        self.active_request = self.active_request.next();
        self.phase = Phase::Loading;
        self.roast_buffer.clear();
        self.error_message = None;
        self.save_state = SaveState::Unsaved;
        self.save_error = None;
        self.saving = false;

        let request = RoastRequest {
            source_text: self.source_text.clone(),
            context_note: self.context_note.clone(),
            detected_language: self.detected_language.clone(),
        };
        self.submission = Some(request.clone());
        Ok((self.active_request, request))
    }

    /// Append a fragment from request `token`.
    ///
    /// Returns `false` and leaves the buffer untouched when `token` is
    /// stale or the roast is no longer in flight.
    pub fn apply_fragment(&mut self, token: RequestToken, fragment: &str) -> bool {
        if !self.accepts(token) {
            debug!(%token, active = %self.active_request, "discarding stale fragment");
            return false;
        }
        self.roast_buffer.push_str(fragment);
        self.phase = Phase::Streaming;
        true
    }

    /// Mark request `token` as cleanly finished.
    pub fn finish_roast(&mut self, token: RequestToken) -> bool {
        if !self.accepts(token) {
            return false;
        }
        self.phase = Phase::Complete;
        true
    }

    /// Mark request `token` as failed. Partial output is kept.
    pub fn fail_roast(&mut self, token: RequestToken, error: &CoreError) -> bool {
        if !self.accepts(token) {
            return false;
        }
        self.phase = Phase::Errored;
        self.error_message = Some(format!("{ROAST_FAILURE_PREFIX}{error}"));
        true
    }

    fn accepts(&self, token: RequestToken) -> bool {
        token == self.active_request && self.phase.is_in_flight()
    }

    // ── Saving ───────────────────────────────────────────────

    /// Whether the save control is enabled.
    pub fn can_save(&self) -> bool {
        matches!(self.phase, Phase::Streaming | Phase::Complete)
            && !self.roast_buffer.is_empty()
            && self.save_state == SaveState::Unsaved
            && !self.saving
    }

    /// Whether the share control is enabled.
    pub fn can_share(&self) -> bool {
        !self.roast_buffer.is_empty() && !self.phase.is_in_flight()
    }

    /// Claim the save slot for the current roast and build its record.
    ///
    /// Returns `None` when saving is not currently permitted.
    pub fn begin_save(&mut self) -> Option<(RequestToken, NewRoast)> {
        if !self.can_save() {
            return None;
        }
        let submission = self.submission.as_ref()?;
        let record = NewRoast::from_submission(submission, &self.roast_buffer);
        self.saving = true;
        Some((self.active_request, record))
    }

    /// Record a successful save for request `token`.
    pub fn mark_saved(&mut self, token: RequestToken) -> bool {
        if token != self.active_request || !self.saving {
            return false;
        }
        self.saving = false;
        self.save_state = SaveState::Saved;
        self.save_error = None;
        true
    }

    /// Record a failed save for request `token`.
    pub fn mark_save_failed(&mut self, token: RequestToken, message: String) -> bool {
        if token != self.active_request || !self.saving {
            return false;
        }
        self.saving = false;
        self.save_state = SaveState::SaveFailed;
        self.save_error = Some(message);
        true
    }

    /// Re-enable saving after a failure for request `token` has been shown.
    pub fn clear_save_failure(&mut self, token: RequestToken) -> bool {
        if token != self.active_request || self.save_state != SaveState::SaveFailed {
            return false;
        }
        self.save_state = SaveState::Unsaved;
        self.save_error = None;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(text: &str) -> Session {
        let mut session = Session::new("javascript");
        session.edit_source(text.to_owned());
        session
    }

    #[test]
    fn test_should_start_idle_with_fallback_language() {
        let session = Session::new("javascript");
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.detected_language(), "javascript");
        assert_eq!(session.save_state(), SaveState::Unsaved);
        assert!(session.roast_buffer().is_empty());
        assert!(!session.can_save());
        assert!(!session.can_share());
    }

    #[test]
    fn test_should_reject_blank_submission_without_changing_phase() {
        for text in ["", "   ", "\n\t  \n"] {
            let mut session = session_with(text);
            let err = session.begin_roast().unwrap_err();
            assert!(matches!(err, CoreError::Validation(_)));
            assert_eq!(session.phase(), Phase::Idle);
            assert_eq!(session.error_message(), Some(VALIDATION_MESSAGE));
            assert_eq!(session.active_request(), RequestToken::default());
        }
    }

    #[test]
    fn test_should_reset_language_when_source_cleared() {
        let mut session = session_with("print('hi')");
        session.apply_classification(Some("python".to_owned()));
        assert_eq!(session.detected_language(), "python");

        let needs_classification = session.edit_source("  ".to_owned());
        assert!(!needs_classification);
        assert_eq!(session.detected_language(), "javascript");
    }

    #[test]
    fn test_should_keep_language_when_classifier_unsure() {
        let mut session = session_with("???");
        session.apply_classification(Some("ruby".to_owned()));
        assert!(!session.apply_classification(None));
        assert_eq!(session.detected_language(), "ruby");
    }

    #[test]
    fn test_should_concatenate_fragments_in_order() {
        let mut session = session_with("x = 1");
        let (token, request) = session.begin_roast().expect("should start");
        assert_eq!(request.source_text, "x = 1");
        assert_eq!(session.phase(), Phase::Loading);

        assert!(session.apply_fragment(token, "## Yab\n"));
        assert_eq!(session.phase(), Phase::Streaming);
        assert!(session.apply_fragment(token, "bad code"));
        assert!(session.finish_roast(token));

        assert_eq!(session.roast_buffer(), "## Yab\nbad code");
        assert_eq!(session.phase(), Phase::Complete);
        assert!(session.can_share());
    }

    #[test]
    fn test_should_complete_with_empty_buffer_when_no_fragments() {
        let mut session = session_with("x");
        let (token, _) = session.begin_roast().expect("should start");
        assert!(session.finish_roast(token));
        assert_eq!(session.phase(), Phase::Complete);
        assert!(!session.can_save());
    }

    #[test]
    fn test_should_discard_fragments_from_superseded_request() {
        let mut session = session_with("x");
        let (old, _) = session.begin_roast().expect("should start");
        session.apply_fragment(old, "old ");
        let (new, _) = session.begin_roast().expect("should restart");
        assert!(new > old);
        assert!(session.roast_buffer().is_empty());

        assert!(!session.apply_fragment(old, "stale"));
        assert!(!session.finish_roast(old));
        assert!(!session.fail_roast(old, &CoreError::Transport("gone".to_owned())));
        assert_eq!(session.phase(), Phase::Loading);

        assert!(session.apply_fragment(new, "fresh"));
        assert_eq!(session.roast_buffer(), "fresh");
    }

    #[test]
    fn test_should_keep_partial_output_on_failure() {
        let mut session = session_with("x");
        let (token, _) = session.begin_roast().expect("should start");
        session.apply_fragment(token, "partial");
        assert!(session.fail_roast(token, &CoreError::Transport("connection reset".to_owned())));

        assert_eq!(session.phase(), Phase::Errored);
        assert_eq!(session.roast_buffer(), "partial");
        let message = session.error_message().expect("should have message");
        assert!(message.starts_with(ROAST_FAILURE_PREFIX));
        assert!(message.contains("connection reset"));
        assert!(!session.apply_fragment(token, "late"), "errored roast accepts nothing");
    }

    #[test]
    fn test_should_save_once() {
        let mut session = session_with("x = 1");
        session.edit_context("  snippet ".to_owned());
        let (token, _) = session.begin_roast().expect("should start");
        session.apply_fragment(token, "roast");
        session.finish_roast(token);

        let (save_token, record) = session.begin_save().expect("should permit save");
        assert_eq!(save_token, token);
        assert_eq!(record.code_snippet, "x = 1");
        assert_eq!(record.roast_markdown, "roast");
        assert_eq!(record.context.as_deref(), Some("  snippet "));
        assert!(session.begin_save().is_none(), "save already in flight");

        assert!(session.mark_saved(save_token));
        assert_eq!(session.save_state(), SaveState::Saved);
        assert!(session.begin_save().is_none(), "saved roast cannot be saved again");
    }

    #[test]
    fn test_should_save_submitted_inputs_not_later_edits() {
        let mut session = session_with("original");
        let (token, _) = session.begin_roast().expect("should start");
        session.apply_fragment(token, "roast");
        session.finish_roast(token);
        session.edit_source("edited afterwards".to_owned());

        let (_, record) = session.begin_save().expect("should permit save");
        assert_eq!(record.code_snippet, "original");
    }

    #[test]
    fn test_should_permit_retry_after_failure_is_cleared() {
        let mut session = session_with("x");
        let (token, _) = session.begin_roast().expect("should start");
        session.apply_fragment(token, "roast");

        session.begin_save().expect("should permit save while streaming");
        assert!(session.mark_save_failed(token, "Supabase error: denied".to_owned()));
        assert_eq!(session.save_state(), SaveState::SaveFailed);
        assert_eq!(session.save_error(), Some("Supabase error: denied"));
        assert!(session.begin_save().is_none());

        assert!(session.clear_save_failure(token));
        assert_eq!(session.save_state(), SaveState::Unsaved);
        assert!(session.begin_save().is_some());
    }

    #[test]
    fn test_should_reset_save_state_on_new_roast() {
        let mut session = session_with("x");
        let (first, _) = session.begin_roast().expect("should start");
        session.apply_fragment(first, "roast");
        session.begin_save().expect("should permit save");
        session.mark_saved(first);

        let (second, _) = session.begin_roast().expect("should restart");
        assert_eq!(session.save_state(), SaveState::Unsaved);
        assert!(!session.mark_saved(first));
        assert!(!session.clear_save_failure(first));
        assert_ne!(first, second);
    }

    #[test]
    fn test_should_serialize_phase_in_camel_case() {
        let value = serde_json::to_value(Phase::Streaming).expect("should serialize");
        assert_eq!(value, "streaming");
        let value = serde_json::to_value(SaveState::SaveFailed).expect("should serialize");
        assert_eq!(value, "saveFailed");
    }
}
