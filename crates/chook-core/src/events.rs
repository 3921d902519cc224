//! Messages exchanged between a presentation layer and the controller.
//!
//! A front end sends [`Command`]s through a
//! [`SessionHandle`](crate::SessionHandle) and observes [`SessionEvent`]s
//! alongside full [`Session`](crate::Session) snapshots.

use serde::{Deserialize, Serialize};

use crate::session::RequestToken;

/// User intents accepted by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Command {
    /// Replace the source text.
    EditSource(String),

    /// Replace the context note.
    EditContext(String),

    /// Start a roast of the current inputs.
    SubmitRoast {
        /// Width of the viewport in px, when the front end knows it.
        viewport_width: Option<u32>,
    },

    /// Persist the current roast.
    Save,

    /// Stop the controller. Pending timers and streams are cancelled.
    Dispose,
}

/// Notable transitions, published after the matching snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// The detected language changed.
    LanguageDetected { language: String },

    /// A classification pass finished, whether or not the language changed.
    ClassificationSettled { language: String },

    /// A roast was requested with an empty editor.
    ValidationFailed { message: String },

    /// A roast request started.
    RoastStarted { token: RequestToken },

    /// A roast started on a narrow viewport; the front end should switch
    /// to the output panel.
    NarrowViewportRoastStarted { token: RequestToken },

    /// A fragment was appended to the roast buffer.
    Fragment { token: RequestToken, text: String },

    /// The roast stream ended cleanly.
    RoastCompleted { token: RequestToken },

    /// The roast stream failed.
    RoastFailed { token: RequestToken, message: String },

    /// The roast was stored.
    Saved,

    /// Storing the roast failed; the message is shown verbatim.
    SaveFailed { message: String },

    /// A save failure expired and saving is available again.
    SaveReset,
}

impl SessionEvent {
    /// Whether this event ends a roast request.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RoastCompleted { .. } | Self::RoastFailed { .. } | Self::ValidationFailed { .. }
        )
    }
}
