mod classifier;
mod config;
mod controller;
mod debounce;
mod error;
mod events;
mod generation;
mod prompt;
mod session;
mod share;
mod storage;
#[cfg(test)]
mod test_support;

pub use classifier::{
    HeuristicClassifier, LanguageClassifier, detect_language, grammar_for, has_component_tag,
    refine_component_syntax,
};
pub use config::{
    API_KEY_ENV, ChookConfig, DEFAULT_FALLBACK_LANGUAGE, DEFAULT_GENERATION_BASE_URL,
    DEFAULT_MODEL, EnvOverrides, FileConfig, GEMINI_API_KEY_ENV, GenerationFileConfig,
    PromptsFileConfig, STORAGE_ANON_KEY_ENV, STORAGE_MISSING_MESSAGE, STORAGE_URL_ENV,
    SessionFileConfig, StorageConfig, StorageFileConfig, load_file_config,
};
pub use controller::{RoastSessionController, SessionDeps, SessionHandle};
pub use debounce::DebounceScheduler;
pub use error::CoreError;
pub use events::{Command, SessionEvent};
pub use generation::{FragmentStream, GeminiStreamer, RoastRequest, RoastStreamer};
pub use prompt::{RoastPrompt, RoastPrompter};
pub use session::{Phase, ROAST_FAILURE_PREFIX, RequestToken, SaveState, Session, VALIDATION_MESSAGE};
pub use share::{APP_URL, SHARE_TEXT, share_intent_url};
pub use storage::{NewRoast, RoastRecord, RoastStore, SupabaseStore};
