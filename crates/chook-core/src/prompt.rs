//! Roast prompt construction.
//!
//! Renders the persona system instruction and the per-request user message
//! from `chook-pm` templates. Templates in the configured prompt directory
//! override the built-in ones by name.

use tracing::{debug, instrument};

use crate::config::ChookConfig;
use crate::error::CoreError;
use crate::generation::RoastRequest;

/// Rendered prompt pair for one roast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoastPrompt {
    pub system_instruction: String,
    pub user_message: String,
}

/// Builds [`RoastPrompt`]s from templates.
#[derive(Debug)]
pub struct RoastPrompter {
    prompt_manager: chook_pm::PromptManager,
}

impl RoastPrompter {
    /// Load built-in templates plus any overrides from `config.prompt_dir()`.
    ///
    /// A configured directory that does not exist is skipped.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Prompt` if a template fails to load.
    #[instrument(skip_all)]
    pub fn new(config: &ChookConfig) -> Result<Self, CoreError> {
        let mut pm = chook_pm::PromptManager::new()?;
        if let Some(dir) = config.prompt_dir().filter(|d| d.is_dir()) {
            pm.load_dir(dir)?;
            debug!(dir = %dir.display(), "loaded prompt overrides");
        }
        Ok(Self { prompt_manager: pm })
    }

    /// Render the prompt pair for `request`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Prompt` if rendering fails.
    pub fn build(&self, request: &RoastRequest) -> Result<RoastPrompt, CoreError> {
        let ctx = serde_json::json!({
            "language": request.detected_language.trim(),
            "context": request.context_note.trim(),
            "code": request.source_text,
        });
        Ok(RoastPrompt {
            system_instruction: self.prompt_manager.render(chook_pm::ROAST_SYSTEM, &ctx)?,
            user_message: self.prompt_manager.render(chook_pm::ROAST_USER, &ctx)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(context: &str) -> RoastRequest {
        RoastRequest {
            source_text: "fn main() {}".to_owned(),
            context_note: context.to_owned(),
            detected_language: "rust".to_owned(),
        }
    }

    #[test]
    fn test_should_render_user_message_with_context() {
        let prompter = RoastPrompter::new(&ChookConfig::builder().build()).expect("should load");
        let prompt = prompter.build(&request("  my first crate  ")).expect("should render");

        assert_eq!(
            prompt.user_message,
            "LANGUAGE: rust\nCONTEXT: my first crate\n---\nCODE:\nfn main() {}"
        );
        assert!(prompt.system_instruction.contains("yàb"));
    }

    #[test]
    fn test_should_render_none_for_blank_context() {
        let prompter = RoastPrompter::new(&ChookConfig::builder().build()).expect("should load");
        let prompt = prompter.build(&request("   ")).expect("should render");
        assert!(prompt.user_message.contains("CONTEXT: None\n"));
    }

    #[test]
    fn test_should_prefer_templates_from_prompt_dir() {
        let dir = tempfile::tempdir().expect("should create tempdir");
        let roast_dir = dir.path().join("roast");
        std::fs::create_dir_all(&roast_dir).expect("should create dir");
        std::fs::write(roast_dir.join("system.j2"), "Be gentle with {{ language }}.")
            .expect("should write template");

        let config = ChookConfig::builder().prompt_dir(dir.path()).build();
        let prompter = RoastPrompter::new(&config).expect("should load");
        let prompt = prompter.build(&request("")).expect("should render");

        assert_eq!(prompt.system_instruction, "Be gentle with rust.");
        assert!(prompt.user_message.starts_with("LANGUAGE: rust"));
    }

    #[test]
    fn test_should_skip_missing_prompt_dir() {
        let config = ChookConfig::builder()
            .prompt_dir("/definitely/not/here")
            .build();
        assert!(RoastPrompter::new(&config).is_ok());
    }
}
