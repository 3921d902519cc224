//! Prompt manager.
//!
//! Ships the built-in roast templates and lets a directory of `.j2` /
//! `.jinja` files replace them by name. Template names carry no file
//! extension so minijinja never auto-escapes the submitted code.

use std::path::Path;

use minijinja::Environment;
use tracing::debug;

use crate::error::PmError;
use crate::template::PromptTemplate;

/// Name of the persona system instruction template.
pub const ROAST_SYSTEM: &str = "roast/system";

/// Name of the user message template (`LANGUAGE` / `CONTEXT` / `CODE`).
pub const ROAST_USER: &str = "roast/user";

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (ROAST_SYSTEM, include_str!("../templates/roast/system.j2")),
    (ROAST_USER, include_str!("../templates/roast/user.j2")),
];

const TEMPLATE_EXTENSIONS: &[&str] = &["j2", "jinja"];

/// Manages prompt templates and renders them with context variables.
#[derive(Debug)]
pub struct PromptManager {
    env: Environment<'static>,
}

impl PromptManager {
    /// Create a prompt manager preloaded with the built-in templates.
    ///
    /// # Errors
    ///
    /// Returns `PmError::InvalidTemplate` if a built-in template fails to parse.
    pub fn new() -> Result<Self, PmError> {
        let mut pm = Self::empty();
        for (name, source) in BUILTIN_TEMPLATES {
            pm.add_template(PromptTemplate::new(*name, *source))?;
        }
        Ok(pm)
    }

    /// Create a prompt manager with no templates registered.
    pub fn empty() -> Self {
        Self {
            env: Environment::new(),
        }
    }

    /// Load all `.j2` / `.jinja` templates below a directory.
    ///
    /// The template name is the path relative to `dir` without its extension,
    /// so `dir/roast/system.j2` replaces the built-in `roast/system`.
    ///
    /// # Errors
    ///
    /// Returns `PmError::Io` if the directory cannot be walked and
    /// `PmError::InvalidTemplate` if a file does not parse.
    pub fn load_dir(&mut self, dir: &Path) -> Result<(), PmError> {
        self.load_dir_inner(dir, dir)
    }

    fn load_dir_inner(&mut self, root: &Path, dir: &Path) -> Result<(), PmError> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.load_dir_inner(root, &path)?;
                continue;
            }

            let is_template = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| TEMPLATE_EXTENSIONS.contains(&e));
            if !is_template {
                continue;
            }

            let Ok(relative) = path.with_extension("").strip_prefix(root).map(Path::to_path_buf)
            else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            let source = std::fs::read_to_string(&path)?;
            debug!(template = %name, path = %path.display(), "loaded template override");
            self.add_template(PromptTemplate { name, source })?;
        }
        Ok(())
    }

    /// Register a single template, replacing any template with the same name.
    ///
    /// # Errors
    ///
    /// Returns `PmError::InvalidTemplate` if the source does not parse.
    pub fn add_template(&mut self, template: PromptTemplate) -> Result<(), PmError> {
        let PromptTemplate { name, source } = template;
        self.env
            .add_template_owned(name.clone(), source)
            .map_err(|e| PmError::InvalidTemplate(format!("{name}: {e}")))
    }

    /// Render a template by name with the given context.
    ///
    /// # Errors
    ///
    /// Returns `PmError::TemplateNotFound` for unknown names and
    /// `PmError::RenderError` when rendering fails.
    pub fn render(&self, name: &str, ctx: &serde_json::Value) -> Result<String, PmError> {
        let template = self
            .env
            .get_template(name)
            .map_err(|_| PmError::TemplateNotFound(name.to_owned()))?;
        template
            .render(ctx)
            .map_err(|e| PmError::RenderError(format!("{name}: {e}")))
    }

    /// Names of all registered templates, sorted.
    pub fn list_templates(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .env
            .templates()
            .map(|(name, _)| name.to_owned())
            .collect();
        names.sort();
        names
    }
}
