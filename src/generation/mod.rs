//! Answer generation: the persona and the generative model behind it.
//!
//! Generation is an opaque call: a system instruction and a user message
//! go in, text or a [`RagError::Generation`] comes out. Retrieval never
//! depends on how the text is produced.
//!
//! # Providers
//!
//! - `ChatCompletionsClient` - OpenAI-compatible HTTP API (requires `server` feature)
//! - [`UnconfiguredGeneration`] - fails every call; used when no API key is set

#[cfg(feature = "server")]
mod chat;

#[cfg(feature = "server")]
pub use chat::ChatCompletionsClient;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::Config;
use crate::error::{RagError, Result};

/// Answer returned when retrieval finds no usable context.
pub const FALLBACK_MESSAGE: &str =
    "I don't have information about that in my knowledge base. Feel free to ask me something else!";

/// Default system instruction.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "\
You are the owner of this portfolio website, answering visitors' questions about yourself.

Rules:
1. Always speak in the first person (\"I\", \"my\", \"me\"), never in the third person.
2. Be conversational and friendly.
3. Keep answers short (2-4 sentences) unless asked for detail.
4. Answer only what was asked, using only the information provided.
5. Never say \"the context shows\" or \"according to\"; just answer directly.";

/// Default user message; `{query}` and `{context}` are substituted.
pub const DEFAULT_USER_TEMPLATE: &str = "\
Someone is asking: \"{query}\"

Here's information about you to help answer:
{context}

Answer the question naturally in first person as yourself. Keep it brief and conversational (2-4 sentences).";

/// Fixed instruction and message template framing every generation call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Persona {
    /// System-level instruction constraining voice and style.
    pub system_instruction: String,
    /// User message template with `{query}` and `{context}` placeholders.
    pub user_template: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            user_template: DEFAULT_USER_TEMPLATE.to_string(),
        }
    }
}

impl Persona {
    /// Reads the system instruction from a file; the template stays default.
    ///
    /// # Errors
    ///
    /// Returns `RagError::Config` if the file cannot be read or is blank.
    pub fn from_file(path: &Path) -> Result<Self> {
        let instruction = fs::read_to_string(path).map_err(|e| {
            RagError::config(format!("failed to read persona {}: {e}", path.display()))
        })?;
        if instruction.trim().is_empty() {
            return Err(RagError::config(format!(
                "persona file {} is empty",
                path.display()
            )));
        }
        Ok(Self {
            system_instruction: instruction.trim().to_string(),
            ..Default::default()
        })
    }

    /// Fills the user template.
    ///
    /// Substitution is a single pass, so placeholder text inside `query` or
    /// `context` is left alone.
    ///
    /// ```rust
    /// use ragfolio::generation::Persona;
    ///
    /// let persona = Persona {
    ///     user_template: "Q: {query}\nC: {context}".to_string(),
    ///     ..Default::default()
    /// };
    /// assert_eq!(persona.user_message("hi {context}", "ctx"), "Q: hi {context}\nC: ctx");
    /// ```
    pub fn user_message(&self, query: &str, context: &str) -> String {
        let mut out = String::with_capacity(self.user_template.len() + query.len() + context.len());
        let mut rest = self.user_template.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open..];
            if let Some(after) = tail.strip_prefix("{query}") {
                out.push_str(query);
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{context}") {
                out.push_str(context);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

/// Generative text model behind `assemble_answer`.
///
/// # Implementing a Custom Provider
///
/// ```rust
/// use async_trait::async_trait;
/// use ragfolio::generation::GenerationService;
/// use ragfolio::Result;
///
/// struct Echo;
///
/// #[async_trait]
/// impl GenerationService for Echo {
///     async fn generate(&self, _system: &str, user: &str) -> Result<String> {
///         Ok(user.to_string())
///     }
///
///     fn model_name(&self) -> &str {
///         "echo"
///     }
/// }
/// ```
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Produces a reply to `user_message` under `system_instruction`.
    ///
    /// # Errors
    ///
    /// Returns `RagError::Generation` on transport, auth, or API failure.
    async fn generate(&self, system_instruction: &str, user_message: &str) -> Result<String>;

    /// Identifies the backend model.
    fn model_name(&self) -> &str;
}

/// Stand-in used when no generation backend is configured.
///
/// Retrieval still works; every generation call fails.
#[derive(Clone, Debug)]
pub struct UnconfiguredGeneration {
    model: String,
}

impl UnconfiguredGeneration {
    /// Creates the stand-in for `model`.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

#[async_trait]
impl GenerationService for UnconfiguredGeneration {
    async fn generate(&self, _system_instruction: &str, _user_message: &str) -> Result<String> {
        Err(RagError::generation(format!(
            "no API key configured for generation model '{}'",
            self.model
        )))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Creates the generation backend described by `config`.
///
/// Without an API key (or without the `server` feature) this is an
/// [`UnconfiguredGeneration`].
///
/// # Errors
///
/// Returns `RagError::Config` if the HTTP client cannot be constructed.
pub fn create_generation_service(config: &Config) -> Result<Arc<dyn GenerationService>> {
    #[cfg(feature = "server")]
    if config.generation.api_key.is_some() {
        return Ok(Arc::new(ChatCompletionsClient::new(&config.generation)?));
    }

    info!(
        model = %config.generation.model,
        "No generation API key configured; answer requests will fail"
    );
    Ok(Arc::new(UnconfiguredGeneration::new(
        config.generation.model.clone(),
    )))
}

/// Loads the configured persona, or the default one.
pub fn load_persona(config: &Config) -> Result<Persona> {
    match &config.persona_path {
        Some(path) => Persona::from_file(path),
        None => Ok(Persona::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_has_placeholders() {
        let persona = Persona::default();
        let message = persona.user_message("Who are you?", "I study Computer Science.");
        assert!(message.contains("\"Who are you?\""));
        assert!(message.contains("I study Computer Science."));
        assert!(!message.contains("{query}"));
        assert!(!message.contains("{context}"));
    }

    #[test]
    fn test_user_message_keeps_unknown_braces() {
        let persona = Persona {
            user_template: "{x} {query} {".to_string(),
            ..Default::default()
        };
        assert_eq!(persona.user_message("q", "c"), "{x} q {");
    }

    #[test]
    fn test_persona_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persona.txt");
        fs::write(&path, "  Be terse.\n").unwrap();

        let persona = Persona::from_file(&path).unwrap();
        assert_eq!(persona.system_instruction, "Be terse.");
        assert_eq!(persona.user_template, DEFAULT_USER_TEMPLATE);
    }

    #[test]
    fn test_persona_from_blank_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persona.txt");
        fs::write(&path, "\n").unwrap();
        assert!(matches!(
            Persona::from_file(&path),
            Err(RagError::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_generation_fails() {
        let service = UnconfiguredGeneration::new("llama");
        let err = service.generate("sys", "user").await.unwrap_err();
        assert!(err.is_generation());
        assert_eq!(service.model_name(), "llama");
    }

    #[test]
    fn test_create_without_key_is_unconfigured() {
        let service = create_generation_service(&Config::default()).unwrap();
        assert_eq!(service.model_name(), "llama-3.1-8b-instant");
    }
}
