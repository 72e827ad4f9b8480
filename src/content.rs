//! Generated educational content with a static fallback.
//!
//! Generation is best effort: a timeout, a transport error or an empty
//! answer all produce the fixed paragraph for the subject's language, so a
//! subject never sees an error or an empty message.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::models::Language;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerateError {
    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Generator returned no text")]
    Empty,

    #[error("Generator transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, language: Language) -> Result<String, GenerateError>;
}

/// Calls a text generation endpoint that takes `{ "prompt", "language" }`
/// and answers `{ "text" }`.
pub struct HttpTextGenerator {
    client: reqwest::Client,
    url: String,
}

impl HttpTextGenerator {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[derive(Deserialize)]
struct GeneratedText {
    text: String,
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, prompt: &str, language: Language) -> Result<String, GenerateError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "prompt": prompt, "language": language.as_str() }))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| GenerateError::Transport(e.to_string()))?;

        let body: GeneratedText = response
            .json()
            .await
            .map_err(|e| GenerateError::Transport(e.to_string()))?;
        Ok(body.text)
    }
}

pub fn fallback_text(language: Language) -> &'static str {
    match language {
        Language::En => {
            "Every week brings new changes for you and your baby. Keep taking your supplements, \
             drink plenty of water, rest, and attend all your clinic visits."
        }
        Language::Fr => {
            "Chaque semaine apporte des changements pour vous et votre bébé. Continuez vos \
             suppléments, buvez beaucoup d'eau, reposez-vous et allez à toutes vos consultations."
        }
        Language::Rw => {
            "Buri cyumweru kizana impinduka kuri wowe no ku mwana wawe. Komeza gufata imiti \
             y'inyongera, unywe amazi ahagije, uruhuke kandi witabire gahunda zose za muganga."
        }
    }
}

fn language_instruction(language: Language) -> &'static str {
    match language {
        Language::En => "Respond in English.",
        Language::Fr => "Répondez en français.",
        Language::Rw => "Subiza mu Kinyarwanda.",
    }
}

/// Prompt for the short paragraph attached to a milestone reminder.
pub fn milestone_prompt(week: u32, language: Language) -> String {
    format!(
        "You are a maternal health assistant sending a text message. In at most three short \
         sentences, describe what typically happens to the baby and the mother in week {week} \
         of pregnancy and give one practical tip. Do not give a diagnosis. {}",
        language_instruction(language)
    )
}

#[derive(Clone)]
pub struct ContentComposer {
    generator: Option<Arc<dyn TextGenerator>>,
    timeout: Duration,
}

impl ContentComposer {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// Generated text for `prompt`, or the fallback for `language`.
    pub async fn compose(&self, prompt: &str, language: Language) -> String {
        let Some(generator) = &self.generator else {
            return fallback_text(language).to_string();
        };

        let result = match tokio::time::timeout(self.timeout, generator.generate(prompt, language)).await {
            Ok(Ok(text)) if text.trim().is_empty() => Err(GenerateError::Empty),
            Ok(result) => result,
            Err(_) => Err(GenerateError::Timeout(self.timeout)),
        };

        match result {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, language = %language, "Using fallback content");
                fallback_text(language).to_string()
            }
        }
    }
}
