//! # py-moderation-mistral
//!
//! `ContentModerator` backed by an LLM chat-completions endpoint
//! (Mistral's `/v1/chat/completions`). Text is screened locally against a
//! blocked-term list before any request is made. Transport failures surface
//! as errors; the caller decides how to report them.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use base64::Engine;
use py_core::models::{ImageUpload, ModerationVerdict};
use py_core::traits::ContentModerator;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const TEXT_REJECTED: &str = "El contenido contiene material inapropiado.";
pub const IMAGE_REJECTED: &str =
    "La imagen contiene contenido inapropiado: La imagen infringe los términos de uso de la plataforma.";

/// Regional insults listed to the model as examples.
const PROMPT_TERMS: &[&str] = &[
    "MMG", "MRD", "CTM", "PTM", "LPM", "KBRN", "VLP", "PGR", "LMQ", "RTM", "Rapa tu madre",
    "Singa", "Singar", "Chingada", "Boludo", "Pelotudo", "Forro", "Weón", "Huevón", "Pendejo",
    "Chingado", "Mamón", "Cabronazo", "Culero", "Malandro", "Come mierda", "Mierda seca",
    "Hijo de puta", "Cabrón", "Desgraciado", "Idiota", "Imbécil", "Estúpido", "Careverga",
    "Caraculo", "Güevón", "Mamaguevo", "Singao", "Mamañema", "Malparío", "Pariguayo",
    "Lambeculo", "Singa su madre",
];

/// Phrases rejected without asking the model. Kept to terms with no innocent reading.
const BLOCKED_TERMS: &[&str] = &[
    "hijo de puta", "singa su madre", "rapa tu madre", "come mierda", "mierda seca",
    "mamaguevo", "mamañema", "lambeculo", "malparío", "careverga", "caraculo", "culero",
    "pendejo", "pelotudo", "huevón", "güevón", "chingada", "cabronazo",
];

const IMAGE_SYSTEM_PROMPT: &str = "You are an image moderation system for PerdidosYa!, a campus \
lost-and-found board. Images should show lost or found objects. Reject images of people or pets, \
sexual content or nudity, violence or gore, hate speech, drugs, weapons, and promotional or spam \
content. Return a JSON object: {\"isAppropriate\": boolean, \"categories\": {\"sexual\": boolean, \
\"violence\": boolean, \"hate\": boolean, \"drugs\": boolean, \"weapons\": boolean, \"nudity\": boolean, \
\"gore\": boolean, \"spam\": boolean, \"other\": boolean}, \"confidence\": number, \"description\": string}";

#[derive(Debug, Clone)]
pub struct MistralSettings {
    /// Chat completions URL, e.g. `https://api.mistral.ai/v1/chat/completions`.
    pub endpoint: String,
    pub api_key: SecretString,
    pub text_model: String,
    pub image_model: String,
}

pub struct MistralModerator {
    client: Client,
    settings: MistralSettings,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentVerdict {
    is_appropriate: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Lowercased words of `text`, joined by single spaces and padded, so that
/// a padded phrase can be searched on word boundaries.
fn normalized_words(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    format!(" {} ", words.join(" "))
}

pub fn contains_blocked_term(text: &str) -> bool {
    let haystack = normalized_words(text);
    BLOCKED_TERMS
        .iter()
        .any(|term| haystack.contains(&format!(" {term} ")))
}

fn text_system_prompt() -> String {
    format!(
        "Eres un filtro de contenido. Analiza el texto del usuario y determina si contiene:\n\
         1. Palabras de esta lista: {}\n\
         2. Variaciones creativas (ej: \"s1ng4\", \"m4m4g3v0\")\n\
         3. Insultos similares no listados\n\
         4. Cualquier contenido ofensivo o inapropiado.\n\
         Responde SOLO con un JSON válido: {{ \"isAppropriate\": boolean }} \
         donde false = contenido inapropiado detectado, true = texto limpio.",
        PROMPT_TERMS.join(", ")
    )
}

impl MistralModerator {
    pub fn new(settings: MistralSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    /// Posts one chat completion in JSON mode and returns the assistant's content.
    async fn complete(&self, model: &str, messages: Value) -> anyhow::Result<String> {
        let body = json!({
            "model": model,
            "messages": messages,
            "response_format": { "type": "json_object" },
            "temperature": 0,
        });

        let response = self
            .client
            .post(&self.settings.endpoint)
            .bearer_auth(self.settings.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .context("moderation request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "moderation API returned error: {} - {}",
                response.status(),
                response.text().await?
            ));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("moderation API returned no choices"))
    }
}

/// Reads the model's answer for a text check. Unparsable answers count as
/// inappropriate.
fn text_verdict(content: &str) -> ModerationVerdict {
    match serde_json::from_str::<ContentVerdict>(content) {
        Ok(verdict) if verdict.is_appropriate => ModerationVerdict::approved(),
        Ok(_) => ModerationVerdict::rejected(TEXT_REJECTED),
        Err(err) => {
            warn!(error = %err, "unparsable moderation answer");
            ModerationVerdict::rejected(TEXT_REJECTED)
        }
    }
}

/// Reads the model's answer for an image check. Unparsable answers are errors.
fn image_verdict(content: &str) -> anyhow::Result<ModerationVerdict> {
    let verdict: ContentVerdict =
        serde_json::from_str(content).context("invalid response from image moderation")?;
    if verdict.is_appropriate {
        return Ok(ModerationVerdict::approved());
    }
    debug!(reason = verdict.description.as_deref().unwrap_or(""), "image rejected");
    Ok(ModerationVerdict::rejected(IMAGE_REJECTED))
}

#[async_trait]
impl ContentModerator for MistralModerator {
    async fn validate_text(&self, text: &str) -> anyhow::Result<ModerationVerdict> {
        if text.trim().is_empty() {
            return Ok(ModerationVerdict::approved());
        }
        if contains_blocked_term(text) {
            debug!("text rejected by local term list");
            return Ok(ModerationVerdict::rejected(TEXT_REJECTED));
        }

        let messages = json!([
            { "role": "system", "content": text_system_prompt() },
            { "role": "user", "content": text },
        ]);
        let content = self.complete(&self.settings.text_model, messages).await?;
        Ok(text_verdict(&content))
    }

    async fn validate_image(&self, image: &ImageUpload) -> anyhow::Result<ModerationVerdict> {
        let mime = image
            .content_type()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| "image/jpeg".to_string());
        let encoded = base64::engine::general_purpose::STANDARD.encode(&image.bytes);

        let messages = json!([
            { "role": "system", "content": IMAGE_SYSTEM_PROMPT },
            {
                "role": "user",
                "content": [
                    { "type": "text", "text": "Analyze this image for inappropriate content." },
                    { "type": "image_url", "image_url": format!("data:{mime};base64,{encoded}") },
                ],
            },
        ]);
        let content = self.complete(&self.settings.image_model, messages).await?;
        image_verdict(&content)
    }
}
