//! Generation port: the capability interface for producing automated
//! responses, with a deterministic canned fallback.
//!
//! The real implementation (a language-model call behind a router) is a
//! collaborator outside this crate. Callers must treat every call as
//! fallible and mask failures with [`fallback_response`]; a generation
//! failure never blocks a round.

use async_trait::async_trait;

use crate::domain::{Identity, Personality};

/// What the generation port gets to see besides the prompt
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    /// 1-based round number
    pub round: u32,
    /// Rounds in the match
    pub total_rounds: u32,
    /// Responses already visible in the round, in identity order
    pub prior_responses: Vec<String>,
}

/// Capability interface for text generation
#[async_trait]
pub trait GenerationPort: Send + Sync {
    /// Produce a response in the given personality. May fail or time out;
    /// the caller falls back to a canned response.
    async fn generate(
        &self,
        personality: Personality,
        prompt: &str,
        context: &GenerationContext,
    ) -> anyhow::Result<String>;
}

/// Deterministic personality-tagged response used when the port fails,
/// times out, or is absent.
pub fn fallback_response(personality: Personality, prompt: &str) -> String {
    let topic: String = prompt
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .chars()
        .take(40)
        .collect();
    match personality {
        Personality::Analyst => {
            format!("Objectively speaking, \"{}\" has exactly one defensible answer.", topic)
        }
        Personality::Comedian => {
            format!("\"{}\"? I have a bit about this, but it needs a drummer.", topic)
        }
        Personality::Skeptic => "Hard to care about this one, honestly.".to_string(),
        Personality::Rambler => format!(
            "Funny story, this reminds me of something else entirely, but to answer \"{}\": it depends.",
            topic
        ),
        Personality::Enthusiast => {
            format!("Oh I LOVE this question. \"{}\" is basically my whole thing.", topic)
        }
    }
}

/// Call the port with a timeout, masking every failure with the canned
/// fallback. Returns the text and whether the fallback was used.
pub async fn generate_with_fallback(
    port: Option<&dyn GenerationPort>,
    timeout: std::time::Duration,
    personality: Personality,
    prompt: &str,
    context: &GenerationContext,
) -> (String, bool) {
    let Some(port) = port else {
        return (fallback_response(personality, prompt), true);
    };

    match tokio::time::timeout(timeout, port.generate(personality, prompt, context)).await {
        Ok(Ok(text)) => (text, false),
        Ok(Err(e)) => {
            tracing::warn!(personality = %personality, "generation failed, using fallback: {}", e);
            (fallback_response(personality, prompt), true)
        }
        Err(_) => {
            tracing::warn!(personality = %personality, "generation timed out, using fallback");
            (fallback_response(personality, prompt), true)
        }
    }
}

/// Port implementation backed entirely by the canned fallback table.
///
/// Used by tests and the local simulation driver.
pub struct CannedGenerator;

#[async_trait]
impl GenerationPort for CannedGenerator {
    async fn generate(
        &self,
        personality: Personality,
        prompt: &str,
        _context: &GenerationContext,
    ) -> anyhow::Result<String> {
        Ok(fallback_response(personality, prompt))
    }
}

/// Port implementation that always fails, for exercising fallback paths.
pub struct FailingGenerator;

#[async_trait]
impl GenerationPort for FailingGenerator {
    async fn generate(
        &self,
        _personality: Personality,
        _prompt: &str,
        _context: &GenerationContext,
    ) -> anyhow::Result<String> {
        anyhow::bail!("generation upstream unavailable")
    }
}

/// Build the full prompt handed to a real generation backend
pub fn build_generation_prompt(
    identity: Identity,
    personality: Personality,
    prompt: &str,
    context: &GenerationContext,
) -> String {
    format!(
        "You are player {} in round {} of {}. {}\nQuestion: {}",
        identity,
        context.round,
        context.total_rounds,
        personality.style(),
        prompt
    )
}
