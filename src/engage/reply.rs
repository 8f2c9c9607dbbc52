// Reply stage
//
// One provider call per mention, in the persona's voice. The draft goes
// through the same cleanup and length limit as an approved post.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use super::Responder;
use crate::config::Persona;
use crate::providers::{LlmProvider, Message, ProviderRequest};
use crate::publish::Mention;
use crate::review::extract_artifact;

pub struct ReplyStage {
    provider: Arc<dyn LlmProvider>,
    persona: Arc<Persona>,
    model: String,
    char_limit: usize,
    max_tokens: u32,
    temperature: f32,
}

impl ReplyStage {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        persona: Arc<Persona>,
        model: impl Into<String>,
        char_limit: usize,
    ) -> Self {
        Self {
            provider,
            persona,
            model: model.into(),
            char_limit,
            max_tokens: crate::config::constants::DEFAULT_MAX_TOKENS,
            temperature: crate::config::constants::DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are {name} ({handle}) replying to someone who mentioned you.\n\n\
             {persona}\n\
             Reply as yourself, not as an assistant:\n\
             1. Answer what they actually said, drawing on real experience only\n\
             2. Be conversational and useful; one concrete detail beats three adjectives\n\
             3. No generic thanks, no self-promotion, no invented projects or credentials\n\
             4. Stay within your areas of expertise; say so briefly if the question is outside them\n\
             5. At most {limit} characters, no hashtags unless they asked about one\n\n\
             Respond with ONLY the reply text.",
            name = self.persona.name,
            handle = self.persona.handle,
            persona = self.persona.to_system_block(),
            limit = self.char_limit,
        )
    }

    fn user_prompt(mention: &Mention, parent: Option<&str>) -> String {
        format!(
            "YOUR EARLIER POST: {parent}\n\n\
             MENTION FROM {author}:\n\"{text}\"\n\n\
             Reply:",
            parent = parent.unwrap_or("Not available"),
            author = mention.author_handle(),
            text = mention.text,
        )
    }
}

#[async_trait]
impl Responder for ReplyStage {
    async fn respond(&self, mention: &Mention, parent: Option<&str>) -> Result<String> {
        let request = ProviderRequest::new(vec![Message::user(Self::user_prompt(mention, parent))])
            .with_model(self.model.clone())
            .with_system(self.system_prompt())
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);

        let started = Instant::now();
        let response = self
            .provider
            .send_message(&request)
            .await
            .with_context(|| format!("Reply request for mention {} failed", mention.id))?;
        crate::metrics::record_stage_duration("reply", started.elapsed().as_secs_f64());

        extract_artifact(&response.text, self.char_limit)
            .with_context(|| format!("No usable reply drafted for mention {}", mention.id))
    }
}
