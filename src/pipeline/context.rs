// Generation context
//
// Named text fields that accumulate as stages run, plus the reviewer
// feedback (if any) that drives revision mode. Fields can be added but never
// replaced or removed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::calendar::ContentPlan;

/// Seed field keys
pub const TOPIC: &str = "topic";
pub const CATEGORY: &str = "category";
pub const THEME: &str = "theme";
pub const TRENDS: &str = "trends";
pub const THREAD: &str = "thread";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context field '{0}' is already set")]
    DuplicateKey(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationContext {
    fields: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    feedback: Option<String>,
}

impl GenerationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed context for a calendar plan (trends are attached separately)
    pub fn from_plan(plan: &ContentPlan) -> Self {
        let mut ctx = Self::new()
            .with_field(TOPIC, plan.topic.clone())
            .with_field(CATEGORY, plan.category.as_str())
            .with_field(THEME, plan.theme.clone());
        if plan.is_thread {
            ctx = ctx.with_field(THREAD, "true");
        }
        ctx
    }

    /// Add a field; fails if `key` is already present
    pub fn attach(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), ContextError> {
        let key = key.into();
        if self.fields.contains_key(&key) {
            return Err(ContextError::DuplicateKey(key));
        }
        self.fields.insert(key, value.into());
        Ok(())
    }

    /// Builder form of `attach` for seed construction; a repeated key keeps
    /// the first value.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.entry(key.into()).or_insert_with(|| value.into());
        self
    }

    /// Copy of this context carrying `feedback` for the next attempt
    pub fn with_feedback(&self, feedback: Option<String>) -> Self {
        Self {
            fields: self.fields.clone(),
            feedback,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
