
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::Result;

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// How conversation history carries over between questions and chain rebuilds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemoryPolicy {
    /// History is fed to the model and survives configuration changes
    #[default]
    Persist,
    /// History is cleared whenever the chain is rebuilt
    ResetOnRebuild,
    /// Every question is answered on its own; the transcript is still kept
    Stateless,
}

impl MemoryPolicy {
    /// Whether prior turns are included in the prompt
    #[inline]
    pub fn feeds_history(self) -> bool {
        !matches!(self, Self::Stateless)
    }
}

impl fmt::Display for MemoryPolicy {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Persist => write!(f, "persist"),
            Self::ResetOnRebuild => write!(f, "reset-on-rebuild"),
            Self::Stateless => write!(f, "stateless"),
        }
    }
}

/// Ordered transcript of one conversation, owned by its caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationSession {
    messages: Vec<ChatMessage>,
    policy: MemoryPolicy,
}

impl ConversationSession {
    #[inline]
    pub fn new(policy: MemoryPolicy) -> Self {
        Self {
            messages: Vec::new(),
            policy,
        }
    }

    #[inline]
    pub fn policy(&self) -> MemoryPolicy {
        self.policy
    }

    #[inline]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Prior turns to include in the next prompt
    #[inline]
    pub fn history(&self) -> &[ChatMessage] {
        if self.policy.feeds_history() {
            &self.messages
        } else {
            &[]
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[inline]
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    #[inline]
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    #[inline]
    pub fn clear(&mut self) {
        debug!("Clearing {} conversation messages", self.messages.len());
        self.messages.clear();
    }

    /// Transcript as a pretty-printed JSON array of `{role, content}` records
    #[inline]
    pub fn export_json(&self) -> Result<String> {
        let json = serde_json::to_string_pretty(&self.messages)
            .context("Failed to serialize conversation")?;
        Ok(json)
    }

    #[inline]
    pub fn export_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = self.export_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write conversation to {}", path.display()))?;
        debug!("Exported {} messages to {}", self.messages.len(), path.display());
        Ok(())
    }
}
