//! Worker pool and conversation settings from environment variables.

use crate::application::optimization::ConversationConfig;
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Dispatch environment configuration
#[derive(Debug, Clone)]
pub struct DispatchEnvConfig {
    pub worker_count: usize,
    pub reply_timeout_ms: u64,
    pub attempts: u32,
    /// `None` when MAX_REASSIGNMENTS is `unbounded`
    pub max_reassignments: Option<usize>,
    pub processing_delay_ms: u64,
    pub bus_capacity: usize,
}

impl Default for DispatchEnvConfig {
    fn default() -> Self {
        let conversation = ConversationConfig::default();
        Self {
            worker_count: 2,
            reply_timeout_ms: conversation.reply_timeout.as_millis() as u64,
            attempts: conversation.attempts,
            max_reassignments: conversation.max_reassignments,
            processing_delay_ms: 0,
            bus_capacity: 256,
        }
    }
}

impl DispatchEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let worker_count = Self::parse_u64("WORKER_COUNT", defaults.worker_count as u64)? as usize;
        if worker_count == 0 {
            anyhow::bail!("WORKER_COUNT must be at least 1");
        }

        let max_reassignments = match env::var("MAX_REASSIGNMENTS") {
            Ok(value) if value.trim().eq_ignore_ascii_case("unbounded") => None,
            Ok(value) => Some(
                value
                    .trim()
                    .parse::<usize>()
                    .context("Failed to parse MAX_REASSIGNMENTS")?,
            ),
            Err(_) => defaults.max_reassignments,
        };

        Ok(Self {
            worker_count,
            reply_timeout_ms: Self::parse_u64("REPLY_TIMEOUT_MS", defaults.reply_timeout_ms)?,
            attempts: Self::parse_u64("REPLY_ATTEMPTS", defaults.attempts as u64)? as u32,
            max_reassignments,
            processing_delay_ms: Self::parse_u64(
                "WORKER_PROCESSING_DELAY_MS",
                defaults.processing_delay_ms,
            )?,
            bus_capacity: Self::parse_u64("BUS_CAPACITY", defaults.bus_capacity as u64)? as usize,
        })
    }

    pub fn conversation_config(&self) -> ConversationConfig {
        ConversationConfig {
            reply_timeout: Duration::from_millis(self.reply_timeout_ms),
            attempts: self.attempts.max(1),
            max_reassignments: self.max_reassignments,
        }
    }

    pub fn processing_delay(&self) -> Duration {
        Duration::from_millis(self.processing_delay_ms)
    }

    fn parse_u64(key: &str, default: u64) -> Result<u64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<u64>()
            .context(format!("Failed to parse {}", key))
    }
}
