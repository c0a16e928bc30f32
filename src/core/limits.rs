//! Per-stage limits for pipeline runs.
//!
//! The scheduler cannot cancel a job, so every outbound capability call is
//! bounded here instead.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeouts, pacing and size bounds applied by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineLimits {
    /// Translation call timeout (default: 30s)
    #[serde(default = "default_translate_timeout")]
    pub translate_timeout_seconds: u64,

    /// Document search timeout (default: 60s)
    #[serde(default = "default_retrieve_timeout")]
    pub retrieve_timeout_seconds: u64,

    /// Per-document fetch timeout (default: 60s)
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,

    /// Pause between sequential fetches (default: 1000ms)
    #[serde(default = "default_fetch_delay")]
    pub fetch_delay_ms: u64,

    /// Per-document extraction timeout (default: 15s)
    #[serde(default = "default_extract_timeout")]
    pub extract_timeout_seconds: u64,

    /// Pages read per document during extraction (default: 5)
    #[serde(default = "default_max_pages")]
    pub extract_max_pages: u32,

    /// Generation call timeout (default: 120s)
    #[serde(default = "default_generate_timeout")]
    pub generate_timeout_seconds: u64,

    /// Token budget passed to the generator (default: 4000)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Longest error text persisted on a failed project (default: 100 chars)
    #[serde(default = "default_max_error_chars")]
    pub max_error_chars: usize,
}

fn default_translate_timeout() -> u64 {
    30
}
fn default_retrieve_timeout() -> u64 {
    60
}
fn default_fetch_timeout() -> u64 {
    60
}
fn default_fetch_delay() -> u64 {
    1000
}
fn default_extract_timeout() -> u64 {
    15
}
fn default_max_pages() -> u32 {
    5
}
fn default_generate_timeout() -> u64 {
    120
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_max_error_chars() -> usize {
    100
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self {
            translate_timeout_seconds: default_translate_timeout(),
            retrieve_timeout_seconds: default_retrieve_timeout(),
            fetch_timeout_seconds: default_fetch_timeout(),
            fetch_delay_ms: default_fetch_delay(),
            extract_timeout_seconds: default_extract_timeout(),
            extract_max_pages: default_max_pages(),
            generate_timeout_seconds: default_generate_timeout(),
            max_tokens: default_max_tokens(),
            max_error_chars: default_max_error_chars(),
        }
    }
}

impl PipelineLimits {
    pub fn translate_timeout(&self) -> Duration {
        Duration::from_secs(self.translate_timeout_seconds)
    }

    pub fn retrieve_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieve_timeout_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn fetch_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_delay_ms)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_seconds)
    }

    pub fn generate_timeout(&self) -> Duration {
        Duration::from_secs(self.generate_timeout_seconds)
    }

    /// Cut `message` to at most `max_error_chars` characters
    pub fn bound_error(&self, message: &str) -> String {
        truncate_chars(message, self.max_error_chars)
    }
}

/// Truncate on a character boundary, marking the cut with an ellipsis
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = PipelineLimits::default();
        assert_eq!(limits.fetch_timeout(), Duration::from_secs(60));
        assert_eq!(limits.extract_timeout(), Duration::from_secs(15));
        assert_eq!(limits.fetch_delay(), Duration::from_secs(1));
        assert_eq!(limits.extract_max_pages, 5);
        assert_eq!(limits.max_tokens, 4000);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let limits: PipelineLimits = serde_yaml::from_str("fetch_delay_ms: 0\nmax_tokens: 100\n").unwrap();
        assert_eq!(limits.fetch_delay_ms, 0);
        assert_eq!(limits.max_tokens, 100);
        assert_eq!(limits.generate_timeout_seconds, 120);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 3), "abc…");
        // Multi-byte characters are never split
        assert_eq!(truncate_chars("论文下载失败", 2), "论文…");
    }
}
