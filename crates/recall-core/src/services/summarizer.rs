//! Type-aware summarization of long memories.
//!
//! Summaries never fail: any provider error, empty reply, or a reply that is
//! not shorter than the input yields the original content.

use std::sync::Arc;

use recall_llm::TextCompleter;
use recall_models::MemoryType;
use tracing::{debug, warn};

/// Character count above which content is summarized.
pub const DEFAULT_SUMMARIZE_THRESHOLD: usize = 200;

/// Whether `content` is long enough to summarize with the default threshold.
pub fn should_summarize(content: &str) -> bool {
    content.chars().count() > DEFAULT_SUMMARIZE_THRESHOLD
}

fn system_prompt(memory_type: MemoryType) -> &'static str {
    match memory_type {
        MemoryType::Personal => {
            "Condense this personal information about the user into a short factual \
             statement. Keep names, relationships, roles, places and dates exactly. \
             Use at most 100 words. Reply with the summary only."
        }
        MemoryType::Preference => {
            "Condense this description of the user's preferences into a short statement \
             of what they like, dislike or prefer, and why if stated. Use at most 100 \
             words. Reply with the summary only."
        }
        MemoryType::Technical => {
            "Condense this technical information into a short statement. Keep tool, \
             language, framework and version names, configuration values and constraints \
             exactly. Use at most 100 words. Reply with the summary only."
        }
        MemoryType::Project => {
            "Condense this project information into a short statement. Keep the project \
             name, goals, deadlines, milestones and people involved. Use at most 100 \
             words. Reply with the summary only."
        }
        MemoryType::General => {
            "Summarize the following information in a concise way, keeping the key facts. \
             Use at most 100 words. Reply with the summary only."
        }
    }
}

/// Summarizes memory content through an injected completion provider.
#[derive(Clone)]
pub struct Summarizer {
    completer: Option<Arc<dyn TextCompleter>>,
    threshold: usize,
}

impl Summarizer {
    pub fn new(completer: Arc<dyn TextCompleter>) -> Self {
        Self {
            completer: Some(completer),
            threshold: DEFAULT_SUMMARIZE_THRESHOLD,
        }
    }

    /// A summarizer that always returns its input.
    pub fn disabled() -> Self {
        Self {
            completer: None,
            threshold: DEFAULT_SUMMARIZE_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.completer.is_some()
    }

    /// Whether `content` exceeds this summarizer's threshold.
    pub fn should_summarize(&self, content: &str) -> bool {
        content.chars().count() > self.threshold
    }

    pub async fn summarize_memory(&self, content: &str) -> String {
        self.summarize_memory_with_type(content, MemoryType::General)
            .await
    }

    pub async fn summarize_memory_with_type(&self, content: &str, memory_type: MemoryType) -> String {
        let Some(completer) = &self.completer else {
            return content.to_string();
        };

        match completer.complete(system_prompt(memory_type), content).await {
            Ok(reply) => {
                let summary = reply.trim();
                if summary.is_empty() {
                    debug!("Empty summary, keeping original content");
                    return content.to_string();
                }
                if summary.chars().count() >= content.chars().count() {
                    debug!("Summary not shorter than original, keeping original content");
                    return content.to_string();
                }
                summary.to_string()
            }
            Err(e) => {
                warn!(error = %e, memory_type = %memory_type, "Summarization failed, keeping original content");
                metrics::counter!("recall_provider_failures_total", "provider" => "llm").increment(1);
                content.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Canned {
        reply: recall_llm::Result<String>,
        seen: Mutex<Vec<String>>,
    }

    impl Canned {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(recall_llm::Error::NoProviders),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextCompleter for Canned {
        async fn complete(&self, system_prompt: &str, _user_content: &str) -> recall_llm::Result<String> {
            self.seen.lock().unwrap().push(system_prompt.to_string());
            match &self.reply {
                Ok(r) => Ok(r.clone()),
                Err(_) => Err(recall_llm::Error::Llm("down".into())),
            }
        }
    }

    fn long_text() -> String {
        "The quarterly planning notes cover many details. ".repeat(6)
    }

    #[test]
    fn test_should_summarize_boundary() {
        assert!(!should_summarize(&"a".repeat(200)));
        assert!(should_summarize(&"a".repeat(201)));
        // Characters, not bytes.
        assert!(!should_summarize(&"é".repeat(200)));
    }

    #[tokio::test]
    async fn test_summary_replaces_long_content() {
        let completer = Canned::ok("  Planning notes.  ");
        let summarizer = Summarizer::new(completer.clone());

        let out = summarizer
            .summarize_memory_with_type(&long_text(), MemoryType::Project)
            .await;

        assert_eq!(out, "Planning notes.");
        let prompts = completer.seen.lock().unwrap();
        assert!(prompts[0].contains("project"));
    }

    #[tokio::test]
    async fn test_failure_returns_original() {
        let summarizer = Summarizer::new(Canned::failing());
        let text = long_text();
        assert_eq!(summarizer.summarize_memory(&text).await, text);
    }

    #[tokio::test]
    async fn test_empty_or_longer_reply_returns_original() {
        let text = long_text();

        let empty = Summarizer::new(Canned::ok("   "));
        assert_eq!(empty.summarize_memory(&text).await, text);

        let longer = Summarizer::new(Canned::ok(&format!("{text} and more")));
        assert_eq!(longer.summarize_memory(&text).await, text);
    }

    #[tokio::test]
    async fn test_disabled_is_identity() {
        let summarizer = Summarizer::disabled().with_threshold(10);
        assert!(!summarizer.is_enabled());
        assert!(summarizer.should_summarize("more than ten chars"));
        assert_eq!(summarizer.summarize_memory("abc").await, "abc");
    }

    #[test]
    fn test_every_type_has_a_prompt() {
        for t in MemoryType::all() {
            assert!(system_prompt(*t).contains("100 words"));
        }
    }
}
