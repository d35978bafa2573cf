//! Request classifier — decides which [`Category`] a turn belongs to so the
//! router can pick a provider/tier for it (spec §4.G/§4.M).
//!
//! Kept as its own module so the regex set and the memoisation cache can be
//! unit-tested without dragging in any provider wiring.

use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use regex::Regex;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Routine,
    Summarization,
    Reasoning,
    Coding,
    Safety,
    Persona,
}

const CACHE_CAPACITY: usize = 256;
const CACHE_TTL: Duration = Duration::from_secs(300);
const SHORT_TEXT_CHARS: usize = 100;

static GREETING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(hi|hello|hey|yo|sup|good (morning|afternoon|evening)|howdy)[\s!.,]*$")
        .unwrap()
});

static CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        ```
        | \b(fn|def|class|impl|struct|import|const|let\s+mut|function|interface)\b
        | \.(rs|py|js|ts|tsx|jsx|go|rb|java|c|cpp|h|hpp|toml|yaml|yml|json|sql)\b
        | \b(stack\s*trace|traceback|compile\s*error|segfault|null\s*pointer|exception)\b
        ",
    )
    .unwrap()
});

static SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(summariz|summaris|tl;?dr|recap|action items?|game\s*plan|outline a plan|step[- ]by[- ]step plan)\w*\b")
        .unwrap()
});

/// Hook for the optional fifth cascade stage — a one-shot, ≤10-token
/// classification call against a fast/cheap model. Not wired to any
/// provider by default; callers that have a fast model available can
/// supply one via [`Classifier::with_fast_classifier`].
#[async_trait]
pub trait FastClassifier: Send + Sync {
    async fn classify_hint(&self, text: &str) -> Option<Category>;
}

/// Cascaded classifier with a size-bounded, TTL-expiring memoisation cache
/// keyed by a hash of the normalised input text (spec §4.G).
pub struct Classifier {
    cache: Mutex<LruCache<u64, (Category, Instant)>>,
    fast: Option<Box<dyn FastClassifier>>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(CACHE_CAPACITY).unwrap())),
            fast: None,
        }
    }

    pub fn with_fast_classifier(fast: Box<dyn FastClassifier>) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(CACHE_CAPACITY).unwrap())),
            fast: Some(fast),
        }
    }

    pub async fn classify(&self, text: &str) -> Category {
        let key = normalized_hash(text);

        {
            let mut cache = self.cache.lock().await;
            if let Some((category, cached_at)) = cache.get(&key) {
                if cached_at.elapsed() < CACHE_TTL {
                    return *category;
                }
            }
        }

        let category = self.classify_uncached(text).await;

        let mut cache = self.cache.lock().await;
        cache.put(key, (category, Instant::now()));
        category
    }

    async fn classify_uncached(&self, text: &str) -> Category {
        if GREETING_RE.is_match(text) {
            return Category::Routine;
        }
        if CODE_RE.is_match(text) {
            return Category::Coding;
        }
        if SUMMARY_RE.is_match(text) {
            return Category::Summarization;
        }
        if text.chars().count() < SHORT_TEXT_CHARS {
            return Category::Routine;
        }
        if let Some(fast) = &self.fast {
            if let Some(hint) = fast.classify_hint(text).await {
                return hint;
            }
        }
        Category::Routine
    }
}

fn normalized_hash(text: &str) -> u64 {
    let normalized: String = text
        .trim()
        .chars()
        .flat_map(|c| c.to_lowercase())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    normalized.hash(&mut hasher);
    hasher.finish()
}

/// Approximate input token count used by the routing matrix: char-sum / 4.
pub fn approx_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn greeting_is_routine() {
        let c = Classifier::new();
        assert_eq!(c.classify("hello!").await, Category::Routine);
        assert_eq!(c.classify("Good morning").await, Category::Routine);
    }

    #[tokio::test]
    async fn code_fence_is_coding() {
        let c = Classifier::new();
        let text = "why does this fail?\n```rust\nfn main() {}\n```";
        assert_eq!(c.classify(text).await, Category::Coding);
    }

    #[tokio::test]
    async fn file_extension_signal_is_coding() {
        let c = Classifier::new();
        assert_eq!(
            c.classify("can you review main.rs for me").await,
            Category::Coding
        );
    }

    #[tokio::test]
    async fn summary_keyword_is_summarization() {
        let c = Classifier::new();
        let long_enough = "please summarize the last ten messages in this conversation thread";
        assert_eq!(c.classify(long_enough).await, Category::Summarization);
    }

    #[tokio::test]
    async fn short_text_without_signals_is_routine() {
        let c = Classifier::new();
        assert_eq!(c.classify("what time is it").await, Category::Routine);
    }

    #[tokio::test]
    async fn long_text_without_signals_falls_back_to_routine_without_fast_classifier() {
        let c = Classifier::new();
        let long = "a".repeat(200);
        assert_eq!(c.classify(&long).await, Category::Routine);
    }

    #[tokio::test]
    async fn fast_classifier_hint_is_used_when_cascade_is_inconclusive() {
        struct AlwaysReasoning;
        #[async_trait]
        impl FastClassifier for AlwaysReasoning {
            async fn classify_hint(&self, _text: &str) -> Option<Category> {
                Some(Category::Reasoning)
            }
        }
        let c = Classifier::with_fast_classifier(Box::new(AlwaysReasoning));
        let long = "a".repeat(200);
        assert_eq!(c.classify(&long).await, Category::Reasoning);
    }

    #[tokio::test]
    async fn result_is_memoised() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        struct CountingClassifier {
            calls: Arc<AtomicU32>,
        }
        #[async_trait]
        impl FastClassifier for CountingClassifier {
            async fn classify_hint(&self, _text: &str) -> Option<Category> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Some(Category::Persona)
            }
        }
        let calls = Arc::new(AtomicU32::new(0));
        let c = Classifier::with_fast_classifier(Box::new(CountingClassifier {
            calls: calls.clone(),
        }));
        let long = "b".repeat(200);
        assert_eq!(c.classify(&long).await, Category::Persona);
        assert_eq!(c.classify(&long).await, Category::Persona);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn approx_tokens_divides_by_four() {
        assert_eq!(approx_tokens(&"a".repeat(400)), 100);
    }
}
