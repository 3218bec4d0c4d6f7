//! Comment classification capability

use crate::domain::Category;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Maps comment text to a canonical category.
///
/// Implementations are infallible from the caller's point of view: any
/// internal failure yields `Category::Neutral`.
#[async_trait]
pub trait ClassifierPort: Send + Sync {
    async fn classify(&self, text: &str) -> Category;
}

/// Keyword classifier for tests
pub struct MockClassifier {
    rules: Vec<(String, Category)>,
    default: Category,
    calls: AtomicUsize,
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default: Category::Neutral,
            calls: AtomicUsize::new(0),
        }
    }
}

impl MockClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Texts containing `keyword` (case-insensitive) get `category`
    pub fn with_rule(mut self, keyword: &str, category: Category) -> Self {
        self.rules.push((keyword.to_lowercase(), category));
        self
    }

    pub fn with_default(mut self, category: Category) -> Self {
        self.default = category;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClassifierPort for MockClassifier {
    async fn classify(&self, text: &str) -> Category {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lowered = text.to_lowercase();
        self.rules
            .iter()
            .find(|(keyword, _)| lowered.contains(keyword.as_str()))
            .map(|(_, category)| *category)
            .unwrap_or(self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_rules_and_default() {
        let classifier = MockClassifier::new()
            .with_rule("buy now", Category::Spam)
            .with_rule("?", Category::Question);

        assert_eq!(classifier.classify("BUY NOW cheap").await, Category::Spam);
        assert_eq!(classifier.classify("how?").await, Category::Question);
        assert_eq!(classifier.classify("ok").await, Category::Neutral);
        assert_eq!(classifier.calls(), 3);
    }
}
