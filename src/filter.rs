//! Policy filter: the single authority on whether a comment is processed.

use crate::domain::{Category, Policy};

/// Why a candidate is not answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Matched a blacklist term; discarded without a record
    Blacklisted(String),
    /// Category configured to be skipped; recorded as a skipped response
    Category(Category),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Process,
    Skip(SkipReason),
}

/// Pure function of (text, category, policy)
pub struct PolicyFilter<'a> {
    policy: &'a Policy,
    blacklist: Vec<String>,
}

impl<'a> PolicyFilter<'a> {
    pub fn new(policy: &'a Policy) -> Self {
        let blacklist = policy
            .blacklist
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { policy, blacklist }
    }

    /// Screen raw text before it is classified
    pub fn check_text(&self, text: &str) -> Decision {
        match self.blacklisted_term(text) {
            Some(term) => Decision::Skip(SkipReason::Blacklisted(term.to_string())),
            None => Decision::Process,
        }
    }

    /// Full decision for a classified comment: blacklist first, then the
    /// category skip flags.
    pub fn decide(&self, text: &str, category: Category) -> Decision {
        match self.check_text(text) {
            Decision::Process => self.check_category(category),
            skip => skip,
        }
    }

    fn check_category(&self, category: Category) -> Decision {
        if self.skips_category(category) {
            Decision::Skip(SkipReason::Category(category))
        } else {
            Decision::Process
        }
    }

    /// First blacklist term found as a case-insensitive substring of `text`
    fn blacklisted_term(&self, text: &str) -> Option<&str> {
        let lowered = text.to_lowercase();
        self.blacklist
            .iter()
            .find(|term| lowered.contains(term.as_str()))
            .map(String::as_str)
    }

    fn skips_category(&self, category: Category) -> bool {
        let p = self.policy;
        match category {
            Category::Spam => p.skip_spam,
            Category::Offensive => p.skip_offensive,
            Category::Praise => !p.respond_to_praise,
            Category::Question => !p.respond_to_questions,
            Category::Neutral => !p.respond_to_neutral,
            Category::Criticism => !p.respond_to_criticism,
            Category::Disagreement | Category::ContentRequest => false,
        }
    }
}
