//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use replyr::credentials::StaticCredentials;
use replyr::domain::{Category, Comment, Integration, Plan, Platform, Policy, RawComment, Response, Tenant};
use replyr::id::now_ms;
use replyr::pipeline::{PipelineConfig, RunPipeline};
use replyr::ports::{MockClassifier, MockResponder, MockSource, MockSourceConnector};
use replyr::source::SourceRegistry;
use replyr::storage::{SqliteStore, Store};
use tempfile::TempDir;

pub const TENANT: &str = "tenant-1";
pub const INTEGRATION: &str = "int-1";

pub struct Fixture {
    pub dir: TempDir,
    pub store: Arc<SqliteStore>,
    pub source: Arc<MockSource>,
    pub classifier: Arc<MockClassifier>,
    pub responder: Arc<MockResponder>,
    pub pipeline: Arc<RunPipeline>,
}

pub struct FixtureBuilder {
    plan_cap: u32,
    policy: Policy,
    comments: Vec<RawComment>,
    source: Option<MockSource>,
    config: PipelineConfig,
}

impl FixtureBuilder {
    pub fn new() -> Self {
        Self {
            plan_cap: 100,
            policy: Policy::default(),
            comments: Vec::new(),
            source: None,
            config: PipelineConfig::default().with_send_interval(Duration::ZERO),
        }
    }

    pub fn plan_cap(mut self, cap: u32) -> Self {
        self.plan_cap = cap;
        self
    }

    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn comments(mut self, comments: Vec<RawComment>) -> Self {
        self.comments = comments;
        self
    }

    /// Replace the default source; its comments win over `comments`
    pub fn source(mut self, source: MockSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path()).unwrap());
        store
            .upsert_tenant(&Tenant::new(TENANT, Some(Plan::new("pro", self.plan_cap))))
            .unwrap();
        store
            .create_integration(&Integration::new(TENANT, Platform::Youtube, "UC-channel").with_id(INTEGRATION))
            .unwrap();
        store.save_policy(INTEGRATION, &self.policy).unwrap();

        let source = Arc::new(
            self.source
                .unwrap_or_else(|| MockSource::new().with_comments(self.comments)),
        );
        let classifier = Arc::new(
            MockClassifier::new()
                .with_rule("buy followers", Category::Spam)
                .with_rule("idiot", Category::Offensive)
                .with_rule("?", Category::Question)
                .with_default(Category::Praise),
        );
        let responder = Arc::new(MockResponder::new().with_text("Thank you!"));

        let registry = SourceRegistry::new().with(Arc::new(MockSourceConnector::new(Platform::Youtube, source.clone())));
        let pipeline = Arc::new(RunPipeline::new(
            store.clone(),
            Arc::new(StaticCredentials::new("test-token")),
            Arc::new(registry),
            classifier.clone(),
            responder.clone(),
            self.config,
        ));

        Fixture {
            dir,
            store,
            source,
            classifier,
            responder,
            pipeline,
        }
    }
}

pub fn comment(external_id: &str, text: &str) -> RawComment {
    RawComment::new(external_id, text).with_author("viewer")
}

/// `n` distinct harmless comments with ids `{prefix}-0..n`
pub fn praise(prefix: &str, n: usize) -> Vec<RawComment> {
    (0..n)
        .map(|i| comment(&format!("{}-{}", prefix, i), "great video"))
        .collect()
}

/// Seed `n` responses already sent now, as if by an earlier run
pub fn seed_sent(store: &SqliteStore, integration_id: &str, n: usize) {
    for i in 0..n {
        let raw = comment(&format!("seeded-{}-{}", integration_id, i), "old comment");
        let c = Comment::from_raw(integration_id, &raw, Some(Category::Praise));
        let mut r = Response::sending(&c.id, "old reply", None, 0);
        r.mark_sent(now_ms()).unwrap();
        store.record_comment(&c, &r).unwrap();
    }
}
