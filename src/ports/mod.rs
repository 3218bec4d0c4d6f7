//! Injected capabilities
//!
//! The pipeline never talks to a concrete platform or model. Each external
//! capability is an `Arc<dyn Trait>` chosen at wiring time:
//! - `SourcePort` / `SourceConnector`: fetch comments and post replies
//! - `ClassifierPort`: text -> `Category`
//! - `ResponderPort`: generate a reply or decline
//!
//! Test doubles for each live next to the trait.

pub mod classifier;
pub mod responder;
pub mod source;

pub use classifier::{ClassifierPort, MockClassifier};
pub use responder::{MockResponder, Reply, ReplyRequest, ResponderPort};
pub use source::{MockSource, MockSourceConnector, SourceConnector, SourceError, SourcePort};
