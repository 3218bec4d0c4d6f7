//! Background execution of run tasks
//!
//! `TaskQueue` owns the durable task records; `TaskRunner` claims them,
//! drives the pipeline and writes the result back.

pub mod queue;
pub mod runner;

pub use queue::TaskQueue;
pub use runner::{TaskRunner, WorkerConfig};
