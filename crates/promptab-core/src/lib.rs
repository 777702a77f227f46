//! promptab Core Library
//!
//! Content-addressed versioning for text prompt artifacts plus a concurrent
//! A/B test engine with statistical comparison of two versions' metrics.
//!
//! Flow: the repository resolves two committed prompt snapshots, the
//! execution engine runs each independently against a shared dataset, the
//! aggregator summarizes each side, the comparator significance-tests the
//! difference, and the run store optionally persists the combined record.

pub mod cas;
pub mod dataset;
pub mod diff;
pub mod error;
pub mod metrics;
pub mod object;
pub mod pricing;
pub mod provider;
pub mod repo;
pub mod run_store;
pub mod runner;
pub mod stats;
pub mod telemetry;
pub mod template;

pub use cas::fs::FsObjectStore;
pub use cas::{Digest, ObjectStore, StoreError};
pub use dataset::{load_dataset, TestCase};
pub use diff::{diff_lines, is_identical, DiffLine};
pub use error::{PromptabError, Result};
pub use metrics::{MetricsSummary, VersionResult};
pub use object::{Commit, Object};
pub use pricing::{ModelPricing, PricingTable};
pub use provider::{
    ChatMessage, ChatProvider, ChatRequest, ChatResponse, OpenAiProvider, ProviderConfig,
};
pub use repo::{Repository, StagedEntry, REPO_DIR};
pub use run_store::{RunResults, TestRun, TestRunStore};
pub use runner::{CaseResult, ProgressCallback, RunConfig, TestExecutionEngine};
pub use stats::{compare_versions, welch_t_test, ComparisonStatistics, TTestResult};
pub use telemetry::init_tracing;
pub use template::render;

/// promptab version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
