//! Concurrent test execution engine.
//!
//! Dispatches dataset cases against a rendered prompt template with a
//! bounded worker pool, per-case retries with exponential backoff, and
//! per-case metrics capture. Provider failures never abort the run; they
//! are absorbed into the result set as failed cases.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::dataset::TestCase;
use crate::error::{PromptabError, Result};
use crate::pricing::PricingTable;
use crate::provider::{ChatMessage, ChatProvider, ChatRequest};
use crate::template::render;

use serde::{Deserialize, Serialize};

/// Outcome of a single test case. A failed case carries zeroed metrics and
/// the last attempt's error message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseResult {
    pub name: String,
    pub success: bool,
    pub latency_ms: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaseResult {
    /// A failed case: zeroed metrics plus the final error message.
    pub fn failure(name: String, error: String) -> Self {
        Self {
            name,
            success: false,
            latency_ms: 0.0,
            input_tokens: 0,
            output_tokens: 0,
            cost: 0.0,
            output: None,
            error: Some(error),
        }
    }
}

/// Observability side channel: invoked once per completed case, in
/// completion order, with `(completed_count, total_count, case_name)`.
pub type ProgressCallback = Arc<dyn Fn(usize, usize, &str) + Send + Sync>;

/// Execution configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub model: String,
    /// Maximum provider requests in flight at once.
    pub concurrency: usize,
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    /// Base delay for exponential backoff; attempt `n` waits
    /// `backoff_base * 2^n`. Production default is one second.
    pub backoff_base: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            concurrency: 5,
            max_retries: 2,
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// Runs a dataset against a prompt template through an injected provider.
pub struct TestExecutionEngine {
    provider: Arc<dyn ChatProvider>,
    pricing: Arc<PricingTable>,
    config: RunConfig,
    progress: Option<ProgressCallback>,
}

impl TestExecutionEngine {
    pub fn new(provider: Arc<dyn ChatProvider>, pricing: Arc<PricingTable>, config: RunConfig) -> Self {
        Self {
            provider,
            pricing,
            config,
            progress: None,
        }
    }

    /// Register a progress callback.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Execute all `cases` against `template`.
    ///
    /// Results come back in dataset order regardless of completion order:
    /// each task reports its original index and the outcomes are scattered
    /// into a pre-sized slot array.
    pub async fn run(&self, template: &str, cases: &[TestCase]) -> Result<Vec<CaseResult>> {
        let total = cases.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        info!(
            cases = total,
            concurrency = self.config.concurrency,
            model = %self.config.model,
            "starting test run"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::with_capacity(total);

        for (index, case) in cases.iter().enumerate() {
            let prompt = render(template, &case.inputs);
            let name = case.name.clone();
            let provider = Arc::clone(&self.provider);
            let pricing = Arc::clone(&self.pricing);
            let semaphore = Arc::clone(&semaphore);
            let completed = Arc::clone(&completed);
            let progress = self.progress.clone();
            let model = self.config.model.clone();
            let max_retries = self.config.max_retries;
            let backoff_base = self.config.backoff_base;

            let task = tokio::spawn(async move {
                let result = run_case(
                    provider.as_ref(),
                    &pricing,
                    &semaphore,
                    &model,
                    &name,
                    &prompt,
                    max_retries,
                    backoff_base,
                )
                .await;

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(callback) = &progress {
                    callback(done, total, &name);
                }

                (index, result)
            });
            tasks.push(task);
        }

        let mut slots: Vec<Option<CaseResult>> = (0..total).map(|_| None).collect();
        for joined in futures::future::join_all(tasks).await {
            let (index, result) =
                joined.map_err(|e| PromptabError::Provider(format!("worker task failed: {e}")))?;
            slots[index] = Some(result);
        }

        let results: Vec<CaseResult> = slots
            .into_iter()
            .map(|slot| slot.expect("every index is filled exactly once"))
            .collect();

        let failures = results.iter().filter(|r| !r.success).count();
        info!(cases = total, failures, "test run finished");
        Ok(results)
    }
}

/// Execute one case with retries. The concurrency permit is held only
/// across the provider call itself, so backoff waits never occupy another
/// worker's slot.
#[allow(clippy::too_many_arguments)]
async fn run_case(
    provider: &dyn ChatProvider,
    pricing: &PricingTable,
    semaphore: &Semaphore,
    model: &str,
    name: &str,
    prompt: &str,
    max_retries: u32,
    backoff_base: Duration,
) -> CaseResult {
    let request = ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::user(prompt)],
    };

    let mut last_error = String::new();
    for attempt in 0..=max_retries {
        let outcome = {
            let _permit = semaphore
                .acquire()
                .await
                .expect("semaphore is never closed");
            let started = Instant::now();
            let response = provider.complete(&request).await;
            (response, started.elapsed())
        };

        match outcome {
            (Ok(response), elapsed) => {
                let latency_ms = elapsed.as_secs_f64() * 1000.0;
                let input_tokens = response.usage.prompt_tokens;
                let output_tokens = response.usage.completion_tokens;
                debug!(case = name, attempt, latency_ms, "case succeeded");
                return CaseResult {
                    name: name.to_string(),
                    success: true,
                    latency_ms,
                    input_tokens,
                    output_tokens,
                    cost: pricing.cost(model, input_tokens, output_tokens),
                    output: Some(response.text().to_string()),
                    error: None,
                };
            }
            (Err(e), _) => {
                last_error = e.to_string();
                warn!(case = name, attempt, error = %last_error, "provider call failed");
                if attempt < max_retries {
                    tokio::time::sleep(backoff_base * 2u32.pow(attempt)).await;
                }
            }
        }
    }

    CaseResult::failure(name.to_string(), last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatResponse, Choice, Usage};
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Scripted provider: fails the first `fail_first` calls per run, then
    /// answers with a fixed response after an optional delay.
    struct ScriptedProvider {
        fail_first: usize,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(fail_first: usize, delay: Duration) -> Self {
            Self {
                fail_first,
                delay,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if call < self.fail_first {
                return Err(PromptabError::Provider(format!("scripted failure {call}")));
            }
            Ok(ChatResponse {
                choices: vec![Choice {
                    message: ChatMessage {
                        role: "assistant".to_string(),
                        content: format!("echo: {}", request.messages[0].content),
                    },
                }],
                usage: Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                },
            })
        }
    }

    fn cases(names: &[&str]) -> Vec<TestCase> {
        names
            .iter()
            .map(|n| TestCase {
                name: n.to_string(),
                inputs: HashMap::from([("name".to_string(), n.to_string())]),
                expected_output: None,
            })
            .collect()
    }

    fn fast_config(concurrency: usize, max_retries: u32) -> RunConfig {
        RunConfig {
            model: "test-model".to_string(),
            concurrency,
            max_retries,
            backoff_base: Duration::from_millis(1),
        }
    }

    fn engine(provider: Arc<dyn ChatProvider>, config: RunConfig) -> TestExecutionEngine {
        TestExecutionEngine::new(provider, Arc::new(PricingTable::default()), config)
    }

    #[tokio::test]
    async fn successful_run_records_metrics_and_output() {
        let provider = Arc::new(ScriptedProvider::new(0, Duration::ZERO));
        let results = engine(provider.clone(), fast_config(2, 0))
            .run("Hi {{name}}", &cases(&["a"]))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert!(r.success);
        assert_eq!(r.input_tokens, 10);
        assert_eq!(r.output_tokens, 5);
        assert!(r.cost > 0.0);
        assert_eq!(r.output.as_deref(), Some("echo: Hi a"));
        assert!(r.error.is_none());
    }

    #[tokio::test]
    async fn retries_then_succeeds_with_exact_call_count() {
        let provider = Arc::new(ScriptedProvider::new(2, Duration::ZERO));
        let results = engine(provider.clone(), fast_config(1, 2))
            .run("Hi {{name}}", &cases(&["a"]))
            .await
            .unwrap();

        assert_eq!(provider.calls(), 3, "fail, fail, succeed");
        assert!(results[0].success);
    }

    #[tokio::test]
    async fn exhausted_retries_preserve_last_error() {
        let provider = Arc::new(ScriptedProvider::new(usize::MAX, Duration::ZERO));
        let results = engine(provider.clone(), fast_config(1, 2))
            .run("Hi {{name}}", &cases(&["a"]))
            .await
            .unwrap();

        assert_eq!(provider.calls(), 3, "initial attempt plus two retries");
        let r = &results[0];
        assert!(!r.success);
        assert_eq!(r.latency_ms, 0.0);
        assert_eq!(r.input_tokens, 0);
        assert_eq!(r.cost, 0.0);
        assert_eq!(r.error.as_deref(), Some("provider error: scripted failure 2"));
    }

    #[tokio::test]
    async fn result_order_matches_dataset_order() {
        /// Later-submitted cases finish first: delay shrinks with call order.
        struct ReverseLatency {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl ChatProvider for ReverseLatency {
            async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(40 - (call as u64 * 10))).await;
                Ok(ChatResponse {
                    choices: vec![Choice {
                        message: ChatMessage {
                            role: "assistant".to_string(),
                            content: request.messages[0].content.clone(),
                        },
                    }],
                    usage: Usage::default(),
                })
            }
        }

        let provider = Arc::new(ReverseLatency {
            calls: AtomicUsize::new(0),
        });
        let names = ["first", "second", "third", "fourth"];
        let results = engine(provider, fast_config(4, 0))
            .run("{{name}}", &cases(&names))
            .await
            .unwrap();

        let got: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(got, names);
    }

    #[tokio::test]
    async fn progress_callback_fires_once_per_case() {
        let provider = Arc::new(ScriptedProvider::new(0, Duration::ZERO));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_cb = Arc::clone(&seen);

        let engine = engine(provider, fast_config(2, 0)).with_progress(Arc::new(
            move |done, total, name: &str| {
                seen_cb.lock().unwrap().push((done, total, name.to_string()));
            },
        ));

        engine.run("{{name}}", &cases(&["a", "b", "c"])).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        // Completion counts are each reported exactly once.
        let mut counts: Vec<usize> = seen.iter().map(|(done, _, _)| *done).collect();
        counts.sort_unstable();
        assert_eq!(counts, vec![1, 2, 3]);
        assert!(seen.iter().all(|(_, total, _)| *total == 3));
    }

    #[tokio::test]
    async fn concurrency_one_serializes_calls() {
        let provider = Arc::new(ScriptedProvider::new(0, Duration::from_millis(50)));
        let started = Instant::now();
        engine(provider, fast_config(1, 0))
            .run("{{name}}", &cases(&["a", "b", "c"]))
            .await
            .unwrap();
        assert!(
            started.elapsed() >= Duration::from_millis(150),
            "three 50ms calls through one slot take at least 150ms"
        );
    }

    #[tokio::test]
    async fn concurrency_bounds_wall_time_by_slowest_call() {
        let provider = Arc::new(ScriptedProvider::new(0, Duration::from_millis(50)));
        let started = Instant::now();
        engine(provider, fast_config(3, 0))
            .run("{{name}}", &cases(&["a", "b", "c"]))
            .await
            .unwrap();
        assert!(
            started.elapsed() < Duration::from_millis(140),
            "three parallel 50ms calls approach a single call's latency"
        );
    }

    #[tokio::test]
    async fn empty_dataset_returns_empty() {
        let provider = Arc::new(ScriptedProvider::new(0, Duration::ZERO));
        let results = engine(provider, fast_config(2, 0)).run("x", &[]).await.unwrap();
        assert!(results.is_empty());
    }
}
