//! Scripted executor for tests
//!
//! Answers commands from a list of substring rules instead of spawning
//! processes, and records every command it was asked to run.
//!
//! ```rust
//! use cluster_test_pipeline::exec::{ExecutionResult, ScriptedExecutor};
//!
//! let executor = ScriptedExecutor::new()
//!     .respond("describe-capacity-reservations", ExecutionResult::with_stdout("4"))
//!     .respond("run_tests.py", ExecutionResult::with_status(65));
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{CommandExecutor, ExecError, ExecutionResult};

struct Rule {
    pattern: String,
    responses: VecDeque<ExecutionResult>,
    delay: Option<Duration>,
}

#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    history: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every command containing `pattern` with `result`
    pub fn respond(self, pattern: &str, result: ExecutionResult) -> Self {
        self.respond_sequence(pattern, vec![result])
    }

    /// Answer successive matching commands with `results` in order; the last
    /// result repeats once the sequence is exhausted
    pub fn respond_sequence(self, pattern: &str, results: Vec<ExecutionResult>) -> Self {
        self.push_rule(pattern, results, None)
    }

    /// Like [`respond`](Self::respond), but the command takes `delay` to finish
    pub fn respond_after(self, pattern: &str, result: ExecutionResult, delay: Duration) -> Self {
        self.push_rule(pattern, vec![result], Some(delay))
    }

    fn push_rule(self, pattern: &str, results: Vec<ExecutionResult>, delay: Option<Duration>) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                pattern: pattern.to_string(),
                responses: results.into(),
                delay,
            });
        }
        self
    }

    /// Every command run so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// Commands run so far that contain `pattern`
    pub fn commands_matching(&self, pattern: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.contains(pattern))
            .collect()
    }

    /// Highest number of commands that were running at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn answer(&self, command: &str) -> (Option<ExecutionResult>, Option<Duration>) {
        let Ok(mut rules) = self.rules.lock() else {
            return (None, None);
        };
        match rules.iter_mut().find(|r| command.contains(&r.pattern)) {
            Some(rule) => {
                let result = if rule.responses.len() > 1 {
                    rule.responses.pop_front()
                } else {
                    rule.responses.front().cloned()
                };
                (result, rule.delay)
            }
            None => (None, None),
        }
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(
        &self,
        command: &str,
        capture_output: bool,
    ) -> Result<ExecutionResult, ExecError> {
        if let Ok(mut history) = self.history.lock() {
            history.push(command.to_string());
        }

        let (result, delay) = self.answer(command);

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut result = result.unwrap_or_else(ExecutionResult::success);
        if !capture_output {
            result.stdout = None;
        } else if result.stdout.is_none() {
            result.stdout = Some(String::new());
        }
        Ok(result)
    }
}
