//! Consistency checks against a running analytics stack
//!
//! The checks talk to the database only through a [`QueryClient`] and to dbt
//! only through a [`ModelRunner`], so tests can script both.
//!
//! - [`system`] - MV real-time propagation and dbt end-to-end flow
//! - [`marts`] - mart models exercised as API endpoints
//! - [`cli`] - `docker exec` implementations

pub mod cli;
pub mod marts;
pub mod system;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use tracing::{error, info, warn};

pub use cli::{DockerClickhouse, DockerDbt};
pub use marts::{run_marts_check, MartsCheckConfig};
pub use system::{run_system_check, SystemCheckConfig};

/// Raw SQL execution against the analytics database
///
/// Values go in as server-side parameters: `{name:Type}` placeholders in the
/// SQL, bound from `params` by name.
#[async_trait]
pub trait QueryClient: Send + Sync {
    /// Run `sql` in `database` with bound `params` and return the raw text output
    async fn query_with(&self, sql: &str, database: &str, params: &[(&str, &str)]) -> Result<String>;

    async fn query(&self, sql: &str, database: &str) -> Result<String> {
        self.query_with(sql, database, &[]).await
    }

    /// Run `sql` with `FORMAT JSON` appended and parse the result
    async fn query_json_with(&self, sql: &str, database: &str, params: &[(&str, &str)]) -> Result<JsonResult> {
        let text = self
            .query_with(&format!("{} FORMAT JSON", sql.trim()), database, params)
            .await?;
        serde_json::from_str(&text).context("Failed to parse FORMAT JSON output")
    }

    async fn query_json(&self, sql: &str, database: &str) -> Result<JsonResult> {
        self.query_json_with(sql, database, &[]).await
    }

    /// Run a `SELECT count()`-style query and parse the single number
    async fn query_count(&self, sql: &str, database: &str) -> Result<u64> {
        let text = self.query(sql, database).await?;
        text.trim()
            .parse()
            .with_context(|| format!("Expected a count, got {:?}", text.trim()))
    }
}

/// Runs the transformation models (dbt)
#[async_trait]
pub trait ModelRunner: Send + Sync {
    /// `Ok(true)` when the run reports success
    async fn run_models(&self) -> Result<bool>;
}

/// Body of a ClickHouse `FORMAT JSON` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonResult {
    #[serde(default)]
    pub data: Vec<Map<String, Value>>,
    #[serde(default)]
    pub rows: u64,
    #[serde(default)]
    pub statistics: Option<QueryStatistics>,
}

impl JsonResult {
    pub fn first(&self) -> Option<&Map<String, Value>> {
        self.data.first()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryStatistics {
    /// Seconds
    #[serde(default)]
    pub elapsed: f64,
    #[serde(default)]
    pub rows_read: u64,
    #[serde(default)]
    pub bytes_read: u64,
}

/// Read a number that ClickHouse may have quoted (64-bit ints are strings in JSON)
pub fn json_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Read a non-negative integer cell, quoted or not
pub fn json_count(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Render a JSON cell for log output without quotes around strings
pub fn json_display(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
        None => "N/A".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Passed,
    /// Not a failure, but worth a look
    Warned,
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "PASS"),
            Self::Warned => write!(f, "WARN"),
            Self::Failed => write!(f, "FAIL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckStep {
    pub name: String,
    pub status: StepStatus,
    pub detail: String,
}

/// Ordered results of a check run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckReport {
    pub steps: Vec<CheckStep>,
}

impl CheckReport {
    pub fn record(&mut self, name: impl Into<String>, status: StepStatus, detail: impl Into<String>) {
        let step = CheckStep {
            name: name.into(),
            status,
            detail: detail.into(),
        };
        match status {
            StepStatus::Passed => info!("[{}] {}: {}", step.status, step.name, step.detail),
            StepStatus::Warned => warn!("[{}] {}: {}", step.status, step.name, step.detail),
            StepStatus::Failed => error!("[{}] {}: {}", step.status, step.name, step.detail),
        }
        self.steps.push(step);
    }

    pub fn pass(&mut self, name: impl Into<String>, detail: impl Into<String>) {
        self.record(name, StepStatus::Passed, detail);
    }

    pub fn warn(&mut self, name: impl Into<String>, detail: impl Into<String>) {
        self.record(name, StepStatus::Warned, detail);
    }

    pub fn fail(&mut self, name: impl Into<String>, detail: impl Into<String>) {
        self.record(name, StepStatus::Failed, detail);
    }

    /// Steps that did not fail
    pub fn passed(&self) -> usize {
        self.steps.iter().filter(|s| s.status != StepStatus::Failed).count()
    }

    pub fn all_passed(&self) -> bool {
        self.passed() == self.steps.len()
    }

    pub fn step(&self, name: &str) -> Option<&CheckStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn log_summary(&self, title: &str) {
        let total = self.steps.len();
        let passed = self.passed();
        info!("{} summary: passed {}/{}", title, passed, total);
        if passed == total {
            info!("All checks passed");
        } else {
            error!("{} checks failed", total - passed);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Script {
        key: String,
        /// Served in order; the last one repeats
        replies: Vec<Result<String, String>>,
        calls: AtomicUsize,
    }

    /// Answers queries from canned responses keyed by SQL substring
    #[derive(Default)]
    pub(crate) struct ScriptedQueries {
        scripts: Vec<Script>,
        pub(crate) log: Mutex<Vec<(String, String)>>,
        pub(crate) bound: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedQueries {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        fn script(mut self, key: &str, replies: Vec<Result<String, String>>) -> Self {
            self.scripts.push(Script {
                key: key.to_string(),
                replies,
                calls: AtomicUsize::new(0),
            });
            self
        }

        /// First matching key wins
        pub(crate) fn on(self, sql_contains: &str, response: &str) -> Self {
            self.script(sql_contains, vec![Ok(response.to_string())])
        }

        /// Successive calls get successive responses
        pub(crate) fn on_each(self, sql_contains: &str, responses: &[&str]) -> Self {
            let replies = responses.iter().map(|r| Ok(r.to_string())).collect();
            self.script(sql_contains, replies)
        }

        pub(crate) fn fail_on(self, sql_contains: &str, message: &str) -> Self {
            self.script(sql_contains, vec![Err(message.to_string())])
        }

        pub(crate) fn queries(&self) -> Vec<String> {
            self.log.lock().unwrap().iter().map(|(sql, _)| sql.clone()).collect()
        }
    }

    #[async_trait]
    impl QueryClient for ScriptedQueries {
        async fn query_with(&self, sql: &str, database: &str, params: &[(&str, &str)]) -> Result<String> {
            self.log.lock().unwrap().push((sql.to_string(), database.to_string()));
            self.bound
                .lock()
                .unwrap()
                .extend(params.iter().map(|(k, v)| (k.to_string(), v.to_string())));

            let Some(script) = self.scripts.iter().find(|s| sql.contains(s.key.as_str())) else {
                return Ok(String::new());
            };
            let call = script.calls.fetch_add(1, Ordering::SeqCst);
            match &script.replies[call.min(script.replies.len() - 1)] {
                Ok(text) => Ok(text.clone()),
                Err(message) => Err(anyhow::anyhow!(message.clone())),
            }
        }
    }

    pub(crate) struct FixedModels(pub(crate) bool);

    #[async_trait]
    impl ModelRunner for FixedModels {
        async fn run_models(&self) -> Result<bool> {
            Ok(self.0)
        }
    }

    /// `FORMAT JSON` body with the given rows
    pub(crate) fn json_rows(rows: Value) -> String {
        let count = rows.as_array().map_or(0, |a| a.len());
        serde_json::json!({
            "meta": [],
            "data": rows,
            "rows": count,
            "statistics": {"elapsed": 0.0012, "rows_read": 10, "bytes_read": 512}
        })
        .to_string()
    }
}
