//! `docker exec` clients for ClickHouse and dbt

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::{ModelRunner, QueryClient};

pub const DEFAULT_CLICKHOUSE_CONTAINER: &str = "solana-clickhouse";
pub const DEFAULT_DBT_CONTAINER: &str = "solana-dbt";

/// Marker dbt prints at the end of a clean run
const DBT_SUCCESS_MARKER: &str = "Completed successfully";

/// `clickhouse-client` inside a running container
#[derive(Debug, Clone)]
pub struct DockerClickhouse {
    container: String,
    timeout: Duration,
}

impl DockerClickhouse {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, sql: &str, database: &str, params: &[(&str, &str)]) -> Command {
        let mut cmd = Command::new("docker");
        cmd.args(["exec", self.container.as_str(), "clickhouse-client"])
            .args(["--database", database]);
        for (name, value) in params {
            cmd.arg(format!("--param_{}={}", name, value));
        }
        cmd.args(["--query", sql.trim()]).kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl QueryClient for DockerClickhouse {
    async fn query_with(&self, sql: &str, database: &str, params: &[(&str, &str)]) -> Result<String> {
        debug!("clickhouse-client [{}]: {} {:?}", database, sql.trim(), params);

        let output = run_with_timeout(self.command(sql, database, params), self.timeout).await?;
        if !output.status.success() {
            bail!(
                "clickhouse-client exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// `dbt run` inside a running container
#[derive(Debug, Clone)]
pub struct DockerDbt {
    container: String,
    timeout: Duration,
}

impl DockerDbt {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            timeout: Duration::from_secs(600),
        }
    }
}

#[async_trait]
impl ModelRunner for DockerDbt {
    async fn run_models(&self) -> Result<bool> {
        let mut cmd = Command::new("docker");
        cmd.args(["exec", self.container.as_str(), "dbt", "run"]).kill_on_drop(true);

        let output = run_with_timeout(cmd, self.timeout).await?;
        Ok(dbt_succeeded(&output))
    }
}

/// dbt logs to stdout or stderr depending on version and config
fn dbt_succeeded(output: &Output) -> bool {
    output.status.success()
        && (String::from_utf8_lossy(&output.stderr).contains(DBT_SUCCESS_MARKER)
            || String::from_utf8_lossy(&output.stdout).contains(DBT_SUCCESS_MARKER))
}

async fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<Output> {
    tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| anyhow!("command timed out after {:?}", timeout))?
        .context("Failed to spawn docker")
}
