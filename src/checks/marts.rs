//! Mart models exercised as API endpoints
//!
//! Each endpoint query must return at least one row carrying the fields the
//! API serves. A final aggregation doubles as a latency check.

use std::time::Duration;
use tracing::info;

use super::system::DEFAULT_MARTS_DATABASE;
use super::{json_display, CheckReport, QueryClient};

/// Settings for [`run_marts_check`]
#[derive(Debug, Clone)]
pub struct MartsCheckConfig {
    pub database: String,
    pub market: String,
    pub mint: String,
    pub trader: String,
    /// Above this the performance query warns
    pub slow_query: Duration,
}

impl Default for MartsCheckConfig {
    fn default() -> Self {
        Self {
            database: DEFAULT_MARTS_DATABASE.to_string(),
            market: "22zLCCNRWk5oBgx8be7LnGNHWatDU2owTczcBZUNdjrb".to_string(),
            mint: "GhE4sh64jawtzUmeQWRgkN3XrzcWN4pib5g5RcKMbonk".to_string(),
            trader: "D7dFRZgTJjHuL1y6kUvgtZZLRYwn2Z7YsfjfAEKJKEz7".to_string(),
            slow_query: Duration::from_millis(100),
        }
    }
}

struct Endpoint<'a> {
    name: &'static str,
    sql: &'static str,
    /// Bound to `{name:String}` placeholders in `sql`
    params: Vec<(&'static str, &'a str)>,
    /// Must be present in the first row
    required: &'static [&'static str],
    /// Logged when present
    optional: &'static [&'static str],
}

fn endpoints(config: &MartsCheckConfig) -> Vec<Endpoint<'_>> {
    vec![
        Endpoint {
            name: "market price",
            sql: "SELECT * FROM mart_market_price WHERE market = {market:String} LIMIT 1",
            params: vec![("market", config.market.as_str())],
            required: &["market", "priceSol", "priceUsd", "marketCapUsd"],
            optional: &[],
        },
        Endpoint {
            name: "token price",
            sql: "SELECT * FROM mart_token_price WHERE mint = {mint:String} LIMIT 1",
            params: vec![("mint", config.mint.as_str())],
            required: &["mint", "priceSol", "priceUsd", "marketCapUsd"],
            optional: &[],
        },
        Endpoint {
            name: "token pair price",
            sql: "SELECT * FROM mart_token_pair_price WHERE mint_a IS NOT NULL AND mint_b IS NOT NULL LIMIT 1",
            params: Vec::new(),
            required: &["mint_a", "mint_b", "priceSol", "priceUsd"],
            optional: &[],
        },
        Endpoint {
            name: "trader stats",
            sql: "SELECT * FROM mart_trader_stats WHERE trader = {trader:String} LIMIT 1",
            params: vec![("trader", config.trader.as_str())],
            required: &["trader", "buys", "sells", "volumeUsd"],
            optional: &[],
        },
        Endpoint {
            name: "trader pnl",
            sql: "SELECT * FROM mart_trader_pnl LIMIT 1",
            params: Vec::new(),
            required: &["trader", "mint"],
            optional: &["realizedPnlSol", "realizedPnlUsd"],
        },
    ]
}

/// Query every mart endpoint, then run the performance query.
pub async fn run_marts_check<Q>(queries: &Q, config: &MartsCheckConfig) -> CheckReport
where
    Q: QueryClient + ?Sized,
{
    let mut report = CheckReport::default();

    for endpoint in endpoints(config) {
        check_endpoint(queries, &config.database, &endpoint, &mut report).await;
    }
    check_performance(queries, config, &mut report).await;

    report
}

async fn check_endpoint<Q>(queries: &Q, database: &str, endpoint: &Endpoint<'_>, report: &mut CheckReport)
where
    Q: QueryClient + ?Sized,
{
    let result = match queries.query_json_with(endpoint.sql, database, &endpoint.params).await {
        Ok(result) => result,
        Err(e) => {
            report.fail(endpoint.name, format!("query failed: {:#}", e));
            return;
        }
    };

    let Some(row) = result.first() else {
        report.fail(endpoint.name, "no rows returned");
        return;
    };

    let missing: Vec<&str> = endpoint
        .required
        .iter()
        .copied()
        .filter(|key| !row.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        report.fail(endpoint.name, format!("missing fields: {}", missing.join(", ")));
        return;
    }

    let fields: Vec<String> = endpoint
        .required
        .iter()
        .chain(endpoint.optional)
        .map(|key| format!("{}={}", key, json_display(row.get(*key))))
        .collect();
    report.pass(endpoint.name, fields.join(" "));
}

async fn check_performance<Q>(queries: &Q, config: &MartsCheckConfig, report: &mut CheckReport)
where
    Q: QueryClient + ?Sized,
{
    let name = "query performance";
    let sql = "SELECT count() AS total_trades, count(DISTINCT trader) AS unique_traders, \
               avg(toFloat64(volumeUsd)) AS avg_volume_usd FROM mart_trader_stats";

    let result = match queries.query_json(sql, &config.database).await {
        Ok(result) => result,
        Err(e) => {
            report.fail(name, format!("query failed: {:#}", e));
            return;
        }
    };

    let stats = result.statistics.unwrap_or_default();
    let elapsed = Duration::from_secs_f64(stats.elapsed.max(0.0));
    info!("Query time: {:.2}ms, rows read: {}", stats.elapsed * 1000.0, stats.rows_read);

    let detail = format!("{:.2}ms, {} rows read", stats.elapsed * 1000.0, stats.rows_read);
    if elapsed < config.slow_query {
        report.pass(name, detail);
    } else {
        report.warn(name, format!("{} (over {:?})", detail, config.slow_query));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::{json_rows, ScriptedQueries};
    use crate::checks::StepStatus;
    use serde_json::json;

    fn all_marts() -> ScriptedQueries {
        ScriptedQueries::new()
            .on("mart_market_price", &json_rows(json!([
                {"market": "m", "priceSol": 0.1, "priceUsd": 17.1, "marketCapUsd": "1000"}
            ])))
            .on("mart_token_price", &json_rows(json!([
                {"mint": "t", "priceSol": 0.1, "priceUsd": 17.1, "marketCapUsd": "1000"}
            ])))
            .on("mart_token_pair_price", &json_rows(json!([
                {"mint_a": "a", "mint_b": "b", "priceSol": 0.1, "priceUsd": 17.1}
            ])))
            .on("mart_trader_stats WHERE", &json_rows(json!([
                {"trader": "t", "buys": "3", "sells": "1", "volumeUsd": 99.5}
            ])))
            .on("mart_trader_pnl", &json_rows(json!([
                {"trader": "t", "mint": "m", "realizedPnlSol": 0.2}
            ])))
            .on("FROM mart_trader_stats", &json_rows(json!([
                {"total_trades": "4", "unique_traders": "1", "avg_volume_usd": 99.5}
            ])))
    }

    #[tokio::test]
    async fn test_all_endpoints_pass() {
        let queries = all_marts();
        let report = run_marts_check(&queries, &MartsCheckConfig::default()).await;

        assert_eq!(report.steps.len(), 6);
        assert!(report.all_passed(), "{:?}", report);
        assert!(report.step("trader pnl").unwrap().detail.contains("realizedPnlUsd=N/A"));
        assert!(queries
            .log
            .lock()
            .unwrap()
            .iter()
            .all(|(_, db)| db == "solana_analytics_marts"));

        let bound = queries.bound.lock().unwrap();
        assert!(bound.contains(&("market".to_string(), MartsCheckConfig::default().market)));
        assert!(bound.contains(&("trader".to_string(), MartsCheckConfig::default().trader)));
    }

    #[tokio::test]
    async fn test_empty_or_incomplete_endpoints_fail() {
        let queries = ScriptedQueries::new()
            .on("mart_market_price", &json_rows(json!([])))
            .on("mart_token_price", &json_rows(json!([{"mint": "t"}])))
            .fail_on("mart_token_pair_price", "table does not exist")
            .on("mart_", &json_rows(json!([
                {"trader": "t", "buys": 1, "sells": 1, "volumeUsd": 1, "mint": "m"}
            ])));

        let report = run_marts_check(&queries, &MartsCheckConfig::default()).await;

        assert_eq!(report.step("market price").unwrap().status, StepStatus::Failed);
        assert!(report.step("token price").unwrap().detail.contains("priceSol"));
        assert_eq!(report.step("token pair price").unwrap().status, StepStatus::Failed);
        assert_eq!(report.step("trader stats").unwrap().status, StepStatus::Passed);
        assert_eq!(report.passed(), 3);
    }

    #[tokio::test]
    async fn test_slow_query_only_warns() {
        let slow = json!({"data": [], "rows": 0, "statistics": {"elapsed": 0.25, "rows_read": 1000000}});
        let queries = ScriptedQueries::new().on("FROM mart_trader_stats", &slow.to_string());

        let mut report = CheckReport::default();
        check_performance(&queries, &MartsCheckConfig::default(), &mut report).await;

        assert_eq!(report.steps[0].status, StepStatus::Warned);
        assert!(report.all_passed());
    }
}
