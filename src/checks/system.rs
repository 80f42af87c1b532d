//! End-to-end system check
//!
//! Verifies that inserts into the raw table show up in the materialized views
//! without a dbt run, compares raw-table vs MV query cost, and checks that
//! dbt marts built on the MVs see the same data.

use anyhow::Result;
use chrono::Utc;
use rand::Rng;
use std::time::{Duration, Instant};
use tracing::info;

use super::{json_count, json_display, CheckReport, ModelRunner, QueryClient};
use crate::config::{LoadOptions, DEFAULT_DATABASE, DEFAULT_TABLE};
use crate::ingest::load_trades;
use crate::store::TradeStore;
use crate::types::TradeRecord;

const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const DEFAULT_MARTS_DATABASE: &str = "solana_analytics_marts";

/// Settings for [`run_system_check`]
#[derive(Debug, Clone)]
pub struct SystemCheckConfig {
    pub database: String,
    pub marts_database: String,
    pub table: String,
    /// How long to wait for MVs to pick up an insert
    pub mv_wait: Duration,
}

impl Default for SystemCheckConfig {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            marts_database: DEFAULT_MARTS_DATABASE.to_string(),
            table: DEFAULT_TABLE.to_string(),
            mv_wait: Duration::from_secs(1),
        }
    }
}

/// Identifiers of the synthetic trades inserted by the check
#[derive(Debug, Clone, PartialEq)]
struct TestTrader {
    id: u32,
    trader: String,
    market: String,
    token: String,
    amount: f64,
}

impl TestTrader {
    fn new(id: u32, amount: f64) -> Self {
        Self {
            id,
            trader: format!("realtime_test_{}", id),
            market: format!("TEST_MARKET_{}", id),
            token: format!("TEST_TOKEN_{}", id),
            amount,
        }
    }

    fn random() -> Self {
        let mut rng = rand::thread_rng();
        let id = rng.gen_range(10_000..100_000);
        let amount = (rng.gen_range(0.1..10.0f64) * 1e9).round() / 1e9;
        Self::new(id, amount)
    }

    /// SOL -> token buy
    fn buy(&self) -> TradeRecord {
        self.trade(self.id, WSOL_MINT, &self.token, self.amount, self.amount * 1000.0, 0.001, 1000.0)
    }

    /// token -> SOL sell, opposite direction of [`TestTrader::buy`]
    fn sell(&self) -> TradeRecord {
        self.trade(self.id + 1, &self.token, WSOL_MINT, self.amount * 2.0, self.amount, 1000.0, 0.001)
    }

    #[allow(clippy::too_many_arguments)]
    fn trade(
        &self,
        seq: u32,
        source_mint: &str,
        destination_mint: &str,
        amount_in: f64,
        amount_out: f64,
        price_a_in_b: f64,
        price_b_in_a: f64,
    ) -> TradeRecord {
        TradeRecord {
            signature: format!("sig_{}", seq),
            trader: self.trader.clone(),
            slot: u64::from(seq),
            transaction_index: 1,
            instruction_index: 1,
            market: self.market.clone(),
            dex: "TEST_DEX".to_string(),
            source_mint: source_mint.to_string(),
            destination_mint: destination_mint.to_string(),
            source_vault: "vault_a".to_string(),
            destination_vault: "vault_b".to_string(),
            amount_in,
            amount_out,
            spot_price_a_in_b: price_a_in_b,
            spot_price_b_in_a: price_b_in_a,
            sol_usd_price: 171.5,
            total_liquidity_a: 1_000_000.0,
            total_liquidity_b: 1_000_000.0,
            total_token_supply_a: 1_000_000_000.0,
            total_token_supply_b: 1_000_000_000.0,
            block_timestamp: Utc::now().naive_utc(),
        }
    }
}

/// Run the full system check.
///
/// Test trades go into `store`; everything else is read through `queries`.
/// `models` is `None` to skip the dbt steps. `seed` is loaded into `store`
/// first if the raw table is empty.
pub async fn run_system_check<Q>(
    queries: &Q,
    store: &dyn TradeStore,
    models: Option<&dyn ModelRunner>,
    seed: Option<&LoadOptions>,
    config: &SystemCheckConfig,
) -> CheckReport
where
    Q: QueryClient + ?Sized,
{
    run_with_trader(queries, store, models, seed, config, TestTrader::random()).await
}

async fn run_with_trader<Q>(
    queries: &Q,
    store: &dyn TradeStore,
    models: Option<&dyn ModelRunner>,
    seed: Option<&LoadOptions>,
    config: &SystemCheckConfig,
    trader: TestTrader,
) -> CheckReport
where
    Q: QueryClient + ?Sized,
{
    let check = SystemCheck {
        queries,
        store,
        config,
        trader,
    };
    let mut report = CheckReport::default();

    check.current_state(&mut report, seed).await;
    check.realtime_update(&mut report).await;
    check.performance(&mut report).await;
    match models {
        Some(models) => check.dbt_models(&mut report, models).await,
        None => info!("Skipping dbt models"),
    }
    check.end_to_end(&mut report).await;
    check.access_paths(&mut report).await;

    report
}

struct SystemCheck<'a, Q: ?Sized> {
    queries: &'a Q,
    store: &'a dyn TradeStore,
    config: &'a SystemCheckConfig,
    trader: TestTrader,
}

impl<'a, Q: QueryClient + ?Sized> SystemCheck<'a, Q> {
    async fn count(&self, table: &str) -> Result<u64> {
        self.queries
            .query_count(&format!("SELECT count() FROM {}", table), &self.config.database)
            .await
    }

    fn trader_param(&self) -> [(&str, &str); 1] {
        [("trader", self.trader.trader.as_str())]
    }

    /// Trade count and SOL volume of the test trader in the trader MV
    async fn trader_volume(&self) -> Result<Option<(u64, String)>> {
        let sql = "SELECT trader, sum(trade_count) AS trade_count, round(sum(total_volume_sol), 4) AS volume_sol \
                   FROM mv_trader_volume WHERE trader = {trader:String} GROUP BY trader";
        let result = self
            .queries
            .query_json_with(sql, &self.config.database, &self.trader_param())
            .await?;
        Ok(result.first().map(|row| {
            (
                json_count(row.get("trade_count")).unwrap_or(0),
                json_display(row.get("volume_sol")),
            )
        }))
    }

    /// Require the MV to hold exactly `expected` test trades
    async fn expect_trade_count(&self, report: &mut CheckReport, name: &str, expected: u64) {
        match self.trader_volume().await {
            Ok(Some((count, volume))) if count == expected => {
                report.pass(name, format!("MV shows {} trades, volume {} SOL", count, volume))
            }
            Ok(Some((count, _))) => {
                report.fail(name, format!("expected {} trades in MV, found {}", expected, count))
            }
            Ok(None) => report.fail(name, "test trader missing from MV"),
            Err(e) => report.fail(name, format!("MV query failed: {:#}", e)),
        }
    }

    async fn timed(&self, sql: &str, database: &str, params: &[(&str, &str)]) -> (Result<String>, Duration) {
        let start = Instant::now();
        let result = self.queries.query_with(sql, database, params).await;
        (result, start.elapsed())
    }

    async fn current_state(&self, report: &mut CheckReport, seed: Option<&LoadOptions>) {
        let name = "current state";
        let mut raw = match self.count(&self.config.table).await {
            Ok(count) => count,
            Err(e) => {
                report.fail(name, format!("cannot count {}: {:#}", self.config.table, e));
                return;
            }
        };

        for mv in ["mv_trader_volume", "mv_market_latest"] {
            match self.count(mv).await {
                Ok(count) => info!("{}: {} rows", mv, count),
                Err(e) => info!("{}: unavailable ({:#})", mv, e),
            }
        }

        if raw == 0 {
            if let Some(seed) = seed {
                info!("No data found. Loading sample data...");
                if let Err(e) = load_trades(self.store, seed).await {
                    report.fail(name, format!("sample load failed: {}", e));
                    return;
                }
                raw = self.count(&self.config.table).await.unwrap_or(0);
            }
        }

        if raw == 0 {
            report.warn(name, format!("{} is empty", self.config.table));
        } else {
            report.pass(name, format!("{} raw trades", raw));
        }
    }

    async fn realtime_update(&self, report: &mut CheckReport) {
        let name = "real-time MV update";
        info!("Inserting test trade for trader {} ({} SOL)", self.trader.trader, self.trader.amount);

        if let Err(e) = self.store.insert_row(&self.trader.buy()).await {
            report.fail(name, format!("insert failed: {:#}", e));
            return;
        }
        tokio::time::sleep(self.config.mv_wait).await;

        self.expect_trade_count(report, name, 1).await;
    }

    async fn performance(&self, report: &mut CheckReport) {
        let name = "raw vs MV performance";
        let raw_sql = format!(
            "SELECT count(DISTINCT trader) AS traders, count() AS trades, sum(amount_in * sol_usd_price) AS volume FROM {}",
            self.config.table
        );
        let mv_sql = "SELECT count() AS traders, sum(trade_count) AS trades, sum(total_volume_usd) AS volume FROM mv_trader_volume";

        let (raw, raw_time) = self.timed(&raw_sql, &self.config.database, &[]).await;
        let (mv, mv_time) = self.timed(mv_sql, &self.config.database, &[]).await;

        match (raw, mv) {
            (Ok(_), Ok(_)) => {
                let speedup = raw_time.as_secs_f64() / mv_time.as_secs_f64().max(f64::EPSILON);
                report.pass(
                    name,
                    format!(
                        "raw {:.2}ms, MV {:.2}ms, {:.1}x",
                        raw_time.as_secs_f64() * 1000.0,
                        mv_time.as_secs_f64() * 1000.0,
                        speedup
                    ),
                );
            }
            (Err(e), _) | (_, Err(e)) => report.fail(name, format!("{:#}", e)),
        }
    }

    async fn dbt_models(&self, report: &mut CheckReport, models: &dyn ModelRunner) {
        info!("Running dbt models...");
        match models.run_models().await {
            Ok(true) => report.pass("dbt run", "models ran successfully"),
            Ok(false) => {
                report.fail("dbt run", "dbt did not report success");
                return;
            }
            Err(e) => {
                report.fail("dbt run", format!("{:#}", e));
                return;
            }
        }

        let sql = "SELECT * FROM mart_trader_stats WHERE trader = {trader:String}";
        match self
            .queries
            .query_json_with(sql, &self.config.marts_database, &self.trader_param())
            .await
        {
            Ok(result) if !result.is_empty() => {
                report.pass("dbt mart", "mart has data for test trader")
            }
            Ok(_) => report.warn("dbt mart", "mart does not have the test trader yet"),
            Err(e) => report.warn("dbt mart", format!("mart query failed: {:#}", e)),
        }
    }

    async fn end_to_end(&self, report: &mut CheckReport) {
        let name = "end-to-end flow";
        if let Err(e) = self.store.insert_row(&self.trader.sell()).await {
            report.fail(name, format!("sell insert failed: {:#}", e));
            return;
        }
        tokio::time::sleep(self.config.mv_wait).await;

        self.expect_trade_count(report, name, 2).await;

        let sql = "SELECT market, round(last_price_a_in_b, 6) AS latest_price \
                   FROM mv_market_latest WHERE market = {market:String}";
        let params = [("market", self.trader.market.as_str())];
        match self.queries.query_json_with(sql, &self.config.database, &params).await {
            Ok(result) => match result.first() {
                Some(row) => report.pass(
                    "market price MV",
                    format!("latest price {}", json_display(row.get("latest_price"))),
                ),
                None => report.fail("market price MV", "test market missing from mv_market_latest"),
            },
            Err(e) => report.fail("market price MV", format!("{:#}", e)),
        }
    }

    async fn access_paths(&self, report: &mut CheckReport) {
        let name = "access paths";
        let paths = [
            ("direct MV", "mv_trader_volume", &self.config.database),
            ("API view", "api_realtime_trader_stats", &self.config.database),
            ("dbt mart", "mart_trader_stats", &self.config.marts_database),
        ];

        let mut timings = Vec::with_capacity(paths.len());
        let mut missing = Vec::new();
        for (label, table, database) in &paths {
            let sql = format!("SELECT * FROM {} WHERE trader = {{trader:String}}", table);
            let (result, elapsed) = self.timed(&sql, database, &self.trader_param()).await;
            match result {
                Ok(text) if !text.trim().is_empty() => {
                    timings.push(format!("{} {:.2}ms", label, elapsed.as_secs_f64() * 1000.0))
                }
                Ok(_) => missing.push(format!("{}: no data", label)),
                Err(e) => missing.push(format!("{}: {:#}", label, e)),
            }
        }

        if missing.is_empty() {
            report.pass(name, timings.join(", "));
        } else {
            timings.extend(missing);
            report.warn(name, timings.join(", "));
        }
    }
}
