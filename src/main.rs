use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use solana_trades::checks::cli::{DEFAULT_CLICKHOUSE_CONTAINER, DEFAULT_DBT_CONTAINER};
use solana_trades::checks::system::DEFAULT_MARTS_DATABASE;
use solana_trades::checks::{
    run_marts_check, run_system_check, DockerClickhouse, DockerDbt, MartsCheckConfig, ModelRunner,
    SystemCheckConfig,
};
use solana_trades::config::{DEFAULT_CSV_PATH, DEFAULT_DATABASE, DEFAULT_HOST, DEFAULT_TABLE, DEFAULT_USER};
use solana_trades::{load_trades, ClickHouseStore, FailurePolicy, LoadOptions, MemoryStore, StoreConfig, TradeStore};

#[derive(Parser, Debug)]
#[command(name = "solana-trades")]
#[command(about = "Load Solana DEX trades into ClickHouse and check MV/dbt consistency")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Print verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// ClickHouse connection
#[derive(ClapArgs, Debug, Clone)]
struct StoreArgs {
    #[arg(long, env = "CLICKHOUSE_HOST", default_value = DEFAULT_HOST)]
    host: String,

    #[arg(long, env = "CLICKHOUSE_PORT", default_value = "8123")]
    port: u16,

    #[arg(long, env = "CLICKHOUSE_USER", default_value = DEFAULT_USER)]
    user: String,

    #[arg(long, env = "CLICKHOUSE_PASSWORD", default_value = "", hide_env_values = true)]
    password: String,

    #[arg(long, env = "CLICKHOUSE_DATABASE", default_value = DEFAULT_DATABASE)]
    database: String,

    /// Raw trades table
    #[arg(long, env = "CLICKHOUSE_TABLE", default_value = DEFAULT_TABLE)]
    table: String,
}

impl From<StoreArgs> for StoreConfig {
    fn from(args: StoreArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            user: args.user,
            password: args.password,
            database: args.database,
            table: args.table,
        }
    }
}

/// How the checks reach the database
#[derive(ClapArgs, Debug, Clone)]
struct CheckArgs {
    /// ClickHouse container for `docker exec clickhouse-client`
    #[arg(long, default_value = DEFAULT_CLICKHOUSE_CONTAINER)]
    container: String,

    /// Per-query timeout in seconds for docker exec
    #[arg(long, default_value = "10")]
    query_timeout: u64,

    /// Database holding the dbt marts
    #[arg(long, default_value = DEFAULT_MARTS_DATABASE)]
    marts_database: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a trades CSV into the raw table
    Load {
        #[command(flatten)]
        store: StoreArgs,

        /// CSV file to load (.zst is decompressed)
        #[arg(short, long, default_value = DEFAULT_CSV_PATH)]
        csv: PathBuf,

        /// Fail the run if any row is rejected
        #[arg(long)]
        strict: bool,

        /// Submit in chunks of this many rows instead of one batch
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Skip OPTIMIZE TABLE after loading
        #[arg(long)]
        no_optimize: bool,

        /// Parse and insert into an in-memory store only
        #[arg(long)]
        dry_run: bool,
    },

    /// Check MV propagation and the dbt flow end to end
    CheckSystem {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        check: CheckArgs,

        /// dbt container for `docker exec dbt run`
        #[arg(long, default_value = DEFAULT_DBT_CONTAINER)]
        dbt_container: String,

        /// Skip the dbt steps
        #[arg(long)]
        skip_dbt: bool,

        /// Milliseconds to wait for MVs after an insert
        #[arg(long, default_value = "1000")]
        mv_wait_ms: u64,

        /// CSV to load first when the raw table is empty
        #[arg(long, default_value = DEFAULT_CSV_PATH)]
        seed_csv: PathBuf,
    },

    /// Check that every mart model answers like an API endpoint
    CheckMarts {
        #[command(flatten)]
        check: CheckArgs,

        /// Market used for the market price endpoint
        #[arg(long)]
        market: Option<String>,

        /// Mint used for the token price endpoint
        #[arg(long)]
        mint: Option<String>,

        /// Trader used for the trader stats endpoint
        #[arg(long)]
        trader: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let default_level = if args.verbose { "solana_trades=debug" } else { "solana_trades=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match run(args.command).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<bool> {
    match command {
        Commands::Load {
            store,
            csv,
            strict,
            chunk_size,
            no_optimize,
            dry_run,
        } => {
            let options = LoadOptions {
                source: csv,
                policy: if strict { FailurePolicy::Strict } else { FailurePolicy::BestEffort },
                chunk_size,
                optimize: !no_optimize,
            };
            run_load(store.into(), options, dry_run).await
        }
        Commands::CheckSystem {
            store,
            check,
            dbt_container,
            skip_dbt,
            mv_wait_ms,
            seed_csv,
        } => {
            let store_config: StoreConfig = store.into();
            let config = SystemCheckConfig {
                database: store_config.database.clone(),
                marts_database: check.marts_database.clone(),
                table: store_config.table.clone(),
                mv_wait: Duration::from_millis(mv_wait_ms),
            };

            let store = ClickHouseStore::new(store_config);
            let queries = query_client(&check);
            let dbt = DockerDbt::new(dbt_container);
            let models: Option<&dyn ModelRunner> = if skip_dbt { None } else { Some(&dbt) };
            let seed = LoadOptions {
                source: seed_csv,
                ..Default::default()
            };

            info!("Running system check");
            let report = run_system_check(&queries, &store, models, Some(&seed), &config).await;
            report.log_summary("System check");
            Ok(report.all_passed())
        }
        Commands::CheckMarts {
            check,
            market,
            mint,
            trader,
        } => {
            let queries = query_client(&check);

            let defaults = MartsCheckConfig::default();
            let config = MartsCheckConfig {
                database: check.marts_database.clone(),
                market: market.unwrap_or(defaults.market),
                mint: mint.unwrap_or(defaults.mint),
                trader: trader.unwrap_or(defaults.trader),
                slow_query: defaults.slow_query,
            };

            info!("Testing Solana analytics API endpoints");
            let report = run_marts_check(&queries, &config).await;
            report.log_summary("Marts check");
            Ok(report.all_passed())
        }
    }
}

async fn run_load(store_config: StoreConfig, options: LoadOptions, dry_run: bool) -> Result<bool> {
    info!(
        "Loading {} into {}.{} ({} policy)",
        options.source.display(),
        store_config.database,
        store_config.table,
        options.policy
    );

    let store: Box<dyn TradeStore> = if dry_run {
        info!("Dry run: using in-memory store");
        Box::new(MemoryStore::new().with_table(store_config.table))
    } else {
        Box::new(ClickHouseStore::new(store_config))
    };

    let report = load_trades(store.as_ref(), &options)
        .await
        .context("Data loading failed")?;

    let outcome = &report.outcome;
    info!(
        "Rows attempted: {}, succeeded: {}, failed: {}",
        outcome.rows_attempted, outcome.rows_succeeded, outcome.rows_failed
    );
    for warning in &report.verification.warnings {
        info!("Verification warning: {}", warning);
    }

    if report.is_success() {
        info!("Data loading complete!");
    } else {
        error!("Data loading failed: {} rows rejected under strict policy", outcome.rows_failed);
    }
    Ok(report.is_success())
}

fn query_client(check: &CheckArgs) -> DockerClickhouse {
    DockerClickhouse::new(check.container.clone()).with_timeout(Duration::from_secs(check.query_timeout))
}
