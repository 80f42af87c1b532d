// End-to-end load runs against the in-memory store

use std::io::Write;
use std::path::PathBuf;

use solana_trades::error::RejectReason;
use solana_trades::{load_trades, FailurePolicy, LoadError, LoadOptions, MemoryStore, RowError, TRADE_COLUMNS};
use tempfile::TempDir;

const TRADER: &str = "D7dFRZgTJjHuL1y6kUvgtZZLRYwn2Z7YsfjfAEKJKEz7";
const MARKET: &str = "22zLCCNRWk5oBgx8be7LnGNHWatDU2owTczcBZUNdjrb";

fn trade_line(signature: &str, dex: &str, amount_in: &str, timestamp: &str) -> String {
    [
        signature,
        TRADER,
        "312000001",
        "4",
        "2",
        MARKET,
        dex,
        "So11111111111111111111111111111111111111112",
        "GhE4sh64jawtzUmeQWRgkN3XrzcWN4pib5g5RcKMbonk",
        "vault_a",
        "vault_b",
        amount_in,
        "1500",
        "0.001",
        "1000.0",
        "171.5",
        "1000000",
        "1000000",
        "1000000000",
        "1000000000",
        timestamp,
    ]
    .join(",")
}

fn write_csv(dir: &TempDir, name: &str, lines: &[String]) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "{}", TRADE_COLUMNS.join(",")).unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    path
}

fn options(source: PathBuf) -> LoadOptions {
    LoadOptions {
        source,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_loads_every_valid_row_with_clean_dex() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(
        &dir,
        "trades.csv",
        &[
            trade_line("sig_1", "RAYDIUM", "1.5", "2025-03-14 09:26:53.589793"),
            trade_line("sig_2", "\"\"\"UNISWAP\"\"\"", "2.0", "2025-03-14 09:26:54"),
            trade_line("sig_3", "ORCA", "3.0", "2025-14-03 09:26:55.000001"),
        ],
    );

    let store = MemoryStore::new();
    let report = load_trades(&store, &options(path)).await.unwrap();

    assert_eq!(report.outcome.rows_attempted, 3);
    assert_eq!(report.outcome.rows_succeeded, 3);
    assert_eq!(report.outcome.rows_failed, 0);
    assert!(report.is_success());
    assert_eq!(report.verification.store_row_count, Some(3));
    assert!(report.verification.optimized);

    let rows = store.rows().await;
    let dexes: Vec<&str> = rows.iter().map(|r| r.dex.as_str()).collect();
    assert_eq!(dexes, vec!["RAYDIUM", "UNISWAP", "ORCA"]);
    assert_eq!(rows[2].block_timestamp.format("%Y-%m-%d").to_string(), "2025-03-14");
    assert_eq!(store.insert_calls().await, (1, 0));
}

#[tokio::test]
async fn test_padded_dex_is_trimmed() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(
        &dir,
        "trades.csv",
        &[trade_line("sig_1", "\" JUPITER \"", "1.5", "2025-03-14 09:26:53")],
    );

    let store = MemoryStore::new();
    load_trades(&store, &options(path)).await.unwrap();

    assert_eq!(store.rows().await[0].dex, "JUPITER");
}

#[tokio::test]
async fn test_unparseable_amount_rejects_only_that_row() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(
        &dir,
        "trades.csv",
        &[
            trade_line("sig_1", "RAYDIUM", "1.5", "2025-03-14 09:26:53"),
            trade_line("sig_2", "RAYDIUM", "not_a_number", "2025-03-14 09:26:54"),
        ],
    );

    let store = MemoryStore::new();
    let report = load_trades(&store, &options(path)).await.unwrap();

    assert_eq!(report.outcome.rows_succeeded, 1);
    assert_eq!(report.outcome.rows_failed, 1);
    assert_eq!(report.outcome.failures[0].row, 2);
    assert_eq!(
        report.outcome.failures[0].reason,
        RejectReason::Parse(RowError::FieldCoercion {
            field: "amount_in",
            value: "not_a_number".to_string(),
        })
    );
    assert_eq!(store.rows().await[0].signature, "sig_1");
}

#[tokio::test]
async fn test_unparseable_timestamp_falls_back_to_midnight() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(
        &dir,
        "trades.csv",
        &[trade_line("sig_1", "RAYDIUM", "1.5", "2025-03-14 garbage")],
    );

    let store = MemoryStore::new();
    let report = load_trades(&store, &options(path)).await.unwrap();

    assert_eq!(report.outcome.rows_succeeded, 1);
    let ts = store.rows().await[0].block_timestamp;
    assert_eq!(ts.format("%Y-%m-%d %H:%M:%S").to_string(), "2025-03-14 00:00:00");
}

#[tokio::test]
async fn test_constraint_violation_falls_back_to_row_inserts() {
    let dir = TempDir::new().unwrap();
    let lines: Vec<String> = (1..=5)
        .map(|i| trade_line(&format!("sig_{}", i), "RAYDIUM", "1.5", "2025-03-14 09:26:53"))
        .collect();
    let path = write_csv(&dir, "trades.csv", &lines);

    let store = MemoryStore::new().with_constraint(|row| {
        (row.signature == "sig_3").then(|| "rejected by store".to_string())
    });
    let report = load_trades(&store, &options(path)).await.unwrap();

    assert_eq!(report.outcome.rows_succeeded, 4);
    assert_eq!(report.outcome.rows_failed, 1);
    assert_eq!(report.outcome.insert_failures().count(), 1);
    assert_eq!(report.outcome.failures[0].row, 3);
    assert!(report.is_success());

    let stored: Vec<String> = store.rows().await.into_iter().map(|r| r.signature).collect();
    assert_eq!(stored, vec!["sig_1", "sig_2", "sig_4", "sig_5"]);
    assert_eq!(store.insert_calls().await, (1, 5));
}

#[tokio::test]
async fn test_rerun_duplicates_rows_without_unique_key() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(
        &dir,
        "trades.csv",
        &[
            trade_line("sig_1", "RAYDIUM", "1.5", "2025-03-14 09:26:53"),
            trade_line("sig_2", "RAYDIUM", "2.5", "2025-03-14 09:26:54"),
        ],
    );

    let store = MemoryStore::new();
    load_trades(&store, &options(path.clone())).await.unwrap();
    let second = load_trades(&store, &options(path)).await.unwrap();

    assert_eq!(second.outcome.rows_succeeded, 2);
    assert_eq!(second.verification.store_row_count, Some(4));
}

#[tokio::test]
async fn test_rerun_with_unique_signatures_inserts_nothing() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(
        &dir,
        "trades.csv",
        &[
            trade_line("sig_1", "RAYDIUM", "1.5", "2025-03-14 09:26:53"),
            trade_line("sig_2", "RAYDIUM", "2.5", "2025-03-14 09:26:54"),
        ],
    );

    let store = MemoryStore::new().with_unique_signatures();
    load_trades(&store, &options(path.clone())).await.unwrap();
    let second = load_trades(&store, &options(path)).await.unwrap();

    assert_eq!(second.outcome.rows_succeeded, 0);
    assert_eq!(second.outcome.rows_failed, 2);
    assert_eq!(store.rows().await.len(), 2);
}

#[tokio::test]
async fn test_strict_policy_fails_on_any_rejected_row() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(
        &dir,
        "trades.csv",
        &[
            trade_line("sig_1", "RAYDIUM", "1.5", "2025-03-14 09:26:53"),
            trade_line("sig_2", "RAYDIUM", "1.5", "no date here"),
        ],
    );

    let store = MemoryStore::new();
    let strict = LoadOptions {
        policy: FailurePolicy::Strict,
        ..options(path.clone())
    };
    let report = load_trades(&store, &strict).await.unwrap();
    assert!(!report.is_success());
    assert_eq!(report.outcome.parse_failures().count(), 1);

    let best_effort = load_trades(&MemoryStore::new(), &options(path)).await.unwrap();
    assert!(best_effort.is_success());
}

#[tokio::test]
async fn test_chunked_load_keeps_order() {
    let dir = TempDir::new().unwrap();
    let lines: Vec<String> = (1..=7)
        .map(|i| trade_line(&format!("sig_{}", i), "RAYDIUM", "1.5", "2025-03-14 09:26:53"))
        .collect();
    let path = write_csv(&dir, "trades.csv", &lines);

    let store = MemoryStore::new();
    let chunked = LoadOptions {
        chunk_size: Some(3),
        ..options(path)
    };
    let report = load_trades(&store, &chunked).await.unwrap();

    assert_eq!(report.outcome.rows_succeeded, 7);
    assert_eq!(store.insert_calls().await, (3, 0));
    let stored: Vec<String> = store.rows().await.into_iter().map(|r| r.signature).collect();
    assert_eq!(stored.first().map(String::as_str), Some("sig_1"));
    assert_eq!(stored.last().map(String::as_str), Some("sig_7"));
}

#[tokio::test]
async fn test_header_only_file_loads_nothing() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(&dir, "empty.csv", &[]);

    let store = MemoryStore::new();
    let report = load_trades(&store, &options(path)).await.unwrap();

    assert_eq!(report.outcome.rows_attempted, 0);
    assert_eq!(store.insert_calls().await, (0, 0));
    assert_eq!(report.verification.store_row_count, Some(0));
}

#[tokio::test]
async fn test_missing_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();

    let err = load_trades(&store, &options(dir.path().join("nope.csv")))
        .await
        .unwrap_err();

    assert!(matches!(err, LoadError::SourceUnreadable { .. }));
    assert_eq!(store.insert_calls().await, (0, 0));
}

#[tokio::test]
async fn test_missing_columns_are_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partial.csv");
    std::fs::write(&path, "signature,trader\nsig_1,someone\n").unwrap();

    let err = load_trades(&MemoryStore::new(), &options(path))
        .await
        .unwrap_err();

    match err {
        LoadError::MissingColumns { missing, .. } => {
            assert_eq!(missing.len(), TRADE_COLUMNS.len() - 2);
            assert!(missing.contains(&"block_timestamp".to_string()));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_zstd_source_is_decompressed() {
    let dir = TempDir::new().unwrap();
    let mut csv = TRADE_COLUMNS.join(",");
    csv.push('\n');
    csv.push_str(&trade_line("sig_1", "RAYDIUM", "1.5", "2025-03-14 09:26:53"));
    csv.push('\n');

    let path = dir.path().join("trades.csv.zst");
    std::fs::write(&path, zstd::encode_all(csv.as_bytes(), 3).unwrap()).unwrap();

    let store = MemoryStore::new();
    let report = load_trades(&store, &options(path)).await.unwrap();

    assert_eq!(report.outcome.rows_succeeded, 1);
    assert_eq!(store.rows().await[0].signature, "sig_1");
}
