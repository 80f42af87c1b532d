use chrono::NaiveDateTime;
use clickhouse::Row;
use serde::{Serialize, Serializer};

/// Columns of `trades_raw`, in insert order.
pub const TRADE_COLUMNS: [&str; 21] = [
    "signature",
    "trader",
    "slot",
    "transaction_index",
    "instruction_index",
    "market",
    "dex",
    "source_mint",
    "destination_mint",
    "source_vault",
    "destination_vault",
    "amount_in",
    "amount_out",
    "spot_price_a_in_b",
    "spot_price_b_in_a",
    "sol_usd_price",
    "total_liquidity_a",
    "total_liquidity_b",
    "total_token_supply_a",
    "total_token_supply_b",
    "block_timestamp",
];

/// One swap as stored in `trades_raw`
///
/// Field order and names match [`TRADE_COLUMNS`]; `block_timestamp` is a
/// `DateTime64(6)` column.
#[derive(Debug, Clone, PartialEq, Serialize, Row)]
pub struct TradeRecord {
    pub signature: String,
    pub trader: String,
    pub slot: u64,
    pub transaction_index: u32,
    pub instruction_index: u32,
    pub market: String,
    pub dex: String,
    pub source_mint: String,
    pub destination_mint: String,
    pub source_vault: String,
    pub destination_vault: String,
    pub amount_in: f64,
    pub amount_out: f64,
    pub spot_price_a_in_b: f64,
    pub spot_price_b_in_a: f64,
    pub sol_usd_price: f64,
    pub total_liquidity_a: f64,
    pub total_liquidity_b: f64,
    pub total_token_supply_a: f64,
    pub total_token_supply_b: f64,
    #[serde(serialize_with = "serialize_micros")]
    pub block_timestamp: NaiveDateTime,
}

/// `DateTime64(6)` travels as microseconds since the epoch (UTC)
fn serialize_micros<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_i64(ts.and_utc().timestamp_micros())
}

#[cfg(test)]
pub(crate) fn sample_trade(signature: &str) -> TradeRecord {
    use chrono::NaiveDate;

    TradeRecord {
        signature: signature.to_string(),
        trader: "D7dFRZgTJjHuL1y6kUvgtZZLRYwn2Z7YsfjfAEKJKEz7".to_string(),
        slot: 312_000_001,
        transaction_index: 4,
        instruction_index: 2,
        market: "22zLCCNRWk5oBgx8be7LnGNHWatDU2owTczcBZUNdjrb".to_string(),
        dex: "RAYDIUM".to_string(),
        source_mint: "So11111111111111111111111111111111111111112".to_string(),
        destination_mint: "GhE4sh64jawtzUmeQWRgkN3XrzcWN4pib5g5RcKMbonk".to_string(),
        source_vault: "vault_a".to_string(),
        destination_vault: "vault_b".to_string(),
        amount_in: 1.5,
        amount_out: 1500.0,
        spot_price_a_in_b: 0.001,
        spot_price_b_in_a: 1000.0,
        sol_usd_price: 171.5,
        total_liquidity_a: 1_000_000.0,
        total_liquidity_b: 1_000_000.0,
        total_token_supply_a: 1_000_000_000.0,
        total_token_supply_b: 1_000_000_000.0,
        block_timestamp: NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_micro_opt(9, 26, 53, 589_793)
            .unwrap(),
    }
}
