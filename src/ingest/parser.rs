//! Row parser: one CSV record to a [`TradeRecord`]
//!
//! Pure; no store access. Timestamp resolution tries the exact formats in
//! order, then falls back to midnight of the leading date.

use chrono::NaiveDateTime;
use std::str::FromStr;

use super::source::RawRecord;
use crate::error::RowError;
use crate::types::TradeRecord;

/// A candidate layout for `block_timestamp`
#[derive(Debug, Clone, Copy)]
struct TimestampFormat {
    pattern: &'static str,
    /// Only tried when the input has a fractional part
    fractional: bool,
}

/// Exact formats, first match wins. The third covers day/month-swapped exports.
const TIMESTAMP_FORMATS: [TimestampFormat; 3] = [
    TimestampFormat { pattern: "%Y-%m-%d %H:%M:%S%.f", fractional: true },
    TimestampFormat { pattern: "%Y-%m-%d %H:%M:%S", fractional: false },
    TimestampFormat { pattern: "%Y-%d-%m %H:%M:%S%.f", fractional: true },
];

const FALLBACK_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Microsecond precision; longer fractions never match an exact format
const MAX_FRACTION_DIGITS: usize = 6;

/// Which rule resolved a timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampResolution {
    /// Index into the exact format list
    Exact(usize),
    /// Date prefix at midnight
    DateFallback,
}

/// Resolve a raw `block_timestamp` value
pub fn parse_timestamp(raw: &str) -> Result<(NaiveDateTime, TimestampResolution), RowError> {
    let unparseable = || RowError::TimestampUnparseable(raw.to_string());

    // chrono's %Y takes any digit count and %.f up to nine digits
    if !has_four_digit_year(raw) {
        return Err(unparseable());
    }
    let fraction_fits = fraction_digits(raw).map_or(false, |n| (1..=MAX_FRACTION_DIGITS).contains(&n));

    for (idx, format) in TIMESTAMP_FORMATS.iter().enumerate() {
        if format.fractional && !fraction_fits {
            continue;
        }
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format.pattern) {
            return Ok((ts, TimestampResolution::Exact(idx)));
        }
    }

    let date_part = raw.split(' ').next().unwrap_or_default();
    NaiveDateTime::parse_from_str(&format!("{} 00:00:00", date_part), FALLBACK_FORMAT)
        .map(|ts| (ts, TimestampResolution::DateFallback))
        .map_err(|_| unparseable())
}

/// Leading `-`-separated field is exactly four ASCII digits
fn has_four_digit_year(raw: &str) -> bool {
    raw.split('-')
        .next()
        .map_or(false, |year| year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit()))
}

/// Digit count after the last `.`, when everything after it is digits
fn fraction_digits(raw: &str) -> Option<usize> {
    raw.rsplit_once('.')
        .map(|(_, frac)| frac)
        .filter(|frac| !frac.is_empty() && frac.bytes().all(|b| b.is_ascii_digit()))
        .map(str::len)
}

/// Strip surrounding quotes, then surrounding whitespace
pub fn clean_dex(raw: &str) -> String {
    raw.trim_matches('"').trim().to_string()
}

/// Parses raw records into trades
#[derive(Debug, Clone, Copy, Default)]
pub struct RowParser;

impl RowParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, raw: &RawRecord<'_>) -> Result<TradeRecord, RowError> {
        let field = |name: &'static str| raw.get(name).ok_or(RowError::MissingField { field: name });

        let (block_timestamp, _) = parse_timestamp(field("block_timestamp")?)?;

        Ok(TradeRecord {
            signature: field("signature")?.to_string(),
            trader: field("trader")?.to_string(),
            slot: coerce(raw, "slot")?,
            transaction_index: coerce(raw, "transaction_index")?,
            instruction_index: coerce(raw, "instruction_index")?,
            market: field("market")?.to_string(),
            dex: clean_dex(field("dex")?),
            source_mint: field("source_mint")?.to_string(),
            destination_mint: field("destination_mint")?.to_string(),
            source_vault: field("source_vault")?.to_string(),
            destination_vault: field("destination_vault")?.to_string(),
            amount_in: coerce_float(raw, "amount_in")?,
            amount_out: coerce_float(raw, "amount_out")?,
            spot_price_a_in_b: coerce_float(raw, "spot_price_a_in_b")?,
            spot_price_b_in_a: coerce_float(raw, "spot_price_b_in_a")?,
            sol_usd_price: coerce_float(raw, "sol_usd_price")?,
            total_liquidity_a: coerce_float(raw, "total_liquidity_a")?,
            total_liquidity_b: coerce_float(raw, "total_liquidity_b")?,
            total_token_supply_a: coerce_float(raw, "total_token_supply_a")?,
            total_token_supply_b: coerce_float(raw, "total_token_supply_b")?,
            block_timestamp,
        })
    }
}

fn coerce<T: FromStr>(raw: &RawRecord<'_>, field: &'static str) -> Result<T, RowError> {
    let value = raw.get(field).ok_or(RowError::MissingField { field })?;
    value.trim().parse().map_err(|_| RowError::FieldCoercion {
        field,
        value: value.to_string(),
    })
}

/// Floats must also be finite; `inf`/`NaN` and overflow are rejected.
fn coerce_float(raw: &RawRecord<'_>, field: &'static str) -> Result<f64, RowError> {
    let parsed: f64 = coerce(raw, field)?;
    if parsed.is_finite() {
        Ok(parsed)
    } else {
        Err(RowError::FieldCoercion {
            field,
            value: raw.get(field).unwrap_or_default().to_string(),
        })
    }
}
