use crate::{LedgerError, Result, Timestamp};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regex::Regex;
use std::str::FromStr;
use tracing::debug;

const SECONDS_PER_DAY: Timestamp = 86_400;

/// Parse a relative timeframe (e.g. "30d", "12h", "15min") into the
/// timestamp that lies that far before `now`
pub fn parse_relative_timeframe(timeframe: &str, now: Timestamp) -> Result<Timestamp> {
    let re = Regex::new(r"^(\d+)(s|min|h|d|m|y)$")
        .map_err(|e| LedgerError::TimeframeParse(format!("Regex error: {}", e)))?;

    let captures = re.captures(timeframe.trim()).ok_or_else(|| {
        LedgerError::TimeframeParse(format!("Invalid timeframe format: {}", timeframe))
    })?;

    let amount: u64 = captures[1]
        .parse()
        .map_err(|e| LedgerError::TimeframeParse(format!("Invalid number: {}", e)))?;

    let unit_seconds: u64 = match &captures[2] {
        "s" => 1,
        "min" => 60,
        "h" => 3_600,
        "d" => SECONDS_PER_DAY,
        "m" => 30 * SECONDS_PER_DAY,
        "y" => 365 * SECONDS_PER_DAY,
        unit => {
            return Err(LedgerError::TimeframeParse(format!("Unknown time unit: {}", unit)))
        }
    };

    let offset = amount.checked_mul(unit_seconds).ok_or_else(|| {
        LedgerError::TimeframeParse(format!("Timeframe too large: {}", timeframe))
    })?;

    let cutoff = now.saturating_sub(offset);
    debug!("Relative timeframe {} => {}", timeframe, cutoff);
    Ok(cutoff)
}

/// Parse an absolute timeframe: "2024-01-15" (UTC midnight) or RFC 3339
pub fn parse_absolute_timeframe(timeframe: &str) -> Result<Timestamp> {
    let timeframe = timeframe.trim();

    let datetime = if let Ok(dt) = DateTime::parse_from_rfc3339(timeframe) {
        dt.with_timezone(&Utc)
    } else if let Ok(date) = NaiveDate::from_str(timeframe) {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| LedgerError::TimeframeParse("Invalid time components".to_string()))?;
        Utc.from_utc_datetime(&midnight)
    } else {
        return Err(LedgerError::TimeframeParse(format!(
            "Invalid absolute timeframe format: {}",
            timeframe
        )));
    };

    let seconds = datetime.timestamp();
    if seconds < 0 {
        return Err(LedgerError::TimeframeParse(format!(
            "Timeframe before the unix epoch: {}",
            timeframe
        )));
    }

    debug!("Absolute timeframe {} => {}", timeframe, seconds);
    Ok(seconds as Timestamp)
}

/// Accept a raw unix timestamp, a relative timeframe or an absolute date
pub fn parse_timeframe(timeframe: &str, now: Timestamp) -> Result<Timestamp> {
    let trimmed = timeframe.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return trimmed
            .parse()
            .map_err(|e| LedgerError::TimeframeParse(format!("Invalid timestamp: {}", e)));
    }

    parse_relative_timeframe(trimmed, now).or_else(|_| parse_absolute_timeframe(trimmed))
}

/// Midnight UTC of the day containing `timestamp`
pub fn start_of_utc_day(timestamp: Timestamp) -> Timestamp {
    timestamp - timestamp % SECONDS_PER_DAY
}

/// Current wall-clock time as a unix timestamp
pub fn now_timestamp() -> Timestamp {
    Utc::now().timestamp().max(0) as Timestamp
}
