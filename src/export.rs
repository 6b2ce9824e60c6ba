use anyhow::Result;
use chrono::DateTime;
use csv::Writer;
use ledger_core::Trade;
use std::io::Write;

/// Write one CSV row per trade, oldest first
pub fn write_trades_csv<W: Write>(writer: W, trades: &[Trade]) -> Result<usize> {
    let mut wtr = Writer::from_writer(writer);

    wtr.write_record([
        "identifier",
        "timestamp",
        "time",
        "trade_type",
        "base_symbol",
        "base_address",
        "quote_symbol",
        "quote_address",
        "amount",
        "rate",
    ])?;

    let mut ordered: Vec<&Trade> = trades.iter().collect();
    ordered.sort_by(|a, b| {
        a.timestamp()
            .cmp(&b.timestamp())
            .then_with(|| a.identifier().cmp(&b.identifier()))
    });

    for trade in &ordered {
        let time = i64::try_from(trade.timestamp())
            .ok()
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_default();
        let trade_type = match trade.trade_type {
            ledger_core::TradeType::Buy => "buy",
            ledger_core::TradeType::Sell => "sell",
        };

        wtr.write_record([
            trade.identifier(),
            trade.timestamp().to_string(),
            time,
            trade_type.to_string(),
            trade.base_asset.symbol().to_string(),
            trade.base_asset.address().to_string(),
            trade.quote_asset.symbol().to_string(),
            trade.quote_asset.address().to_string(),
            trade.amount.to_string(),
            trade.rate.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(ordered.len())
}
