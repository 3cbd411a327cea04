//! Domain notification builders. All pure: they only shape requests.

use serde::{Deserialize, Serialize};
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::request::NotificationRequest;

/// Confidence at or above which a signal stays up until acknowledged.
pub const STICKY_SIGNAL_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Above,
    Below,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Above => "above",
            Self::Below => "below",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAlert {
    pub symbol: String,
    pub price: f64,
    pub target: f64,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalKind {
    Buy,
    Sell,
    Hold,
}

impl SignalKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub symbol: String,
    pub signal: SignalKind,
    /// In `0.0..=1.0`.
    pub confidence: f64,
    pub price: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioDelta {
    pub total_value: f64,
    pub change: f64,
    pub change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStatus {
    pub market: String,
    pub is_open: bool,
    pub next_change: Option<String>,
}

pub fn price_alert(alert: &PriceAlert) -> NotificationRequest {
    let title = format!("{} price alert", alert.symbol);
    let body = format!(
        "{} is now {}, {} your target of {}",
        alert.symbol,
        money(alert.price),
        alert.direction.as_str(),
        money(alert.target)
    );

    NotificationRequest::new(title, body)
        .with_tag(format!("price-{}", alert.symbol))
        .with_payload(json!({
            "type": "price_alert",
            "symbol": alert.symbol,
            "price": alert.price,
            "target": alert.target,
            "direction": alert.direction,
        }))
        .with_action("view_chart", "View chart")
        .with_action("dismiss", "Dismiss")
}

pub fn trading_signal(signal: &TradingSignal) -> NotificationRequest {
    let confidence = (signal.confidence.clamp(0.0, 1.0) * 100.0).round();
    let title = format!("{} signal: {}", signal.signal.as_str(), signal.symbol);
    let body = match signal.price {
        Some(price) => format!("{confidence}% confidence at {}", money(price)),
        None => format!("{confidence}% confidence"),
    };
    let generated_at = signal.generated_at.format(&Rfc3339).ok();

    let request = NotificationRequest::new(title, body)
        .with_tag(format!("signal-{}", signal.symbol))
        .with_payload(json!({
            "type": "trading_signal",
            "symbol": signal.symbol,
            "signal": signal.signal,
            "confidence": signal.confidence,
            "price": signal.price,
            "generated_at": generated_at,
        }))
        .with_action("view_signal", "View signal")
        .with_action("dismiss", "Dismiss");

    if signal.confidence >= STICKY_SIGNAL_CONFIDENCE {
        request.requiring_interaction()
    } else {
        request
    }
}

pub fn portfolio_update(delta: &PortfolioDelta) -> NotificationRequest {
    let sign = if delta.change >= 0.0 { "+" } else { "-" };
    let body = format!(
        "Total value {} ({sign}{}, {sign}{:.2}%)",
        money(delta.total_value),
        money(delta.change.abs()),
        delta.change_percent.abs()
    );

    NotificationRequest::new("Portfolio update", body)
        .with_tag("portfolio-update")
        .with_payload(json!({
            "type": "portfolio_update",
            "total_value": delta.total_value,
            "change": delta.change,
            "change_percent": delta.change_percent,
        }))
        .with_action("view_portfolio", "View portfolio")
}

pub fn market_status(status: &MarketStatus) -> NotificationRequest {
    let state = if status.is_open { "open" } else { "closed" };
    let title = format!("{} is {state}", status.market);
    let body = match &status.next_change {
        Some(next) if status.is_open => format!("Closes at {next}"),
        Some(next) => format!("Opens at {next}"),
        None => format!("{} is now {state}", status.market),
    };

    NotificationRequest::new(title, body)
        .with_tag("market-status")
        .with_payload(json!({
            "type": "market_status",
            "market": status.market,
            "is_open": status.is_open,
            "next_change": status.next_change,
        }))
        .with_action("dismiss", "Dismiss")
}

/// `1234.5` -> `$1,234.50`
fn money(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}
