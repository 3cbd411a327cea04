//! Permission-gated user notifications.
//!
//! | Type | Role |
//! |------|------|
//! | [`NotificationQueue`] | FIFO delivery gated on [`Permission`], dedup by tag, auto-dismiss |
//! | [`NotificationSurface`] | Platform seam ([`RecordingSurface`] records in memory) |
//! | [`NotificationRequest`] | What to show; built directly or through the domain builders |
//!
//! Domain builders: [`price_alert`], [`trading_signal`], [`portfolio_update`],
//! [`market_status`].

mod builders;
mod queue;
mod request;
mod surface;

pub use builders::{
    market_status, portfolio_update, price_alert, trading_signal, Direction, MarketStatus,
    PortfolioDelta, PriceAlert, SignalKind, TradingSignal, STICKY_SIGNAL_CONFIDENCE,
};
pub use queue::{NotificationQueue, QueueConfig, SendOutcome};
pub use request::{
    DisplayedNotification, NotificationAction, NotificationRequest, DEFAULT_BADGE, DEFAULT_ICON,
};
pub use surface::{NotificationSurface, Permission, PermissionFuture, RecordingSurface, ShownRecord};
