//! Market data controllers and their building blocks

pub mod candle;
pub mod chart;
pub mod market_hours;
pub mod price_display;
pub mod scheduler;

pub use candle::{Candle, CandleRequest, DateRange, Interval, normalize_candles};
pub use chart::{ChartController, ChartEvent};
pub use market_hours::{Clock, MarketHours, SystemClock, is_open};
pub use price_display::{PriceBadge, PriceDisplayController, PriceEvent, PriceSource, PriceView};
pub use scheduler::{AutoRefreshScheduler, RefreshSignal, SchedulerState};
