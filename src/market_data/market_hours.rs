//! Exchange trading-hours oracle

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Offset, Timelike, Utc, Weekday};

/// Source of the current time, injectable for tests
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Regular trading session of an exchange, evaluated in exchange-local civil time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketHours {
    offset: FixedOffset,
    open: NaiveTime,
    close: NaiveTime,
}

impl MarketHours {
    pub fn new(offset: FixedOffset, open: NaiveTime, close: NaiveTime) -> Self {
        Self {
            offset,
            open,
            close,
        }
    }

    /// NSE/BSE cash session: 09:15 to 15:30 IST
    pub fn nse() -> Self {
        Self {
            offset: ist_offset(),
            open: NaiveTime::from_hms_opt(9, 15, 0).unwrap_or_default(),
            close: NaiveTime::from_hms_opt(15, 30, 0).unwrap_or_default(),
        }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Whether the session is open at `now`
    ///
    /// Closed on weekends. On weekdays the check is at minute resolution and both
    /// ends are inclusive, so 15:30:59 local still counts as open.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }

        let minute_of_day = local.hour() * 60 + local.minute();
        let open = self.open.hour() * 60 + self.open.minute();
        let close = self.close.hour() * 60 + self.close.minute();
        (open..=close).contains(&minute_of_day)
    }
}

impl Default for MarketHours {
    fn default() -> Self {
        Self::nse()
    }
}

const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Whether the NSE cash session is open at `now`
pub fn is_open(now: DateTime<Utc>) -> bool {
    MarketHours::nse().is_open(now)
}
