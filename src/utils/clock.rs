use chrono::{DateTime, Local, NaiveDate, NaiveTime, Timelike};

/// Represents an entity responsible for providing dates across application. This allows the
/// planner to be tested with a frozen "now".
pub trait Clock: Sync + Send + 'static {
    fn time(&self) -> DateTime<Local>;

    fn today(&self) -> NaiveDate {
        self.time().date_naive()
    }

    /// Current wall clock time truncated to minutes, the resolution of agenda cells.
    fn minute(&self) -> NaiveTime {
        let now = self.time().time();
        NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).unwrap_or(now)
    }

    fn timestamp_millis(&self) -> i64 {
        self.time().timestamp_millis()
    }
}

pub struct DefaultClock;

impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock frozen at a single moment.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Local>);

impl Clock for FixedClock {
    fn time(&self) -> DateTime<Local> {
        self.0
    }
}
