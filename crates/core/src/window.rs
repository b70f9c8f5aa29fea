//! Time-window arithmetic for day and sub-window processing.

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};

/// A half-open UTC interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    /// The UTC date this window belongs to (taken from its start).
    pub fn date(&self) -> NaiveDate {
        self.start.date_naive()
    }
}

/// The full-day window `[00:00, 24:00)` for a UTC date.
pub fn day_bounds(date: NaiveDate) -> TimeWindow {
    let start = date.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc();
    TimeWindow::new(start, start + Duration::days(1))
}

/// Split a day into consecutive `chunk_hours`-wide sub-windows, in
/// chronological order. A chunk width that does not divide 24 gets a short
/// final window clamped to the end of the day.
pub fn sub_windows(date: NaiveDate, chunk_hours: u32) -> Vec<TimeWindow> {
    let chunk_hours = chunk_hours.clamp(1, 24);
    let day = day_bounds(date);
    let step = Duration::hours(i64::from(chunk_hours));

    let mut windows = Vec::new();
    let mut start = day.start;
    while start < day.end {
        let end = (start + step).min(day.end);
        windows.push(TimeWindow::new(start, end));
        start = end;
    }
    windows
}

/// The most recent fully elapsed hour before `now`.
pub fn previous_hour(now: DateTime<Utc>) -> TimeWindow {
    let hour_start = now
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .expect("hour truncation is valid");
    TimeWindow::new(hour_start - Duration::hours(1), hour_start)
}

/// All dates in `[from, to]`, oldest first.
pub fn date_range(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut d = from;
    while d <= to {
        dates.push(d);
        d = d.succ_opt().expect("date overflow");
    }
    dates
}
