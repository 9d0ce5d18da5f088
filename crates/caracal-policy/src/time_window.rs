use caracal_core::Timestamp;
use chrono::{Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    Rolling,
    Calendar,
}

/// `(start, end)` in unix seconds; `end` is always `reference_time`.
/// Grounded on `caracal/core/time_windows.py`'s `TimeWindowCalculator`,
/// matching spec §4.3's table exactly, including the 30-day monthly
/// approximation for rolling windows.
pub fn calculate_window_bounds(
    window: TimeWindow,
    window_type: WindowType,
    reference_time: Timestamp,
) -> Result<(Timestamp, Timestamp), PolicyError> {
    let start = match window_type {
        WindowType::Rolling => rolling_start(window, reference_time),
        WindowType::Calendar => calendar_start(window, reference_time)?,
    };
    Ok((start, reference_time))
}

fn rolling_start(window: TimeWindow, reference_time: Timestamp) -> Timestamp {
    let seconds = match window {
        TimeWindow::Hourly => 3_600,
        TimeWindow::Daily => 86_400,
        TimeWindow::Weekly => 7 * 86_400,
        TimeWindow::Monthly => 30 * 86_400, // documented approximation
    };
    reference_time - seconds
}

fn calendar_start(window: TimeWindow, reference_time: Timestamp) -> Result<Timestamp, PolicyError> {
    let dt = Utc
        .timestamp_opt(reference_time, 0)
        .single()
        .ok_or_else(|| PolicyError::InvalidPolicy("reference_time out of range".into()))?;

    let start = match window {
        TimeWindow::Hourly => dt
            .with_minute(0)
            .and_then(|d| d.with_second(0))
            .and_then(|d| d.with_nanosecond(0))
            .unwrap(),
        TimeWindow::Daily => dt
            .with_hour(0)
            .and_then(|d| d.with_minute(0))
            .and_then(|d| d.with_second(0))
            .and_then(|d| d.with_nanosecond(0))
            .unwrap(),
        TimeWindow::Weekly => {
            let midnight = dt
                .with_hour(0)
                .and_then(|d| d.with_minute(0))
                .and_then(|d| d.with_second(0))
                .and_then(|d| d.with_nanosecond(0))
                .unwrap();
            let days_since_monday = midnight.weekday().num_days_from_monday();
            midnight - chrono::Duration::days(days_since_monday as i64)
        }
        TimeWindow::Monthly => {
            let naive = dt
                .date_naive()
                .with_day(1)
                .ok_or_else(|| PolicyError::InvalidPolicy("invalid month".into()))?
                .and_hms_opt(0, 0, 0)
                .unwrap();
            Utc.from_utc_datetime(&naive)
        }
    };
    Ok(start.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> Timestamp {
        Utc.from_utc_datetime(&NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, mi, s).unwrap())
            .timestamp()
    }

    #[test]
    fn rolling_windows_are_exact_durations() {
        let reference = ts(2026, 7, 28, 12, 30, 0);
        for (window, expected_seconds) in [
            (TimeWindow::Hourly, 3_600),
            (TimeWindow::Daily, 86_400),
            (TimeWindow::Weekly, 7 * 86_400),
            (TimeWindow::Monthly, 30 * 86_400),
        ] {
            let (start, end) = calculate_window_bounds(window, WindowType::Rolling, reference).unwrap();
            assert_eq!(end, reference);
            assert_eq!(reference - start, expected_seconds);
        }
    }

    #[test]
    fn calendar_windows_align_to_boundaries_and_precede_reference() {
        // Tuesday 2026-07-28 12:30:00 UTC
        let reference = ts(2026, 7, 28, 12, 30, 0);

        let (hourly_start, _) = calculate_window_bounds(TimeWindow::Hourly, WindowType::Calendar, reference).unwrap();
        assert_eq!(hourly_start, ts(2026, 7, 28, 12, 0, 0));

        let (daily_start, _) = calculate_window_bounds(TimeWindow::Daily, WindowType::Calendar, reference).unwrap();
        assert_eq!(daily_start, ts(2026, 7, 28, 0, 0, 0));

        let (weekly_start, _) = calculate_window_bounds(TimeWindow::Weekly, WindowType::Calendar, reference).unwrap();
        assert_eq!(weekly_start, ts(2026, 7, 27, 0, 0, 0)); // most recent Monday

        let (monthly_start, _) = calculate_window_bounds(TimeWindow::Monthly, WindowType::Calendar, reference).unwrap();
        assert_eq!(monthly_start, ts(2026, 7, 1, 0, 0, 0));

        assert!(hourly_start <= reference);
        assert!(daily_start <= reference);
        assert!(weekly_start <= reference);
        assert!(monthly_start <= reference);
    }
}
