//! Trailing return computation from daily closes.

use chrono::Datelike;
use screener_core::{PricePoint, Security};

/// Approximate trading sessions in three months and one month.
const SESSIONS_3M: usize = 63;
const SESSIONS_1M: usize = 21;

fn pct_change(from: f64, to: f64) -> Option<f64> {
    if from == 0.0 {
        None
    } else {
        Some((to - from) / from * 100.0)
    }
}

/// Fill the trailing-return fields from roughly one year of daily closes
/// (oldest first). Fields whose lookback exceeds the history stay `None`.
pub fn apply(security: &mut Security, history: &[PricePoint]) {
    let Some(last) = history.last() else {
        return;
    };
    let len = history.len();

    if len >= 2 {
        security.return_1y = pct_change(history[0].close, last.close);
    }
    if len > SESSIONS_3M {
        security.return_3m = pct_change(history[len - 1 - SESSIONS_3M].close, last.close);
    }
    if len > SESSIONS_1M {
        security.return_1m = pct_change(history[len - 1 - SESSIONS_1M].close, last.close);
    }

    // YTD: first session of the current calendar year within the window
    let year = last.date.year();
    if let Some(first_of_year) = history.iter().find(|p| p.date.year() == year) {
        if first_of_year.date != last.date {
            security.return_ytd = pct_change(first_of_year.close, last.close);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn history(start: (i32, u32, u32), closes: &[f64]) -> Vec<PricePoint> {
        let start = NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PricePoint {
                date: start + chrono::Duration::days(i as i64),
                close,
            })
            .collect()
    }

    #[test]
    fn test_one_year_return_from_window_edges() {
        let mut closes = vec![100.0; 250];
        closes[249] = 150.0;
        let mut sec = Security::new("X");
        apply(&mut sec, &history((2024, 9, 1), &closes));
        assert!((sec.return_1y.unwrap() - 50.0).abs() < 1e-9);
        assert!(sec.return_3m.is_some());
        assert!(sec.return_1m.is_some());
    }

    #[test]
    fn test_short_history_leaves_long_lookbacks_unset() {
        let mut sec = Security::new("X");
        apply(&mut sec, &history((2025, 8, 1), &[100.0, 101.0, 102.0]));
        assert!(sec.return_1y.is_some());
        assert!(sec.return_3m.is_none());
        assert!(sec.return_1m.is_none());
    }

    #[test]
    fn test_empty_history_is_a_noop() {
        let mut sec = Security::new("X");
        apply(&mut sec, &[]);
        assert!(sec.return_1y.is_none());
        assert!(sec.return_ytd.is_none());
    }

    #[test]
    fn test_ytd_measured_from_first_session_of_year() {
        // 40 days spanning a year boundary starting Dec 20
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let mut sec = Security::new("X");
        apply(&mut sec, &history((2024, 12, 20), &closes));

        // Jan 1 is index 12 (close 112); last close 139
        let expected = (139.0 - 112.0) / 112.0 * 100.0;
        assert!((sec.return_ytd.unwrap() - expected).abs() < 1e-9);
    }
}
