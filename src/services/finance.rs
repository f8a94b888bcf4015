use serde::Serialize;
use time::{Date, Duration};

use crate::domains::records::{FinanceKind, FinanceRecord};
use crate::local_time::parse_date;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FinanceStats {
    pub total_balance: f64,
    pub income_today: f64,
    pub expense_today: f64,
    pub expense_week: f64,
}

/// Monday and Sunday of the week containing `day`.
pub fn week_bounds(day: Date) -> (Date, Date) {
    let back = i64::from(day.weekday().number_days_from_monday());
    let monday = day.saturating_sub(Duration::days(back));
    (monday, monday.saturating_add(Duration::days(6)))
}

/// Balance is all-time; records whose date does not parse only count there.
pub fn finance_stats(records: &[FinanceRecord], today: Date) -> FinanceStats {
    let (monday, sunday) = week_bounds(today);
    records.iter().fold(FinanceStats::default(), |mut stats, record| {
        let signed = match record.kind {
            FinanceKind::Income => record.amount,
            FinanceKind::Expense => -record.amount,
        };
        stats.total_balance += signed;

        if let Some(date) = parse_date(&record.date) {
            match record.kind {
                FinanceKind::Income if date == today => stats.income_today += record.amount,
                FinanceKind::Expense => {
                    if date == today {
                        stats.expense_today += record.amount;
                    }
                    if date >= monday && date <= sunday {
                        stats.expense_week += record.amount;
                    }
                }
                FinanceKind::Income => {}
            }
        }
        stats
    })
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[test]
    fn week_runs_monday_to_sunday() {
        // 2025-03-05 is a Wednesday.
        assert_eq!(
            week_bounds(date!(2025 - 03 - 05)),
            (date!(2025 - 03 - 03), date!(2025 - 03 - 09))
        );
        assert_eq!(
            week_bounds(date!(2025 - 03 - 09)),
            (date!(2025 - 03 - 03), date!(2025 - 03 - 09))
        );
        assert_eq!(
            week_bounds(date!(2025 - 03 - 03)),
            (date!(2025 - 03 - 03), date!(2025 - 03 - 09))
        );
    }
}
