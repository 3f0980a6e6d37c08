use crate::ledger::{Direction, Transaction};
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, Local, Months, NaiveDate, TimeZone};
use rust_decimal::Decimal;
use serde::Serialize;

/// A time window for statistics: relative to the current instant, or the
/// most recent occurrence of a named calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsWindow {
    Today,
    Week,
    Month,
    Year,
    CalendarMonth(u32),
}

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

impl StatsWindow {
    pub fn parse(input: &str) -> Option<StatsWindow> {
        let input = input.trim().to_lowercase();
        match input.as_str() {
            "today" => return Some(StatsWindow::Today),
            "week" => return Some(StatsWindow::Week),
            "month" => return Some(StatsWindow::Month),
            "year" => return Some(StatsWindow::Year),
            _ => {}
        }
        MONTH_NAMES
            .iter()
            .position(|name| *name == input)
            .map(|index| StatsWindow::CalendarMonth(index as u32 + 1))
    }

    /// Inclusive lower bound and exclusive upper bound, local time. Relative
    /// windows have no upper bound.
    pub fn bounds(&self, now: DateTime<Local>) -> Result<(DateTime<Local>, Option<DateTime<Local>>)> {
        match self {
            StatsWindow::Today => {
                let midnight = now
                    .date_naive()
                    .and_hms_opt(0, 0, 0)
                    .context("Invalid local midnight")?;
                let start = Local
                    .from_local_datetime(&midnight)
                    .earliest()
                    .context("Local midnight does not exist in this timezone")?;
                Ok((start, None))
            }
            StatsWindow::Week => Ok((now - Duration::days(7), None)),
            StatsWindow::Month => {
                let start = now
                    .checked_sub_months(Months::new(1))
                    .context("Cannot step one month back")?;
                Ok((start, None))
            }
            StatsWindow::Year => {
                let start = now
                    .checked_sub_months(Months::new(12))
                    .context("Cannot step one year back")?;
                Ok((start, None))
            }
            StatsWindow::CalendarMonth(month) => {
                // Most recent occurrence: a month later than the current one
                // belongs to the previous year.
                let year = if *month > now.month() {
                    now.year() - 1
                } else {
                    now.year()
                };
                let start = month_start(year, *month)?;
                let end = if *month == 12 {
                    month_start(year + 1, 1)?
                } else {
                    month_start(year, month + 1)?
                };
                Ok((start, Some(end)))
            }
        }
    }

    pub fn label(&self, now: DateTime<Local>) -> String {
        match self {
            StatsWindow::Today => "today".to_string(),
            StatsWindow::Week => "last 7 days".to_string(),
            StatsWindow::Month => "last month".to_string(),
            StatsWindow::Year => "last year".to_string(),
            StatsWindow::CalendarMonth(month) => {
                let year = if *month > now.month() {
                    now.year() - 1
                } else {
                    now.year()
                };
                format!("{} {}", MONTH_NAMES[(*month - 1) as usize], year)
            }
        }
    }
}

fn month_start(year: i32, month: u32) -> Result<DateTime<Local>> {
    let naive = NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .with_context(|| format!("Invalid month {year}-{month}"))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .with_context(|| format!("Month start {year}-{month} does not exist in this timezone"))
}

/// Aggregates over one window. All sums are display-unit decimals and render
/// with six fractional digits.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub period: String,
    pub count: usize,
    pub total_received: Decimal,
    pub total_sent: Decimal,
    pub total_fees: Decimal,
    pub net_change: Decimal,
}

/// Pure aggregation over a transaction snapshot. Fees accrue from sent
/// transactions only; the tracked wallet pays nothing on receipt.
pub fn aggregate(
    transactions: &[Transaction],
    window: &StatsWindow,
    now: DateTime<Local>,
) -> Result<StatsSummary> {
    let (start, end) = window.bounds(now)?;
    let start_ms = start.timestamp_millis();
    let end_ms = end.map(|e| e.timestamp_millis());

    let mut count = 0usize;
    let mut total_received = Decimal::ZERO;
    let mut total_sent = Decimal::ZERO;
    let mut total_fees = Decimal::ZERO;

    for tx in transactions {
        if tx.timestamp_ms < start_ms {
            continue;
        }
        if let Some(end_ms) = end_ms {
            if tx.timestamp_ms >= end_ms {
                continue;
            }
        }

        count += 1;
        match tx.direction {
            Direction::Received => total_received += tx.value,
            Direction::Sent => {
                total_sent += tx.value;
                total_fees += tx.fee;
            }
        }
    }

    Ok(StatsSummary {
        period: window.label(now),
        count,
        total_received,
        total_sent,
        total_fees,
        net_change: total_received - total_sent - total_fees,
    })
}
