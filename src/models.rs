use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;

use crate::error::LedgerError;

/// Fixed-width storage form; lexicographic order matches chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const WHOLE_SECOND_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub const DEFAULT_CATEGORY_COLOR: &str = "#666666";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RecordType {
    Income,
    Expense,
}

impl RecordType {
    pub const ALL: [RecordType; 2] = [RecordType::Income, RecordType::Expense];

    /// Text stored in the `records.type` column.
    pub fn label(self) -> &'static str {
        match self {
            RecordType::Income => "收入",
            RecordType::Expense => "支出",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RecordType::Income => "Income",
            RecordType::Expense => "Expense",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RecordType {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        RecordType::ALL
            .into_iter()
            .find(|kind| kind.label() == value)
            .ok_or_else(|| LedgerError::UnknownLabel {
                kind: "record type",
                value: value.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PaymentMethod {
    Cash,
    WeChat,
    Alipay,
    BankCard,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 4] = [
        PaymentMethod::Alipay,
        PaymentMethod::WeChat,
        PaymentMethod::Cash,
        PaymentMethod::BankCard,
    ];

    /// Text stored in the `records.payment_method` column.
    pub fn label(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "现金",
            PaymentMethod::WeChat => "微信",
            PaymentMethod::Alipay => "支付宝",
            PaymentMethod::BankCard => "银行卡",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Cash",
            PaymentMethod::WeChat => "WeChat Pay",
            PaymentMethod::Alipay => "Alipay",
            PaymentMethod::BankCard => "Bank card",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PaymentMethod {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|method| method.label() == value)
            .ok_or_else(|| LedgerError::UnknownLabel {
                kind: "payment method",
                value: value.to_string(),
            })
    }
}

fn label_from_sql<T>(value: ValueRef<'_>) -> FromSqlResult<T>
where
    T: FromStr<Err = LedgerError>,
{
    value
        .as_str()?
        .parse()
        .map_err(|err: LedgerError| FromSqlError::Other(Box::new(err)))
}

impl ToSql for RecordType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.label()))
    }
}

impl FromSql for RecordType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        label_from_sql(value)
    }
}

impl ToSql for PaymentMethod {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.label()))
    }
}

impl FromSql for PaymentMethod {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        label_from_sql(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub icon: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Zero until the store assigns one.
    pub id: i64,
    pub amount: f64,
    pub record_type: RecordType,
    pub category_id: i64,
    /// Joined at read time; `None` when the referenced category is missing.
    pub category: Option<Category>,
    pub payment_method: PaymentMethod,
    pub note: String,
    pub record_date: NaiveDateTime,
}

impl Record {
    pub fn new(
        amount: f64,
        record_type: RecordType,
        category: &Category,
        payment_method: PaymentMethod,
        note: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            amount,
            record_type,
            category_id: category.id,
            category: Some(category.clone()),
            payment_method,
            note: note.into(),
            record_date: Local::now().naive_local(),
        }
    }

    pub fn at(mut self, record_date: NaiveDateTime) -> Self {
        self.record_date = record_date;
        self
    }

    pub fn category_name(&self) -> Option<&str> {
        self.category.as_ref().map(|category| category.name.as_str())
    }

    pub fn formatted_date(&self) -> String {
        self.record_date.format("%m/%d %H:%M").to_string()
    }

    pub fn relative_label(&self, now: NaiveDateTime) -> String {
        relative_label(self.record_date, now)
    }
}

/// "Today HH:MM", "Yesterday HH:MM", or "MM/DD HH:MM" relative to `now`.
pub fn relative_label(at: NaiveDateTime, now: NaiveDateTime) -> String {
    let day = at.date();
    let today = now.date();
    if day == today {
        format!("Today {}", at.format("%H:%M"))
    } else if Some(day) == today.pred_opt() {
        format!("Yesterday {}", at.format("%H:%M"))
    } else {
        at.format("%m/%d %H:%M").to_string()
    }
}

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Lower bound for a text range scan. A whole-second instant drops its
/// fraction so rows stored as `...T00:00:00` still sort at or above it.
pub fn format_range_start(at: NaiveDateTime) -> String {
    if at.nanosecond() == 0 {
        at.format(WHOLE_SECOND_FORMAT).to_string()
    } else {
        format_timestamp(at)
    }
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_PARSE_FORMAT).ok()
}

pub fn month_key(day: NaiveDate) -> String {
    day.format("%Y-%m").to_string()
}

/// Per-type sums. Range summaries narrowed to one type carry a single key.
pub type TypeTotals = BTreeMap<RecordType, f64>;

/// Keyed by category name; `None` groups records whose category is missing.
pub type CategorySummary = BTreeMap<Option<String>, TypeTotals>;

pub fn zeroed_totals() -> TypeTotals {
    RecordType::ALL.into_iter().map(|kind| (kind, 0.0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn dt(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn labels_parse_back_to_variants() {
        for kind in RecordType::ALL {
            assert_eq!(kind.label().parse::<RecordType>().unwrap(), kind);
        }
        for method in PaymentMethod::ALL {
            assert_eq!(method.label().parse::<PaymentMethod>().unwrap(), method);
        }
    }

    #[test]
    fn unknown_labels_fail_lookup() {
        let err = "Income".parse::<RecordType>().unwrap_err();
        assert!(matches!(err, LedgerError::UnknownLabel { kind: "record type", .. }));
        assert!("PayPal".parse::<PaymentMethod>().is_err());
        assert!("".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn relative_label_today_and_yesterday() {
        let now = dt("2026-10-19 15:00");
        assert_eq!(relative_label(dt("2026-10-19 08:05"), now), "Today 08:05");
        assert_eq!(relative_label(dt("2026-10-18 23:59"), now), "Yesterday 23:59");
        assert_eq!(relative_label(dt("2026-10-17 12:30"), now), "10/17 12:30");
    }

    #[test]
    fn relative_label_crosses_month_and_year_boundaries() {
        assert_eq!(
            relative_label(dt("2026-09-30 21:10"), dt("2026-10-01 09:00")),
            "Yesterday 21:10"
        );
        assert_eq!(
            relative_label(dt("2025-12-31 07:45"), dt("2026-01-01 00:10")),
            "Yesterday 07:45"
        );
        assert_eq!(
            relative_label(dt("2026-02-28 10:00"), dt("2026-03-01 10:00")),
            "Yesterday 10:00"
        );
    }

    #[test]
    fn future_dates_use_absolute_form() {
        assert_eq!(
            relative_label(dt("2026-10-20 10:00"), dt("2026-10-19 10:00")),
            "10/20 10:00"
        );
    }

    #[test]
    fn timestamps_are_fixed_width() {
        let whole = format_timestamp(dt("2026-10-01 00:00"));
        assert_eq!(whole, "2026-10-01T00:00:00.000000");
        let later = format_timestamp(dt("2026-10-01 00:00") + Duration::microseconds(1500));
        assert_eq!(later.len(), whole.len());
        assert!(whole < later);
    }

    #[test]
    fn range_start_sorts_below_every_stored_form() {
        let midnight = dt("2026-10-01 00:00");
        let start = format_range_start(midnight);
        assert_eq!(start, "2026-10-01T00:00:00");
        assert!(start.as_str() <= "2026-10-01T00:00:00");
        assert!(start < format_timestamp(midnight));

        let fractional = midnight + Duration::microseconds(250);
        assert_eq!(format_range_start(fractional), format_timestamp(fractional));
    }

    #[test]
    fn parses_timestamps_with_and_without_fraction() {
        assert_eq!(parse_timestamp("2026-10-19T15:00:00"), Some(dt("2026-10-19 15:00")));
        assert_eq!(
            parse_timestamp("2026-10-19T15:00:00.000000"),
            Some(dt("2026-10-19 15:00"))
        );
        assert!(parse_timestamp("2026-10-19T15:00:00.123456").is_some());
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn record_formats_absolute_date() {
        let category = Category {
            id: 2,
            name: "Shopping".into(),
            icon: "🎒".into(),
            color: "#4ECDC4".into(),
        };
        let record = Record::new(12.5, RecordType::Expense, &category, PaymentMethod::Cash, "")
            .at(dt("2026-03-07 09:04"));
        assert_eq!(record.id, 0);
        assert_eq!(record.category_id, 2);
        assert_eq!(record.category_name(), Some("Shopping"));
        assert_eq!(record.formatted_date(), "03/07 09:04");
    }

    #[test]
    fn zeroed_totals_has_both_keys() {
        let totals = zeroed_totals();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[&RecordType::Income], 0.0);
        assert_eq!(totals[&RecordType::Expense], 0.0);
    }
}
