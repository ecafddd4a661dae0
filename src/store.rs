use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::{error, info};

use crate::db::{self, DbPool};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    month_key, zeroed_totals, Category, CategorySummary, Record, RecordType, TypeTotals,
};

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Owner of the ledger file. Every read and write of records and categories
/// goes through here.
///
/// The pool holds a single connection, so calls are serialized and there is
/// never more than one writer against the file.
///
/// Once `initialize` fails the store stops dialing the file: later calls
/// return [`LedgerError::Unavailable`] without waiting on the pool.
pub struct LedgerStore {
    pool: DbPool,
    path: PathBuf,
    unavailable: AtomicBool,
}

impl LedgerStore {
    /// Does not touch the file; connections are established on first use.
    pub fn open(path: &Path) -> Self {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(1)
            .min_idle(Some(0))
            .connection_timeout(CONNECTION_TIMEOUT)
            .build_unchecked(manager);
        Self {
            pool,
            path: path.to_path_buf(),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_conn<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&Connection) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(LedgerError::Unavailable(self.path.clone()));
        }
        self.checkout(operation, f)
    }

    fn checkout<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&Connection) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        self.pool
            .get()
            .map_err(LedgerError::from)
            .and_then(|conn| f(&conn))
            .inspect_err(|err| error!(operation, error = %err, "ledger store call failed"))
    }

    /// Creates the file and schema if needed and seeds the default
    /// categories. Safe to call repeatedly; a later success makes the store
    /// usable again after a failure.
    pub fn initialize(&self) -> LedgerResult<()> {
        let result = self.prepare_file();
        self.unavailable.store(result.is_err(), Ordering::Release);
        result?;
        info!(path = %self.path.display(), "ledger database ready");
        Ok(())
    }

    fn prepare_file(&self) -> LedgerResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).inspect_err(|err| {
                error!(operation = "initialize", error = %err, "cannot create ledger directory")
            })?;
        }
        self.checkout("initialize", |conn| Ok(db::run_migrations(conn)?))
    }

    /// Returns the id assigned to the new row. Amount and category are not
    /// validated here.
    pub fn add_record(&self, record: &Record) -> LedgerResult<i64> {
        self.with_conn("add_record", |conn| Ok(db::insert_record(conn, record)?))
    }

    pub fn get_all_records(&self, limit: Option<usize>) -> LedgerResult<Vec<Record>> {
        self.with_conn("get_all_records", |conn| Ok(db::list_records(conn, limit)?))
    }

    /// Inclusive on both ends. `None` means all types.
    pub fn get_records_by_date_range(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        record_type: Option<RecordType>,
    ) -> LedgerResult<Vec<Record>> {
        self.with_conn("get_records_by_date_range", |conn| {
            Ok(db::list_records_between(conn, start, end, record_type)?)
        })
    }

    /// Both types zero-filled, or only the requested type when one is given.
    pub fn get_summary_by_date_range(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        record_type: Option<RecordType>,
    ) -> LedgerResult<TypeTotals> {
        self.with_conn("get_summary_by_date_range", |conn| {
            let mut totals = zeroed_totals();
            totals.extend(db::type_totals_between(conn, start, end, record_type)?);
            Ok(match record_type {
                Some(kind) => TypeTotals::from([(kind, totals[&kind])]),
                None => totals,
            })
        })
    }

    pub fn get_category_summary(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        record_type: Option<RecordType>,
    ) -> LedgerResult<CategorySummary> {
        self.with_conn("get_category_summary", |conn| {
            let mut summary = CategorySummary::new();
            for (name, kind, amount) in db::category_totals_between(conn, start, end, record_type)? {
                summary
                    .entry(name)
                    .or_insert_with(zeroed_totals)
                    .insert(kind, amount);
            }
            Ok(summary)
        })
    }

    /// Totals for the current calendar month.
    pub fn get_monthly_summary(&self) -> LedgerResult<TypeTotals> {
        self.get_monthly_summary_for(Local::now().date_naive())
    }

    /// Totals for the calendar month containing `day`.
    pub fn get_monthly_summary_for(&self, day: NaiveDate) -> LedgerResult<TypeTotals> {
        self.with_conn("get_monthly_summary", |conn| {
            let mut totals = zeroed_totals();
            totals.extend(db::month_totals(conn, &month_key(day))?);
            Ok(totals)
        })
    }

    pub fn list_categories(&self) -> LedgerResult<Vec<Category>> {
        self.with_conn("list_categories", |conn| Ok(db::list_categories(conn)?))
    }

    pub fn record_count(&self) -> LedgerResult<i64> {
        self.with_conn("record_count", |conn| Ok(db::record_count(conn)?))
    }
}
