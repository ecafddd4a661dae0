use chrono::{Local, NaiveDateTime};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, Result, Row};
use tracing::warn;

use crate::models::{
    format_range_start, format_timestamp, parse_timestamp, Category, Record, RecordType,
    DEFAULT_CATEGORY_COLOR,
};

pub type DbPool = Pool<SqliteConnectionManager>;

const DEFAULT_CATEGORIES: &[(i64, &str, &str, &str)] = &[
    (1, "Food & Drink", "🍔", "#FF6B6B"),
    (2, "Shopping", "🎒", "#4ECDC4"),
    (3, "Transport", "🚗", "#45B7D1"),
    (4, "Entertainment", "🎮", "#96CEB4"),
    (5, "Electronics", "📱", "#F7DC6F"),
    (6, "Healthcare", "🏥", "#BB8FCE"),
    (7, "Education", "📚", "#F1948A"),
    (8, "Salary", "💰", "#52BE80"),
    (9, "Investment", "📈", "#5499C7"),
    (10, "Other", "📦", "#95A5A6"),
];

const RECORD_SELECT: &str = "
    SELECT r.id, r.amount, r.type, COALESCE(r.category_id, 0), r.payment_method, r.note,
           r.record_date, c.id, c.name, c.icon, c.color
    FROM records r
    LEFT JOIN categories c ON r.category_id = c.id
";

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            amount REAL NOT NULL,
            type TEXT NOT NULL,
            category_id INTEGER,
            payment_method TEXT NOT NULL,
            note TEXT,
            record_date TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            icon TEXT,
            color TEXT
        );
        ",
    )?;
    seed_default_categories(conn)
}

fn seed_default_categories(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO categories (id, name, icon, color) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (id, name, icon, color) in DEFAULT_CATEGORIES {
            stmt.execute(params![id, name, icon, color])?;
        }
    }
    tx.commit()
}

pub fn list_categories(conn: &Connection) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare(
        "
        SELECT id, name, icon, color
        FROM categories
        ORDER BY id
        ",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
            icon: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            color: row
                .get::<_, Option<String>>(3)?
                .unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string()),
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn insert_record(conn: &Connection, record: &Record) -> Result<i64> {
    conn.execute(
        "
        INSERT INTO records (amount, type, category_id, payment_method, note, record_date)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ",
        params![
            record.amount,
            record.record_type,
            record.category_id,
            record.payment_method,
            record.note,
            format_timestamp(record.record_date)
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn record_count(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
}

fn record_from_row(row: &Row<'_>) -> Result<Record> {
    let raw_date: String = row.get(6)?;
    let record_date = parse_timestamp(&raw_date).unwrap_or_else(|| {
        let id: i64 = row.get(0).unwrap_or_default();
        warn!(record_id = id, raw_date = %raw_date, "unparseable record date, using now");
        Local::now().naive_local()
    });
    let category = match row.get::<_, Option<i64>>(7)? {
        Some(id) => Some(Category {
            id,
            name: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
            icon: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
            color: row
                .get::<_, Option<String>>(10)?
                .unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string()),
        }),
        None => None,
    };

    Ok(Record {
        id: row.get(0)?,
        amount: row.get(1)?,
        record_type: row.get(2)?,
        category_id: row.get(3)?,
        category,
        payment_method: row.get(4)?,
        note: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        record_date,
    })
}

/// Most recent first. `None` returns every record.
pub fn list_records(conn: &Connection, limit: Option<usize>) -> Result<Vec<Record>> {
    let limit = limit.map_or(-1, |value| i64::try_from(value).unwrap_or(i64::MAX));
    let mut stmt = conn.prepare(&format!(
        "{RECORD_SELECT}
        ORDER BY r.record_date DESC, r.id DESC
        LIMIT ?1
        "
    ))?;
    let rows = stmt.query_map(params![limit], record_from_row)?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Records with `start <= record_date <= end`, optionally of one type.
pub fn list_records_between(
    conn: &Connection,
    start: NaiveDateTime,
    end: NaiveDateTime,
    record_type: Option<RecordType>,
) -> Result<Vec<Record>> {
    let mut stmt = conn.prepare(&format!(
        "{RECORD_SELECT}
        WHERE r.record_date BETWEEN ?1 AND ?2
          AND (?3 IS NULL OR r.type = ?3)
        ORDER BY r.record_date DESC, r.id DESC
        "
    ))?;
    let rows = stmt.query_map(
        params![format_range_start(start), format_timestamp(end), record_type],
        record_from_row,
    )?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// One row per type that has records in range; empty groups are absent.
pub fn type_totals_between(
    conn: &Connection,
    start: NaiveDateTime,
    end: NaiveDateTime,
    record_type: Option<RecordType>,
) -> Result<Vec<(RecordType, f64)>> {
    let mut stmt = conn.prepare(
        "
        SELECT type, SUM(amount)
        FROM records
        WHERE record_date BETWEEN ?1 AND ?2
          AND (?3 IS NULL OR type = ?3)
        GROUP BY type
        ",
    )?;
    let rows = stmt.query_map(
        params![format_range_start(start), format_timestamp(end), record_type],
        |row| {
            Ok((
                row.get(0)?,
                row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
            ))
        },
    )?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn category_totals_between(
    conn: &Connection,
    start: NaiveDateTime,
    end: NaiveDateTime,
    record_type: Option<RecordType>,
) -> Result<Vec<(Option<String>, RecordType, f64)>> {
    let mut stmt = conn.prepare(
        "
        SELECT c.name, r.type, SUM(r.amount)
        FROM records r
        LEFT JOIN categories c ON r.category_id = c.id
        WHERE r.record_date BETWEEN ?1 AND ?2
          AND (?3 IS NULL OR r.type = ?3)
        GROUP BY c.name, r.type
        ",
    )?;
    let rows = stmt.query_map(
        params![format_range_start(start), format_timestamp(end), record_type],
        |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
            ))
        },
    )?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// `month` is `YYYY-MM`.
pub fn month_totals(conn: &Connection, month: &str) -> Result<Vec<(RecordType, f64)>> {
    let mut stmt = conn.prepare(
        "
        SELECT type, SUM(amount)
        FROM records
        WHERE substr(record_date, 1, 7) = ?1
        GROUP BY type
        ",
    )?;
    let rows = stmt.query_map(params![month], |row| {
        Ok((
            row.get(0)?,
            row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
