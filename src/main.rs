#[macro_use]
extern crate rocket;

mod config;
mod db;
mod error;
mod models;
mod store;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use rocket::form::Form;
use rocket::fs::FileServer;
use rocket::response::Redirect;
use rocket::serde::Serialize;
use rocket::{Build, Rocket, State};
use rocket_dyn_templates::Template;
use tracing::{error, info, warn};

use config::AppConfig;
use error::{LedgerError, LedgerResult};
use models::{
    zeroed_totals, Category, CategorySummary, PaymentMethod, Record, RecordType, TypeTotals,
};
use store::LedgerStore;

const RECENT_LIMIT: usize = 10;
const STATS_DEFAULT_DAYS: i64 = 30;
const UNCATEGORIZED: &str = "Uncategorized";
const END_OF_DAY: NaiveTime = match NaiveTime::from_hms_opt(23, 59, 59) {
    Some(time) => time,
    None => panic!("23:59:59 is a valid time"),
};

#[derive(FromForm)]
struct RecordForm {
    kind: String,
    amount: String,
    category_id: Option<i64>,
    payment_method: String,
    note: Option<String>,
}

#[derive(Serialize)]
struct RecordView {
    id: i64,
    when: String,
    date: String,
    income: bool,
    kind: &'static str,
    category_name: String,
    icon: String,
    amount: String,
    payment_method: &'static str,
    note: String,
}

#[derive(Serialize)]
struct OptionView {
    value: &'static str,
    label: &'static str,
}

#[derive(Serialize, Debug, PartialEq)]
struct StatsTotalsView {
    income: String,
    expense: String,
    balance: String,
}

#[derive(Serialize, Debug, PartialEq)]
struct CategoryRowView {
    name: String,
    income: String,
    expense: String,
    share: String,
}

fn format_money(amount: f64) -> String {
    format!("{amount:.2}")
}

/// Keeps digits and the first decimal point, with at most two decimals.
fn sanitize_amount(input: &str) -> String {
    let mut out = String::new();
    let mut decimals: Option<usize> = None;
    for ch in input.chars() {
        match (ch, decimals) {
            ('0'..='9', None) => out.push(ch),
            ('0'..='9', Some(count)) if count < 2 => {
                out.push(ch);
                decimals = Some(count + 1);
            }
            ('.', None) => {
                out.push('.');
                decimals = Some(0);
            }
            _ => {}
        }
    }
    out
}

fn parse_amount(input: &str) -> Option<f64> {
    let cleaned = sanitize_amount(input);
    if cleaned.is_empty() || cleaned == "." {
        return None;
    }
    cleaned.parse().ok()
}

/// Empty, "All" and "全部" mean no filter.
fn parse_type_filter(value: &str) -> LedgerResult<Option<RecordType>> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("all") || value == "全部" {
        return Ok(None);
    }
    value.parse().map(Some)
}

/// Whole days: `start` from midnight, `end` through 23:59:59.
fn parse_day_range(start: &str, end: &str) -> LedgerResult<(NaiveDateTime, NaiveDateTime)> {
    let parse = |value: &str| {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
            LedgerError::Validation("Dates must use the YYYY-MM-DD format".to_string())
        })
    };
    Ok((
        parse(start)?.and_time(NaiveTime::MIN),
        parse(end)?.and_time(END_OF_DAY),
    ))
}

fn build_record(
    form: &RecordForm,
    categories: &[Category],
    now: NaiveDateTime,
) -> LedgerResult<Record> {
    let category = form
        .category_id
        .and_then(|id| categories.iter().find(|category| category.id == id))
        .ok_or_else(|| LedgerError::Validation("Please choose a category".to_string()))?;
    let amount = parse_amount(&form.amount)
        .filter(|amount| *amount > 0.0)
        .ok_or_else(|| LedgerError::Validation("Amount must be greater than 0".to_string()))?;
    let record_type: RecordType = form.kind.parse()?;
    let payment_method: PaymentMethod = form.payment_method.parse()?;
    let note = form.note.as_deref().unwrap_or_default().trim();

    Ok(Record::new(amount, record_type, category, payment_method, note).at(now))
}

fn record_view(record: Record, now: NaiveDateTime) -> RecordView {
    let income = record.record_type == RecordType::Income;
    let sign = if income { "+" } else { "-" };
    RecordView {
        id: record.id,
        when: record.relative_label(now),
        date: record.formatted_date(),
        income,
        kind: record.record_type.name(),
        category_name: record.category_name().unwrap_or(UNCATEGORIZED).to_string(),
        icon: record
            .category
            .as_ref()
            .map(|category| category.icon.clone())
            .unwrap_or_default(),
        amount: format!("{sign}{}", format_money(record.amount)),
        payment_method: record.payment_method.name(),
        note: record.note,
    }
}

fn type_options() -> Vec<OptionView> {
    RecordType::ALL
        .into_iter()
        .map(|kind| OptionView {
            value: kind.label(),
            label: kind.name(),
        })
        .collect()
}

fn payment_options() -> Vec<OptionView> {
    PaymentMethod::ALL
        .into_iter()
        .map(|method| OptionView {
            value: method.label(),
            label: method.name(),
        })
        .collect()
}

fn total_of(totals: &TypeTotals, kind: RecordType) -> f64 {
    totals.get(&kind).copied().unwrap_or(0.0)
}

fn stats_totals(filter: Option<RecordType>, summary: &TypeTotals) -> StatsTotalsView {
    let (income, expense) = match filter {
        None => (
            total_of(summary, RecordType::Income),
            total_of(summary, RecordType::Expense),
        ),
        Some(RecordType::Income) => (total_of(summary, RecordType::Income), 0.0),
        Some(RecordType::Expense) => (0.0, total_of(summary, RecordType::Expense)),
    };
    StatsTotalsView {
        income: format_money(income),
        expense: format_money(expense),
        balance: format_money(income - expense),
    }
}

fn category_rows(
    filter: Option<RecordType>,
    summary: &TypeTotals,
    categories: &CategorySummary,
) -> Vec<CategoryRowView> {
    let total = match filter {
        None => total_of(summary, RecordType::Income) + total_of(summary, RecordType::Expense),
        Some(kind) => total_of(summary, kind),
    };
    let cell = |amount: f64, shown: bool| {
        if shown && amount > 0.0 {
            format_money(amount)
        } else {
            "-".to_string()
        }
    };

    categories
        .iter()
        .map(|(name, totals)| {
            let income = total_of(totals, RecordType::Income);
            let expense = total_of(totals, RecordType::Expense);
            let counted = match filter {
                None => income + expense,
                Some(RecordType::Income) => income,
                Some(RecordType::Expense) => expense,
            };
            let share = if counted > 0.0 && total > 0.0 {
                format!("{:.1}%", counted / total * 100.0)
            } else {
                "-".to_string()
            };
            CategoryRowView {
                name: name.clone().unwrap_or_else(|| UNCATEGORIZED.to_string()),
                income: cell(income, filter != Some(RecordType::Expense)),
                expense: cell(expense, filter != Some(RecordType::Income)),
                share,
            }
        })
        .collect()
}

fn render_dashboard(store: &LedgerStore, error: Option<&str>, notice: Option<&str>) -> Template {
    let now = Local::now().naive_local();
    let month = store.get_monthly_summary().unwrap_or_else(|_| zeroed_totals());
    let income = total_of(&month, RecordType::Income);
    let expense = total_of(&month, RecordType::Expense);
    let recent = store
        .get_all_records(Some(RECENT_LIMIT))
        .unwrap_or_default()
        .into_iter()
        .map(|record| record_view(record, now))
        .collect::<Vec<_>>();
    let categories = store.list_categories().unwrap_or_default();

    let context = serde_json::json!({
        "balance": format_money(income - expense),
        "income": format_money(income),
        "expense": format_money(expense),
        "records": recent,
        "categories": categories,
        "types": type_options(),
        "payment_methods": payment_options(),
        "default_type": RecordType::Expense.label(),
        "default_payment": PaymentMethod::Alipay.label(),
        "error": error,
        "notice": notice,
    });
    Template::render("dashboard", &context)
}

#[get("/?<saved>")]
fn dashboard(store: &State<LedgerStore>, saved: Option<bool>) -> Template {
    let notice = saved.unwrap_or(false).then_some("Record saved");
    render_dashboard(store, None, notice)
}

#[post("/records", data = "<form>")]
fn add_record(store: &State<LedgerStore>, form: Form<RecordForm>) -> Result<Redirect, Template> {
    let categories = store.list_categories().unwrap_or_default();
    let record = build_record(&form, &categories, Local::now().naive_local())
        .map_err(|err| render_dashboard(store, Some(&err.to_string()), None))?;
    store
        .add_record(&record)
        .map_err(|_| render_dashboard(store, Some("Failed to save the record"), None))?;
    Ok(Redirect::to("/?saved=true"))
}

#[get("/records")]
fn all_records(store: &State<LedgerStore>) -> Template {
    let now = Local::now().naive_local();
    let records = store
        .get_all_records(None)
        .unwrap_or_default()
        .into_iter()
        .map(|record| record_view(record, now))
        .collect::<Vec<_>>();
    Template::render("records", serde_json::json!({ "records": records }))
}

#[get("/stats?<start>&<end>&<kind>")]
fn statistics(
    store: &State<LedgerStore>,
    start: Option<String>,
    end: Option<String>,
    kind: Option<String>,
) -> Template {
    let today = Local::now().date_naive();
    let start = start.unwrap_or_else(|| {
        (today - Duration::days(STATS_DEFAULT_DAYS))
            .format("%Y-%m-%d")
            .to_string()
    });
    let end = end.unwrap_or_else(|| today.format("%Y-%m-%d").to_string());
    let kind = kind.unwrap_or_else(|| "All".to_string());

    let mut context = serde_json::json!({
        "start": start,
        "end": end,
        "kind": kind,
        "types": type_options(),
        "error": null,
        "totals": stats_totals(None, &zeroed_totals()),
        "rows": Vec::<CategoryRowView>::new(),
    });

    let query = parse_type_filter(&kind)
        .and_then(|filter| parse_day_range(&start, &end).map(|range| (filter, range)));
    match query {
        Ok((filter, (from, to))) => {
            let summary = store
                .get_summary_by_date_range(from, to, filter)
                .unwrap_or_else(|_| zeroed_totals());
            let categories = store
                .get_category_summary(from, to, filter)
                .unwrap_or_default();
            context["totals"] = serde_json::json!(stats_totals(filter, &summary));
            context["rows"] = serde_json::json!(category_rows(filter, &summary, &categories));
        }
        Err(err) => context["error"] = serde_json::json!(err.to_string()),
    }
    Template::render("stats", &context)
}

/// First-run demo data so the dashboard is not empty.
fn seed_sample_records(store: &LedgerStore) {
    match store.record_count() {
        Ok(0) => {}
        _ => return,
    }
    let categories = store.list_categories().unwrap_or_default();
    let samples = [
        (256.80, RecordType::Expense, 2, PaymentMethod::Alipay, "supermarket"),
        (6600.00, RecordType::Income, 8, PaymentMethod::WeChat, "salary"),
        (128.00, RecordType::Expense, 1, PaymentMethod::WeChat, "dinner"),
        (39.00, RecordType::Expense, 4, PaymentMethod::Cash, "movie tickets"),
    ];
    for (amount, kind, category_id, method, note) in samples {
        let Some(category) = categories.iter().find(|c| c.id == category_id) else {
            warn!(category_id, "sample category missing, skipping");
            continue;
        };
        if store
            .add_record(&Record::new(amount, kind, category, method, note))
            .is_err()
        {
            return;
        }
    }
    info!("inserted sample records");
}

fn build_rocket(rocket: Rocket<Build>) -> Rocket<Build> {
    let config = AppConfig::from_figment(rocket.figment());
    let store = LedgerStore::open(&config.ledger_path);
    if let Err(err) = store.initialize() {
        error!(path = %store.path().display(), error = %err, "ledger unavailable, continuing");
    }
    seed_sample_records(&store);

    rocket
        .manage(store)
        .mount(
            "/",
            routes![dashboard, add_record, all_records, statistics],
        )
        .mount("/static", FileServer::from("static"))
        .attach(Template::fairing())
}

#[launch]
fn rocket() -> _ {
    build_rocket(rocket::build())
}
