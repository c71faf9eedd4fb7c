use crate::{
    paths::PathShortener,
    render::{format_cost, format_duration},
    storage::{Ledger, format_date},
};
use chrono::NaiveDate;
use std::fmt::Write;

pub const NO_SESSIONS_TODAY: &str = "No sessions recorded today.";
pub const NO_SESSIONS_THIS_MONTH: &str = "No sessions recorded this month.";

/// Today's sessions in ledger order, followed by a total line.
pub fn today_report(ledger: &Ledger, today: NaiveDate, shortener: &PathShortener) -> String {
    let sessions = ledger.sessions_on(today);
    if sessions.is_empty() {
        return NO_SESSIONS_TODAY.to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "Sessions for {}", format_date(today));
    for record in &sessions {
        let path = if record.working_directory.is_empty() {
            "-".to_string()
        } else {
            shortener.shorten(&record.working_directory)
        };
        let _ = writeln!(
            out,
            "  {:>9}  {:>7}  {}",
            format_cost(record.cost),
            format_duration(record.duration_ms),
            path
        );
    }

    let totals = ledger.day_totals(today);
    let _ = write!(
        out,
        "Total: {} across {} session{} ({})",
        format_cost(totals.total_cost),
        totals.count,
        plural(totals.count),
        format_duration(totals.total_duration_ms)
    );
    out
}

/// Month-to-date spend per day, newest first, with a grand total.
pub fn month_report(ledger: &Ledger, today: NaiveDate) -> String {
    let days = ledger.month_by_day(today);
    if days.is_empty() {
        return NO_SESSIONS_THIS_MONTH.to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "Spend for {}", today.format("%B %Y"));
    for day in &days {
        let _ = writeln!(
            out,
            "  {}  {:>9}  {} session{}",
            day.date,
            format_cost(day.totals.total_cost),
            day.totals.count,
            plural(day.totals.count)
        );
    }

    let totals = ledger.month_to_date(today);
    let _ = write!(
        out,
        "Total: {} across {} session{}",
        format_cost(totals.total_cost),
        totals.count,
        plural(totals.count)
    );
    out
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{paths::PathStyle, storage::SessionRecord};

    fn record(id: &str, cost: f64, date: &str, duration_ms: u64, dir: &str) -> SessionRecord {
        SessionRecord {
            id: id.into(),
            cost,
            date: date.into(),
            duration_ms,
            working_directory: dir.into(),
        }
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn shortener() -> PathShortener {
        PathShortener::with_home(PathStyle::Unix, Some("/home/ada".into()))
    }

    #[test]
    fn empty_ledger_prints_no_data() {
        let ledger = Ledger::default();
        assert_eq!(
            today_report(&ledger, day("2025-03-04"), &shortener()),
            NO_SESSIONS_TODAY
        );
        assert_eq!(month_report(&ledger, day("2025-03-04")), NO_SESSIONS_THIS_MONTH);
    }

    #[test]
    fn today_lists_sessions_and_total() {
        let mut ledger = Ledger::default();
        ledger.upsert(record("a", 0.42, "2025-03-04", 720_000, "/home/ada/app"));
        ledger.upsert(record("b", 1.00, "2025-03-03", 60_000, "/home/ada/old"));
        ledger.upsert(record("c", 0.08, "2025-03-04", 30_000, "/srv/tool"));

        let out = today_report(&ledger, day("2025-03-04"), &shortener());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Sessions for 2025-03-04");
        assert_eq!(lines.len(), 4);
        assert!(lines[1].contains("$0.42") && lines[1].contains("12m") && lines[1].ends_with("~/app"));
        assert!(lines[2].contains("$0.08") && lines[2].ends_with("/srv/tool"));
        assert_eq!(lines[3], "Total: $0.50 across 2 sessions (12m)");
        assert!(!out.contains("~/old"));
    }

    #[test]
    fn today_without_matching_date_prints_no_data() {
        let mut ledger = Ledger::default();
        ledger.upsert(record("b", 1.00, "2025-03-03", 60_000, "/tmp"));
        assert_eq!(
            today_report(&ledger, day("2025-03-04"), &shortener()),
            NO_SESSIONS_TODAY
        );
    }

    #[test]
    fn month_excludes_other_months() {
        let mut ledger = Ledger::default();
        ledger.upsert(record("prev", 7.00, "2025-02-28", 1, "/tmp"));
        ledger.upsert(record("a", 1.25, "2025-03-01", 1, "/tmp"));
        ledger.upsert(record("b", 2.00, "2025-03-04", 1, "/tmp"));
        ledger.upsert(record("c", 0.50, "2025-03-04", 1, "/tmp"));
        ledger.upsert(record("next", 9.00, "2025-04-02", 1, "/tmp"));

        let out = month_report(&ledger, day("2025-03-04"));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Spend for March 2025");
        assert!(lines[1].starts_with("  2025-03-04") && lines[1].contains("$2.50") && lines[1].ends_with("2 sessions"));
        assert!(lines[2].starts_with("  2025-03-01") && lines[2].contains("$1.25") && lines[2].ends_with("1 session"));
        assert_eq!(lines[3], "Total: $3.75 across 3 sessions");
        assert!(!out.contains("2025-02-28"));
        assert!(!out.contains("2025-04-02"));
    }
}
