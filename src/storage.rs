use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Spend of one assistant session, keyed by session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub cost: f64,
    /// Calendar day in `YYYY-MM-DD` form.
    pub date: String,
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    #[serde(default)]
    pub working_directory: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub sessions: Vec<SessionRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregateTotals {
    pub total_cost: f64,
    pub total_duration_ms: u64,
    pub count: usize,
}

impl AggregateTotals {
    fn add(&mut self, record: &SessionRecord) {
        self.total_cost += record.cost;
        self.total_duration_ms = self.total_duration_ms.saturating_add(record.duration_ms);
        self.count += 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayTotals {
    pub date: String,
    pub totals: AggregateTotals,
}

impl Ledger {
    /// Replaces the record with the same id, or appends it.
    pub fn upsert(&mut self, record: SessionRecord) {
        match self.sessions.iter_mut().find(|existing| existing.id == record.id) {
            Some(existing) => *existing = record,
            None => self.sessions.push(record),
        }
    }

    pub fn aggregate<P>(&self, predicate: P) -> AggregateTotals
    where
        P: Fn(&SessionRecord) -> bool,
    {
        let mut totals = AggregateTotals::default();
        for record in &self.sessions {
            if predicate(record) {
                totals.add(record);
            }
        }
        totals
    }

    pub fn sessions_on(&self, day: NaiveDate) -> Vec<&SessionRecord> {
        let date = format_date(day);
        self.sessions.iter().filter(|r| r.date == date).collect()
    }

    pub fn day_totals(&self, day: NaiveDate) -> AggregateTotals {
        let date = format_date(day);
        self.aggregate(|record| record.date == date)
    }

    pub fn month_to_date(&self, today: NaiveDate) -> AggregateTotals {
        let prefix = month_prefix(today);
        self.aggregate(|record| record.date.starts_with(&prefix))
    }

    /// Month-to-date totals per day, newest day first.
    pub fn month_by_day(&self, today: NaiveDate) -> Vec<DayTotals> {
        let prefix = month_prefix(today);
        let mut by_day: BTreeMap<&str, AggregateTotals> = BTreeMap::new();
        for record in self.sessions.iter().filter(|r| r.date.starts_with(&prefix)) {
            by_day.entry(record.date.as_str()).or_default().add(record);
        }
        by_day
            .into_iter()
            .rev()
            .map(|(date, totals)| DayTotals {
                date: date.to_string(),
                totals,
            })
            .collect()
    }
}

/// JSON file holding the session ledger. Reads never fail; a missing or
/// corrupt file reads as an empty ledger and is replaced on the next save.
#[derive(Debug, Clone)]
pub struct SpendStore {
    path: PathBuf,
}

impl SpendStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Ledger {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) => {
                tracing::debug!(error = %err, path = %self.path.display(), "ledger not readable, starting empty");
                return Ledger::default();
            }
        };
        match serde_json::from_str(&contents) {
            Ok(ledger) => ledger,
            Err(err) => {
                tracing::warn!(error = %err, path = %self.path.display(), "ledger is corrupt, starting empty");
                Ledger::default()
            }
        }
    }

    /// Rewrites the whole file through a sibling temp file and a rename.
    pub fn save(&self, ledger: &Ledger) -> Result<()> {
        write_json_atomic(&self.path, ledger)
    }

    pub fn upsert(&self, record: SessionRecord) -> Result<()> {
        let mut ledger = self.load();
        ledger.upsert(record);
        self.save(&ledger)
    }
}

pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value).context("failed to serialize JSON")?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

pub fn format_date(day: NaiveDate) -> String {
    day.format(DATE_FORMAT).to_string()
}

/// `YYYY-MM-` of the given day; records outside that month never match.
fn month_prefix(day: NaiveDate) -> String {
    day.format("%Y-%m-").to_string()
}
