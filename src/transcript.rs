use chrono::{DateTime, Utc};
use serde_json::Value;
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

/// Token counts that occupy the context window for one assistant turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContextUsage {
    pub input_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub cache_creation_input_tokens: u64,
}

impl ContextUsage {
    fn from_value(value: &Value) -> Option<Self> {
        let field = |name: &str| value.get(name).and_then(|v| v.as_u64()).unwrap_or(0);
        if !value.is_object() {
            return None;
        }
        Some(Self {
            input_tokens: field("input_tokens"),
            cache_read_input_tokens: field("cache_read_input_tokens"),
            cache_creation_input_tokens: field("cache_creation_input_tokens"),
        })
    }

    pub fn context_tokens(self) -> u64 {
        self.input_tokens
            .saturating_add(self.cache_read_input_tokens)
            .saturating_add(self.cache_creation_input_tokens)
    }
}

/// Returns the context size reported by the newest usage-bearing record in
/// a JSONL transcript, or 0 when the file is missing or has none.
pub fn scan_context_tokens(path: &Path) -> u64 {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            tracing::debug!(error = %err, path = %path.display(), "transcript not readable");
            return 0;
        }
    };
    latest_usage(BufReader::new(file))
        .map(ContextUsage::context_tokens)
        .unwrap_or(0)
}

fn latest_usage(reader: impl BufRead) -> Option<ContextUsage> {
    let mut latest: Option<(DateTime<Utc>, ContextUsage)> = None;

    for line in reader.lines() {
        let Ok(line) = line else {
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let Some((timestamp, usage)) = usage_record(&value) else {
            continue;
        };
        if latest.is_none_or(|(seen, _)| timestamp >= seen) {
            latest = Some((timestamp, usage));
        }
    }

    latest.map(|(_, usage)| usage)
}

fn usage_record(value: &Value) -> Option<(DateTime<Utc>, ContextUsage)> {
    let flagged = |name: &str| value.get(name).and_then(|v| v.as_bool()).unwrap_or(false);
    if flagged("isSidechain") || flagged("isApiErrorMessage") {
        return None;
    }
    let usage = value.get("message")?.get("usage")?;
    let usage = ContextUsage::from_value(usage)?;
    let timestamp = value
        .get("timestamp")
        .and_then(|v| v.as_str())
        .and_then(parse_timestamp)?;
    Some((timestamp, usage))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
