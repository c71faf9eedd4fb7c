use crate::{
    cli::Command,
    config::AppConfig,
    deadline::with_deadline,
    git::{self, GitStatus},
    input::SessionInput,
    limits::{LimitsFetcher, UsageLimits},
    paths::PathShortener,
    period::PeriodTracker,
    render::{self, RenderOptions, StatusSnapshot},
    report,
    storage::{SessionRecord, SpendStore, format_date},
    transcript,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{io::AsyncReadExt, task::JoinHandle};

/// High-level orchestrator for one invocation.
pub struct App {
    config: Arc<AppConfig>,
    store: SpendStore,
    tracker: PeriodTracker,
    shortener: PathShortener,
}

/// Session state to fold into the ledger and period record once the
/// status line is on screen.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    record: Option<SessionRecord>,
    session_id: String,
    session_cost: f64,
    resets_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default)]
struct SpendView {
    today_cost: f64,
    month_cost: f64,
    period_cost: f64,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        let store = SpendStore::new(config.storage.ledger_path());
        let tracker = PeriodTracker::new(config.storage.period_path());
        let shortener =
            PathShortener::new(config.display.path_style, config.display.home_dir.as_deref());
        Self {
            config: Arc::new(config),
            store,
            tracker,
            shortener,
        }
    }

    pub async fn run(self, command: Command) -> Result<()> {
        match command {
            Command::Statusline => self.statusline().await,
            Command::Today => {
                let ledger = self.store.load();
                println!("{}", report::today_report(&ledger, local_today(), &self.shortener));
                Ok(())
            }
            Command::Month => {
                let ledger = self.store.load();
                println!("{}", report::month_report(&ledger, local_today()));
                Ok(())
            }
        }
    }

    async fn statusline(&self) -> Result<()> {
        let mut raw = String::new();
        if let Err(err) = tokio::io::stdin().read_to_string(&mut raw).await {
            tracing::warn!(error = %err, "failed to read session payload from stdin");
        }

        let (output, pending) = self.refresh(&raw, Utc::now(), local_today()).await;
        {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{output}").context("failed to write status line")?;
            stdout.flush().context("failed to flush status line")?;
        }

        // Only awaited so the runtime does not drop the write on exit.
        if let Err(err) = self.spawn_persist(pending).await {
            tracing::warn!(error = %err, "background persistence task failed");
        }
        Ok(())
    }

    /// Gathers every enrichment source concurrently and renders the status
    /// line. Nothing is written to disk here.
    pub async fn refresh(
        &self,
        raw: &str,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> (String, PendingWrite) {
        let input = SessionInput::parse(raw);
        let cost = input.cost.total_cost_usd;
        let record = session_record(&input, today);

        let cwd = input
            .working_dir()
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok());
        let fetcher = LimitsFetcher::new(self.config.limits.clone());

        let (git, limits, context_tokens, spend) = tokio::join!(
            with_deadline(
                "git",
                self.config.git.timeout(),
                GitStatus::NotRepository,
                collect_git(cwd.as_deref()),
            ),
            with_deadline(
                "usage-limits",
                self.config.limits.timeout(),
                UsageLimits::default(),
                fetcher.fetch(),
            ),
            scan_context(input.transcript_path.clone()),
            self.read_spend(record.clone(), today, now),
        );

        let snapshot = StatusSnapshot {
            model: input.model_label().map(str::to_string),
            path: input.working_dir().map(|dir| self.shortener.shorten(dir)),
            git,
            session_cost: cost,
            session_duration_ms: input.cost.total_duration_ms,
            lines_added: input.cost.total_lines_added,
            lines_removed: input.cost.total_lines_removed,
            context_tokens,
            limits: limits.clone(),
            period_cost: spend.period_cost,
            today_cost: spend.today_cost,
            month_cost: spend.month_cost,
        };
        let options = RenderOptions {
            context_window_tokens: self.config.display.context_window_tokens,
            seven_day_threshold: self.config.display.seven_day_threshold,
            color: self.config.display.color,
        };
        let output = render::render(&snapshot, &options, now);

        let pending = PendingWrite {
            record,
            session_id: input.session_id.clone(),
            session_cost: cost,
            resets_at: limits.five_hour.and_then(|window| window.resets_at),
        };
        (output, pending)
    }

    /// Ledger and period reads; the live session is merged in memory so it
    /// counts exactly once whether or not an earlier refresh stored it.
    async fn read_spend(
        &self,
        current: Option<SessionRecord>,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> SpendView {
        let store = self.store.clone();
        let tracker = self.tracker.clone();
        let view = tokio::task::spawn_blocking(move || {
            let mut ledger = store.load();
            if let Some(record) = current {
                ledger.upsert(record);
            }
            SpendView {
                today_cost: ledger.day_totals(today).total_cost,
                month_cost: ledger.month_to_date(today).total_cost,
                period_cost: tracker.current_cost(now),
            }
        })
        .await;
        view.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "spend read task failed");
            SpendView::default()
        })
    }

    /// Best-effort persistence: failures are logged and dropped, never
    /// surfaced to the status line.
    pub fn spawn_persist(&self, pending: PendingWrite) -> JoinHandle<()> {
        let store = self.store.clone();
        let tracker = self.tracker.clone();
        tokio::task::spawn_blocking(move || {
            if let Some(record) = pending.record {
                if let Err(err) = store.upsert(record) {
                    tracing::warn!(error = %err, path = %store.path().display(), "failed to persist session");
                }
            }
            if pending.session_id.is_empty() {
                return;
            }
            if let Err(err) =
                tracker.update(pending.resets_at, &pending.session_id, pending.session_cost)
            {
                tracing::warn!(error = %err, "failed to update period cost");
            }
        })
    }
}

fn session_record(input: &SessionInput, today: NaiveDate) -> Option<SessionRecord> {
    if input.session_id.is_empty() || input.cost.total_cost_usd <= 0.0 {
        return None;
    }
    Some(SessionRecord {
        id: input.session_id.clone(),
        cost: input.cost.total_cost_usd,
        date: format_date(today),
        duration_ms: input.cost.total_duration_ms,
        working_directory: input.working_dir().unwrap_or_default().to_string(),
    })
}

async fn collect_git(cwd: Option<&Path>) -> GitStatus {
    match cwd {
        Some(cwd) => git::collect(cwd).await,
        None => GitStatus::NotRepository,
    }
}

async fn scan_context(path: Option<PathBuf>) -> u64 {
    let Some(path) = path else {
        return 0;
    };
    tokio::task::spawn_blocking(move || transcript::scan_context_tokens(&path))
        .await
        .unwrap_or(0)
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::PeriodCostRecord;
    use axum::{Json, Router, routing::get};
    use std::fs;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    fn test_config(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.storage.data_dir = dir.path().join("data");
        config.limits.credentials_path = dir.path().join("missing-credentials.json");
        config.limits.endpoint = "http://127.0.0.1:9/api/oauth/usage".to_string();
        config.display.color = false;
        config.display.home_dir = Some(dir.path().to_path_buf());
        config
    }

    fn test_app(dir: &TempDir) -> App {
        App::new(test_config(dir))
    }

    /// App whose usage endpoint reports the given 5-hour window.
    async fn app_with_usage(dir: &TempDir, utilization: f64, resets_at: &'static str) -> App {
        let router = Router::new().route(
            "/api/oauth/usage",
            get(move || async move {
                Json(serde_json::json!({
                    "five_hour": { "utilization": utilization, "resets_at": resets_at },
                    "seven_day": { "utilization": 40.0, "resets_at": "2025-06-05T00:00:00Z" }
                }))
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        let credentials = dir.path().join(".credentials.json");
        fs::write(
            &credentials,
            serde_json::json!({ "claudeAiOauth": { "accessToken": "token-1" } }).to_string(),
        )
        .unwrap();

        let mut config = test_config(dir);
        config.limits.endpoint = format!("http://{addr}/api/oauth/usage");
        config.limits.credentials_path = credentials;
        App::new(config)
    }

    fn period_record(dir: &TempDir) -> Option<PeriodCostRecord> {
        let raw = fs::read_to_string(dir.path().join("data").join("period-cost.json")).ok()?;
        Some(serde_json::from_str(&raw).unwrap())
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn payload(dir: &TempDir, session: &str, cost: f64) -> String {
        serde_json::json!({
            "session_id": session,
            "transcript_path": dir.path().join("transcript.jsonl"),
            "cwd": dir.path(),
            "model": { "id": "claude-opus-4-1", "display_name": "Opus" },
            "workspace": { "current_dir": dir.path(), "project_dir": dir.path() },
            "cost": { "total_cost_usd": cost, "total_duration_ms": 60000 }
        })
        .to_string()
    }

    #[tokio::test]
    async fn first_refresh_renders_and_creates_ledger_record() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir);

        let (output, pending) = app.refresh(&payload(&dir, "s1", 0.10), now(), today()).await;
        assert_eq!(output.lines().count(), 2);
        assert!(output.contains("$0.10"));
        assert!(output.contains("1m"));
        assert!(output.contains("Opus"));
        assert!(output.contains("today $0.10 · month $0.10"));

        app.spawn_persist(pending).await.unwrap();

        let ledger = app.store.load();
        assert_eq!(ledger.sessions.len(), 1);
        assert_eq!(ledger.sessions[0].id, "s1");
        assert_eq!(ledger.sessions[0].date, "2025-06-01");
        assert_eq!(ledger.sessions[0].duration_ms, 60_000);
        assert!(!dir.path().join("data").join("period-cost.json").exists());
    }

    #[tokio::test]
    async fn repeated_refreshes_keep_one_record_and_count_it_once() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir);

        let (_, pending) = app.refresh(&payload(&dir, "s1", 0.10), now(), today()).await;
        app.spawn_persist(pending).await.unwrap();
        let (output, pending) = app.refresh(&payload(&dir, "s1", 0.25), now(), today()).await;
        app.spawn_persist(pending).await.unwrap();

        assert!(output.contains("today $0.25 · month $0.25"));
        let ledger = app.store.load();
        assert_eq!(ledger.sessions.len(), 1);
        assert!((ledger.sessions[0].cost - 0.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn period_cost_accumulates_across_sessions_in_one_window() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with_usage(&dir, 95.0, "2025-06-01T14:59:58Z").await;

        let (output, pending) = app.refresh(&payload(&dir, "a", 1.00), now(), today()).await;
        assert!(output.contains("5h 95% ↻2h59m"));
        assert!(!output.contains("↻2h59m $"));
        app.spawn_persist(pending).await.unwrap();
        let record = period_record(&dir).expect("period record after first session");
        assert!((record.cost - 1.0).abs() < 1e-9);
        assert_eq!(record.last_session_id, "a");

        let (output, pending) = app.refresh(&payload(&dir, "b", 2.00), now(), today()).await;
        assert!(output.contains("5h 95% ↻2h59m $1.00"));
        app.spawn_persist(pending).await.unwrap();

        let (output, pending) = app.refresh(&payload(&dir, "b", 2.50), now(), today()).await;
        assert!(output.contains("5h 95% ↻2h59m $3.00"));
        assert!(output.contains("7d 40%"));
        app.spawn_persist(pending).await.unwrap();

        let record = period_record(&dir).unwrap();
        assert!((record.cost - 3.0).abs() < 1e-9);
        assert_eq!(record.last_session_id, "b");
        assert_eq!(
            record.resets_at,
            DateTime::parse_from_rfc3339("2025-06-01T15:00:00Z")
                .unwrap()
                .with_timezone(&Utc)
        );
    }

    #[tokio::test]
    async fn session_without_id_leaves_period_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with_usage(&dir, 20.0, "2025-06-01T15:00:00Z").await;

        let (output, pending) = app.refresh(&payload(&dir, "", 1.50), now(), today()).await;
        assert!(output.contains("5h 20% ↻3h0m"));
        app.spawn_persist(pending).await.unwrap();
        assert!(period_record(&dir).is_none());
        assert!(app.store.load().sessions.is_empty());

        let (_, pending) = app.refresh(&payload(&dir, "a", 1.00), now(), today()).await;
        app.spawn_persist(pending).await.unwrap();
        let (_, pending) = app.refresh(&payload(&dir, "", 4.00), now(), today()).await;
        app.spawn_persist(pending).await.unwrap();

        let record = period_record(&dir).unwrap();
        assert!((record.cost - 1.0).abs() < 1e-9);
        assert_eq!(record.last_session_id, "a");
    }

    #[tokio::test]
    async fn garbage_input_still_renders_minimum_output() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir);

        let (output, pending) = app.refresh("not json at all", now(), today()).await;
        assert_eq!(output.lines().count(), 2);
        assert!(output.contains("$0.00"));
        assert!(output.contains("0s"));

        app.spawn_persist(pending).await.unwrap();
        assert!(app.store.load().sessions.is_empty());
    }

    #[tokio::test]
    async fn context_tokens_come_from_the_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir);
        fs::write(
            dir.path().join("transcript.jsonl"),
            r#"{"timestamp":"2025-06-01T11:59:00Z","message":{"usage":{"input_tokens":10,"cache_read_input_tokens":99000,"cache_creation_input_tokens":990}}}"#,
        )
        .unwrap();

        let (output, _) = app.refresh(&payload(&dir, "s1", 0.10), now(), today()).await;
        assert!(output.contains("100.0K █████░░░░░ 50%"));
    }
}
