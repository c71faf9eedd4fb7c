use crate::{
    git::{DiffCounts, GitStatus},
    limits::{LimitWindow, UsageLimits},
};
use chrono::{DateTime, Utc};
use crossterm::style::{Color, Stylize};

const BAR_WIDTH: usize = 10;
const SEPARATOR: &str = " │ ";

/// Everything one refresh needs to draw; assembled by the app.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    pub model: Option<String>,
    pub path: Option<String>,
    pub git: GitStatus,
    pub session_cost: f64,
    pub session_duration_ms: u64,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub context_tokens: u64,
    pub limits: UsageLimits,
    pub period_cost: f64,
    pub today_cost: f64,
    pub month_cost: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub context_window_tokens: u64,
    pub seven_day_threshold: f64,
    pub color: bool,
}

/// ANSI styling that can be switched off for NO_COLOR and tests.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn paint(&self, text: &str, color: Color) -> String {
        if self.enabled {
            text.with(color).to_string()
        } else {
            text.to_string()
        }
    }

    pub fn dim(&self, text: &str) -> String {
        if self.enabled {
            text.dim().to_string()
        } else {
            text.to_string()
        }
    }
}

/// Two lines: repository/path/model, then spend/context/limits.
pub fn render(snapshot: &StatusSnapshot, options: &RenderOptions, now: DateTime<Utc>) -> String {
    let palette = Palette::new(options.color);
    format!(
        "{}\n{}",
        first_line(snapshot, &palette),
        second_line(snapshot, options, &palette, now)
    )
}

fn first_line(snapshot: &StatusSnapshot, palette: &Palette) -> String {
    let mut segments = Vec::new();

    if let GitStatus::Repository(repo) = &snapshot.git {
        let mut git = palette.paint(&format!("⎇ {}", repo.branch), Color::Magenta);
        if repo.dirty {
            git.push_str(&palette.paint("*", Color::Yellow));
        }
        if let Some(staged) = diff_segment("S", &repo.staged, palette) {
            git.push(' ');
            git.push_str(&staged);
        }
        if let Some(unstaged) = diff_segment("U", &repo.unstaged, palette) {
            git.push(' ');
            git.push_str(&unstaged);
        }
        segments.push(git);
    }

    if let Some(path) = snapshot.path.as_deref() {
        segments.push(palette.paint(path, Color::Blue));
    }
    if let Some(model) = snapshot.model.as_deref() {
        segments.push(palette.paint(model, Color::Cyan));
    }

    segments.join(SEPARATOR)
}

fn diff_segment(label: &str, counts: &DiffCounts, palette: &Palette) -> Option<String> {
    if counts.files == 0 {
        return None;
    }
    Some(format!(
        "{}:{}/{} {}",
        label,
        palette.paint(&format!("+{}", counts.added), Color::Green),
        palette.paint(&format!("-{}", counts.deleted), Color::Red),
        palette.dim(&format!("({}f)", counts.files)),
    ))
}

fn second_line(
    snapshot: &StatusSnapshot,
    options: &RenderOptions,
    palette: &Palette,
    now: DateTime<Utc>,
) -> String {
    let mut segments = Vec::new();

    segments.push(palette.paint(&format_cost(snapshot.session_cost), Color::Green));

    let percent = context_percent(snapshot.context_tokens, options.context_window_tokens);
    let tier = tier_color(percent);
    segments.push(format!(
        "{} {} {}",
        format_tokens(snapshot.context_tokens),
        palette.paint(&progress_bar(percent), tier),
        palette.paint(&format!("{percent:.0}%"), tier),
    ));

    segments.push(format_duration(snapshot.session_duration_ms));

    if snapshot.lines_added > 0 || snapshot.lines_removed > 0 {
        segments.push(format!(
            "{}/{}",
            palette.paint(&format!("+{}", snapshot.lines_added), Color::Green),
            palette.paint(&format!("-{}", snapshot.lines_removed), Color::Red),
        ));
    }

    if let Some(five) = snapshot.limits.five_hour.as_ref() {
        let mut segment = limit_segment("5h", five, palette, now);
        if snapshot.period_cost > 0.0 {
            segment.push(' ');
            segment.push_str(&palette.dim(&format_cost(snapshot.period_cost)));
        }
        segments.push(segment);

        if five.utilization_percent >= options.seven_day_threshold {
            if let Some(seven) = snapshot.limits.seven_day.as_ref() {
                segments.push(limit_segment("7d", seven, palette, now));
            }
        }
    }

    segments.push(format!(
        "today {} · month {}",
        palette.paint(&format_cost(snapshot.today_cost), Color::Yellow),
        palette.paint(&format_cost(snapshot.month_cost), Color::Yellow),
    ));

    segments.join(SEPARATOR)
}

fn limit_segment(label: &str, window: &LimitWindow, palette: &Palette, now: DateTime<Utc>) -> String {
    let percent = window.utilization_percent.clamp(0.0, 100.0);
    let mut segment = format!(
        "{} {}",
        label,
        palette.paint(&format!("{percent:.0}%"), tier_color(percent))
    );
    if let Some(resets_at) = window.resets_at {
        let remaining = (resets_at - now).num_milliseconds().max(0) as u64;
        segment.push(' ');
        segment.push_str(&palette.dim(&format!("↻{}", format_duration(remaining))));
    }
    segment
}

pub fn context_percent(tokens: u64, window: u64) -> f64 {
    if window == 0 {
        return 0.0;
    }
    (tokens as f64 / window as f64 * 100.0).min(100.0)
}

fn tier_color(percent: f64) -> Color {
    if percent >= 90.0 {
        Color::Red
    } else if percent >= 70.0 {
        Color::DarkYellow
    } else if percent >= 50.0 {
        Color::Yellow
    } else {
        Color::Green
    }
}

fn progress_bar(percent: f64) -> String {
    let filled = ((percent / 100.0) * BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(BAR_WIDTH);
    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

pub fn format_cost(cost: f64) -> String {
    format!("${:.2}", cost)
}

pub fn format_tokens(value: u64) -> String {
    if value >= 1_000_000 {
        format!("{:.1}M", value as f64 / 1_000_000.0)
    } else if value >= 1_000 {
        format!("{:.1}K", value as f64 / 1_000.0)
    } else {
        value.to_string()
    }
}

pub fn format_duration(ms: u64) -> String {
    let total_secs = ms / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}h{minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        format!("{seconds}s")
    }
}
