use serde::Deserialize;
use std::path::{Path, PathBuf};

/// How working directories are compared against the home directory and
/// printed. `Auto` follows the platform the binary was built for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathStyle {
    #[default]
    Auto,
    Unix,
    Windows,
}

impl PathStyle {
    pub fn resolve(self) -> Self {
        match self {
            Self::Auto if cfg!(windows) => Self::Windows,
            Self::Auto => Self::Unix,
            other => other,
        }
    }

    fn separator(self) -> char {
        match self.resolve() {
            Self::Windows => '\\',
            _ => '/',
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathShortener {
    style: PathStyle,
    home: Option<String>,
}

impl PathShortener {
    pub fn new(style: PathStyle, home_override: Option<&Path>) -> Self {
        let home = home_override
            .map(Path::to_path_buf)
            .or_else(dirs::home_dir)
            .map(|home: PathBuf| home.to_string_lossy().into_owned());
        Self::with_home(style, home)
    }

    pub fn with_home(style: PathStyle, home: Option<String>) -> Self {
        let style = style.resolve();
        let home = home
            .map(|home| normalize(&home, style))
            .filter(|home| !home.is_empty());
        Self { style, home }
    }

    /// Replaces the home prefix with `~` and normalizes separators.
    pub fn shorten(&self, path: &str) -> String {
        let normalized = normalize(path, self.style);
        let Some(home) = self.home.as_deref() else {
            return normalized;
        };
        let sep = self.style.separator();

        let matches_prefix = |candidate: &str| match self.style {
            PathStyle::Windows => candidate.eq_ignore_ascii_case(home),
            _ => candidate == home,
        };

        if normalized.len() < home.len() || !normalized.is_char_boundary(home.len()) {
            return normalized;
        }
        let (head, rest) = normalized.split_at(home.len());
        if !matches_prefix(head) {
            return normalized;
        }
        if rest.is_empty() {
            "~".to_string()
        } else if rest.starts_with(sep) {
            format!("~{rest}")
        } else {
            normalized
        }
    }
}

fn normalize(path: &str, style: PathStyle) -> String {
    let mut out = match style {
        PathStyle::Windows => path.replace('/', "\\"),
        _ => path.to_string(),
    };
    let sep = style.separator();
    while out.len() > 1 && out.ends_with(sep) {
        out.pop();
    }
    out
}
