use std::path::Path;
use tokio::process::Command;

/// Working-tree summary for the session's directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GitStatus {
    #[default]
    NotRepository,
    Repository(RepoStatus),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoStatus {
    pub branch: String,
    pub dirty: bool,
    pub staged: DiffCounts,
    pub unstaged: DiffCounts,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffCounts {
    pub added: u64,
    pub deleted: u64,
    pub files: u64,
}

impl DiffCounts {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.deleted == 0 && self.files == 0
    }

    /// Sums `git diff --numstat` output. Binary files report `-` counts,
    /// which count as zero lines but still count as a changed file.
    pub fn from_numstat(output: &str) -> Self {
        let mut counts = Self::default();
        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            let added = fields.next().and_then(|v| v.trim().parse::<u64>().ok());
            let deleted = fields.next().and_then(|v| v.trim().parse::<u64>().ok());
            counts.added += added.unwrap_or(0);
            counts.deleted += deleted.unwrap_or(0);
            counts.files += 1;
        }
        counts
    }
}

/// Collects branch and diff counts with the `git` CLI. Any failure to run
/// git, or a directory outside a repository, yields `NotRepository`.
pub async fn collect(cwd: &Path) -> GitStatus {
    let Some(inside) = run_git(&["rev-parse", "--is-inside-work-tree"], cwd).await else {
        return GitStatus::NotRepository;
    };
    if inside.trim() != "true" {
        return GitStatus::NotRepository;
    }

    let (branch, head, porcelain, staged, unstaged) = tokio::join!(
        run_git(&["rev-parse", "--abbrev-ref", "HEAD"], cwd),
        run_git(&["rev-parse", "--short", "HEAD"], cwd),
        run_git(&["status", "--porcelain"], cwd),
        run_git(&["diff", "--cached", "--numstat"], cwd),
        run_git(&["diff", "--numstat"], cwd),
    );

    let branch = branch_label(branch.as_deref(), head.as_deref());
    let staged = staged.as_deref().map(DiffCounts::from_numstat).unwrap_or_default();
    let unstaged = unstaged
        .as_deref()
        .map(DiffCounts::from_numstat)
        .unwrap_or_default();
    let dirty = porcelain
        .as_deref()
        .map(|out| out.lines().any(|line| !line.trim().is_empty()))
        .unwrap_or(false)
        || !staged.is_empty()
        || !unstaged.is_empty();

    GitStatus::Repository(RepoStatus {
        branch,
        dirty,
        staged,
        unstaged,
    })
}

fn branch_label(abbrev: Option<&str>, short_head: Option<&str>) -> String {
    let abbrev = abbrev.map(str::trim).filter(|b| !b.is_empty());
    match abbrev {
        Some("HEAD") | None => short_head
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(|h| format!("@{h}"))
            .unwrap_or_else(|| "HEAD".to_string()),
        Some(branch) => branch.to_string(),
    }
}

async fn run_git(args: &[&str], cwd: &Path) -> Option<String> {
    let output = match Command::new("git")
        .args(args)
        .current_dir(cwd)
        .kill_on_drop(true)
        .output()
        .await
    {
        Ok(output) => output,
        Err(err) => {
            tracing::debug!(error = %err, ?args, "failed to spawn git");
            return None;
        }
    };
    if !output.status.success() {
        tracing::debug!(status = %output.status, ?args, "git exited unsuccessfully");
        return None;
    }
    String::from_utf8(output.stdout).ok()
}
