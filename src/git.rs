use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result, anyhow, bail};
use std::collections::HashMap;

use git2::{Repository, Status, StatusOptions, SubmoduleIgnore, SubmoduleStatus};
use tokio::process::Command;

/// The version-control operations a deploy run needs.
pub trait Vcs {
    /// Bring the local branch up to date with its remote.
    async fn sync(&self) -> Result<()>;
    async fn refresh_index(&self) -> Result<()>;
    /// Short status listing; empty when the tree is clean.
    async fn status(&self) -> Result<String>;
    async fn current_branch(&self) -> Result<String>;
    async fn tag_exists(&self, tag: &str) -> Result<bool>;
    /// Lightweight tag at HEAD.
    async fn create_tag(&self, tag: &str) -> Result<()>;
    async fn push_tags(&self) -> Result<()>;
}

/// A repository on disk, driven through git2 and the `git` binary.
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
}

impl GitRepo {
    /// Locate the repository containing `start`.
    pub async fn discover(start: impl AsRef<Path>) -> Result<Self> {
        let start = start.as_ref().to_path_buf();
        tracing::trace!("git: discovering repo root from {}", start.display());
        let root = tokio::task::spawn_blocking(move || {
            let repo = Repository::discover(&start)
                .with_context(|| format!("not a git repository: {}", start.display()))?;
            Ok::<_, anyhow::Error>(repo.workdir().unwrap_or(repo.path()).to_path_buf())
        })
        .await
        .map_err(|e| anyhow!("repo discovery task join error: {}", e))??;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn run_git<I, S>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let status = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .status()
            .await
            .context("failed to spawn git")?;
        if !status.success() {
            bail!("git command failed with status: {}", status);
        }
        Ok(())
    }

    async fn with_repo<T, F>(&self, what: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Repository) -> Result<T> + Send + 'static,
    {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            let repo = Repository::open(&root)?;
            f(&repo)
        })
        .await
        .map_err(|e| anyhow!("{} task join error: {}", what, e))?
    }
}

impl Vcs for GitRepo {
    async fn sync(&self) -> Result<()> {
        self.run_git(["pull"]).await
    }

    async fn refresh_index(&self) -> Result<()> {
        self.run_git(["update-index", "-q", "--ignore-submodules", "--refresh"])
            .await
    }

    async fn status(&self) -> Result<String> {
        self.with_repo("status", |repo| {
            let mut opts = StatusOptions::new();
            opts.include_untracked(true).recurse_untracked_dirs(false);
            // path -> name, submodule names may differ from their paths
            let submodules: HashMap<String, String> = repo
                .submodules()?
                .iter()
                .filter_map(|sm| {
                    let path = sm.path().to_str()?.to_string();
                    Some((path, sm.name()?.to_string()))
                })
                .collect();
            let statuses = repo.statuses(Some(&mut opts))?;
            let mut out = String::new();
            for entry in statuses.iter() {
                let path = entry.path().unwrap_or("<non-utf8 path>");
                let code = match submodules.get(path) {
                    Some(name) => {
                        let sm = repo.submodule_status(name, SubmoduleIgnore::None)?;
                        submodule_code(entry.status(), sm)
                    }
                    None => short_code(entry.status()),
                };
                let Some(code) = code else {
                    continue;
                };
                out.push_str(&format!("{} {}\n", code, path));
            }
            Ok(out)
        })
        .await
    }

    async fn current_branch(&self) -> Result<String> {
        self.with_repo("current_branch", |repo| {
            if repo.head_detached()? {
                return Ok(String::from("HEAD"));
            }
            let head = repo.head().context("HEAD does not point to a commit")?;
            let name = head
                .shorthand()
                .ok_or_else(|| anyhow!("branch name is not valid UTF-8"))?;
            Ok(name.trim_end().to_string())
        })
        .await
    }

    async fn tag_exists(&self, tag: &str) -> Result<bool> {
        let refname = format!("refs/tags/{}", tag);
        self.with_repo("tag_exists", move |repo| {
            Ok(repo.refname_to_id(&refname).is_ok())
        })
        .await
    }

    async fn create_tag(&self, tag: &str) -> Result<()> {
        let tag_name = tag.to_string();
        self.with_repo("create_tag", move |repo| {
            if !git2::Reference::is_valid_name(&format!("refs/tags/{}", tag_name)) {
                bail!("invalid tag name: {}", tag_name);
            }
            let head = repo.head()?.peel(git2::ObjectType::Commit)?;
            repo.tag_lightweight(&tag_name, &head, false)
                .with_context(|| format!("cannot set tag: {}", tag_name))?;
            Ok(())
        })
        .await
    }

    async fn push_tags(&self) -> Result<()> {
        self.run_git(["push", "--tags"]).await
    }
}

/// Two-letter `git status --short` code, or `None` for entries git would not list.
fn short_code(status: Status) -> Option<String> {
    if status.is_empty() || status.contains(Status::IGNORED) {
        return None;
    }
    if status == Status::WT_NEW {
        return Some(String::from("??"));
    }
    if status.contains(Status::CONFLICTED) {
        return Some(String::from("UU"));
    }
    Some(format!("{}{}", index_char(status), worktree_char(status)))
}

/// Like [`short_code`], but with git's lowercase markers for dirty submodule content.
fn submodule_code(status: Status, submodule: SubmoduleStatus) -> Option<String> {
    let worktree = if submodule.contains(SubmoduleStatus::WD_MODIFIED) {
        'M'
    } else if submodule
        .intersects(SubmoduleStatus::WD_INDEX_MODIFIED | SubmoduleStatus::WD_WD_MODIFIED)
    {
        'm'
    } else if submodule.contains(SubmoduleStatus::WD_UNTRACKED) {
        '?'
    } else {
        return short_code(status);
    };
    Some(format!("{}{}", index_char(status), worktree))
}

fn index_char(status: Status) -> char {
    if status.contains(Status::INDEX_NEW) {
        'A'
    } else if status.contains(Status::INDEX_MODIFIED) {
        'M'
    } else if status.contains(Status::INDEX_DELETED) {
        'D'
    } else if status.contains(Status::INDEX_RENAMED) {
        'R'
    } else if status.contains(Status::INDEX_TYPECHANGE) {
        'T'
    } else {
        ' '
    }
}

fn worktree_char(status: Status) -> char {
    if status.contains(Status::WT_MODIFIED) {
        'M'
    } else if status.contains(Status::WT_DELETED) {
        'D'
    } else if status.contains(Status::WT_RENAMED) {
        'R'
    } else if status.contains(Status::WT_TYPECHANGE) {
        'T'
    } else {
        ' '
    }
}
