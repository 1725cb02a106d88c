//! Git source synchronization.
//!
//! Each project with a git URL gets a checkout under the deployments
//! directory. Checkouts are disposable build inputs: updates are applied
//! by fetching and hard-resetting to the remote branch head, never by
//! merging, so local edits in a checkout are discarded.
//!
//! libgit2 is blocking, so every repository operation runs under
//! `spawn_blocking`.

use git2::build::RepoBuilder;
use git2::{Cred, Direction, FetchOptions, RemoteCallbacks, Repository, ResetType};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::error::{Result, WharfError};
use crate::project::Project;

/// Synchronizes project sources from their git remotes.
#[derive(Debug, Clone)]
pub struct SourceSync {
    deployments_dir: PathBuf,
    ssh_key_path: Option<PathBuf>,
}

impl SourceSync {
    pub fn new(deployments_dir: impl Into<PathBuf>, ssh_key_path: Option<PathBuf>) -> Self {
        Self { deployments_dir: deployments_dir.into(), ssh_key_path }
    }

    /// Checkout directory for a project.
    pub fn project_dir(&self, project: &Project) -> PathBuf {
        self.deployments_dir.join(&project.name)
    }

    /// Whether a checkout exists for this project.
    pub fn exists(&self, project: &Project) -> bool {
        self.project_dir(project).join(".git").exists()
    }

    /// Bring the checkout up to date with the remote branch head.
    ///
    /// Clones fresh when no checkout exists (removing any partial
    /// directory first); otherwise fetches and hard-resets.
    #[instrument(skip(self, project), fields(project_id = %project.id, branch = %project.branch))]
    pub async fn ensure(&self, project: &Project) -> Result<()> {
        let dest = self.project_dir(project);
        let url = project.git_url.clone();
        let branch = project.branch.clone();
        let key = self.ssh_key_path.clone();

        if self.exists(project) {
            tokio::task::spawn_blocking(move || fetch_and_reset(&dest, &url, &branch, key))
                .await
                .map_err(WharfError::internal)??;
        } else {
            info!(url = %url, "Cloning project source");
            tokio::task::spawn_blocking(move || clone_repo(&dest, &url, &branch, key))
                .await
                .map_err(WharfError::internal)??;
        }
        Ok(())
    }

    /// Commit hash at the checkout's HEAD.
    pub async fn current_commit(&self, project: &Project) -> Result<String> {
        let dest = self.project_dir(project);
        tokio::task::spawn_blocking(move || head_commit(&dest))
            .await
            .map_err(WharfError::internal)?
    }

    /// Commit hash at the remote branch head. Fetches.
    pub async fn remote_commit(&self, project: &Project) -> Result<String> {
        let dest = self.project_dir(project);
        let url = project.git_url.clone();
        let branch = project.branch.clone();
        let key = self.ssh_key_path.clone();
        tokio::task::spawn_blocking(move || remote_head(&dest, &url, &branch, key))
            .await
            .map_err(WharfError::internal)?
    }

    /// Check whether the remote branch moved past the checkout.
    ///
    /// Returns the remote commit when it differs from the local HEAD.
    #[instrument(skip(self, project), fields(project_id = %project.id))]
    pub async fn has_update(&self, project: &Project) -> Result<Option<String>> {
        let current = self.current_commit(project).await?;
        let remote = self.remote_commit(project).await?;
        if current != remote {
            Ok(Some(remote))
        } else {
            Ok(None)
        }
    }

    /// Discover the default branch of a remote.
    pub async fn default_branch(&self, url: &str) -> Result<String> {
        let url = url.to_string();
        let key = self.ssh_key_path.clone();
        tokio::task::spawn_blocking(move || discover_default_branch(&url, key))
            .await
            .map_err(WharfError::internal)?
    }

    /// Delete a project's checkout, if present.
    pub async fn remove(&self, project: &Project) -> Result<()> {
        let dest = self.project_dir(project);
        match tokio::fs::remove_dir_all(&dest).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WharfError::IoError { path: dest, source: e }),
        }
    }
}

fn make_callbacks(ssh_key_path: Option<PathBuf>) -> RemoteCallbacks<'static> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |url, username_from_url, _allowed| {
        let use_ssh = (url.starts_with("git@") || url.starts_with("ssh://"))
            && ssh_key_path.as_deref().map(Path::exists).unwrap_or(false);
        if use_ssh {
            let key = ssh_key_path.as_deref().unwrap_or(Path::new(""));
            Cred::ssh_key(username_from_url.unwrap_or("git"), None, key, None)
        } else {
            Cred::default()
        }
    });
    callbacks
}

fn fetch_options(ssh_key_path: Option<PathBuf>) -> FetchOptions<'static> {
    let mut options = FetchOptions::new();
    options.remote_callbacks(make_callbacks(ssh_key_path));
    options.download_tags(git2::AutotagOption::None);
    options
}

fn clone_repo(dest: &Path, url: &str, branch: &str, key: Option<PathBuf>) -> Result<()> {
    // A partial directory from an interrupted clone would confuse libgit2.
    if dest.exists() {
        std::fs::remove_dir_all(dest)
            .map_err(|e| WharfError::IoError { path: dest.to_path_buf(), source: e })?;
    }

    let mut options = fetch_options(key);
    // Local-path remotes reject shallow negotiation; keep depth for the
    // network transports where it matters.
    if url.starts_with("http://")
        || url.starts_with("https://")
        || url.starts_with("ssh://")
        || url.starts_with("git@")
    {
        options.depth(1);
    }

    let mut builder = RepoBuilder::new();
    builder.fetch_options(options);
    builder.branch(branch);
    builder.clone(url, dest)?;
    Ok(())
}

fn fetch_and_reset(dest: &Path, url: &str, branch: &str, key: Option<PathBuf>) -> Result<()> {
    let repo = Repository::open(dest)?;
    fetch_branch(&repo, url, branch, key)?;

    let remote_ref = repo.find_reference(&format!("refs/remotes/origin/{}", branch))?;
    let target = remote_ref.peel(git2::ObjectType::Commit)?;
    repo.reset(&target, ResetType::Hard, None)?;
    Ok(())
}

fn fetch_branch(repo: &Repository, url: &str, branch: &str, key: Option<PathBuf>) -> Result<()> {
    let refspec = format!("+refs/heads/{0}:refs/remotes/origin/{0}", branch);
    let mut options = fetch_options(key);
    match repo.find_remote("origin") {
        Ok(mut remote) => remote.fetch(&[&refspec], Some(&mut options), None)?,
        Err(_) => {
            let mut remote = repo.remote_anonymous(url)?;
            remote.fetch(&[&refspec], Some(&mut options), None)?;
        }
    }
    Ok(())
}

fn head_commit(dest: &Path) -> Result<String> {
    let repo = Repository::open(dest)?;
    let head = repo.head()?;
    head.target().map(|oid| oid.to_string()).ok_or_else(|| WharfError::GitError {
        reason: format!("HEAD of {} is not a direct reference", dest.display()),
    })
}

fn remote_head(dest: &Path, url: &str, branch: &str, key: Option<PathBuf>) -> Result<String> {
    let repo = Repository::open(dest)?;
    fetch_branch(&repo, url, branch, key)?;

    let remote_ref = repo.find_reference(&format!("refs/remotes/origin/{}", branch))?;
    remote_ref.target().map(|oid| oid.to_string()).ok_or_else(|| WharfError::GitError {
        reason: format!("Remote branch {} did not resolve to a commit", branch),
    })
}

fn discover_default_branch(url: &str, key: Option<PathBuf>) -> Result<String> {
    let mut remote = git2::Remote::create_detached(url)?;
    let connection = remote.connect_auth(Direction::Fetch, Some(make_callbacks(key)), None)?;
    let heads = connection.list()?;

    // The symbolic HEAD advertised by the remote is authoritative.
    for head in heads {
        if head.name() == "HEAD" {
            if let Some(target) = head.symref_target() {
                if let Some(branch) = target.strip_prefix("refs/heads/") {
                    return Ok(branch.to_string());
                }
            }
        }
    }

    let branches: Vec<&str> =
        heads.iter().filter_map(|h| h.name().strip_prefix("refs/heads/")).collect();

    for candidate in ["main", "master", "develop", "trunk"] {
        if branches.contains(&candidate) {
            return Ok(candidate.to_string());
        }
    }

    branches.first().map(|b| b.to_string()).ok_or_else(|| WharfError::GitError {
        reason: format!("Remote {} has no branches", url),
    })
}
