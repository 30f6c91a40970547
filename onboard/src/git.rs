//! Publishing generated scripts to a feature branch of the scripts repository.

use std::path::Path;

use chrono::Utc;
use tokio::process::Command;

use crate::config::GitConfig;

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("Git command failed: {0}")]
    Command(String),
    #[error("Git credentials are not configured (GIT_USERNAME / GIT_TOKEN)")]
    MissingCredentials,
    #[error("Git repository is not configured")]
    MissingRepo,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct GitCredentials {
    pub username: String,
    pub token: String,
}

impl std::fmt::Debug for GitCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitCredentials")
            .field("username", &self.username)
            .field("token", &"****")
            .finish()
    }
}

impl GitCredentials {
    pub fn from_env() -> Result<Self, GitError> {
        let username = std::env::var("GIT_USERNAME").unwrap_or_default();
        let token = std::env::var("GIT_TOKEN").unwrap_or_default();
        if username.is_empty() || token.is_empty() {
            return Err(GitError::MissingCredentials);
        }
        Ok(Self { username, token })
    }
}

pub fn remote_url(config: &GitConfig, creds: &GitCredentials) -> String {
    if let Some(url) = config.remote_url.as_deref().filter(|u| !u.is_empty()) {
        return url.to_string();
    }
    format!(
        "https://{}:{}@{}/{}/{}.git",
        creds.username, creds.token, config.host, config.repo_owner, config.repo_name
    )
}

/// Replace the token (and the `user:token@` pair) in command output.
fn redact(text: &str, creds: &GitCredentials) -> String {
    let pair = format!("{}:{}@", creds.username, creds.token);
    text.replace(&pair, "****@").replace(&creds.token, "****")
}

/// `feature/{src}_{dataset}_{timestamp}`
pub fn branch_name(src_nm: &str, dataset_nm: &str) -> String {
    format!(
        "feature/{src_nm}_{dataset_nm}_{}",
        Utc::now().format("%Y%m%d%H%M%S")
    )
}

/// `main` when the remote has it, else `master`.
fn default_branch(remote_branches: &str) -> &'static str {
    if remote_branches
        .lines()
        .any(|l| l.trim() == "origin/main")
    {
        "main"
    } else {
        "master"
    }
}

async fn git(cwd: &Path, args: &[&str], creds: &GitCredentials) -> Result<String, GitError> {
    let output = Command::new("git").args(args).current_dir(cwd).output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let msg = redact(&format!("git {}: {}", args.join(" "), stderr.trim()), creds);
        tracing::error!(error = %msg, "git step failed");
        return Err(GitError::Command(msg));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[derive(Debug, Clone)]
pub struct GitPublisher {
    config: GitConfig,
    creds: GitCredentials,
}

impl GitPublisher {
    pub fn new(config: GitConfig, creds: GitCredentials) -> Result<Self, GitError> {
        let has_remote = config.remote_url.as_deref().is_some_and(|u| !u.is_empty());
        if !has_remote && (config.repo_owner.is_empty() || config.repo_name.is_empty()) {
            return Err(GitError::MissingRepo);
        }
        Ok(Self { config, creds })
    }

    /// Commit `files` to a new branch and push it. Returns the branch name.
    /// The working clone lives in a temporary directory dropped on return.
    #[tracing::instrument(skip(self, files), fields(repo = %self.config.repo_name))]
    pub async fn push_files(
        &self,
        branch: &str,
        files: &[(String, String)],
        message: &str,
    ) -> Result<String, GitError> {
        let workdir = tempfile::TempDir::new()?;
        let repo = workdir.path().join("repo");
        let repo_arg = repo.to_string_lossy().into_owned();
        let url = remote_url(&self.config, &self.creds);

        git(workdir.path(), &["clone", &url, &repo_arg], &self.creds).await?;
        let remotes = git(&repo, &["branch", "-r"], &self.creds).await?;
        let base = default_branch(&remotes);
        git(&repo, &["checkout", base], &self.creds).await?;
        git(&repo, &["pull", "origin", base], &self.creds).await?;
        git(&repo, &["checkout", "-b", branch], &self.creds).await?;

        let folder = repo.join(&self.config.scripts_folder);
        tokio::fs::create_dir_all(&folder).await?;
        for (name, content) in files {
            tokio::fs::write(folder.join(name), content).await?;
        }

        git(&repo, &["config", "user.name", &self.config.bot_name], &self.creds).await?;
        git(&repo, &["config", "user.email", &self.config.bot_email], &self.creds).await?;
        git(&repo, &["add", "."], &self.creds).await?;
        git(&repo, &["commit", "-m", message], &self.creds).await?;
        git(&repo, &["push", "--set-upstream", "origin", branch], &self.creds).await?;

        tracing::info!(%branch, base, files = files.len(), "pushed scripts");
        Ok(branch.to_string())
    }
}
