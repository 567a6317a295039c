//! Story branches through the `git` command line.

use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::shell::Shell;
use crate::story::StoryNumber;

const MAIN: &str = "main";

/// What [`Git::ensure_story_branch`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchAction {
    /// Already on the story branch.
    None,
    Create,
    Switch,
    Checkout,
    ForceRecreate,
}

impl fmt::Display for BranchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BranchAction::None => "none",
            BranchAction::Create => "create",
            BranchAction::Switch => "switch",
            BranchAction::Checkout => "checkout",
            BranchAction::ForceRecreate => "force-recreate",
        })
    }
}

/// Where the current branch leaves us before touching anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Start {
    Recreate,
    OnStoryBranch,
    /// On `main`, which must not lag `origin/main`.
    FromMain,
    /// On another branch of the same story.
    FromRelated,
}

fn classify(current: &str, number: StoryNumber, expected: &str, force: bool) -> Result<Start> {
    if force {
        return Ok(Start::Recreate);
    }
    if current == expected {
        return Ok(Start::OnStoryBranch);
    }
    if current == MAIN {
        return Ok(Start::FromMain);
    }
    if current.starts_with(&format!("{number}-")) {
        return Ok(Start::FromRelated);
    }
    Err(Error::platform(format!(
        "currently on branch '{current}' which is not related to story {number}; switch to {MAIN} first"
    )))
}

#[derive(Debug, Clone)]
pub struct Git {
    shell: Shell,
    program: String,
}

impl Default for Git {
    fn default() -> Self {
        Self::new(Shell::new())
    }
}

impl Git {
    pub fn new(shell: Shell) -> Self {
        Self {
            shell,
            program: "git".to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    async fn git(&self, args: &[&str], cancel: &CancellationToken) -> Result<String> {
        self.shell.stdout(&self.program, args, cancel).await
    }

    /// Exit status only; `Ok(false)` on a non-zero exit.
    async fn succeeds(&self, args: &[&str], cancel: &CancellationToken) -> Result<bool> {
        Ok(self.shell.capture(&self.program, args, cancel).await?.success)
    }

    pub async fn is_repository(&self, cancel: &CancellationToken) -> Result<bool> {
        self.succeeds(&["rev-parse", "--git-dir"], cancel).await
    }

    /// Empty when HEAD is detached.
    pub async fn current_branch(&self, cancel: &CancellationToken) -> Result<String> {
        self.git(&["branch", "--show-current"], cancel).await
    }

    pub async fn is_clean(&self, cancel: &CancellationToken) -> Result<bool> {
        Ok(self.git(&["status", "--porcelain"], cancel).await?.is_empty())
    }

    pub async fn local_branch_exists(&self, branch: &str, cancel: &CancellationToken) -> Result<bool> {
        self.succeeds(&["rev-parse", "--verify", "--quiet", branch], cancel).await
    }

    pub async fn remote_branch_exists(&self, branch: &str, cancel: &CancellationToken) -> Result<bool> {
        let out = self
            .shell
            .capture(&self.program, &["ls-remote", "--heads", "origin", branch], cancel)
            .await?;
        Ok(out.success && !out.stdout.trim().is_empty())
    }

    async fn main_is_behind_origin(&self, cancel: &CancellationToken) -> Result<bool> {
        self.git(&["fetch", "origin", MAIN], cancel).await?;
        let count = self
            .git(&["rev-list", "--count", &format!("{MAIN}..origin/{MAIN}")], cancel)
            .await?;
        Ok(count != "0")
    }

    async fn switch(&self, branch: &str, cancel: &CancellationToken) -> Result<()> {
        tracing::info!(branch, "switching branch");
        self.git(&["switch", branch], cancel).await.map(|_| ())
    }

    async fn create(&self, branch: &str, cancel: &CancellationToken) -> Result<()> {
        tracing::info!(branch, "creating branch");
        self.git(&["switch", "-c", branch], cancel).await?;
        self.git(&["push", "-u", "origin", branch], cancel).await.map(|_| ())
    }

    async fn recreate(&self, branch: &str, cancel: &CancellationToken) -> Result<()> {
        tracing::info!(branch, "recreating branch");
        self.switch(MAIN, cancel).await?;
        if self.local_branch_exists(branch, cancel).await? {
            self.git(&["branch", "-D", branch], cancel).await?;
        }
        if self.remote_branch_exists(branch, cancel).await? {
            self.git(&["push", "origin", "--delete", branch], cancel).await?;
        }
        self.create(branch, cancel).await
    }

    /// Make `<number>-<slug>` the checked-out branch.
    ///
    /// Requires a clean tree on an attached HEAD. From `main` (up to date
    /// with origin) or a sibling branch of the same story, an existing local
    /// branch is switched to, a remote one checked out, otherwise a new one
    /// is created and pushed. `force` deletes and recreates it from `main`.
    pub async fn ensure_story_branch(
        &self,
        number: StoryNumber,
        slug: &str,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<BranchAction> {
        let expected = format!("{number}-{slug}");
        tracing::info!(branch = %expected, force, "ensuring story branch");

        if !self.is_repository(cancel).await? {
            return Err(Error::platform("current directory is not a git repository"));
        }
        if !self.is_clean(cancel).await? {
            return Err(Error::platform(
                "working tree has uncommitted changes; commit or stash them first",
            ));
        }
        let current = self.current_branch(cancel).await?;
        if current.is_empty() {
            return Err(Error::platform("HEAD is detached; check out a branch first"));
        }

        let action = match classify(&current, number, &expected, force)? {
            Start::Recreate => {
                self.recreate(&expected, cancel).await?;
                BranchAction::ForceRecreate
            }
            Start::OnStoryBranch => BranchAction::None,
            start => {
                if start == Start::FromMain && self.main_is_behind_origin(cancel).await? {
                    return Err(Error::platform(
                        "main is behind origin/main; pull the latest changes first",
                    ));
                }
                if self.local_branch_exists(&expected, cancel).await? {
                    self.switch(&expected, cancel).await?;
                    BranchAction::Switch
                } else if self.remote_branch_exists(&expected, cancel).await? {
                    self.git(
                        &["checkout", "-b", &expected, &format!("origin/{expected}")],
                        cancel,
                    )
                    .await?;
                    BranchAction::Checkout
                } else {
                    self.create(&expected, cancel).await?;
                    BranchAction::Create
                }
            }
        };
        tracing::info!(branch = %expected, action = %action, "story branch ready");
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number() -> StoryNumber {
        StoryNumber::parse("3.1").unwrap()
    }

    #[test]
    fn classifies_current_branch() {
        let n = number();
        let expected = "3.1-login";
        assert_eq!(classify("main", n, expected, false).unwrap(), Start::FromMain);
        assert_eq!(classify(expected, n, expected, false).unwrap(), Start::OnStoryBranch);
        assert_eq!(classify("3.1-old-title", n, expected, false).unwrap(), Start::FromRelated);
        assert_eq!(classify("feature/x", n, expected, true).unwrap(), Start::Recreate);

        let err = classify("3.10-other", n, expected, false).unwrap_err();
        assert!(err.to_string().contains("not related to story 3.1"), "{err}");
    }

    #[cfg(unix)]
    mod fake_git {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        /// A git stand-in that logs its arguments and answers from `body`.
        fn fake(dir: &TempDir, body: &str) -> Git {
            let path = dir.path().join("git");
            let log = dir.path().join("calls.log");
            std::fs::write(
                &path,
                format!("#!/bin/sh\necho \"$*\" >> '{}'\n{body}\n", log.display()),
            )
            .unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            Git::default().with_program(path.display().to_string())
        }

        fn calls(dir: &TempDir) -> Vec<String> {
            std::fs::read_to_string(dir.path().join("calls.log"))
                .unwrap_or_default()
                .lines()
                .map(String::from)
                .collect()
        }

        #[tokio::test]
        async fn creates_branch_from_main() {
            let dir = TempDir::new().unwrap();
            let git = fake(
                &dir,
                r#"case "$*" in
  "branch --show-current") echo main ;;
  "rev-list"*) echo 0 ;;
  "rev-parse --verify"*) exit 1 ;;
esac
exit 0"#,
            );
            let action = git
                .ensure_story_branch(number(), "login", false, &CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(action, BranchAction::Create);
            let calls = calls(&dir);
            assert!(calls.contains(&"switch -c 3.1-login".to_string()), "{calls:?}");
            assert_eq!(calls.last().unwrap(), "push -u origin 3.1-login");
        }

        #[tokio::test]
        async fn dirty_tree_is_rejected() {
            let dir = TempDir::new().unwrap();
            let git = fake(
                &dir,
                r#"case "$*" in
  "status --porcelain") echo " M src/lib.rs" ;;
esac
exit 0"#,
            );
            let err = git
                .ensure_story_branch(number(), "login", false, &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(err.to_string().contains("uncommitted changes"));
            assert!(!calls(&dir).iter().any(|c| c.starts_with("switch")));
        }

        #[tokio::test]
        async fn detached_head_is_rejected() {
            let dir = TempDir::new().unwrap();
            let git = fake(&dir, "exit 0");
            let err = git
                .ensure_story_branch(number(), "login", false, &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(err.to_string().contains("detached"));
        }
    }
}
