//! GitHub through the `gh` command line client.

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{Comment, ReviewPlatform, Thread};
use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::shell::Shell;

const THREADS_QUERY: &str = "query($owner: String!, $name: String!, $prNumber: Int!, $after: String) { \
repository(owner: $owner, name: $name) { pullRequest(number: $prNumber) { \
reviewThreads(first: 100, after: $after) { pageInfo { hasNextPage endCursor } \
nodes { id isResolved comments(first: 50) { nodes { path line body outdated url } } } } } } }";

const RESOLVE_MUTATION: &str =
    "mutation($tid: ID!) { resolveReviewThread(input: {threadId: $tid}) { thread { isResolved } } }";

const REPLY_MUTATION: &str = "mutation($tid: ID!, $body: String!) { \
addPullRequestReviewThreadReply(input: {pullRequestReviewThreadId: $tid, body: $body}) { comment { id } } }";

/// Owner and name of the repository `gh` resolves from the working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repo {
    pub owner: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct GhCli {
    shell: Shell,
    program: String,
    git: String,
}

impl Default for GhCli {
    fn default() -> Self {
        Self::new(Shell::new())
    }
}

impl GhCli {
    pub fn new(shell: Shell) -> Self {
        Self {
            shell,
            program: "gh".to_string(),
            git: "git".to_string(),
        }
    }

    /// Use other binaries for `gh` and `git`.
    pub fn with_programs(mut self, gh: impl Into<String>, git: impl Into<String>) -> Self {
        self.program = gh.into();
        self.git = git.into();
        self
    }

    async fn gh(&self, args: &[&str], cancel: &CancellationToken) -> Result<String> {
        self.shell.stdout(&self.program, args, cancel).await
    }

    /// `gh api graphql` with `-F` typed fields and `-f` string fields.
    async fn graphql(
        &self,
        query: &str,
        typed: &[(&str, String)],
        strings: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<String> {
        let mut args = vec![
            "api".to_string(),
            "graphql".to_string(),
            "-f".to_string(),
            format!("query={query}"),
        ];
        for (key, value) in typed {
            args.push("-F".to_string());
            args.push(format!("{key}={value}"));
        }
        for (key, value) in strings {
            args.push("-f".to_string());
            args.push(format!("{key}={value}"));
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.gh(&args, cancel).await
    }

    pub async fn repo(&self, cancel: &CancellationToken) -> Result<Repo> {
        let out = self
            .gh(&["repo", "view", "--json", "owner,name"], cancel)
            .await?;
        parse_repo(&out)
    }

    async fn current_branch(&self, cancel: &CancellationToken) -> Result<String> {
        self.shell
            .stdout(&self.git, &["rev-parse", "--abbrev-ref", "HEAD"], cancel)
            .await
    }
}

#[async_trait]
impl ReviewPlatform for GhCli {
    async fn pr_number(&self, cancel: &CancellationToken) -> Result<u64> {
        match self
            .gh(&["pr", "view", "--json", "number", "-q", ".number"], cancel)
            .await
        {
            Ok(out) => {
                return out
                    .trim()
                    .parse()
                    .or_kind(ErrorKind::Platform, || format!("parse PR number '{out}'"))
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => tracing::debug!(error = %e, "gh pr view failed, searching by branch"),
        }

        let branch = self.current_branch(cancel).await?;
        let out = self
            .gh(
                &["pr", "list", "--head", &branch, "--json", "number", "--limit", "1"],
                cancel,
            )
            .await?;
        parse_pr_list(&out)?
            .ok_or_else(|| Error::platform(format!("no pull request found for branch {branch}")))
    }

    async fn threads(&self, pr_number: u64, cancel: &CancellationToken) -> Result<Vec<Thread>> {
        let repo = self.repo(cancel).await?;
        let mut threads = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let mut strings = vec![("owner", repo.owner.clone()), ("name", repo.name.clone())];
            if let Some(cursor) = &after {
                strings.push(("after", cursor.clone()));
            }
            let out = self
                .graphql(
                    THREADS_QUERY,
                    &[("prNumber", pr_number.to_string())],
                    &strings,
                    cancel,
                )
                .await?;
            let (page, next) = parse_threads_page(&out)?;
            threads.extend(page);
            match next {
                Some(cursor) => after = Some(cursor),
                None => break,
            }
        }
        tracing::info!(pr = pr_number, threads = threads.len(), "fetched review threads");
        Ok(threads)
    }

    async fn reply(&self, thread_id: &str, body: &str, cancel: &CancellationToken) -> Result<()> {
        self.graphql(
            REPLY_MUTATION,
            &[],
            &[("tid", thread_id.to_string()), ("body", body.to_string())],
            cancel,
        )
        .await
        .map(|_| ())
        .map_err(|e| e.context(format!("reply to thread {thread_id}")))
    }

    async fn resolve(&self, thread_id: &str, cancel: &CancellationToken) -> Result<()> {
        self.graphql(RESOLVE_MUTATION, &[], &[("tid", thread_id.to_string())], cancel)
            .await
            .map(|_| ())
            .map_err(|e| e.context(format!("resolve thread {thread_id}")))
    }
}

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RepoView {
    owner: Owner,
    name: String,
}

#[derive(Deserialize)]
struct Owner {
    login: String,
}

#[derive(Deserialize)]
struct PrEntry {
    number: u64,
}

#[derive(Deserialize)]
struct Response {
    data: Option<Data>,
}

#[derive(Deserialize)]
struct Data {
    repository: Option<Repository>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Repository {
    pull_request: Option<PullRequest>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    review_threads: Connection<ThreadNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection<T> {
    #[serde(default)]
    page_info: Option<PageInfo>,
    nodes: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadNode {
    id: String,
    is_resolved: bool,
    comments: Connection<CommentNode>,
}

#[derive(Deserialize)]
struct CommentNode {
    path: Option<String>,
    line: Option<u32>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    outdated: bool,
    #[serde(default)]
    url: String,
}

fn parse_repo(json: &str) -> Result<Repo> {
    let view: RepoView =
        serde_json::from_str(json).or_kind(ErrorKind::Platform, || "parse gh repo view".to_string())?;
    Ok(Repo {
        owner: view.owner.login,
        name: view.name,
    })
}

fn parse_pr_list(json: &str) -> Result<Option<u64>> {
    let entries: Vec<PrEntry> =
        serde_json::from_str(json).or_kind(ErrorKind::Platform, || "parse gh pr list".to_string())?;
    Ok(entries.first().map(|e| e.number))
}

/// One page of review threads: unresolved threads with comments, plus the
/// cursor of the next page if there is one.
pub fn parse_threads_page(json: &str) -> Result<(Vec<Thread>, Option<String>)> {
    let response: Response = serde_json::from_str(json)
        .or_kind(ErrorKind::Platform, || "parse review threads".to_string())?;
    let pr = response
        .data
        .and_then(|d| d.repository)
        .and_then(|r| r.pull_request)
        .ok_or_else(|| Error::platform("pull request not found in response"))?;

    let connection = pr.review_threads;
    let next = match connection.page_info {
        Some(PageInfo {
            has_next_page: true,
            end_cursor: Some(cursor),
        }) => Some(cursor),
        _ => None,
    };
    let threads = connection
        .nodes
        .into_iter()
        .filter(|t| !t.is_resolved && !t.comments.nodes.is_empty())
        .map(|t| Thread {
            id: t.id,
            comments: t
                .comments
                .nodes
                .into_iter()
                .map(|c| Comment {
                    file: c.path.unwrap_or_default(),
                    line: c.line.unwrap_or(0),
                    body: c.body,
                    url: c.url,
                    outdated: c.outdated,
                })
                .collect(),
        })
        .collect();
    Ok((threads, next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PAGE: &str = r#"{"data":{"repository":{"pullRequest":{"reviewThreads":{
        "pageInfo":{"hasNextPage":true,"endCursor":"Y3Vyc29yOjE="},
        "nodes":[
          {"id":"T1","isResolved":false,"comments":{"nodes":[
             {"path":"src/lib.rs","line":7,"body":"rename","outdated":false,"url":"u1"},
             {"path":"src/lib.rs","line":7,"body":"+1","outdated":false,"url":"u2"}]}},
          {"id":"T2","isResolved":true,"comments":{"nodes":[
             {"path":"a","line":1,"body":"done","outdated":false,"url":"u3"}]}},
          {"id":"T3","isResolved":false,"comments":{"nodes":[]}},
          {"id":"T4","isResolved":false,"comments":{"nodes":[
             {"path":null,"line":null,"body":"general","outdated":true,"url":"u4"}]}}
        ]}}}}}"#;

    #[test]
    fn keeps_unresolved_threads_with_comments() {
        let (threads, next) = parse_threads_page(PAGE).unwrap();
        assert_eq!(next.as_deref(), Some("Y3Vyc29yOjE="));
        let ids: Vec<_> = threads.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["T1", "T4"]);
        assert_eq!(threads[0].comments.len(), 2);
        assert_eq!(threads[0].comments[1].body, "+1");
        assert_eq!(threads[1].comments[0].file, "");
        assert_eq!(threads[1].comments[0].line, 0);
        assert!(threads[1].comments[0].outdated);
    }

    #[test]
    fn last_page_has_no_cursor() {
        let json = r#"{"data":{"repository":{"pullRequest":{"reviewThreads":{
            "pageInfo":{"hasNextPage":false,"endCursor":"x"},"nodes":[]}}}}}"#;
        let (threads, next) = parse_threads_page(json).unwrap();
        assert!(threads.is_empty());
        assert_eq!(next, None);
    }

    #[test]
    fn missing_pull_request_is_platform_error() {
        let err = parse_threads_page(r#"{"data":{"repository":{"pullRequest":null}}}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Platform);
    }

    #[test]
    fn repo_and_pr_list() {
        let repo = parse_repo(r#"{"name":"bmad","owner":{"id":"x","login":"acme"}}"#).unwrap();
        assert_eq!(
            repo,
            Repo {
                owner: "acme".into(),
                name: "bmad".into()
            }
        );
        assert_eq!(parse_pr_list(r#"[{"number":17}]"#).unwrap(), Some(17));
        assert_eq!(parse_pr_list("[]").unwrap(), None);
    }

    #[cfg(unix)]
    mod fake_gh {
        use super::super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        fn script(dir: &TempDir, name: &str, body: &str) -> String {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.display().to_string()
        }

        #[tokio::test]
        async fn pages_through_threads() {
            let dir = TempDir::new().unwrap();
            let gh = script(
                &dir,
                "gh",
                r#"case "$*" in
  "repo view"*) echo '{"name":"bmad","owner":{"login":"acme"}}' ;;
  *after=C1*) echo '{"data":{"repository":{"pullRequest":{"reviewThreads":{"pageInfo":{"hasNextPage":false,"endCursor":null},"nodes":[{"id":"T2","isResolved":false,"comments":{"nodes":[{"path":"b","line":2,"body":"two","outdated":false,"url":""}]}}]}}}}}' ;;
  *prNumber=5*) echo '{"data":{"repository":{"pullRequest":{"reviewThreads":{"pageInfo":{"hasNextPage":true,"endCursor":"C1"},"nodes":[{"id":"T1","isResolved":false,"comments":{"nodes":[{"path":"a","line":1,"body":"one","outdated":false,"url":""}]}}]}}}}}' ;;
  *) exit 1 ;;
esac"#,
            );
            let cli = GhCli::default().with_programs(gh, "git");
            let threads = cli.threads(5, &CancellationToken::new()).await.unwrap();
            let ids: Vec<_> = threads.iter().map(|t| t.id.as_str()).collect();
            assert_eq!(ids, ["T1", "T2"]);
        }

        #[tokio::test]
        async fn pr_number_falls_back_to_branch_search() {
            let dir = TempDir::new().unwrap();
            let gh = script(
                &dir,
                "gh",
                r#"case "$*" in
  "pr view"*) echo 'no pull requests found' >&2; exit 1 ;;
  "pr list --head feature/x"*) echo '[{"number":42}]' ;;
  *) exit 1 ;;
esac"#,
            );
            let git = script(&dir, "git", "echo feature/x");
            let cli = GhCli::default().with_programs(gh, git);
            assert_eq!(cli.pr_number(&CancellationToken::new()).await.unwrap(), 42);
        }

        #[tokio::test]
        async fn mutation_failure_names_thread() {
            let dir = TempDir::new().unwrap();
            let gh = script(&dir, "gh", "echo 'GraphQL: forbidden' >&2; exit 1");
            let cli = GhCli::default().with_programs(gh, "git");
            let err = cli
                .resolve("T9", &CancellationToken::new())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Platform);
            assert!(err.to_string().contains("resolve thread T9"), "{err}");
        }
    }
}
