use std::fmt::Write as _;

use tracing::Instrument;

use super::generators::{HeuristicGenerator, ImplementationGenerator};
use super::{Approver, ReviewPlatform, ThreadContext, ThreadState, OUTDATED_REPLY};
use crate::cancel;
use crate::config::Config;
use crate::error::{report, Result};
use crate::pipeline::GeneratorContext;

/// Final state of one thread after a triage run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadOutcome {
    pub thread_id: String,
    pub location: String,
    pub state: ThreadState,
    pub score: Option<u8>,
    /// Reply posted, skip reason, or error report.
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriageSummary {
    pub pr_number: u64,
    pub outcomes: Vec<ThreadOutcome>,
}

impl TriageSummary {
    pub fn count(&self, state: ThreadState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "PR #{}: {} thread(s), {} resolved, {} skipped, {} failed\n",
            self.pr_number,
            self.outcomes.len(),
            self.count(ThreadState::Resolved),
            self.count(ThreadState::Skipped),
            self.count(ThreadState::Failed),
        );
        for o in &self.outcomes {
            let score = o.score.map(|s| format!(" [risk {s}/10]")).unwrap_or_default();
            let _ = writeln!(out, "  {:<8} {} {}{score}: {}", o.state, o.thread_id, o.location, o.detail);
        }
        out
    }
}

/// Walks every unresolved review thread of the current pull request.
pub struct TriageOrchestrator<'a> {
    config: &'a Config,
    ctx: GeneratorContext<'a>,
    platform: &'a dyn ReviewPlatform,
    approver: &'a dyn Approver,
}

impl<'a> TriageOrchestrator<'a> {
    pub fn new(
        config: &'a Config,
        ctx: GeneratorContext<'a>,
        platform: &'a dyn ReviewPlatform,
        approver: &'a dyn Approver,
    ) -> Self {
        Self {
            config,
            ctx,
            platform,
            approver,
        }
    }

    /// Process all threads in server order. A failing thread is recorded and
    /// logged; only cancellation or a failure to list threads aborts the run.
    pub async fn run(&self) -> Result<TriageSummary> {
        let cancel = self.ctx.cancel;
        let pr_number = self.platform.pr_number(cancel).await?;
        let threads = self.platform.threads(pr_number, cancel).await?;
        tracing::info!(pr = pr_number, threads = threads.len(), "starting triage");

        let mut summary = TriageSummary {
            pr_number,
            outcomes: Vec::with_capacity(threads.len()),
        };
        for thread in threads {
            cancel::check(cancel)?;
            let thread = ThreadContext::new(pr_number, thread);
            let span = tracing::info_span!("thread", id = %thread.thread_id, location = %thread.location());
            let outcome = match self.process(&thread).instrument(span).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    let detail = report(&e);
                    tracing::error!(thread = %thread.thread_id, error = %detail, "thread failed");
                    ThreadOutcome {
                        thread_id: thread.thread_id.clone(),
                        location: thread.location(),
                        state: ThreadState::Failed,
                        score: None,
                        detail,
                    }
                }
            };
            summary.outcomes.push(outcome);
        }
        tracing::info!(
            resolved = summary.count(ThreadState::Resolved),
            skipped = summary.count(ThreadState::Skipped),
            failed = summary.count(ThreadState::Failed),
            "triage finished"
        );
        Ok(summary)
    }

    async fn process(&self, thread: &ThreadContext) -> Result<ThreadOutcome> {
        let cancel = self.ctx.cancel;
        let id = thread.thread_id.as_str();
        let outcome = |state, score, detail: String| ThreadOutcome {
            thread_id: id.to_string(),
            location: thread.location(),
            state,
            score,
            detail,
        };

        if self.config.triage.auto_resolve_outdated && thread.is_outdated() {
            tracing::info!("thread is outdated, resolving");
            self.platform.reply(id, OUTDATED_REPLY, cancel).await?;
            self.platform.resolve(id, cancel).await?;
            return Ok(outcome(ThreadState::Resolved, None, OUTDATED_REPLY.to_string()));
        }

        let heuristic = self
            .ctx
            .run(
                id,
                &HeuristicGenerator {
                    config: self.config,
                    thread,
                },
            )
            .await?;
        tracing::info!(
            state = %ThreadState::Analyzed,
            score = heuristic.score,
            summary = %heuristic.summary,
            "analysis complete"
        );

        if heuristic.score >= self.config.triage.approval_threshold {
            tracing::info!(state = %ThreadState::AwaitApproval, "asking for approval");
            if !self.approver.approve(thread, &heuristic, cancel).await? {
                tracing::info!(state = %ThreadState::Skipped, "approval declined");
                return Ok(outcome(
                    ThreadState::Skipped,
                    Some(heuristic.score),
                    "approval declined".to_string(),
                ));
            }
        }

        let reply = self
            .ctx
            .run(
                id,
                &ImplementationGenerator {
                    config: self.config,
                    thread,
                    heuristic: &heuristic,
                },
            )
            .await?;
        tracing::info!(state = %ThreadState::Implemented, summary = %reply, "changes applied");

        self.platform.reply(id, &reply, cancel).await?;
        self.platform.resolve(id, cancel).await?;
        tracing::info!(state = %ThreadState::Resolved, "thread resolved");
        Ok(outcome(ThreadState::Resolved, Some(heuristic.score), reply))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::error::Error;
    use crate::parser::HeuristicResult;
    use crate::run_dir::RunDirectory;
    use crate::testing::StubAi;
    use crate::triage::{Comment, Thread};

    #[derive(Default)]
    struct FakePlatform {
        threads: Vec<Thread>,
        log: Mutex<Vec<String>>,
    }

    impl FakePlatform {
        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReviewPlatform for FakePlatform {
        async fn pr_number(&self, _cancel: &CancellationToken) -> Result<u64> {
            Ok(21)
        }

        async fn threads(&self, pr_number: u64, _cancel: &CancellationToken) -> Result<Vec<Thread>> {
            assert_eq!(pr_number, 21);
            Ok(self.threads.clone())
        }

        async fn reply(&self, thread_id: &str, body: &str, _cancel: &CancellationToken) -> Result<()> {
            self.log.lock().unwrap().push(format!("reply {thread_id}: {body}"));
            Ok(())
        }

        async fn resolve(&self, thread_id: &str, _cancel: &CancellationToken) -> Result<()> {
            self.log.lock().unwrap().push(format!("resolve {thread_id}"));
            Ok(())
        }
    }

    struct Answer(bool);

    #[async_trait]
    impl Approver for Answer {
        async fn approve(
            &self,
            _thread: &ThreadContext,
            _result: &HeuristicResult,
            _cancel: &CancellationToken,
        ) -> Result<bool> {
            Ok(self.0)
        }
    }

    fn thread(id: &str, body: &str, outdated: bool) -> Thread {
        Thread {
            id: id.into(),
            comments: vec![Comment {
                file: "src/app.rs".into(),
                line: 10,
                body: body.into(),
                url: String::new(),
                outdated,
            }],
        }
    }

    fn heuristic(score: u8) -> String {
        format!(
            "Looking at the thread.\n\nrisk_score: {score}\nsummary: rename the variable\npreferred_option: rename it\nitems:\n  tools_present: true\n  pr_detected: true\n  conversations_fetched: true\n  auto_resolved_outdated: false\n  relevance_classified: true\n  human_approval_needed: {}\n",
            score >= 8
        )
    }

    fn setup(dir: &TempDir) -> (Config, RunDirectory) {
        let templates = dir.path().join("templates");
        std::fs::create_dir_all(&templates).unwrap();
        let mut config = Config::default();
        for name in ["heuristic", "implementation"] {
            let path = templates.join(format!("{name}.tpl"));
            std::fs::write(&path, format!("{name} {{{{thread_id}}}}: {{{{conversation}}}}")).unwrap();
            config.templates.prompts.insert(name.into(), path);
        }
        let run = RunDirectory::at(dir.path().join("run")).unwrap();
        (config, run)
    }

    #[tokio::test]
    async fn failing_thread_does_not_stop_siblings() {
        let dir = TempDir::new().unwrap();
        let (config, run) = setup(&dir);
        let platform = FakePlatform {
            threads: vec![
                thread("T1", "one", false),
                thread("T2", "two", false),
                thread("T3", "three", false),
            ],
            ..Default::default()
        };
        let ai = StubAi::new(|call| {
            if call.user.starts_with("heuristic T2") {
                return Err(Error::ai("backend exploded"));
            }
            if call.user.starts_with("heuristic") {
                return Ok(heuristic(3));
            }
            Ok(format!("\nFixed {}\n", &call.user["implementation ".len()..][..2]))
        });
        let cancel = CancellationToken::new();
        let ctx = GeneratorContext::new(&ai, &run, "sonnet", &cancel);
        let approver = Answer(true);

        let summary = TriageOrchestrator::new(&config, ctx, &platform, &approver)
            .run()
            .await
            .unwrap();

        let states: Vec<_> = summary.outcomes.iter().map(|o| o.state).collect();
        assert_eq!(
            states,
            [ThreadState::Resolved, ThreadState::Failed, ThreadState::Resolved]
        );
        assert!(summary.outcomes[1].detail.contains("backend exploded"));
        assert_eq!(
            platform.log(),
            ["reply T1: Fixed T1", "resolve T1", "reply T3: Fixed T3", "resolve T3"]
        );
        assert!(run.join("T2-heuristic-user-prompt.txt").is_file());
        assert!(summary.render().contains("3 thread(s), 2 resolved, 0 skipped, 1 failed"));
    }

    #[tokio::test]
    async fn high_risk_needs_approval() {
        let dir = TempDir::new().unwrap();
        let (config, run) = setup(&dir);
        let platform = FakePlatform {
            threads: vec![thread("T1", "rewrite everything", false)],
            ..Default::default()
        };
        let ai = StubAi::fixed(&heuristic(9));
        let cancel = CancellationToken::new();
        let ctx = GeneratorContext::new(&ai, &run, "sonnet", &cancel);
        let approver = Answer(false);

        let summary = TriageOrchestrator::new(&config, ctx, &platform, &approver)
            .run()
            .await
            .unwrap();

        assert_eq!(summary.outcomes[0].state, ThreadState::Skipped);
        assert_eq!(summary.outcomes[0].score, Some(9));
        assert_eq!(ai.calls().len(), 1);
        assert!(platform.log().is_empty());
    }

    #[tokio::test]
    async fn outdated_threads_resolve_without_ai() {
        let dir = TempDir::new().unwrap();
        let (config, run) = setup(&dir);
        let platform = FakePlatform {
            threads: vec![thread("T1", "old", true)],
            ..Default::default()
        };
        let ai = StubAi::fixed("unused");
        let cancel = CancellationToken::new();
        let ctx = GeneratorContext::new(&ai, &run, "sonnet", &cancel);
        let approver = Answer(true);

        let summary = TriageOrchestrator::new(&config, ctx, &platform, &approver)
            .run()
            .await
            .unwrap();

        assert_eq!(summary.count(ThreadState::Resolved), 1);
        assert!(ai.calls().is_empty());
        assert_eq!(
            platform.log(),
            [format!("reply T1: {OUTDATED_REPLY}"), "resolve T1".to_string()]
        );
    }

    #[tokio::test]
    async fn cancellation_aborts_the_run() {
        let dir = TempDir::new().unwrap();
        let (config, run) = setup(&dir);
        let platform = FakePlatform {
            threads: vec![thread("T1", "one", false)],
            ..Default::default()
        };
        let ai = StubAi::fixed(&heuristic(2));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = GeneratorContext::new(&ai, &run, "sonnet", &cancel);
        let approver = Answer(true);

        let err = TriageOrchestrator::new(&config, ctx, &platform, &approver)
            .run()
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
