//! Line-oriented human interaction over a reader and a writer
//! (stdin/stdout in production): the fix loop's [`Interaction`] and the
//! triage [`Approver`].

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::cancel::OrCancelExt;
use crate::checklist::{table, Report};
use crate::error::{ErrorKind, Result, ResultExt};
use crate::fixloop::{Action, ClarifyQuestion, Interaction};
use crate::parser::HeuristicResult;
use crate::triage::{Approver, ThreadContext};

const RULE_WIDTH: usize = 60;

pub struct Terminal<R, W> {
    input: Mutex<R>,
    output: StdMutex<W>,
}

impl Terminal<BufReader<Stdin>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), std::io::stdout())
    }
}

impl<R, W> Terminal<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: Write + Send,
{
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: Mutex::new(input),
            output: StdMutex::new(output),
        }
    }

    pub fn into_output(self) -> W {
        self.output
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn print(&self, text: &str) -> Result<()> {
        let mut out = self
            .output
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        out.write_all(text.as_bytes())
            .and_then(|_| out.flush())
            .or_kind(ErrorKind::Store, || "write to terminal".into())
    }

    /// One trimmed line; end of input reads as an empty line.
    async fn read_line(&self, cancel: &CancellationToken) -> Result<String> {
        let mut input = self.input.lock().await;
        let mut line = String::new();
        input
            .read_line(&mut line)
            .or_cancel(cancel)
            .await?
            .or_kind(ErrorKind::Store, || "read from terminal".into())?;
        Ok(line.trim().to_string())
    }
}

/// Numeric answers in `1..=options.len()` select that option; anything
/// else (including `0`) is taken verbatim.
pub fn map_option(input: &str, options: &[String]) -> String {
    match input.parse::<usize>() {
        Ok(n) if (1..=options.len()).contains(&n) => options[n - 1].clone(),
        _ => input.to_string(),
    }
}

pub fn parse_action(input: &str) -> Action {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "apply" => Action::Apply,
        "2" | "refine" => Action::Refine,
        _ => Action::Exit,
    }
}

pub fn is_yes(input: &str) -> bool {
    matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn rule(c: char) -> String {
    std::iter::repeat(c).take(RULE_WIDTH).collect()
}

#[async_trait]
impl<R, W> Interaction for Terminal<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: Write + Send,
{
    async fn ask_questions(
        &self,
        questions: &[ClarifyQuestion],
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, String>> {
        let mut answers = BTreeMap::new();
        self.print(&format!("\n{}\nCLARIFICATION NEEDED\n{}\n", rule('-'), rule('-')))?;
        for (i, q) in questions.iter().enumerate() {
            let mut block = format!("\n[{}/{}] {}\n", i + 1, questions.len(), q.text);
            if !q.context.is_empty() {
                block.push_str(&format!("    Context: {}\n", q.context));
            }
            if !q.options.is_empty() {
                block.push_str("    Options:\n");
                for (n, option) in q.options.iter().enumerate() {
                    block.push_str(&format!("      {}) {option}\n", n + 1));
                }
                block.push_str("      0) Other (type custom answer)\n");
            }
            block.push_str("\n    Your answer: ");
            self.print(&block)?;

            let answer = map_option(&self.read_line(cancel).await?, &q.options);
            self.print(&format!("    Recorded: {answer}\n"))?;
            answers.insert(q.id.clone(), answer);
        }
        self.print(&format!("\n{}\n", rule('-')))?;
        Ok(answers)
    }

    async fn show_report(&self, report: &Report) -> Result<()> {
        self.print(&table::render_to_string(report))
    }

    async fn show_fix_prompt(&self, fix_prompt: &str) -> Result<()> {
        self.print(&format!(
            "\n{}\nFIX PROMPT\n{}\n{fix_prompt}\n",
            rule('='),
            rule('=')
        ))
    }

    async fn choose_action(&self, cancel: &CancellationToken) -> Result<Action> {
        self.print(&format!(
            "\n{eq}\nWhat would you like to do?\n{eq}\n  [1] Apply this fix to working copy\n  \
             [2] Refine the fix prompt (provide feedback)\n  [3] Exit without applying\n{eq}\n\
             Your choice (1/2/3): ",
            eq = rule('=')
        ))?;
        Ok(parse_action(&self.read_line(cancel).await?))
    }

    async fn refinement_feedback(&self, cancel: &CancellationToken) -> Result<String> {
        self.print(&format!(
            "\n{dash}\nREFINE FIX PROMPT\n{dash}\nEnter your feedback to improve the fix prompt.\n\
             Press Enter twice when done.\n\n",
            dash = rule('-')
        ))?;
        let mut lines = Vec::new();
        loop {
            let line = self.read_line(cancel).await?;
            if line.is_empty() {
                break;
            }
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }

    async fn confirm_copy(&self, cancel: &CancellationToken) -> Result<bool> {
        self.print(&format!(
            "\n{eq}\nALL CHECKS PASSED!\n{eq}\nCopy fixed story to original location? (y/n): ",
            eq = rule('=')
        ))?;
        Ok(is_yes(&self.read_line(cancel).await?))
    }
}

#[async_trait]
impl<R, W> Approver for Terminal<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: Write + Send,
{
    async fn approve(
        &self,
        thread: &ThreadContext,
        result: &HeuristicResult,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let mut block = format!(
            "\n{eq}\nAPPROVAL NEEDED (risk score {}/10)\n{eq}\n{}\n{}\n",
            result.score,
            thread.location(),
            result.summary.trim(),
            eq = rule('=')
        );
        for action in &result.proposed_actions {
            block.push_str(&format!("  - {action}\n"));
        }
        block.push_str("Proceed with implementation? (y/n): ");
        self.print(&block)?;
        Ok(is_yes(&self.read_line(cancel).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terminal(input: &'static str) -> Terminal<&'static [u8], Vec<u8>> {
        Terminal::new(input.as_bytes(), Vec::new())
    }

    #[test]
    fn option_mapping() {
        let options = vec!["admin".to_string(), "guest".to_string()];
        assert_eq!(map_option("2", &options), "guest");
        assert_eq!(map_option("0", &options), "0");
        assert_eq!(map_option("3", &options), "3");
        assert_eq!(map_option("editors only", &options), "editors only");
        assert_eq!(map_option("1", &[]), "1");
    }

    #[test]
    fn action_and_confirmation_parsing() {
        assert_eq!(parse_action("1"), Action::Apply);
        assert_eq!(parse_action("Apply"), Action::Apply);
        assert_eq!(parse_action("2"), Action::Refine);
        assert_eq!(parse_action("refine"), Action::Refine);
        assert_eq!(parse_action("3"), Action::Exit);
        assert_eq!(parse_action(""), Action::Exit);
        assert!(is_yes("Y"));
        assert!(is_yes("yes"));
        assert!(!is_yes("yep"));
    }

    #[tokio::test]
    async fn asks_questions_and_maps_options() {
        let term = terminal("1\nonly editors\n");
        let questions = vec![
            ClarifyQuestion {
                id: "q1".into(),
                text: "Which role?".into(),
                context: "Roles differ in permissions".into(),
                options: vec!["admin".into(), "guest".into()],
            },
            ClarifyQuestion {
                id: "q2".into(),
                text: "Who else?".into(),
                ..Default::default()
            },
        ];
        let answers = term
            .ask_questions(&questions, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(answers["q1"], "admin");
        assert_eq!(answers["q2"], "only editors");
        let shown = String::from_utf8(term.into_output()).unwrap();
        assert!(shown.contains("[1/2] Which role?"));
        assert!(shown.contains("      0) Other (type custom answer)"));
        assert!(shown.contains("Recorded: admin"));
    }

    #[tokio::test]
    async fn feedback_ends_at_blank_line() {
        let term = terminal("first\nsecond\n\nignored\n");
        let text = term.refinement_feedback(&CancellationToken::new()).await.unwrap();
        assert_eq!(text, "first\nsecond");
    }

    #[tokio::test]
    async fn end_of_input_exits() {
        let term = terminal("");
        let cancel = CancellationToken::new();
        assert_eq!(term.choose_action(&cancel).await.unwrap(), Action::Exit);
        assert!(!term.confirm_copy(&cancel).await.unwrap());
    }

    #[tokio::test]
    async fn approval_prompt_shows_score() {
        let term = terminal("yes\n");
        let thread = ThreadContext {
            pr_number: 7,
            thread_id: "T1".into(),
            comments: vec![crate::triage::Comment {
                file: "src/lib.rs".into(),
                line: 12,
                body: "rename this".into(),
                ..Default::default()
            }],
        };
        let result = HeuristicResult::parse(
            "risk_score: 9\nsummary: \"big refactor\"\npreferred_option: \"split module\"\nitems:\n  tools_present: true\n  pr_detected: true\n  conversations_fetched: true\n  auto_resolved_outdated: false\n  relevance_classified: true\n  human_approval_needed: true\n",
        )
        .unwrap();
        assert!(term.approve(&thread, &result, &CancellationToken::new()).await.unwrap());
        let shown = String::from_utf8(term.into_output()).unwrap();
        assert!(shown.contains("risk score 9/10"));
        assert!(shown.contains("src/lib.rs:12"));
        assert!(shown.contains("  - split module"));
    }
}
