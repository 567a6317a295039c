use anyhow::{Context, Result};
use bmad_core::shell::Shell;
use bmad_core::terminal::Terminal;
use bmad_core::triage::{GhCli, TriageOrchestrator};

use super::Session;

#[derive(clap::Subcommand)]
pub enum PrSubcommand {
    /// Triage every unresolved review thread of the current branch's pull request.
    ///
    /// Each thread is assessed by the AI; low-risk changes are implemented
    /// directly, high-risk ones need confirmation. Implemented threads get a
    /// reply and are resolved.
    Triage,
}

pub async fn run(session: &Session, subcommand: PrSubcommand) -> Result<()> {
    match subcommand {
        PrSubcommand::Triage => triage(session).await,
    }
}

async fn triage(session: &Session) -> Result<()> {
    let platform = GhCli::new(Shell::in_dir(&session.root));
    let terminal = Terminal::stdio();
    let summary = TriageOrchestrator::new(&session.config, session.ctx(), &platform, &terminal)
        .run()
        .await
        .context("pr triage")?;
    print!("{}", summary.render());
    println!("Run directory: {}", session.run_dir.path().display());
    Ok(())
}
