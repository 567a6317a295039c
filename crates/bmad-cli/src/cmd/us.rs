use anyhow::{bail, Context, Result};
use bmad_core::fixloop::{self, Interaction, LoopOutcome};
use bmad_core::schema::{self, StructuralValidator};
use bmad_core::shell::Shell;
use bmad_core::story::{self, slugify, StoryDocument, StoryFactory, StoryNumber};
use bmad_core::terminal::Terminal;
use bmad_core::vcs::{BranchAction, Git};
use bmad_core::version_store::VersionStore;
use std::path::PathBuf;

use super::Session;

#[derive(clap::Subcommand)]
pub enum UsSubcommand {
    /// Generate a complete user story from its epic entry.
    ///
    /// Runs the tasks, dev notes, testing, scenarios and QA generators in
    /// order, validates the result, reviews it against the story checklist
    /// and writes `<stories_dir>/<N.M>-<slug>.yaml`.
    Create {
        /// Story number, e.g. 3.1
        number: String,

        /// Skip the checklist review and fix loop
        #[arg(long)]
        skip_checklist: bool,
    },

    /// Prepare the story branch for implementation
    Implement {
        /// Story number, e.g. 3.1
        number: String,

        /// Delete and recreate the story branch from main
        #[arg(long)]
        force: bool,
    },

    /// Review an existing story against the checklist, fixing failures interactively
    Checklist {
        /// Story number, e.g. 3.1
        number: String,
    },
}

pub async fn run(session: &Session, subcommand: UsSubcommand) -> Result<()> {
    match subcommand {
        UsSubcommand::Create {
            number,
            skip_checklist,
        } => create(session, &number, skip_checklist).await,
        UsSubcommand::Implement { number, force } => implement(session, &number, force).await,
        UsSubcommand::Checklist { number } => checklist(session, &number).await,
    }
}

fn parse_number(raw: &str) -> Result<StoryNumber> {
    StoryNumber::parse(raw).context("parse story number")
}

fn stories_dir(session: &Session) -> PathBuf {
    session.path(&session.config.paths.stories_dir)
}

async fn create(session: &Session, raw: &str, skip_checklist: bool) -> Result<()> {
    let number = parse_number(raw)?;
    let config = &session.config;
    let ctx = session.ctx();
    let dir = stories_dir(session);

    let doc = StoryFactory::new(config, ctx, session.today())
        .generate(number)
        .await
        .with_context(|| format!("generate story {number}"))?;

    let mut store = VersionStore::story(session.run_dir.path(), doc.id())?;
    let initial = store.save_initial(&doc)?;
    StructuralValidator::new(config.paths.story_schema.clone())
        .validate_file(&initial, &session.cancel)
        .await
        .context("validate story")?;

    let path = story::write_canonical(&dir, number, &doc)?;
    println!("Story {number} written to {}", path.display());

    if skip_checklist {
        tracing::info!("checklist review skipped by flag");
    } else if config.paths.checklist.is_none() {
        tracing::warn!("no checklist configured, skipping review");
    } else {
        let terminal = Terminal::stdio();
        let outcome = fixloop::review(config, ctx, &mut store, &terminal)
            .await
            .with_context(|| format!("review story {number}"))?;
        report_outcome(&outcome);
        offer_copy_back(session, &terminal, &store, &outcome, number).await?;
    }

    println!("Run directory: {}", session.run_dir.path().display());
    Ok(())
}

async fn checklist(session: &Session, raw: &str) -> Result<()> {
    let number = parse_number(raw)?;
    let config = &session.config;
    let ctx = session.ctx();

    let doc = match story::find_canonical(&stories_dir(session), number)? {
        Some(path) => {
            tracing::info!(file = %path.display(), "reviewing story file");
            story::load_document(&path)?
        }
        None => {
            tracing::info!(story = %number, "no story file yet, reviewing the epic entry");
            StoryFactory::new(config, ctx, session.today()).initial_document(number)?
        }
    };

    let mut store = VersionStore::story(session.run_dir.path(), doc.id())?;
    store.save_initial(&doc)?;
    let terminal = Terminal::stdio();
    let outcome = fixloop::review(config, ctx, &mut store, &terminal)
        .await
        .with_context(|| format!("review story {number}"))?;
    report_outcome(&outcome);
    offer_copy_back(session, &terminal, &store, &outcome, number).await
}

/// A story fixed into passing is copied back only with the user's consent.
/// Unfixed and exited reviews leave the story file alone.
async fn offer_copy_back(
    session: &Session,
    interaction: &dyn Interaction,
    store: &VersionStore,
    outcome: &LoopOutcome,
    number: StoryNumber,
) -> Result<()> {
    if !matches!(outcome, LoopOutcome::Passed { .. }) || store.current_version() <= 1 {
        return Ok(());
    }
    if interaction.confirm_copy(&session.cancel).await? {
        let latest: StoryDocument = store.load_latest()?;
        let path = story::write_canonical(&stories_dir(session), number, &latest)?;
        println!("Story {number} updated at {}", path.display());
    } else {
        println!("Fixed story left at {}", outcome.latest().display());
    }
    Ok(())
}

async fn implement(session: &Session, raw: &str, force: bool) -> Result<()> {
    let number = parse_number(raw)?;
    let dir = stories_dir(session);
    let Some(path) = story::find_canonical(&dir, number)? else {
        bail!(
            "story file for {number} not found in {}; run `us create {number}` first",
            dir.display()
        );
    };
    let doc = story::load_document(&path)?;
    schema::validate_story_document(&doc).with_context(|| format!("validate {}", path.display()))?;
    StructuralValidator::new(session.config.paths.story_schema.clone())
        .validate_file(&path, &session.cancel)
        .await
        .with_context(|| format!("validate {}", path.display()))?;

    let git = Git::new(Shell::in_dir(&session.root));
    let action = git
        .ensure_story_branch(number, &slugify(&doc.story.title), force, &session.cancel)
        .await
        .context("prepare story branch")?;
    match action {
        BranchAction::None => println!("Already on the branch for story {number}"),
        other => println!("Story branch ready ({other})"),
    }
    println!("Implementation of story {number} is not available yet");
    Ok(())
}

fn report_outcome(outcome: &LoopOutcome) {
    match outcome {
        LoopOutcome::Passed { latest } => {
            println!("Checklist passed: {}", latest.display())
        }
        LoopOutcome::Exited { latest } => println!(
            "Checklist review ended with open failures; latest version: {}",
            latest.display()
        ),
    }
}
