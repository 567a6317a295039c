use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::model::Story;
use crate::error::{Error, ErrorKind, Result, ResultExt};

static NUMBER_RE: OnceLock<Regex> = OnceLock::new();
static NON_WORD_RE: OnceLock<Regex> = OnceLock::new();
static SEPARATOR_RE: OnceLock<Regex> = OnceLock::new();

/// A validated `<epic>.<story>` identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoryNumber {
    pub epic: u32,
    pub story: u32,
}

impl StoryNumber {
    pub fn parse(raw: &str) -> Result<Self> {
        let re = NUMBER_RE.get_or_init(|| Regex::new(r"^(\d+)\.(\d+)$").unwrap());
        let invalid = || Error::config(format!("invalid story number '{raw}': expected <epic>.<story>, e.g. 3.1"));
        let caps = re.captures(raw.trim()).ok_or_else(invalid)?;
        Ok(Self {
            epic: caps[1].parse().map_err(|_| invalid())?,
            story: caps[2].parse().map_err(|_| invalid())?,
        })
    }
}

impl std::fmt::Display for StoryNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.epic, self.story)
    }
}

/// Lowercase, drop non-word characters, collapse whitespace / `_` / `-`
/// runs into a single `-`.
pub fn slugify(title: &str) -> String {
    let non_word = NON_WORD_RE.get_or_init(|| Regex::new(r"[^\w\s-]").unwrap());
    let sep = SEPARATOR_RE.get_or_init(|| Regex::new(r"[\s_-]+").unwrap());
    let lower = title.to_lowercase();
    let cleaned = non_word.replace_all(&lower, "");
    sep.replace_all(&cleaned, "-").trim_matches('-').to_string()
}

// ---------------------------------------------------------------------------
// Epic documents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpicInfo {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub completion_summary: String,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpicDocument {
    pub epic: EpicInfo,
    #[serde(default)]
    pub stories: Vec<Story>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub technical_notes: Vec<String>,
}

/// Loads stories out of `epic-NN-*.yaml` files.
#[derive(Debug, Clone)]
pub struct EpicLoader {
    base: PathBuf,
}

impl EpicLoader {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// The single file matching `epic-NN-*.yaml`.
    pub fn epic_path(&self, epic: u32) -> Result<PathBuf> {
        let pattern = self.base.join(format!("epic-{epic:02}-*.yaml"));
        let pattern_str = pattern.to_string_lossy().into_owned();
        let matches: Vec<PathBuf> = glob::glob(&pattern_str)
            .or_kind(ErrorKind::Config, || format!("search epic files {pattern_str}"))?
            .filter_map(|entry| entry.ok())
            .collect();
        match matches.as_slice() {
            [] => Err(Error::config(format!("no epic file matches {pattern_str}"))),
            [one] => Ok(one.clone()),
            many => Err(Error::config(format!(
                "multiple epic files match {pattern_str}: {}",
                many.iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    pub fn load_epic(&self, epic: u32) -> Result<EpicDocument> {
        let path = self.epic_path(epic)?;
        load_epic_file(&path)
    }

    /// The story at 1-based index `number.story` of epic `number.epic`.
    pub fn load_story(&self, number: StoryNumber) -> Result<Story> {
        let doc = self
            .load_epic(number.epic)
            .map_err(|e| e.context(format!("load epic {}", number.epic)))?;
        let count = doc.stories.len();
        if number.story == 0 || number.story as usize > count {
            return Err(Error::config(format!(
                "story index {} out of range for epic {} ({count} stories)",
                number.story, number.epic
            )));
        }
        Ok(doc.stories[number.story as usize - 1].clone())
    }
}

fn load_epic_file(path: &Path) -> Result<EpicDocument> {
    let data = std::fs::read_to_string(path)
        .or_kind(ErrorKind::Config, || format!("read epic file {}", path.display()))?;
    serde_yaml::from_str(&data)
        .or_kind(ErrorKind::Config, || format!("parse epic file {}", path.display()))
}
