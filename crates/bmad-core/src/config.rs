use crate::error::{Error, ErrorKind, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "bmad-cli.yaml";

// ---------------------------------------------------------------------------
// PathsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Base directory for per-invocation run directories.
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,
    #[serde(default = "default_stories_dir")]
    pub stories_dir: PathBuf,
    #[serde(default)]
    pub checklist: Option<PathBuf>,
    #[serde(default)]
    pub story_schema: Option<PathBuf>,
}

fn default_tmp_dir() -> PathBuf {
    PathBuf::from("./tmp")
}

fn default_stories_dir() -> PathBuf {
    PathBuf::from("docs/stories")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            tmp_dir: default_tmp_dir(),
            stories_dir: default_stories_dir(),
            checklist: None,
            story_schema: None,
        }
    }
}

// ---------------------------------------------------------------------------
// EpicsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpicsConfig {
    #[serde(default = "default_epics_path")]
    pub path: PathBuf,
}

fn default_epics_path() -> PathBuf {
    PathBuf::from("docs/epics")
}

impl Default for EpicsConfig {
    fn default() -> Self {
        Self {
            path: default_epics_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(rename = "type", default = "default_engine_type")]
    pub engine_type: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Path to the `claude` binary when it is not on `PATH`.
    #[serde(default)]
    pub executable: Option<String>,
    #[serde(default)]
    pub timeout_minutes: Option<u64>,
}

fn default_engine_type() -> String {
    "claude".to_string()
}

fn default_model() -> String {
    "sonnet".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_type: default_engine_type(),
            model: default_model(),
            executable: None,
            timeout_minutes: None,
        }
    }
}

// ---------------------------------------------------------------------------
// TemplatesConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Prompt template paths keyed by name (`tasks`, `tasks_system`, …).
    #[serde(default)]
    pub prompts: BTreeMap<String, PathBuf>,
    /// Reference document injected into the heuristic triage prompt.
    #[serde(default)]
    pub heuristic_checklist: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// TriageConfig / FixLoopConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageConfig {
    /// Heuristic scores at or above this ask for human approval.
    #[serde(default = "default_approval_threshold")]
    pub approval_threshold: u8,
    #[serde(default = "default_true")]
    pub auto_resolve_outdated: bool,
}

fn default_approval_threshold() -> u8 {
    8
}

fn default_true() -> bool {
    true
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            approval_threshold: default_approval_threshold(),
            auto_resolve_outdated: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixLoopConfig {
    /// `None` leaves clarification rounds unbounded.
    #[serde(default)]
    pub max_clarification_rounds: Option<u32>,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub epics: EpicsConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Reference documents by key (`architecture`, `coding_standards`, …).
    #[serde(default)]
    pub documents: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub triage: TriageConfig,
    #[serde(default)]
    pub fix_loop: FixLoopConfig,
}

/// Document keys a checklist prompt may request.
pub const DOCUMENT_KEYS: &[&str] = &[
    "architecture",
    "frontend_architecture",
    "coding_standards",
    "source_tree",
    "tech_stack",
    "prd",
    "user_roles",
    "architecture_yaml",
];

impl Config {
    /// Load from `path`. Relative paths inside the file stay relative to the
    /// process working directory, which is the project root.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let data = std::fs::read_to_string(path)
            .or_kind(ErrorKind::Config, || format!("read {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&data)
            .or_kind(ErrorKind::Config, || format!("parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.engine_type != "claude" {
            return Err(Error::config(format!(
                "unsupported engine.type '{}': only 'claude' is available",
                self.engine.engine_type
            )));
        }
        if !(1..=10).contains(&self.triage.approval_threshold) {
            return Err(Error::config(format!(
                "triage.approval_threshold must be within 1..=10, got {}",
                self.triage.approval_threshold
            )));
        }
        Ok(())
    }

    /// Template path for `name`; missing keys are configuration errors.
    pub fn template(&self, name: &str) -> Result<&Path> {
        self.templates
            .prompts
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| {
                Error::config(format!("missing required key templates.prompts.{name}"))
            })
    }

    /// Optional template (system prompts may be left unconfigured).
    pub fn optional_template(&self, name: &str) -> Option<&Path> {
        self.templates.prompts.get(name).map(PathBuf::as_path)
    }

    pub fn checklist_path(&self) -> Result<&Path> {
        self.paths
            .checklist
            .as_deref()
            .ok_or_else(|| Error::config("missing required key paths.checklist"))
    }

    /// Resolve a document key to its configured path. Unknown keys and
    /// unconfigured paths return `None`.
    pub fn document(&self, key: &str) -> Option<&Path> {
        if !DOCUMENT_KEYS.contains(&key) {
            return None;
        }
        self.documents.get(key).map(PathBuf::as_path)
    }

    /// Resolve requested document keys to display paths. Unknown and
    /// unconfigured keys are logged and left out.
    pub fn document_paths(&self, keys: &[String]) -> BTreeMap<String, String> {
        let mut docs = BTreeMap::new();
        for key in keys {
            if !DOCUMENT_KEYS.contains(&key.as_str()) {
                tracing::warn!(key = %key, "unknown document key, skipping");
                continue;
            }
            match self.document(key) {
                Some(path) => {
                    docs.insert(key.clone(), path.display().to_string());
                }
                None => tracing::warn!(key = %key, "document path not configured, skipping"),
            }
        }
        docs
    }
}
