use std::path::PathBuf;

use crate::types::PermissionMode;

// ─── ExecutionMode ────────────────────────────────────────────────────────

/// Tool-permission profile under which one prompt runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Read and search anywhere; write only below `write_root`; no shell,
    /// no edits, no network, no sub-agents.
    Restricted { write_root: PathBuf },
    /// Every tool permitted.
    FullAccess,
}

const READ_TOOLS: &[&str] = &["Read(**)", "Glob(**)", "Grep(**)"];

const FULL_ACCESS_TOOLS: &[&str] = &[
    "Read(**)",
    "Write(**)",
    "Edit(**)",
    "MultiEdit(**)",
    "Glob(**)",
    "Grep(**)",
    "Bash",
    "WebFetch",
    "WebSearch",
    "Task",
];

const RESTRICTED_DENY: &[&str] = &[
    "Bash",
    "Edit(**)",
    "MultiEdit(**)",
    "WebFetch",
    "WebSearch",
    "Task",
];

impl ExecutionMode {
    pub fn restricted(write_root: impl Into<PathBuf>) -> Self {
        ExecutionMode::Restricted {
            write_root: write_root.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExecutionMode::Restricted { .. } => "restricted",
            ExecutionMode::FullAccess => "full-access",
        }
    }

    pub fn allowed_tools(&self) -> Vec<String> {
        match self {
            ExecutionMode::Restricted { write_root } => {
                let root = write_root.to_string_lossy();
                let root = root.trim_end_matches('/');
                let mut tools: Vec<String> = READ_TOOLS.iter().map(|t| t.to_string()).collect();
                tools.insert(1, format!("Write({root}/**)"));
                tools
            }
            ExecutionMode::FullAccess => FULL_ACCESS_TOOLS.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn disallowed_tools(&self) -> Vec<String> {
        match self {
            ExecutionMode::Restricted { .. } => {
                RESTRICTED_DENY.iter().map(|t| t.to_string()).collect()
            }
            ExecutionMode::FullAccess => Vec::new(),
        }
    }

    pub fn permission_mode(&self) -> PermissionMode {
        PermissionMode::AcceptEdits
    }
}
