pub mod ai;
pub mod cancel;
pub mod checklist;
pub mod config;
pub mod error;
pub mod fixloop;
pub mod io;
pub mod parser;
pub mod pipeline;
pub mod run_dir;
pub mod schema;
pub mod shell;
pub mod story;
pub mod template;
pub mod terminal;
pub mod triage;
pub mod vcs;
pub mod version_store;

#[cfg(test)]
mod testing;

pub use error::{Error, ErrorKind, Result};
