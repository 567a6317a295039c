pub mod epic;
pub mod factory;
pub mod model;

use std::path::{Path, PathBuf};

pub use epic::{slugify, EpicLoader, StoryNumber};
pub use factory::{Section, StoryFactory};
pub use model::{Story, StoryDocument};

use crate::error::{Error, ErrorKind, Result, ResultExt};

/// `<stories_dir>/<N.M>-<slug>.yaml`
pub fn canonical_path(stories_dir: &Path, number: StoryNumber, title: &str) -> PathBuf {
    stories_dir.join(format!("{number}-{}.yaml", slugify(title)))
}

/// An existing canonical file for `number`, whatever its slug.
pub fn find_canonical(stories_dir: &Path, number: StoryNumber) -> Result<Option<PathBuf>> {
    let pattern = stories_dir.join(format!("{number}-*.yaml"));
    let pattern = pattern.to_string_lossy().into_owned();
    let mut matches: Vec<PathBuf> = glob::glob(&pattern)
        .or_kind(ErrorKind::Config, || format!("search stories {pattern}"))?
        .filter_map(|entry| entry.ok())
        .collect();
    matches.sort();
    match matches.len() {
        0 | 1 => Ok(matches.pop()),
        _ => Err(Error::config(format!(
            "several story files match {pattern}"
        ))),
    }
}

pub fn load_document(path: &Path) -> Result<StoryDocument> {
    let data = crate::io::read_to_string(path)?;
    serde_yaml::from_str(&data).or_kind(ErrorKind::Parse, || format!("parse {}", path.display()))
}

/// Write `doc` to its canonical location and return the path.
pub fn write_canonical(stories_dir: &Path, number: StoryNumber, doc: &StoryDocument) -> Result<PathBuf> {
    let path = canonical_path(stories_dir, number, &doc.story.title);
    let yaml = serde_yaml::to_string(doc)
        .or_kind(ErrorKind::Store, || format!("serialize {}", path.display()))?;
    crate::io::atomic_write(&path, yaml.as_bytes())?;
    tracing::info!(file = %path.display(), "story written");
    Ok(path)
}
