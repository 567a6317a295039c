use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_FILE: &str = "bmad-cli.log.json";

/// `DEBUG` counts as set unless empty, `0` or `false`.
pub fn debug_enabled(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None | Some("") | Some("0") => false,
        Some(v) => !v.eq_ignore_ascii_case("false"),
    }
}

/// Structured JSON of every level into `<run_dir>/bmad-cli.log.json`, plus
/// a console layer: info on stdout, or debug on stderr when `DEBUG` is set.
/// `RUST_LOG` overrides the console level.
pub fn init(run_dir: &Path) -> Result<()> {
    let path = run_dir.join(LOG_FILE);
    let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
    let debug = debug_enabled(std::env::var("DEBUG").ok().as_deref());
    let console_filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }))
    };

    let file_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(Mutex::new(file))
        .with_filter(LevelFilter::TRACE);

    let registry = tracing_subscriber::registry().with(file_layer);
    if debug {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_filter(console_filter()),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stdout)
                    .with_filter(console_filter()),
            )
            .try_init()
    }
    .context("install tracing subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_values() {
        assert!(!debug_enabled(None));
        assert!(!debug_enabled(Some("")));
        assert!(!debug_enabled(Some("0")));
        assert!(!debug_enabled(Some("FALSE")));
        assert!(debug_enabled(Some("1")));
        assert!(debug_enabled(Some("yes")));
    }
}
