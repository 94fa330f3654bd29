//! Helpers for the accompanying binary: argument parsing
//! macros, logging setup and input record loading.
//!
//! APIs here shouldn't be considered stable / used as a
//! library.

use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
    sync::Once,
};

use anyhow::{Context, Result};
pub use clap::{App, Arg};
use indicatif::{ProgressBar, ProgressStyle};
pub use inflector::Inflector;
use serde_json::Deserializer;
use tracing_subscriber::EnvFilter;

use crate::input::InputRecord;

#[macro_export]
macro_rules! args_parser {
    ($name:expr) => {{
        $crate::cli::App::new($name)
            .version(clap::crate_version!())
            .author(clap::crate_authors!())
    }};
}

#[macro_export]
macro_rules! arg {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name).value_name(&$name.to_screaming_snake_case())
    }};
}

#[macro_export]
macro_rules! opt {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name)
            .long(&$name.to_kebab_case())
            .value_name(&$name.to_screaming_snake_case())
    }};
}

/// Install the global subscriber, writing to stderr so stdout
/// stays machine readable. `RUST_LOG` wins over `verbosity`.
pub fn init_logging(verbosity: u64) {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let level = match verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
    })
}

pub fn progress_bar(len: usize) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {wide_bar:cyan/blue} {pos:>7}/{len:7}"),
    );
    bar
}

/// Input records from a file holding either a JSON array or a
/// stream of JSON objects.
pub fn read_input_records(path: &Path) -> Result<Vec<InputRecord>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    parse_input_records(BufReader::new(file))
        .with_context(|| format!("parsing input records in {}", path.display()))
}

fn parse_input_records<R: Read>(rdr: R) -> Result<Vec<InputRecord>> {
    let mut records = vec![];
    for value in Deserializer::from_reader(rdr).into_iter::<serde_json::Value>() {
        match value? {
            serde_json::Value::Array(items) => {
                for item in items {
                    records.push(serde_json::from_value(item)?);
                }
            }
            other => records.push(serde_json::from_value(other)?),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_as_array_or_stream() -> Result<()> {
        let one = r#"{"id": "a", "name": "flirIrCamera - 2018-07-01__12-30-00"}"#;
        let two = r#"{"id": "b", "name": "flirIrCamera - 2018-07-02__12-30-00"}"#;

        let stream = parse_input_records(format!("{one}\n{two}").as_bytes())?;
        let array = parse_input_records(format!("[{one}, {two}]").as_bytes())?;
        assert_eq!(stream.len(), 2);
        assert_eq!(array.len(), 2);
        assert_eq!(array[1].id, "b");
        Ok(())
    }

    #[test]
    fn malformed_records_are_errors() {
        assert!(parse_input_records(r#"{"name": 3}"#.as_bytes()).is_err());
    }
}
