//! Structured logging.
//!
//! Call sites use `tracing` macros. This module installs the subscriber that
//! turns them into lines: console or JSON encoding, an optional ANSI color,
//! and one or more outputs that every line is copied to.

use std::fs::{File, OpenOptions};
use std::io;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{LogConfig, LogEncoding};
use crate::error::Error;

/// Installs the global subscriber described by `cfg`.
///
/// Fails if a log file cannot be opened or a subscriber is already set.
pub fn init(cfg: &LogConfig) -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.level.to_string()));
    let writer = make_writer(&cfg.outputs)?;

    let registry = tracing_subscriber::registry().with(filter);

    match cfg.encoding {
        LogEncoding::Console => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(cfg.color)
                    .with_writer(writer),
            )
            .try_init()?,
        LogEncoding::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(writer),
            )
            .try_init()?,
    }

    Ok(())
}

/// One writer that copies every line to each of `outputs`.
fn make_writer(outputs: &[String]) -> Result<BoxMakeWriter, Error> {
    let mut writers = outputs.iter().map(|path| output(path));

    let first = match writers.next() {
        Some(w) => w?,
        None => return Ok(BoxMakeWriter::new(io::stderr)),
    };

    writers.try_fold(first, |acc, next| Ok(BoxMakeWriter::new(acc.and(next?))))
}

fn output(path: &str) -> Result<BoxMakeWriter, Error> {
    Ok(match path {
        "stderr" => BoxMakeWriter::new(io::stderr),
        "stdout" => BoxMakeWriter::new(io::stdout),
        _ => BoxMakeWriter::new(Mutex::new(open_append(path)?)),
    })
}

fn open_append(path: &str) -> Result<File, Error> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| Error::LogOutput { path: path.to_owned(), source })
}
