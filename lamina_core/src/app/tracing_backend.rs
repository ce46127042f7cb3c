// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! Configures a suitable default [`tracing`] implementation for a Lamina host.
//!
//! Lifecycle updates can run for every frame, so the log format is kept short:
//! the time is printed without the date and with millisecond precision, and targets are skipped.
//! In debug mode, every message is also written to a temporary file.
//! The default filter can be overwritten using `RUST_LOG`.
//! This will include all [`DEBUG`](tracing::Level::DEBUG) messages in debug mode,
//! and all [`INFO`](tracing::Level::INFO) level messages in release mode.
//!
//! If a `tracing` backend is already configured, this will not overwrite that.

use std::error::Error;
use std::fmt;
use std::fs::File;
use std::time::UNIX_EPOCH;

use time::macros::format_description;
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;

/// Constructs a default tracing subscriber with a given `default_level` filter.
///
/// Returns the subscriber, and the error in case of a (recoverable) error.
pub fn default_tracing_subscriber(
    default_level: LevelFilter,
) -> (impl Subscriber, Option<Box<dyn Error>>) {
    let mut errors: Vec<String> = Vec::new();

    let env_filter_builder = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var("RUST_LOG");
    if let Err(err) = env_filter_builder.from_env() {
        errors.push(format!("failed to parse RUST_LOG environment variable: {err:#}"));
    }
    let env_filter = env_filter_builder.from_env_lossy();

    let timer = UtcTime::new(format_description!(
        // We append a `Z` here to indicate clearly that this is a UTC time
        "[hour repr:24]:[minute]:[second].[subsecond digits:3]Z"
    ));
    // If modifying, also update the module level docs
    let console_layer = tracing_subscriber::fmt::layer()
        .with_timer(timer.clone())
        .with_target(false)
        .with_filter(env_filter);

    // The log file is skipped in `--release` mode for performance.
    let log_file_layer = if cfg!(debug_assertions) {
        let id = std::time::SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis());
        let tmp_path = std::env::temp_dir().join(format!("lamina-{id:016}-dense.log"));
        match File::create(&tmp_path) {
            Ok(file) => {
                #[allow(clippy::print_stderr, reason = "Tracing isn't set up yet")]
                {
                    eprintln!("---");
                    eprintln!("Writing full logs to {}", tmp_path.display());
                    eprintln!("---");
                }
                // This layer logs all events, regardless of the filter.
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_timer(timer)
                        .with_writer(file)
                        .with_ansi(false),
                )
            }
            Err(err) => {
                errors.push(format!(
                    "failed to create log file {}: {err}",
                    tmp_path.display()
                ));
                None
            }
        }
    } else {
        None
    };

    let registry = tracing_subscriber::registry()
        .with(console_layer)
        .with(log_file_layer);

    let err = (!errors.is_empty()).then(|| errors.join("; ").into());
    (registry, err)
}

/// An Error indicating that a tracing subscriber has been set before.
#[derive(Debug)]
pub struct TracingSubscriberHasBeenSetError;

impl fmt::Display for TracingSubscriberHasBeenSetError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.pad("A tracing subscriber has been set before.")
    }
}

impl Error for TracingSubscriberHasBeenSetError {}

/// Verify that a tracing subscriber has not been set before or return with an error.
fn verify_subscriber_has_not_been_set() -> Result<(), TracingSubscriberHasBeenSetError> {
    // The tracing_core::dispatcher::has_been_set function is doc(hidden),
    // but tracing itself depends on it for the whole 1.0 series.
    if tracing_core::dispatcher::has_been_set() {
        return Err(TracingSubscriberHasBeenSetError);
    }
    Ok(())
}

fn try_init_with_level(default_level: LevelFilter) -> Result<(), TracingSubscriberHasBeenSetError> {
    verify_subscriber_has_not_been_set()?;

    let (subscriber, err) = default_tracing_subscriber(default_level);

    // We may ignore potential errors here because we already checked that no subscriber
    // has been set.
    let _ = tracing::subscriber::set_global_default(subscriber);
    if let Some(err) = err {
        tracing::error!("Initialising logging encountered recoverable error: {err}");
    }

    Ok(())
}

/// Initialise tracing with a default subscriber for a unit test.
///
/// This ignores most messages to limit noise (but will still log all messages to a file).
pub fn try_init_test_tracing() -> Result<(), TracingSubscriberHasBeenSetError> {
    try_init_with_level(LevelFilter::WARN)
}

/// Initialise tracing with a default subscriber for an application embedding Lamina.
pub fn try_init_tracing() -> Result<(), TracingSubscriberHasBeenSetError> {
    // DEBUG should print a few logs per lifecycle update.
    // INFO should only print logs for noteworthy things.
    let default_level = if cfg!(debug_assertions) {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    try_init_with_level(default_level)
}
