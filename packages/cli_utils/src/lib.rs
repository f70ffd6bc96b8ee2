#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal output for titanic.
//!
//! Provides an `indicatif` byte-transfer bar behind the
//! [`ProgressCallback`] trait, a [`ProgressFactory`] that hands one out per
//! file, and [`init_logger`] which routes `log` through
//! `indicatif-log-bridge` so log lines never tear a bar mid-redraw.

use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use titanic_upload::{ProgressCallback, ProgressFactory};

pub use indicatif::MultiProgress;

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "titanic=info";

/// An `indicatif` [`ProgressBar`] that implements [`ProgressCallback`].
pub struct IndicatifProgress {
    bar: ProgressBar,
}

impl IndicatifProgress {
    /// Creates a terminal-width transfer bar showing bytes, percentage and
    /// ETA for a transfer of `total` bytes.
    #[must_use]
    pub fn bytes_bar(
        multi: &MultiProgress,
        label: &str,
        total: u64,
    ) -> Arc<dyn ProgressCallback> {
        Arc::new(Self::transfer(multi, label, total))
    }

    fn transfer(multi: &MultiProgress, label: &str, total: u64) -> Self {
        let bar = multi.add(ProgressBar::new(total));
        bar.set_style(
            ProgressStyle::with_template(
                "  {msg} {wide_bar:.cyan/dim} {bytes}/{total_bytes} {percent}% [{eta}]",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );
        bar.set_message(label.to_string());

        Self { bar }
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
    }

    fn set_position(&self, pos: u64) {
        self.bar.set_position(pos);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }

    fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

/// Hands out one [`IndicatifProgress::bytes_bar`] per file transfer.
pub struct IndicatifFactory {
    multi: MultiProgress,
}

impl IndicatifFactory {
    #[must_use]
    pub const fn new(multi: MultiProgress) -> Self {
        Self { multi }
    }
}

impl ProgressFactory for IndicatifFactory {
    fn transfer_bar(&self, label: &str, total_bytes: u64) -> Arc<dyn ProgressCallback> {
        IndicatifProgress::bytes_bar(&self.multi, label, total_bytes)
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge` so that
/// `log::info!` and friends are suspended while progress bars redraw.
///
/// `RUST_LOG` overrides the default `titanic=info` filter.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let mut builder = pretty_env_logger::formatted_builder();
    match std::env::var("RUST_LOG") {
        Ok(filter) => builder.parse_filters(&filter),
        Err(_) => builder.parse_filters(DEFAULT_FILTER),
    };
    let logger = builder.build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // already set in tests

    log::set_max_level(level);

    multi
}
