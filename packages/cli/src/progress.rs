//! Terminal output for the `score` command: logging and the incident bar.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use log::LevelFilter;
use verifix_scoring::ScoringProgress;

const WAITING_TEMPLATE: &str = "{spinner:.green} {prefix:.bold} preparing amenity index";
const SCORING_TEMPLATE: &str =
    "{prefix:.bold} [{bar:40.green/white}] {pos}/{len} incidents {msg:.red} ({elapsed})";

/// Bar tracking one scoring batch.
///
/// Spins while the amenity index is prepared, switches to a counted bar
/// when the batch begins and ends with the scored/skipped totals.
pub struct IncidentBar {
    bar: ProgressBar,
    skipped: AtomicUsize,
}

impl IncidentBar {
    /// Adds a bar labelled with the incident source to `multi`.
    #[must_use]
    pub fn new(multi: &MultiProgress, source: &str) -> Self {
        let bar = multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::with_template(WAITING_TEMPLATE) {
            bar.set_style(style);
        }
        bar.set_prefix(source.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        Self {
            bar,
            skipped: AtomicUsize::new(0),
        }
    }
}

impl ScoringProgress for IncidentBar {
    fn begin(&self, incidents: usize) {
        self.skipped.store(0, Ordering::Relaxed);
        if let Ok(style) = ProgressStyle::with_template(SCORING_TEMPLATE) {
            self.bar.set_style(style.progress_chars("=> "));
        }
        self.bar.set_length(incidents as u64);
        self.bar.set_position(0);
    }

    fn incident_done(&self, scored: bool) {
        if !scored {
            let skipped = self.skipped.fetch_add(1, Ordering::Relaxed) + 1;
            self.bar.set_message(format!("{skipped} skipped"));
        }
        self.bar.inc(1);
    }

    fn end(&self, scored: usize, skipped: usize) {
        self.bar
            .finish_with_message(format!("{scored} scored, {skipped} skipped"));
    }
}

/// Installs `pretty_env_logger` behind `indicatif-log-bridge`.
///
/// Defaults to `info`; `RUST_LOG` filters apply on top. Every bar must be
/// added to the returned [`MultiProgress`] so log lines don't tear it.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(LevelFilter::Info);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    let logger = builder.build();
    let max_level = logger.filter();

    let multi = MultiProgress::new();
    if LogWrapper::new(multi.clone(), logger).try_init().is_ok() {
        log::set_max_level(max_level);
    }
    multi
}
