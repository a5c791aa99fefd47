//! Build progress reporting.
//!
//! `docqa build` reports what is being discovered, which source is being
//! processed and how many remain. Progress goes to **stderr** so stdout
//! stays parseable.

use std::io::Write;

/// A single progress event of a corpus build.
#[derive(Clone, Debug, PartialEq)]
pub enum BuildEvent {
    /// Listing sources. Total unknown.
    Discovering,
    /// Source `n` of `total` is being fetched, extracted and embedded.
    Processing { n: u64, total: u64, source: String },
    /// Writing artifacts to the corpus directory.
    Saving { chunks: u64 },
}

/// Receives build progress. Implementations must not fail the build.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: BuildEvent);
}

/// Human-friendly progress: `build  processing  12 / 1,340  Budget Report.pdf`.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: BuildEvent) {
        let line = match &event {
            BuildEvent::Discovering => "build  discovering sources...\n".to_string(),
            BuildEvent::Processing { n, total, source } => format!(
                "build  processing  {} / {}  {}\n",
                format_number(*n),
                format_number(*total),
                source
            ),
            BuildEvent::Saving { chunks } => {
                format!("build  saving  {} chunks\n", format_number(*chunks))
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// One JSON object per line.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: BuildEvent) {
        let obj = match &event {
            BuildEvent::Discovering => serde_json::json!({
                "event": "progress",
                "phase": "discovering"
            }),
            BuildEvent::Processing { n, total, source } => serde_json::json!({
                "event": "progress",
                "phase": "processing",
                "n": n,
                "total": total,
                "source": source
            }),
            BuildEvent::Saving { chunks } => serde_json::json!({
                "event": "progress",
                "phase": "saving",
                "chunks": chunks
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: BuildEvent) {}
}

/// Thousands separators: `1234567` → `1,234,567`.
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Progress mode selected on the command line.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_groups_thousands() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(12_345), "12,345");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
