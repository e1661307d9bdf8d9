//! Progress reporting for long-running plugin phases

use std::fmt;
use std::io::{IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;

/// How long a phase may run before outstanding plugins are reported.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CreateNodes,
    CreateDependencies,
    CreateMetadata,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::CreateNodes => "creating project nodes",
            Phase::CreateDependencies => "creating project graph dependencies",
            Phase::CreateMetadata => "creating project metadata",
        };
        f.write_str(label)
    }
}

/// Observes the plugins a phase is still waiting on. Never affects results.
pub trait ProgressObserver: Send + Sync {
    /// `None` disables reporting entirely.
    fn grace_period(&self) -> Option<Duration>;

    /// Called once the grace period has passed, then on each tick while
    /// plugins remain outstanding.
    fn waiting(&self, phase: Phase, outstanding: &[String]);

    /// Called when a phase that reported progress completes.
    fn finished(&self, phase: Phase);
}

/// Reports nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressObserver for NoopProgress {
    fn grace_period(&self) -> Option<Duration> {
        None
    }

    fn waiting(&self, _phase: Phase, _outstanding: &[String]) {}

    fn finished(&self, _phase: Phase) {}
}

/// Prints a single updating status line on stderr.
#[derive(Debug, Clone)]
pub struct TerminalProgress {
    grace: Duration,
}

impl TerminalProgress {
    pub fn new(grace: Duration) -> Self {
        TerminalProgress { grace }
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}

impl ProgressObserver for TerminalProgress {
    fn grace_period(&self) -> Option<Duration> {
        Some(self.grace)
    }

    fn waiting(&self, phase: Phase, outstanding: &[String]) {
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r\x1b[2K{} ({phase})", waiting_message(outstanding));
        let _ = stderr.flush();
    }

    fn finished(&self, _phase: Phase) {
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r\x1b[2K");
        let _ = stderr.flush();
    }
}

/// Name the plugin when only one is outstanding, count them otherwise.
pub fn waiting_message(outstanding: &[String]) -> String {
    match outstanding {
        [] => "Waiting for plugins".to_string(),
        [only] => format!("Waiting for {only}"),
        many => format!("Waiting for {} plugins", many.len()),
    }
}

/// Terminal progress unless stderr is not a terminal, the build runs as
/// part of a parallel invocation (`WEAVE_PARALLEL`), or under CI.
pub fn progress_for_environment(parallel: bool) -> Arc<dyn ProgressObserver> {
    let parallel = parallel || env_flag("WEAVE_PARALLEL");
    if parallel || env_flag("CI") || !std::io::stderr().is_terminal() {
        tracing::debug!("Progress display disabled");
        return Arc::new(NoopProgress);
    }
    Arc::new(TerminalProgress::default())
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| !v.is_empty() && v != "0" && v != "false")
}
