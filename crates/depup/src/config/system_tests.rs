//! Configuration of the user-supplied system-test suite.
use serde::{Deserialize, Serialize};

/// When the system-test suite runs relative to updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Before any updates are applied.
    Preflight,
    /// After every update group.
    AfterEach,
    /// Once, after all updates, when at least one succeeded.
    AfterAll,
    /// Never.
    #[default]
    None,
}

/// A single system test: a named, ordered list of commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct SystemTest {
    pub name: String,
    /// Commands run in order; the first failure fails the test.
    pub commands: Vec<String>,
    /// Per-test deadline; the suite default when absent.
    pub timeout_seconds: Option<u64>,
    /// A failing test marked `continue_on_fail` is reported but not
    /// critical.
    pub continue_on_fail: bool,
}

/// The system-test suite and its policy switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct SystemTestsCfg {
    pub run_mode: RunMode,
    /// Also run the suite during preflight regardless of `run_mode`.
    pub run_preflight: bool,
    /// Abort the run on the first critical failure.
    pub stop_on_fail: bool,
    pub tests: Vec<SystemTest>,
}

impl SystemTestsCfg {
    #[must_use]
    pub fn runs_in(&self, mode: RunMode) -> bool {
        self.run_mode == mode || (mode == RunMode::Preflight && self.run_preflight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_preflight_switch_adds_preflight_mode() {
        let cfg = SystemTestsCfg {
            run_mode: RunMode::AfterAll,
            run_preflight: true,
            ..SystemTestsCfg::default()
        };
        assert!(cfg.runs_in(RunMode::Preflight));
        assert!(cfg.runs_in(RunMode::AfterAll));
        assert!(!cfg.runs_in(RunMode::AfterEach));
    }
}
