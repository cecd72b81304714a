use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a benchmark runs its statement a single time or once per iteration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Once,
    #[default]
    Loop,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Once => "once",
            Mode::Loop => "loop",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of benchmark work, either parsed from a script or taken from a
/// bencher's built-in workload. Never mutated after construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkDescriptor {
    pub name: String,
    pub mode: Mode,
    /// Fraction of the global iteration count, in `(0.0, 1.0]`. Only used in loop mode.
    pub iteration_ratio: f64,
    /// Run detached from the coordinator's sequence.
    pub parallel: bool,
    pub statement: String,
}

impl BenchmarkDescriptor {
    /// Loop-mode descriptor with the full iteration budget.
    pub fn looped(name: impl Into<String>, statement: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Loop,
            iteration_ratio: 1.0,
            parallel: false,
            statement: statement.into(),
        }
    }

    pub fn once(name: impl Into<String>, statement: impl Into<String>) -> Self {
        Self {
            mode: Mode::Once,
            ..Self::looped(name, statement)
        }
    }

    /// Number of statement executions requested for this descriptor.
    ///
    /// Loop mode scales the global count by the ratio, rounds, and never goes
    /// below one. Once mode is always a single execution.
    pub fn effective_iterations(&self, global_iterations: u64) -> u64 {
        match self.mode {
            Mode::Once => 1,
            Mode::Loop => {
                let scaled = (global_iterations as f64 * self.iteration_ratio).round();
                (scaled as u64).max(1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_iterations_scales_by_ratio() {
        let mut d = BenchmarkDescriptor::looped("half", "SELECT 1;");
        d.iteration_ratio = 0.5;
        assert_eq!(d.effective_iterations(100), 50);
        assert_eq!(d.effective_iterations(3), 2);
    }

    #[test]
    fn effective_iterations_never_below_one() {
        let mut d = BenchmarkDescriptor::looped("tiny", "SELECT 1;");
        d.iteration_ratio = 0.001;
        assert_eq!(d.effective_iterations(10), 1);
        assert_eq!(d.effective_iterations(0), 1);
    }

    #[test]
    fn once_mode_ignores_global_count() {
        let d = BenchmarkDescriptor::once("ping", "SELECT 1;");
        assert_eq!(d.effective_iterations(10_000), 1);
    }
}
