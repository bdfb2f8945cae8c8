//! Tick statistics and profiling output.

use std::fmt;
use std::time::Duration;

use crate::component::TickOutcome;

/// Outcome counts and busy time of one instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceStats {
    /// Instance name.
    pub name: String,
    /// Ticks per outcome, indexed like [`TickOutcome::ALL`].
    pub outcomes: [u64; 6],
    /// Time spent inside `tick` (only measured with profiling enabled).
    pub busy: Duration,
}

impl InstanceStats {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub(crate) fn record(&mut self, outcome: TickOutcome) {
        self.outcomes[outcome_slot(outcome)] += 1;
    }

    /// Ticks that returned `outcome`.
    pub fn count(&self, outcome: TickOutcome) -> u64 {
        self.outcomes[outcome_slot(outcome)]
    }

    /// Total ticks.
    pub fn total(&self) -> u64 {
        self.outcomes.iter().sum()
    }
}

fn outcome_slot(outcome: TickOutcome) -> usize {
    TickOutcome::ALL
        .iter()
        .position(|o| *o == outcome)
        .unwrap_or(0)
}

/// Statistics of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Rounds executed.
    pub ticks: u64,
    /// End-of-input assertions.
    pub eoi_counter: u32,
    /// Per-instance statistics, in tick order.
    pub instances: Vec<InstanceStats>,
}

impl RunStats {
    /// Sum of busy time over all instances.
    pub fn total_busy(&self) -> Duration {
        self.instances.iter().map(|i| i.busy).sum()
    }

    /// One line per instance with its share of the total busy time.
    pub fn profile_lines(&self) -> Vec<String> {
        let total = self.total_busy().as_secs_f64();
        self.instances
            .iter()
            .map(|i| {
                let secs = i.busy.as_secs_f64();
                let share = if total > 0.0 { 100.0 * secs / total } else { 0.0 };
                format!("{:<24} {:>10.6}s {:>6.2}%", i.name, secs, share)
            })
            .collect()
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ticks: {}  end-of-input passes: {}", self.ticks, self.eoi_counter)?;
        for i in &self.instances {
            write!(f, "  {:<24}", i.name)?;
            for outcome in TickOutcome::ALL {
                let n = i.count(outcome);
                if n > 0 {
                    write!(f, " {}={}", outcome.label(), n)?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Instance names grouped by outcome for one round.
pub(crate) fn round_summary<'a>(results: impl Iterator<Item = (&'a str, TickOutcome)>) -> String {
    let mut groups: Vec<(TickOutcome, Vec<&str>)> = Vec::new();
    for (name, outcome) in results {
        match groups.iter_mut().find(|(o, _)| *o == outcome) {
            Some((_, names)) => names.push(name),
            None => groups.push((outcome, vec![name])),
        }
    }
    groups
        .iter()
        .map(|(o, names)| format!("{}: {}", o.label(), names.join(",")))
        .collect::<Vec<_>>()
        .join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_outcome() {
        let mut s = InstanceStats::new("a");
        s.record(TickOutcome::Success);
        s.record(TickOutcome::Success);
        s.record(TickOutcome::Inactive);
        assert_eq!(s.count(TickOutcome::Success), 2);
        assert_eq!(s.total(), 3);
    }

    #[test]
    fn profile_shares_sum_to_hundred() {
        let mut a = InstanceStats::new("a");
        a.busy = Duration::from_millis(30);
        let mut b = InstanceStats::new("b");
        b.busy = Duration::from_millis(10);
        let stats = RunStats {
            ticks: 4,
            eoi_counter: 1,
            instances: vec![a, b],
        };
        let lines = stats.profile_lines();
        assert!(lines[0].contains("75.00%"));
        assert!(lines[1].contains("25.00%"));
    }

    #[test]
    fn summary_groups_names() {
        let s = round_summary(
            [
                ("gen", TickOutcome::Success),
                ("sink", TickOutcome::SourceNotAvailable),
                ("rms", TickOutcome::Success),
            ]
            .into_iter(),
        );
        assert_eq!(s, "SUCCESS: gen,rms | SOURCE_NOT_AVAIL: sink");
    }
}
