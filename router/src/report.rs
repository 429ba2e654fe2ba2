use crate::algo::astar::SearchSnapshot;
use gridtrace_common::board::indices::NetId;
use std::fmt;
use std::time::Duration;

/// Why a net was skipped before any search ran. Preconditions are checked
/// up front so a hopeless net never burns iteration budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyConnected,
    NoCopper,
    NoUsableLayer,
    PairLayersDisjoint,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyConnected => write!(f, "already connected"),
            SkipReason::NoCopper => write!(f, "no copper to connect"),
            SkipReason::NoUsableLayer => write!(f, "a stub group has no usable layer"),
            SkipReason::PairLayersDisjoint => {
                write!(f, "pair halves share no layer at an endpoint")
            }
        }
    }
}

/// Per-net routing result. "No path" is an ordinary value here; only broken
/// invariants travel as errors.
#[derive(Debug)]
pub enum NetOutcome {
    Routed {
        iterations: u32,
        length: f64,
        vias: usize,
    },
    FailedNoPath {
        iterations: u32,
    },
    Skipped {
        reason: SkipReason,
    },
}

#[derive(Debug)]
pub struct NetReport {
    pub net: NetId,
    pub name: String,
    pub outcome: NetOutcome,
}

#[derive(Debug, Default)]
pub struct Report {
    pub nets: Vec<NetReport>,
    pub elapsed: Duration,
}

impl Report {
    pub fn routed(&self) -> usize {
        self.count(|o| matches!(o, NetOutcome::Routed { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, NetOutcome::FailedNoPath { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, NetOutcome::Skipped { .. }))
    }

    pub fn total_iterations(&self) -> u64 {
        self.nets
            .iter()
            .map(|r| match r.outcome {
                NetOutcome::Routed { iterations, .. } => iterations as u64,
                NetOutcome::FailedNoPath { iterations } => iterations as u64,
                NetOutcome::Skipped { .. } => 0,
            })
            .sum()
    }

    pub fn total_length(&self) -> f64 {
        self.nets
            .iter()
            .map(|r| match r.outcome {
                NetOutcome::Routed { length, .. } => length,
                _ => 0.0,
            })
            .sum()
    }

    fn count(&self, pred: impl Fn(&NetOutcome) -> bool) -> usize {
        self.nets.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn log_summary(&self) {
        if self.failed() == 0 {
            log::info!(
                "\x1b[32mPASS\x1b[0m: {} routed, {} skipped, {:.2}mm of track, {} iterations in {:?}",
                self.routed(),
                self.skipped(),
                self.total_length(),
                self.total_iterations(),
                self.elapsed
            );
        } else {
            log::warn!(
                "\x1b[31mFAIL\x1b[0m: {} routed, {} failed, {} skipped, {} iterations in {:?}",
                self.routed(),
                self.failed(),
                self.skipped(),
                self.total_iterations(),
                self.elapsed
            );
        }
    }
}

/// Events the batch pipeline pushes out while it works. `Searching` fires
/// between iteration batches so a renderer can draw the frontier.
pub enum Progress<'a> {
    NetStarted {
        index: usize,
        total: usize,
        net: NetId,
        name: &'a str,
    },
    Searching {
        net: NetId,
        snapshot: &'a SearchSnapshot,
    },
    NetDone {
        report: &'a NetReport,
    },
}

pub trait ProgressSink {
    fn event(&mut self, progress: Progress<'_>);
}

/// Headless runs plug this in.
pub struct SilentSink;

impl ProgressSink for SilentSink {
    fn event(&mut self, _: Progress<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tallies_group_by_outcome() {
        let report = Report {
            nets: vec![
                NetReport {
                    net: NetId::new(0),
                    name: "A".into(),
                    outcome: NetOutcome::Routed {
                        iterations: 120,
                        length: 4.5,
                        vias: 1,
                    },
                },
                NetReport {
                    net: NetId::new(1),
                    name: "B".into(),
                    outcome: NetOutcome::FailedNoPath { iterations: 900 },
                },
                NetReport {
                    net: NetId::new(2),
                    name: "C".into(),
                    outcome: NetOutcome::Skipped {
                        reason: SkipReason::AlreadyConnected,
                    },
                },
            ],
            elapsed: Duration::from_millis(5),
        };
        assert_eq!(report.routed(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.total_iterations(), 1020);
        assert!((report.total_length() - 4.5).abs() < 1e-9);
    }
}
