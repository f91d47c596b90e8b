//! Validator ranking by Commit arrival time
//!
//! For every sequence the core records when each committee member's first
//! Commit arrived, relative to the start of the round. Once the block is
//! final the arrivals are summarized and each member is assessed:
//!
//! | code | meaning       |
//! |------|---------------|
//! | 0    | arrived early |
//! | 1    | arrived late  |
//! | 2    | not arrived   |
//!
//! Assessments are packed 2 bits per member, 4 per byte, most significant
//! first, over the committee sorted by address.

use super::view::View;
use shared_crypto::Address;
use std::collections::HashMap;
use std::time::{Duration, Instant};

const ARRIVED_EARLY: u8 = 0;
const ARRIVED_LATE: u8 = 1;
const NOT_ARRIVED: u8 = 2;

/// Summary of one finalized sequence
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VrankReport {
    pub view: View,
    pub first_commit: Duration,
    pub quorum_commit: Duration,
    pub avg_commit_within_quorum: Duration,
    pub last_commit: Duration,
    /// Hex of the packed assessment bitmap
    pub bitmap: String,
    /// Encoded arrival times of late members, committee order
    pub late_commits: Vec<String>,
}

#[derive(Debug)]
pub struct Vrank {
    started: Instant,
    view: View,
    committee: Vec<Address>,
    threshold: Duration,
    arrivals: HashMap<Address, Duration>,
}

impl Vrank {
    pub fn new(view: View, mut committee: Vec<Address>, threshold: Duration, started: Instant) -> Self {
        committee.sort_unstable();
        Self {
            started,
            view,
            committee,
            threshold,
            arrivals: HashMap::new(),
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    /// Record the first Commit from `sender` for this view.
    pub fn add_commit(&mut self, view: View, sender: Address, now: Instant) {
        if view != self.view {
            return;
        }
        let elapsed = now.saturating_duration_since(self.started);
        self.arrivals.entry(sender).or_insert(elapsed);
    }

    /// Summarize arrivals once `number` is final.
    ///
    /// Returns `None` when the block is not the one this ranking tracks.
    pub fn handle_committed(&mut self, number: u64) -> Option<VrankReport> {
        if number != self.view.sequence {
            return None;
        }

        let mut report = VrankReport {
            view: self.view,
            ..Default::default()
        };
        if !self.arrivals.is_empty() {
            let sum: Duration = self.arrivals.values().sum();
            report.avg_commit_within_quorum = sum / self.arrivals.len() as u32;
            report.first_commit = self.arrivals.values().copied().min().unwrap_or_default();
            report.quorum_commit = self.arrivals.values().copied().max().unwrap_or_default();
            if !report.quorum_commit.is_zero() && self.threshold > report.quorum_commit {
                self.threshold = report.quorum_commit;
            }
        }

        let serialized = self.serialize();
        let assessed: Vec<u8> = serialized
            .iter()
            .map(|arrival| assess(*arrival, self.threshold))
            .collect();
        let late: Vec<Duration> = serialized
            .iter()
            .flatten()
            .copied()
            .filter(|arrival| *arrival > self.threshold)
            .collect();

        report.last_commit = late.iter().copied().max().unwrap_or_default();
        report.bitmap = hex::encode(compress(&assessed));
        report.late_commits = late.into_iter().map(encode_duration).collect();
        Some(report)
    }

    fn serialize(&self) -> Vec<Option<Duration>> {
        self.committee
            .iter()
            .map(|member| self.arrivals.get(member).copied())
            .collect()
    }
}

fn assess(arrival: Option<Duration>, threshold: Duration) -> u8 {
    match arrival {
        None => NOT_ARRIVED,
        Some(t) if t > threshold => ARRIVED_LATE,
        Some(_) => ARRIVED_EARLY,
    }
}

/// Pack 2-bit codes, 4 per byte, zero padded
fn compress(codes: &[u8]) -> Vec<u8> {
    codes
        .chunks(4)
        .map(|chunk| {
            chunk
                .iter()
                .chain(std::iter::repeat(&0))
                .take(4)
                .fold(0u8, |byte, code| (byte << 2) | (code & 0b11))
        })
        .collect()
}

/// Short form used in log lines, at most 4 characters
pub fn encode_duration(duration: Duration) -> String {
    if duration > Duration::from_secs(10) {
        format!("{:.0}s", duration.as_secs_f64())
    } else if duration > Duration::from_secs(1) {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        format!("{}", duration.as_millis())
    }
}
