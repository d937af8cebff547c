//! RAID Level Resolution
//!
//! Given the redundancy profiles of a set of input devices and a client
//! goal, pick the RAID level whose combined profile matches best. The
//! policy is fixed: exact-goal matches always beat mere bounds
//! satisfaction, and within a pass the level with the lowest priority
//! rank wins, preferring mirroring and parity over bare striping.
//!
//! The level table co-locates everything the policy depends on — the
//! protocol encoding, the tie-break rank and the minimum device count —
//! so the invariants are testable in one place.

use super::goal::RedundancyGoal;
use super::profile::RedundancyProfile;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

// =============================================================================
// RAID Level
// =============================================================================

/// A discrete redundancy scheme applied to a set of input devices.
///
/// The discriminants are part of the wire contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u16)]
pub enum RaidLevel {
    Raid0 = 0,
    Raid1 = 1,
    Raid4 = 4,
    Raid5 = 5,
    Raid6 = 6,
    Raid10 = 10,
}

impl RaidLevel {
    /// Every supported level
    pub const ALL: [RaidLevel; 6] = [
        RaidLevel::Raid0,
        RaidLevel::Raid1,
        RaidLevel::Raid4,
        RaidLevel::Raid5,
        RaidLevel::Raid6,
        RaidLevel::Raid10,
    ];

    /// Protocol encoding of this level
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Level for a protocol encoding, if supported
    pub fn from_u16(value: u16) -> Option<RaidLevel> {
        RaidLevel::ALL.into_iter().find(|l| l.as_u16() == value)
    }

    fn entry(self) -> &'static LevelEntry {
        // The table covers every variant.
        LEVEL_TABLE
            .iter()
            .find(|e| e.level == self)
            .expect("level missing from LEVEL_TABLE")
    }

    /// Tie-break rank; lower wins when several levels match a goal
    pub fn priority(self) -> u8 {
        self.entry().priority
    }

    /// Fewest input devices this level can be assembled from
    pub fn min_devices(self) -> usize {
        self.entry().min_devices
    }

    /// Fail fast when `count` devices cannot form this level
    pub fn check_device_count(self, count: usize) -> Result<()> {
        let required = self.min_devices();
        if count < required {
            return Err(Error::TooFewDevices {
                level: self.to_string(),
                required,
                actual: count,
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for RaidLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RAID{}", self.as_u16())
    }
}

// =============================================================================
// Level Table
// =============================================================================

/// One row of the selection policy
#[derive(Debug, Clone, Copy)]
pub struct LevelEntry {
    pub level: RaidLevel,
    pub priority: u8,
    pub min_devices: usize,
}

/// The selection policy, ordered by ascending priority rank.
///
/// Mirroring first, then single/double parity, with bare striping as the
/// last resort.
pub const LEVEL_TABLE: [LevelEntry; 6] = [
    LevelEntry {
        level: RaidLevel::Raid1,
        priority: 1,
        min_devices: 2,
    },
    LevelEntry {
        level: RaidLevel::Raid5,
        priority: 2,
        min_devices: 3,
    },
    LevelEntry {
        level: RaidLevel::Raid6,
        priority: 3,
        min_devices: 4,
    },
    LevelEntry {
        level: RaidLevel::Raid4,
        priority: 4,
        min_devices: 3,
    },
    LevelEntry {
        level: RaidLevel::Raid10,
        priority: 5,
        min_devices: 2,
    },
    LevelEntry {
        level: RaidLevel::Raid0,
        priority: 6,
        min_devices: 2,
    },
];

// =============================================================================
// Level Selection
// =============================================================================

/// Select the best-matching RAID level for the given goal.
///
/// Candidates that cannot be assembled from the given number of devices
/// are skipped before their profile is ever computed. The remaining
/// candidates are evaluated in two passes: first against the exact-goal
/// view, then (only when nothing matched) against the bounds view; within
/// a pass the lowest priority rank wins. Returns `None` when no candidate
/// satisfies either pass.
///
/// # Panics
///
/// Panics when `redundancies` is empty or when two candidates share a
/// priority rank; both indicate an engine bug.
pub fn select_level(
    redundancies: &[RedundancyProfile],
    goal: &RedundancyGoal,
    candidates: &[RaidLevel],
) -> Option<RaidLevel> {
    assert!(
        !redundancies.is_empty(),
        "cannot select a RAID level for an empty device set"
    );
    assert_distinct_priorities(candidates);

    let viable: Vec<(RaidLevel, RedundancyProfile)> = candidates
        .iter()
        .filter(|level| {
            let enough = redundancies.len() >= level.min_devices();
            if !enough {
                debug!(
                    level = %level,
                    devices = redundancies.len(),
                    required = level.min_devices(),
                    "skipping level, not enough devices"
                );
            }
            enough
        })
        .map(|&level| (level, RedundancyProfile::combine(redundancies, Some(level))))
        .collect();

    // Pass 1: exact-goal matches are always preferred.
    let best = run_pass(&viable, |profile| goal.check_profile_exact(profile), "goal");
    if best.is_some() {
        return best;
    }

    // Pass 2: fall back to anything inside the bounds.
    run_pass(&viable, |profile| goal.check_profile(profile), "bounds")
}

fn run_pass<F>(
    viable: &[(RaidLevel, RedundancyProfile)],
    check: F,
    pass: &'static str,
) -> Option<RaidLevel>
where
    F: Fn(&RedundancyProfile) -> std::result::Result<(), super::goal::GoalMismatch>,
{
    let mut best: Option<RaidLevel> = None;
    for (level, profile) in viable {
        match check(profile) {
            Ok(()) => {
                debug!(pass, level = %level, rank = level.priority(), "level matches");
                if best.map_or(true, |b| level.priority() < b.priority()) {
                    best = Some(*level);
                }
            }
            Err(mismatch) => {
                debug!(pass, level = %level, %mismatch, "skipping level");
            }
        }
    }
    best
}

fn assert_distinct_priorities(candidates: &[RaidLevel]) {
    for (i, a) in candidates.iter().enumerate() {
        for b in &candidates[i + 1..] {
            assert!(
                a == b || a.priority() != b.priority(),
                "RAID levels {a} and {b} share priority rank {}",
                a.priority()
            );
        }
    }
}
