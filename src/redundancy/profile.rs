//! Redundancy Profiles
//!
//! A `RedundancyProfile` describes the fault-tolerance characteristics a
//! device (or a combination of devices) actually provides: how many copies
//! of the data exist, how many member devices may fail without data loss,
//! how wide the stripe is, and how parity is laid out.
//!
//! `combine` is the pure model of what a set of devices yields when put
//! together linearly or under a RAID level. It has no I/O and no failure
//! mode other than programmer error.

use super::resolver::RaidLevel;
use serde::{Deserialize, Serialize};

// =============================================================================
// Parity Layout
// =============================================================================

/// Placement of parity blocks within a parity-based scheme.
///
/// The discriminants are part of the wire contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u16)]
pub enum ParityLayout {
    /// Parity concentrated on dedicated devices (RAID4 style)
    NonRotated = 1,
    /// Parity distributed across all member devices (RAID5/6 style)
    Rotated = 2,
}

impl std::fmt::Display for ParityLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParityLayout::NonRotated => write!(f, "non-rotated"),
            ParityLayout::Rotated => write!(f, "rotated"),
        }
    }
}

// =============================================================================
// Redundancy Profile
// =============================================================================

/// Fault-tolerance characteristics of a device or device combination.
///
/// Immutable once computed; cheap to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedundancyProfile {
    /// Number of complete copies of the data
    pub data_redundancy: u16,
    /// Number of member devices that may fail without losing data
    pub package_redundancy: u16,
    /// Number of members user data is striped across
    pub stripe_length: u16,
    /// Whether the combination survives any single device failure
    pub no_single_point_of_failure: bool,
    /// Parity placement, if the scheme uses parity at all
    pub parity_layout: Option<ParityLayout>,
}

impl Default for RedundancyProfile {
    /// Profile of a plain device with no redundancy of its own
    fn default() -> Self {
        Self {
            data_redundancy: 1,
            package_redundancy: 1,
            stripe_length: 1,
            no_single_point_of_failure: false,
            parity_layout: None,
        }
    }
}

impl RedundancyProfile {
    /// Combined profile of `profiles` under the given redundancy scheme.
    ///
    /// `None` means no added redundancy: plain concatenation, where only
    /// the weakest characteristics of the inputs survive.
    ///
    /// # Panics
    ///
    /// Panics when `profiles` is empty; resolving redundancy against an
    /// empty device set is an engine bug, not a user-input problem.
    pub fn combine(profiles: &[RedundancyProfile], level: Option<RaidLevel>) -> RedundancyProfile {
        assert!(
            !profiles.is_empty(),
            "cannot combine an empty set of redundancy profiles"
        );

        match level {
            None => Self::combine_linear(profiles),
            Some(RaidLevel::Raid0) => Self::combine_raid0(profiles),
            Some(RaidLevel::Raid1) => Self::combine_raid1(profiles),
            Some(RaidLevel::Raid4) => Self::combine_parity(profiles, 1, ParityLayout::NonRotated),
            Some(RaidLevel::Raid5) => Self::combine_parity(profiles, 1, ParityLayout::Rotated),
            Some(RaidLevel::Raid6) => Self::combine_parity(profiles, 2, ParityLayout::Rotated),
            Some(RaidLevel::Raid10) => Self::combine_raid10(profiles),
        }
    }

    /// Concatenation: data lives on exactly one member, so the worst
    /// member bounds every characteristic.
    fn combine_linear(profiles: &[RedundancyProfile]) -> RedundancyProfile {
        RedundancyProfile {
            data_redundancy: Self::min_data(profiles),
            package_redundancy: Self::min_package(profiles),
            stripe_length: profiles.iter().map(|p| p.stripe_length).min().unwrap_or(1),
            no_single_point_of_failure: profiles.iter().all(|p| p.no_single_point_of_failure),
            parity_layout: Self::common_parity(profiles),
        }
    }

    fn combine_raid0(profiles: &[RedundancyProfile]) -> RedundancyProfile {
        RedundancyProfile {
            data_redundancy: Self::min_data(profiles),
            package_redundancy: Self::min_package(profiles),
            stripe_length: Self::sum_stripes(profiles),
            no_single_point_of_failure: false,
            parity_layout: None,
        }
    }

    fn combine_raid1(profiles: &[RedundancyProfile]) -> RedundancyProfile {
        let members = profiles.len() as u16;
        RedundancyProfile {
            data_redundancy: profiles
                .iter()
                .map(|p| p.data_redundancy)
                .fold(0u16, u16::saturating_add),
            package_redundancy: Self::min_package(profiles).saturating_add(members - 1),
            stripe_length: profiles.iter().map(|p| p.stripe_length).min().unwrap_or(1),
            no_single_point_of_failure: true,
            parity_layout: None,
        }
    }

    /// RAID4/5/6: `parity_members` stripes worth of capacity hold parity
    /// instead of data, and the same number of failures is tolerated.
    fn combine_parity(
        profiles: &[RedundancyProfile],
        parity_members: u16,
        layout: ParityLayout,
    ) -> RedundancyProfile {
        RedundancyProfile {
            data_redundancy: Self::min_data(profiles),
            package_redundancy: Self::min_package(profiles).saturating_add(parity_members),
            stripe_length: Self::sum_stripes(profiles).saturating_sub(parity_members),
            no_single_point_of_failure: true,
            parity_layout: Some(layout),
        }
    }

    /// RAID10: mirrored pairs, striped together.
    fn combine_raid10(profiles: &[RedundancyProfile]) -> RedundancyProfile {
        RedundancyProfile {
            data_redundancy: Self::min_data(profiles).saturating_mul(2),
            package_redundancy: Self::min_package(profiles).saturating_add(1),
            stripe_length: Self::sum_stripes(profiles) / 2,
            no_single_point_of_failure: true,
            parity_layout: None,
        }
    }

    fn min_data(profiles: &[RedundancyProfile]) -> u16 {
        profiles.iter().map(|p| p.data_redundancy).min().unwrap_or(1)
    }

    fn min_package(profiles: &[RedundancyProfile]) -> u16 {
        profiles
            .iter()
            .map(|p| p.package_redundancy)
            .min()
            .unwrap_or(1)
    }

    fn sum_stripes(profiles: &[RedundancyProfile]) -> u16 {
        profiles
            .iter()
            .map(|p| p.stripe_length)
            .fold(0u16, u16::saturating_add)
    }

    /// Parity layout shared by every input, if any
    fn common_parity(profiles: &[RedundancyProfile]) -> Option<ParityLayout> {
        let first = profiles[0].parity_layout?;
        if profiles.iter().all(|p| p.parity_layout == Some(first)) {
            Some(first)
        } else {
            None
        }
    }
}
