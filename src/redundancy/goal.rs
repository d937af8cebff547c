//! Redundancy Goals
//!
//! A `RedundancyGoal` carries a client's desired fault-tolerance
//! constraints: per numeric dimension an optional `(min, max, goal)`
//! triple, plus the boolean and parity requirements. Matching a goal
//! against an achievable [`RedundancyProfile`] comes in two views:
//!
//! - the *bounds* view ([`RedundancyGoal::check_profile`]): min/max must
//!   hold; a `goal` value alone (no bounds) demands exact equality;
//! - the *exact-goal* view ([`RedundancyGoal::check_profile_exact`]):
//!   every `goal` value must match exactly, and the bounds view must hold
//!   on top of it.
//!
//! Dimensions are checked in a fixed order (data redundancy, stripe
//! length, package redundancy, single point of failure, parity layout)
//! and the first violation wins; callers surface that diagnostic to the
//! end user, so the order is part of the contract.

use super::profile::{ParityLayout, RedundancyProfile};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Goal Range
// =============================================================================

/// Optional `(min, max, goal)` constraint triple for one dimension
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalRange {
    /// Lowest acceptable value (absent = unbounded below)
    pub min: Option<u16>,
    /// Highest acceptable value (absent = unbounded above)
    pub max: Option<u16>,
    /// Preferred value, used for exact matching and tie-breaking
    pub goal: Option<u16>,
}

impl GoalRange {
    /// No constraint on this dimension
    pub const UNCONSTRAINED: GoalRange = GoalRange {
        min: None,
        max: None,
        goal: None,
    };

    /// Demand exactly `value`
    pub fn exactly(value: u16) -> Self {
        Self {
            min: None,
            max: None,
            goal: Some(value),
        }
    }

    /// Accept anything in `[min, max]`
    pub fn within(min: u16, max: u16) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            goal: None,
        }
    }

    /// Accept `min` or more
    pub fn at_least(min: u16) -> Self {
        Self {
            min: Some(min),
            max: None,
            goal: None,
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        *self == Self::UNCONSTRAINED
    }
}

// =============================================================================
// Goal Mismatch
// =============================================================================

/// Constrained dimensions of a redundancy goal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    DataRedundancy,
    StripeLength,
    PackageRedundancy,
    NoSinglePointOfFailure,
    ParityLayout,
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dimension::DataRedundancy => write!(f, "data redundancy"),
            Dimension::StripeLength => write!(f, "stripe length"),
            Dimension::PackageRedundancy => write!(f, "package redundancy"),
            Dimension::NoSinglePointOfFailure => write!(f, "no single point of failure"),
            Dimension::ParityLayout => write!(f, "parity layout"),
        }
    }
}

/// First violated dimension of a goal, with a human-readable reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GoalMismatch {
    #[error("{dimension} {actual} is above the requested maximum {max}")]
    AboveMax {
        dimension: Dimension,
        actual: u16,
        max: u16,
    },

    #[error("{dimension} {actual} is below the requested minimum {min}")]
    BelowMin {
        dimension: Dimension,
        actual: u16,
        min: u16,
    },

    #[error("{dimension} {actual} does not match the goal {goal}")]
    GoalNotMet {
        dimension: Dimension,
        actual: u16,
        goal: u16,
    },

    #[error("no-single-point-of-failure mismatch: requested {requested}, achievable {actual}")]
    SinglePointOfFailure { requested: bool, actual: bool },

    #[error("parity layout mismatch: requested {requested}, achievable {}", display_parity(.actual))]
    Parity {
        requested: ParityLayout,
        actual: Option<ParityLayout>,
    },
}

fn display_parity(layout: &Option<ParityLayout>) -> String {
    match layout {
        Some(l) => l.to_string(),
        None => "none".to_string(),
    }
}

impl GoalMismatch {
    /// Which dimension was violated
    pub fn dimension(&self) -> Dimension {
        match self {
            GoalMismatch::AboveMax { dimension, .. }
            | GoalMismatch::BelowMin { dimension, .. }
            | GoalMismatch::GoalNotMet { dimension, .. } => *dimension,
            GoalMismatch::SinglePointOfFailure { .. } => Dimension::NoSinglePointOfFailure,
            GoalMismatch::Parity { .. } => Dimension::ParityLayout,
        }
    }
}

// =============================================================================
// Redundancy Goal
// =============================================================================

/// A client's requested redundancy constraints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedundancyGoal {
    pub data_redundancy: GoalRange,
    pub stripe_length: GoalRange,
    pub package_redundancy: GoalRange,
    /// Required single-failure survivability, if constrained
    pub no_single_point_of_failure: Option<bool>,
    /// Required parity placement, if constrained
    pub parity_layout: Option<ParityLayout>,
}

impl RedundancyGoal {
    /// Bounds view: every min/max must hold; a `goal` with neither bound
    /// set demands exact equality.
    pub fn check_profile(&self, profile: &RedundancyProfile) -> Result<(), GoalMismatch> {
        check_range(
            &self.data_redundancy,
            profile.data_redundancy,
            Dimension::DataRedundancy,
        )?;
        check_range(
            &self.stripe_length,
            profile.stripe_length,
            Dimension::StripeLength,
        )?;
        check_range(
            &self.package_redundancy,
            profile.package_redundancy,
            Dimension::PackageRedundancy,
        )?;
        self.check_flags(profile)
    }

    /// Exact-goal view: every set `goal` must match the profile exactly;
    /// the bounds view is applied on top, so an exact match that falls
    /// outside min/max still fails.
    pub fn check_profile_exact(&self, profile: &RedundancyProfile) -> Result<(), GoalMismatch> {
        check_goal(
            &self.data_redundancy,
            profile.data_redundancy,
            Dimension::DataRedundancy,
        )?;
        check_goal(
            &self.stripe_length,
            profile.stripe_length,
            Dimension::StripeLength,
        )?;
        check_goal(
            &self.package_redundancy,
            profile.package_redundancy,
            Dimension::PackageRedundancy,
        )?;
        self.check_flags(profile)?;
        self.check_profile(profile)
    }

    fn check_flags(&self, profile: &RedundancyProfile) -> Result<(), GoalMismatch> {
        if let Some(requested) = self.no_single_point_of_failure {
            if requested != profile.no_single_point_of_failure {
                return Err(GoalMismatch::SinglePointOfFailure {
                    requested,
                    actual: profile.no_single_point_of_failure,
                });
            }
        }
        if let Some(requested) = self.parity_layout {
            if Some(requested) != profile.parity_layout {
                return Err(GoalMismatch::Parity {
                    requested,
                    actual: profile.parity_layout,
                });
            }
        }
        Ok(())
    }

    pub fn is_unconstrained(&self) -> bool {
        self.data_redundancy.is_unconstrained()
            && self.stripe_length.is_unconstrained()
            && self.package_redundancy.is_unconstrained()
            && self.no_single_point_of_failure.is_none()
            && self.parity_layout.is_none()
    }
}

fn check_range(range: &GoalRange, actual: u16, dimension: Dimension) -> Result<(), GoalMismatch> {
    if let Some(max) = range.max {
        if actual > max {
            return Err(GoalMismatch::AboveMax {
                dimension,
                actual,
                max,
            });
        }
    }
    if let Some(min) = range.min {
        if actual < min {
            return Err(GoalMismatch::BelowMin {
                dimension,
                actual,
                min,
            });
        }
    }
    // With no bounds at all, a bare goal value must match exactly.
    if range.max.is_none() && range.min.is_none() {
        if let Some(goal) = range.goal {
            if actual != goal {
                return Err(GoalMismatch::GoalNotMet {
                    dimension,
                    actual,
                    goal,
                });
            }
        }
    }
    Ok(())
}

fn check_goal(range: &GoalRange, actual: u16, dimension: Dimension) -> Result<(), GoalMismatch> {
    if let Some(goal) = range.goal {
        if actual != goal {
            return Err(GoalMismatch::GoalNotMet {
                dimension,
                actual,
                goal,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn profile(data: u16, stripe: u16, package: u16) -> RedundancyProfile {
        RedundancyProfile {
            data_redundancy: data,
            stripe_length: stripe,
            package_redundancy: package,
            no_single_point_of_failure: false,
            parity_layout: None,
        }
    }

    #[test]
    fn test_unconstrained_goal_matches_everything() {
        let goal = RedundancyGoal::default();
        assert!(goal.is_unconstrained());
        assert!(goal.check_profile(&profile(1, 1, 1)).is_ok());
        assert!(goal.check_profile_exact(&profile(7, 3, 2)).is_ok());
    }

    #[test]
    fn test_goal_only_fields_demand_equality() {
        let goal = RedundancyGoal {
            data_redundancy: GoalRange::exactly(2),
            stripe_length: GoalRange::exactly(1),
            package_redundancy: GoalRange::exactly(2),
            ..Default::default()
        };
        assert!(goal.check_profile(&profile(2, 1, 2)).is_ok());

        // Moving any one dimension off by one fails on exactly that dimension.
        let err = goal.check_profile(&profile(3, 1, 2)).unwrap_err();
        assert_eq!(err.dimension(), Dimension::DataRedundancy);

        let err = goal.check_profile(&profile(2, 2, 2)).unwrap_err();
        assert_eq!(err.dimension(), Dimension::StripeLength);

        let err = goal.check_profile(&profile(2, 1, 1)).unwrap_err();
        assert_eq!(err.dimension(), Dimension::PackageRedundancy);
    }

    #[test]
    fn test_bounds_allow_a_range() {
        let goal = RedundancyGoal {
            data_redundancy: GoalRange::within(1, 2),
            ..Default::default()
        };
        assert!(goal.check_profile(&profile(1, 4, 1)).is_ok());
        assert!(goal.check_profile(&profile(2, 1, 1)).is_ok());

        assert_matches!(
            goal.check_profile(&profile(3, 1, 1)),
            Err(GoalMismatch::AboveMax { max: 2, actual: 3, .. })
        );
        let goal = RedundancyGoal {
            data_redundancy: GoalRange::at_least(2),
            ..Default::default()
        };
        assert_matches!(
            goal.check_profile(&profile(1, 1, 1)),
            Err(GoalMismatch::BelowMin { min: 2, actual: 1, .. })
        );
    }

    #[test]
    fn test_goal_with_bounds_is_ignored_by_bounds_view() {
        // goal=2 together with bounds is only a preference; the bounds view
        // accepts any value inside the range.
        let goal = RedundancyGoal {
            data_redundancy: GoalRange {
                min: Some(1),
                max: Some(3),
                goal: Some(2),
            },
            ..Default::default()
        };
        assert!(goal.check_profile(&profile(1, 1, 1)).is_ok());
        assert!(goal.check_profile(&profile(3, 1, 1)).is_ok());

        // The exact-goal view insists on it.
        assert_matches!(
            goal.check_profile_exact(&profile(1, 1, 1)),
            Err(GoalMismatch::GoalNotMet { goal: 2, actual: 1, .. })
        );
        assert!(goal.check_profile_exact(&profile(2, 1, 1)).is_ok());
    }

    #[test]
    fn test_exact_view_still_enforces_bounds() {
        // An exact goal hit outside the bounds must not pass.
        let goal = RedundancyGoal {
            data_redundancy: GoalRange {
                min: None,
                max: Some(1),
                goal: Some(2),
            },
            ..Default::default()
        };
        assert_matches!(
            goal.check_profile_exact(&profile(2, 1, 1)),
            Err(GoalMismatch::AboveMax { .. })
        );
    }

    #[test]
    fn test_first_violated_dimension_wins() {
        let goal = RedundancyGoal {
            data_redundancy: GoalRange::exactly(2),
            stripe_length: GoalRange::exactly(4),
            ..Default::default()
        };
        // Both dimensions are wrong; the diagnostic names data redundancy.
        let err = goal.check_profile(&profile(1, 1, 1)).unwrap_err();
        assert_eq!(err.dimension(), Dimension::DataRedundancy);
    }

    #[test]
    fn test_flag_dimensions() {
        let goal = RedundancyGoal {
            no_single_point_of_failure: Some(true),
            ..Default::default()
        };
        let err = goal.check_profile(&profile(1, 1, 1)).unwrap_err();
        assert_eq!(err.dimension(), Dimension::NoSinglePointOfFailure);

        let goal = RedundancyGoal {
            parity_layout: Some(ParityLayout::Rotated),
            ..Default::default()
        };
        let err = goal.check_profile(&profile(1, 1, 1)).unwrap_err();
        assert_eq!(err.dimension(), Dimension::ParityLayout);
        assert_eq!(
            err.to_string(),
            "parity layout mismatch: requested rotated, achievable none"
        );
    }
}
