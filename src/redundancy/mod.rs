//! Redundancy Modeling and Constraint Resolution
//!
//! Pure data and algorithms: no I/O, no concurrency. [`profile`] models
//! what a device combination achieves, [`goal`] models what a client
//! asked for, and [`resolver`] picks the RAID level that reconciles the
//! two.

pub mod goal;
pub mod profile;
pub mod resolver;

pub use goal::{Dimension, GoalMismatch, GoalRange, RedundancyGoal};
pub use profile::{ParityLayout, RedundancyProfile};
pub use resolver::{select_level, LevelEntry, RaidLevel, LEVEL_TABLE};
