//! Error-state taxonomy.
//!
//! Every issue a rule detects is classified by group (how many records it
//! affects) and location (what kind of issue it is). The pair selects one
//! [`ErrorState`] from the [`ErrorStateRegistry`]: a unique power-of-two bit
//! and the probability that a record flagged with it is a genuine error.
//! Tables accumulate the bits of all states that touch a record in a
//! bitmask, rendered for output by [`bitmask_to_positions`].

mod bitmask;
mod classification;
mod registry;

pub use bitmask::{bitmask_to_positions, positions_to_bitmask};
pub use classification::{
    FEW_RECORDS_PERCENT, GeneralGroup, GroupId, LocationId, LowFrequencyGroup,
    MANY_RECORDS_PERCENT, ReferenceGroup, SOME_RECORDS_PERCENT,
};
pub use registry::{ErrorState, ErrorStateRegistry};
