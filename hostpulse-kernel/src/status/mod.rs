//! Status page aggregation: upstream adapter, tree normalizer, propagation,
//! expansion state, feeds and the board tying them together.

pub mod board;
pub mod expansion;
pub mod feed;
pub mod normalize;
pub mod source;
pub mod tree;
pub mod view;

pub use board::{ApplyResult, FetchOutcome, StatusBoard};
pub use source::StatusSource;
