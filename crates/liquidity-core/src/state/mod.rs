//! Stage tracking for ledger calls.
//!
//! Each add-liquidity call walks a fixed sequence of stages. The tracker only
//! accepts transitions listed in a static table, so a handler that skips or
//! repeats a step fails loudly instead of recording a half-finished operation.

pub mod add;

pub use add::{AddStage, AddStageTracker, StageError};
