//! Add-liquidity stage machine.
//!
//! `Requested -> TokensPulled -> RouterInvoked -> Recorded`, with `Failed`
//! reachable from every non-terminal stage.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StageError {
	#[error("Invalid stage transition from {from:?} to {to:?}")]
	InvalidTransition { from: AddStage, to: AddStage },
}

/// Progress of a single add-liquidity call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddStage {
	/// Parameters accepted, nothing touched yet.
	Requested,
	/// Both inputs are held by the ledger and approved to the router.
	TokensPulled,
	/// The router minted liquidity.
	RouterInvoked,
	/// Committed and counted.
	Recorded,
	Failed,
}

static TRANSITIONS: Lazy<HashMap<AddStage, HashSet<AddStage>>> = Lazy::new(|| {
	let mut m = HashMap::new();
	m.insert(
		AddStage::Requested,
		HashSet::from([AddStage::TokensPulled, AddStage::Failed]),
	);
	m.insert(
		AddStage::TokensPulled,
		HashSet::from([AddStage::RouterInvoked, AddStage::Failed]),
	);
	m.insert(
		AddStage::RouterInvoked,
		HashSet::from([AddStage::Recorded, AddStage::Failed]),
	);
	m.insert(AddStage::Recorded, HashSet::new()); // terminal
	m.insert(AddStage::Failed, HashSet::new()); // terminal
	m
});

impl AddStage {
	pub fn can_transition_to(self, next: AddStage) -> bool {
		TRANSITIONS
			.get(&self)
			.is_some_and(|allowed| allowed.contains(&next))
	}

	pub fn is_terminal(self) -> bool {
		matches!(self, AddStage::Recorded | AddStage::Failed)
	}
}

/// Tracks the stage of one call.
#[derive(Debug)]
pub struct AddStageTracker {
	stage: AddStage,
}

impl AddStageTracker {
	pub fn new() -> Self {
		Self {
			stage: AddStage::Requested,
		}
	}

	pub fn stage(&self) -> AddStage {
		self.stage
	}

	/// Moves to `next` if the table allows it.
	pub fn advance(&mut self, next: AddStage) -> Result<(), StageError> {
		if !self.stage.can_transition_to(next) {
			return Err(StageError::InvalidTransition {
				from: self.stage,
				to: next,
			});
		}
		tracing::trace!(from = ?self.stage, to = ?next, "Add stage transition");
		self.stage = next;
		Ok(())
	}

	/// Marks the call failed and returns the stage it failed in.
	///
	/// A call that already finished keeps its terminal stage.
	pub fn fail(&mut self) -> AddStage {
		let at = self.stage;
		if !at.is_terminal() {
			self.stage = AddStage::Failed;
		}
		at
	}
}

impl Default for AddStageTracker {
	fn default() -> Self {
		Self::new()
	}
}
