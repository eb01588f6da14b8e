//! Utility functions shared by every ledger crate.

pub mod eip712;

pub use eip712::{
	compute_domain_hash, compute_final_digest, Eip712AbiEncoder, DOMAIN_TYPE, PERMIT_TYPE,
	PERMIT_VERSION,
};
