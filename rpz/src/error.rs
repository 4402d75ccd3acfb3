//! Error types for the trigger index.
//!
//! Mirrors the hand-rolled style used elsewhere in this corpus for DNS
//! tooling (a plain enum plus `Display`/`Error` impls) rather than reaching
//! for a derive-macro crate: the error set here is small and fixed, and the
//! distinctions between variants (logged-and-skipped vs propagated vs
//! fatal) matter more than boilerplate reduction.

use core::fmt;

use crate::zone::ZoneNum;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
	/// A zone's owner name did not parse as a valid trigger of its
	/// expected type. Logged and skipped by `Index::add`; only returned to
	/// the caller by `Index::add_strict`.
	BadOwnerFormat { owner: String, zone: ZoneNum, reason: String },
	/// The owner was already present in this zone. Logged; treated as
	/// success by `Index::add`.
	DuplicateTrigger { owner: String, zone: ZoneNum },
	/// Arena allocation failed. Always propagated; a reload in progress
	/// discards its staging index.
	OutOfMemory,
	/// `Index::delete` was asked to remove an owner that was never a real
	/// trigger (e.g. it names a purely-structural internal tree node).
	/// Silently ignored by callers that don't care; kept as a distinct
	/// variant so tests can assert it.
	NodeNotFound,
	/// A structural invariant (I1-I5 in the index's data model) did not
	/// hold. Indicates a bug in this crate, not a malformed zone file.
	InternalInvariantViolated(String),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::BadOwnerFormat { owner, zone, reason } => {
				write!(f, "invalid rpz owner '{owner}' in zone {zone}: {reason}")
			}
			Error::DuplicateTrigger { owner, zone } => {
				write!(f, "invalid rpz owner '{owner}' in zone {zone}: duplicate trigger")
			}
			Error::OutOfMemory => write!(f, "rpz trigger index failed: out of memory"),
			Error::NodeNotFound => write!(f, "rpz trigger index failed: node not found"),
			Error::InternalInvariantViolated(msg) => write!(f, "rpz trigger index failed: internal invariant violated: {msg}"),
		}
	}
}

impl std::error::Error for Error {}

pub type Result<T = (), E = Error> = core::result::Result<T, E>;
