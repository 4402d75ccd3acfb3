//! Small in-process configuration for one `Index`. This is not a zone-file
//! config parser (out of scope, per spec.md §1) — just the runtime knobs
//! the index itself needs.

use log::Level;

#[derive(Clone, Debug)]
pub struct IndexOptions {
	/// Level at which malformed owner names are logged. Set to
	/// `Level::Trace` (or lower severity than your log filter) to quiet a
	/// noisy zone during bulk load.
	pub reject_log_level: Level,

	/// Index-wide default for `ZoneDesc::wait_recurse` on newly described
	/// zones; each zone can still override it individually.
	pub default_wait_recurse: bool,
}

impl Default for IndexOptions {
	fn default() -> Self {
		Self { reject_log_level: Level::Warn, default_wait_recurse: false }
	}
}
