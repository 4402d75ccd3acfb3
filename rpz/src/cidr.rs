//! The CIDR radix tree: maps `(ip, prefix)` triggers to the zones that list
//! them, for both IP and NSIP trigger types.

use collections::radix::{PatriciaTree, Search};

use crate::ipkey::IpKey;
use crate::zone::{InsertOutcome, TriggerType, ZoneBits, ZoneNum, ZonePair};

pub struct CidrTree {
	tree: PatriciaTree<ZonePair, 4>,
}

impl Default for CidrTree {
	fn default() -> Self {
		Self::new()
	}
}

impl CidrTree {
	pub fn new() -> Self {
		Self { tree: PatriciaTree::new() }
	}

	pub fn is_empty(&self) -> bool {
		self.tree.is_empty()
	}

	/// Insert `(zone, kind)` under `(ip, prefix)`.
	pub fn insert(&mut self, ip: &IpKey, prefix: u32, kind: TriggerType, zone: ZoneNum) -> InsertOutcome {
		let requested = ZonePair::single(kind, zone);

		match self.tree.search(ip, prefix, requested, true) {
			Search::Found(_) => InsertOutcome::Inserted,
			Search::AlreadyPresent(_) => InsertOutcome::AlreadyPresent,
			Search::Partial(_) | Search::NotFound => unreachable!("search(create=true) always finds or allocates"),
		}
	}

	/// Remove `(zone, kind)` from the exact node `(ip, prefix)`, pruning
	/// any node left empty. `false` if no such exact trigger existed.
	pub fn delete(&mut self, ip: &IpKey, prefix: u32, kind: TriggerType, zone: ZoneNum) -> bool {
		let requested = ZonePair::single(kind, zone);

		let node = match self.tree.find(ip, prefix, requested) {
			Search::Found(n) => n,
			_ => return false,
		};

		let current = self.tree.pair(node);
		let side = current.side(kind) & !ZoneBits::from(zone);
		let new_pair = current.with_side(kind, side);

		self.tree.clear_bits_and_prune(node, new_pair);
		true
	}

	/// Longest-prefix match for `(ip, prefix)` against `eligible` zones of
	/// `kind`. Returns the winning zone (lowest-numbered among those tied
	/// for the longest matching prefix) and the exact `(key, prefix)` of
	/// the node that matched, for re-deriving the trigger's owner name.
	pub fn longest_match(&self, ip: &IpKey, prefix: u32, kind: TriggerType, eligible: ZoneBits) -> Option<(ZoneNum, IpKey, u32)> {
		if eligible.is_empty() {
			return None;
		}

		let requested = ZonePair::EMPTY.with_side(kind, eligible);

		let node = match self.tree.find(ip, prefix, requested) {
			Search::Found(n) => n,
			Search::Partial(n) => n,
			Search::AlreadyPresent(_) | Search::NotFound => return None,
		};

		let hit = self.tree.pair(node).side(kind) & eligible;
		let zone = ZoneNum::new(hit.lowest_set_bit_index())?;
		let (key, found_prefix) = self.tree.key_prefix(node);

		Some((zone, key, found_prefix))
	}

	/// Insert an arbitrary zone pair at `(ip, prefix)` directly, bypassing
	/// the duplicate-trigger bookkeeping. Used only to copy another
	/// zone's triggers forward into a fresh staging tree during a
	/// reload, where each source node is visited exactly once.
	pub fn insert_raw(&mut self, ip: &IpKey, prefix: u32, pair: ZonePair) {
		self.tree.search(ip, prefix, pair, true);
	}

	pub fn check_invariants(&self) -> bool {
		self.tree.check_sum_invariant()
	}

	/// Every `(key, prefix, pair)` with a non-empty payload, for reload
	/// copy-forward.
	pub fn iter(&self) -> impl Iterator<Item = (IpKey, u32, ZonePair)> + '_ {
		self.tree.iter()
	}
}
