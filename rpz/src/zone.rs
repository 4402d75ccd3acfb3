//! Zone numbering and the per-zone bit vectors used throughout the index.

use core::fmt;

use collections::bits::Bits64;
use collections::radix::Summable;

/// Number of policy zones a single index can hold. Selectable at compile
/// time; see the `zones64` Cargo feature.
#[cfg(not(feature = "zones64"))]
pub const MAX_ZONES: u32 = 32;
#[cfg(feature = "zones64")]
pub const MAX_ZONES: u32 = 64;

/// A zone index in `[0, MAX_ZONES)`. Lower numbers have higher precedence.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ZoneNum(u32);

impl ZoneNum {
	pub fn new(n: u32) -> Option<Self> {
		(n < MAX_ZONES).then_some(Self(n))
	}

	pub const fn get(self) -> u32 {
		self.0
	}
}

impl fmt::Display for ZoneNum {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl fmt::Debug for ZoneNum {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ZoneNum({})", self.0)
	}
}

/// A fixed-width set of zones, one bit per `ZoneNum`.
pub type ZoneBits = Bits64;

impl From<ZoneNum> for ZoneBits {
	fn from(z: ZoneNum) -> Self {
		ZoneBits::from_bit(z.get())
	}
}

/// Outcome of inserting a trigger into either tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
	Inserted,
	/// The owner was already present for this zone/type; logged by the
	/// caller, not an error.
	AlreadyPresent,
}

/// The kind of owner a trigger was parsed as.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum TriggerType {
	Qname,
	Ip,
	Nsip,
	Nsdname,
}

impl TriggerType {
	/// Whether this trigger type contributes to the `d` (qname/ip) side of
	/// a `ZonePair`, as opposed to the `ns` (nsdname/nsip) side.
	pub fn is_d_side(self) -> bool {
		matches!(self, TriggerType::Qname | TriggerType::Ip)
	}
}

pub fn type2str(t: TriggerType) -> &'static str {
	match t {
		TriggerType::Qname => "qname",
		TriggerType::Ip => "ip",
		TriggerType::Nsip => "nsip",
		TriggerType::Nsdname => "nsdname",
	}
}

/// A pair of zone bit-vectors: `d` for QNAME/IP triggers, `ns` for
/// NSDNAME/NSIP triggers. This is the payload carried by every tree node.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct ZonePair {
	pub d: ZoneBits,
	pub ns: ZoneBits,
}

impl ZonePair {
	pub const EMPTY: Self = Self { d: ZoneBits::EMPTY, ns: ZoneBits::EMPTY };

	pub fn single(kind: TriggerType, zone: ZoneNum) -> Self {
		let bit = ZoneBits::from(zone);

		if kind.is_d_side() {
			Self { d: bit, ns: ZoneBits::EMPTY }
		} else {
			Self { d: ZoneBits::EMPTY, ns: bit }
		}
	}

	pub fn side(self, kind: TriggerType) -> ZoneBits {
		if kind.is_d_side() {
			self.d
		} else {
			self.ns
		}
	}

	pub fn with_side(mut self, kind: TriggerType, bits: ZoneBits) -> Self {
		if kind.is_d_side() {
			self.d = bits;
		} else {
			self.ns = bits;
		}

		self
	}

	pub fn union(self, other: Self) -> Self {
		Self { d: self.d | other.d, ns: self.ns | other.ns }
	}

	pub fn intersection(self, other: Self) -> Self {
		Self { d: self.d & other.d, ns: self.ns & other.ns }
	}

	pub fn is_empty(self) -> bool {
		self.d.is_empty() && self.ns.is_empty()
	}

	/// `self` with every bit set in `other` cleared, on both sides.
	pub fn remove(self, other: Self) -> Self {
		Self { d: self.d & !other.d, ns: self.ns & !other.ns }
	}
}

impl Summable for ZonePair {
	const EMPTY: Self = ZonePair::EMPTY;

	fn union(self, other: Self) -> Self {
		ZonePair::union(self, other)
	}

	fn intersection(self, other: Self) -> Self {
		ZonePair::intersection(self, other)
	}

	fn is_empty(self) -> bool {
		ZonePair::is_empty(self)
	}

	/// Drop, on each side independently, every bit of lower precedence
	/// than the best hit already seen on that side. `hit` is
	/// `self.intersection(node.pair)`, i.e. the part of the request that
	/// just matched.
	fn trim(self, hit: Self) -> Self {
		Self {
			d: if hit.d.is_empty() { self.d } else { self.d.trim(hit.d) },
			ns: if hit.ns.is_empty() { self.ns } else { self.ns.trim(hit.ns) },
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn zone_num_rejects_out_of_range() {
		assert!(ZoneNum::new(MAX_ZONES).is_none());
		assert!(ZoneNum::new(MAX_ZONES - 1).is_some());
	}

	#[test]
	fn single_sets_only_one_side() {
		let z = ZoneNum::new(3).unwrap();
		let qname = ZonePair::single(TriggerType::Qname, z);
		assert!(qname.d.bit(3));
		assert!(qname.ns.is_empty());

		let nsip = ZonePair::single(TriggerType::Nsip, z);
		assert!(nsip.ns.bit(3));
		assert!(nsip.d.is_empty());
	}
}
