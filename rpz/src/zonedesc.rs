//! Per-zone descriptor: origin, derived trigger subzones, and the
//! per-type trigger counts that drive the index-wide "have" summaries.

use crate::name::Name;
use crate::policy::PolicyVerb;
use crate::zone::TriggerType;

/// Per-type trigger counts for one zone. `adj_trigger_cnt` (in
/// `crate::index`) bumps these and reports 0↔1 transitions so the
/// index-wide `have.*` bitmaps can be kept in sync (invariant I2).
#[derive(Clone, Copy, Default, Debug)]
pub struct TriggerCounts {
	pub qname: u32,
	pub ipv4: u32,
	pub ipv6: u32,
	pub nsipv4: u32,
	pub nsipv6: u32,
	pub nsdname: u32,
}

/// Which counter a trigger add/delete touches. IP/NSIP triggers split
/// further by address family, which `TriggerCounts` can't tell from
/// `TriggerType` alone.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CounterKind {
	Qname,
	Ipv4,
	Ipv6,
	Nsipv4,
	Nsipv6,
	Nsdname,
}

impl TriggerCounts {
	fn slot(&mut self, kind: CounterKind) -> &mut u32 {
		match kind {
			CounterKind::Qname => &mut self.qname,
			CounterKind::Ipv4 => &mut self.ipv4,
			CounterKind::Ipv6 => &mut self.ipv6,
			CounterKind::Nsipv4 => &mut self.nsipv4,
			CounterKind::Nsipv6 => &mut self.nsipv6,
			CounterKind::Nsdname => &mut self.nsdname,
		}
	}

	/// Adjust the counter for `kind` by +1/-1; returns `true` on a 0↔1
	/// transition (the caller must then flip the matching `have.<kind>`
	/// bit and recompute the derived summaries).
	pub fn adjust(&mut self, kind: CounterKind, inc: bool) -> bool {
		let slot = self.slot(kind);

		if inc {
			*slot += 1;
			*slot == 1
		} else {
			debug_assert!(*slot > 0);
			*slot -= 1;
			*slot == 0
		}
	}
}

/// A zone's descriptor: identity, derived subzone names, and the policy
/// knobs that shape how its triggers are parsed and its CNAMEs decoded.
pub struct ZoneDesc {
	pub origin: Name,
	pub passthru_sentinel: Name,
	pub default_cname_target: Option<Name>,
	pub counts: TriggerCounts,

	pub qname_enabled: bool,
	pub ip_enabled: bool,
	pub nsip_enabled: bool,
	pub nsdname_enabled: bool,

	/// Per-zone override of `decode_cname`'s usual CNAME-derived
	/// classification (`rpz-policy` zone option equivalents). `None`
	/// means "derive from the CNAME as usual".
	pub override_policy: Option<PolicyVerb>,

	/// Per-zone `qname-wait-recurse`: `true` means this zone's QNAME
	/// trigger must not be answered until the query has been recursively
	/// resolved, because its IP/NSIP/NSDNAME triggers (which can only be
	/// checked post-recursion) might override it.
	pub wait_recurse: bool,
}

impl ZoneDesc {
	pub fn new(origin: Name) -> Self {
		Self {
			passthru_sentinel: Name::parse("rpz-passthru."),
			default_cname_target: None,
			counts: TriggerCounts::default(),
			qname_enabled: true,
			ip_enabled: true,
			nsip_enabled: true,
			nsdname_enabled: true,
			override_policy: None,
			wait_recurse: false,
			origin,
		}
	}

	/// `true` if `kind` is enabled for this zone — a disabled kind's adds
	/// are silently skipped and never contribute to `have.*`.
	pub fn kind_enabled(&self, kind: TriggerType) -> bool {
		match kind {
			TriggerType::Qname => self.qname_enabled,
			TriggerType::Ip => self.ip_enabled,
			TriggerType::Nsip => self.nsip_enabled,
			TriggerType::Nsdname => self.nsdname_enabled,
		}
	}

	/// The subzone origin a trigger of `kind` is parsed relative to, e.g.
	/// `rpz-ip.<origin>` for IP triggers. QNAME triggers live directly
	/// under `origin`.
	pub fn trigger_origin(&self, kind: TriggerType) -> Name {
		match kind {
			TriggerType::Qname => self.origin.clone(),
			TriggerType::Ip => self.origin.prepend(&[Box::from("rpz-ip")]),
			TriggerType::Nsip => self.origin.prepend(&[Box::from("rpz-nsip")]),
			TriggerType::Nsdname => self.origin.prepend(&[Box::from("rpz-nsdname")]),
		}
	}
}
