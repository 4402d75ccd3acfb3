//! The zone-set container: holds every zone's descriptor, both trigger
//! trees, the index-wide "have" summaries, the maintenance/search locks,
//! and the reload protocol.

use core::net::IpAddr;
use std::sync::Arc;

use log::{debug, log};
use parking_lot::RwLock;

use crate::canon;
use crate::cidr::CidrTree;
use crate::config::IndexOptions;
use crate::error::{Error, Result};
use crate::ipkey::{IpKey, Prefix, is_ipv4_mapped, key_from_addr};
use crate::name::Name;
use crate::names_tree::NamesTree;
use crate::zone::{InsertOutcome, MAX_ZONES, TriggerType, ZoneBits, ZoneNum, ZonePair, type2str};
use crate::zonedesc::{CounterKind, ZoneDesc};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AddOutcome {
	Inserted,
	AlreadyExists,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IpTriggerKind {
	Ip,
	Nsip,
}

impl From<IpTriggerKind> for TriggerType {
	fn from(k: IpTriggerKind) -> Self {
		match k {
			IpTriggerKind::Ip => TriggerType::Ip,
			IpTriggerKind::Nsip => TriggerType::Nsip,
		}
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NameTriggerKind {
	Qname,
	Nsdname,
}

impl From<NameTriggerKind> for TriggerType {
	fn from(k: NameTriggerKind) -> Self {
		match k {
			NameTriggerKind::Qname => TriggerType::Qname,
			NameTriggerKind::Nsdname => TriggerType::Nsdname,
		}
	}
}

#[derive(Clone, Debug)]
pub struct IpHit {
	pub zone: ZoneNum,
	pub trigger: Name,
	pub prefix: Prefix,
}

/// Index-wide summaries of which zones hold at least one trigger of each
/// kind (invariant I2), plus the derived unions and the qname-skip-recurse
/// mask (I3).
#[derive(Clone, Copy, Default)]
struct HaveSummary {
	qname: ZoneBits,
	nsdname: ZoneBits,
	ipv4: ZoneBits,
	ipv6: ZoneBits,
	nsipv4: ZoneBits,
	nsipv6: ZoneBits,
	ip: ZoneBits,
	nsip: ZoneBits,
	qname_skip_recurse: ZoneBits,
}

impl HaveSummary {
	fn field_mut(&mut self, kind: CounterKind) -> &mut ZoneBits {
		match kind {
			CounterKind::Qname => &mut self.qname,
			CounterKind::Ipv4 => &mut self.ipv4,
			CounterKind::Ipv6 => &mut self.ipv6,
			CounterKind::Nsipv4 => &mut self.nsipv4,
			CounterKind::Nsipv6 => &mut self.nsipv6,
			CounterKind::Nsdname => &mut self.nsdname,
		}
	}

	fn toggle(&mut self, kind: CounterKind, zone: ZoneNum, on: bool) {
		let field = self.field_mut(kind);
		let bit = ZoneBits::from(zone);
		*field = if on { field.union(bit) } else { field.intersection(!bit) };
	}

	/// Invariant I3, with the per-zone `wait_recurse` supplement: start
	/// from the index-wide mask, then force out any zone that
	/// individually insists on waiting for recursion regardless of what
	/// the rest of the index looks like.
	fn recompute_derived(&mut self, zones: &[Option<ZoneDesc>]) {
		self.ip = self.ipv4.union(self.ipv6);
		self.nsip = self.nsipv4.union(self.nsipv6);

		let post_recurse = self.ipv4.union(self.ipv6).union(self.nsdname).union(self.nsipv4).union(self.nsipv6);

		let mut mask = if post_recurse.is_empty() { ZoneBits::ALL } else { ZoneBits::mask_up_to(post_recurse.lowest_set_bit_index()) };

		for (i, z) in zones.iter().enumerate() {
			if let Some(d) = z {
				if d.wait_recurse {
					mask.clear_bit(i as u32);
				}
			}
		}

		self.qname_skip_recurse = mask;
	}

	fn rebuild_from_counts(&mut self, zones: &[Option<ZoneDesc>]) {
		*self = HaveSummary::default();

		for (i, z) in zones.iter().enumerate() {
			let Some(d) = z else { continue };
			let bit = ZoneBits::from_bit(i as u32);

			let set = |field: &mut ZoneBits, n: u32| {
				if n > 0 {
					*field = field.union(bit);
				}
			};

			set(&mut self.qname, d.counts.qname);
			set(&mut self.ipv4, d.counts.ipv4);
			set(&mut self.ipv6, d.counts.ipv6);
			set(&mut self.nsipv4, d.counts.nsipv4);
			set(&mut self.nsipv6, d.counts.nsipv6);
			set(&mut self.nsdname, d.counts.nsdname);
		}

		self.recompute_derived(zones);
	}
}

struct Maintenance {
	zones: Vec<Option<ZoneDesc>>,
	load_begun: ZoneBits,
}

struct Search {
	cidr: CidrTree,
	names: NamesTree,
	have: HaveSummary,
}

struct IndexInner {
	options: IndexOptions,
	maintenance: RwLock<Maintenance>,
	search: RwLock<Search>,
}

/// The trigger index. Cheap to clone (an `Arc` bump, i.e. `attach` from
/// the external interface); dropping the last clone tears the index down
/// (`detach`).
#[derive(Clone)]
pub struct Index(Arc<IndexInner>);

/// The container a zone reload populates via repeated `Index::add_staged`
/// before calling `Index::ready`.
pub struct Staging {
	zone: ZoneNum,
	trees: StagingTrees,
}

enum StagingTrees {
	/// First-ever load of this zone slot: writes go straight into the
	/// live trees (safe because `have.*` doesn't include this zone yet,
	/// so no lookup can be asking for it).
	Live,
	Fresh(CidrTree, NamesTree),
}

impl Index {
	pub fn new(options: IndexOptions) -> Self {
		let zones = (0..MAX_ZONES).map(|_| None).collect();

		Self(Arc::new(IndexInner {
			options,
			maintenance: RwLock::new(Maintenance { zones, load_begun: ZoneBits::EMPTY }),
			search: RwLock::new(Search { cidr: CidrTree::new(), names: NamesTree::new(), have: HaveSummary::default() }),
		}))
	}

	/// Install (or replace) `zone`'s descriptor. Called once before a
	/// zone's first `begin_load`, and again with updated config ahead of
	/// any later reload.
	pub fn describe_zone(&self, zone: ZoneNum, desc: ZoneDesc) {
		let mut maint = self.0.maintenance.write();
		maint.zones[zone.get() as usize] = Some(desc);
	}

	/// Begin (re)loading `zone`, which must already have a descriptor
	/// from `describe_zone`. The caller populates the returned `Staging`
	/// with `add_staged` for every trigger in the new zone file, then
	/// calls `ready`.
	pub fn begin_load(&self, zone: ZoneNum) -> Staging {
		let mut maint = self.0.maintenance.write();
		let idx = zone.get() as usize;

		assert!(maint.zones[idx].is_some(), "zone {} must be described before its first load", zone.get());

		let first_time = !maint.load_begun.bit(idx as u32);
		maint.load_begun.set_bit(idx as u32);

		let trees = if first_time { StagingTrees::Live } else { StagingTrees::Fresh(CidrTree::new(), NamesTree::new()) };

		Staging { zone, trees }
	}

	/// Parse and insert one trigger owner into a zone still being loaded.
	pub fn add_staged(&self, staging: &mut Staging, owner_str: &str) -> Result<AddOutcome> {
		let owner = Name::parse(owner_str);
		let mut maint = self.0.maintenance.write();
		let idx = staging.zone.get() as usize;
		let desc = maint.zones[idx].as_mut().ok_or(Error::NodeNotFound)?;

		let (kind, trigger) = match classify(desc, &owner) {
			Ok(v) => v,
			Err(reason) => return self.reject(desc, staging.zone, &owner, reason, false),
		};

		if !desc.kind_enabled(kind) {
			debug!("rpz: trigger kind {} disabled for zone '{}', skipping '{owner}'", type2str(kind), desc.origin);
			return Ok(AddOutcome::Inserted);
		}

		let inserted = match &mut staging.trees {
			StagingTrees::Live => insert_into_search(&mut self.0.search.write(), staging.zone, kind, &trigger),
			StagingTrees::Fresh(cidr, names) => insert_into(cidr, names, staging.zone, kind, &trigger),
		};

		match inserted {
			Ok((outcome, counter)) => {
				desc.counts.adjust(counter, true);

				Ok(match outcome {
					InsertOutcome::Inserted => AddOutcome::Inserted,
					InsertOutcome::AlreadyPresent => AddOutcome::AlreadyExists,
				})
			}
			Err(reason) => self.reject(desc, staging.zone, &owner, reason, false),
		}
	}

	/// Finish a reload: fold the new zone's trees into a consistent live
	/// view (copying every other zone forward for a non-fast-path
	/// reload), then recompute the `have.*` summaries once.
	pub fn ready(&self, staging: Staging) -> Result<()> {
		let maint = self.0.maintenance.read();

		match staging.trees {
			StagingTrees::Live => {
				let mut search = self.0.search.write();
				search.have.rebuild_from_counts(&maint.zones);
			}
			StagingTrees::Fresh(mut cidr, mut names) => {
				// Strip the reloading zone's own bit from every copied
				// entry: its fresh triggers are already in `cidr`/`names`
				// from `add_staged`, and its stale ones must not survive.
				let reload_zone_bits = ZonePair { d: ZoneBits::from(staging.zone), ns: ZoneBits::from(staging.zone) };
				let mut search = self.0.search.write();

				for (key, prefix, pair) in search.cidr.iter() {
					let masked = pair.remove(reload_zone_bits);

					if !masked.is_empty() {
						cidr.insert_raw(&key, prefix, masked);
					}
				}

				for (name, pair, wild) in search.names.iter() {
					let pair = pair.remove(reload_zone_bits);
					let wild = wild.remove(reload_zone_bits);

					if !pair.is_empty() || !wild.is_empty() {
						names.insert_raw(&name, pair, wild);
					}
				}

				std::mem::swap(&mut search.cidr, &mut cidr);
				std::mem::swap(&mut search.names, &mut names);
				search.have.rebuild_from_counts(&maint.zones);
			}
		}

		Ok(())
	}

	/// Incrementally add a single trigger to an already-ready zone
	/// (outside of a full reload).
	pub fn add(&self, zone: ZoneNum, owner_str: &str) -> Result<AddOutcome> {
		self.add_impl(zone, owner_str, false)
	}

	/// Like `add`, but owner-parse failures and duplicate triggers are
	/// returned as `Err` instead of logged-and-absorbed.
	pub fn add_strict(&self, zone: ZoneNum, owner_str: &str) -> Result<AddOutcome> {
		self.add_impl(zone, owner_str, true)
	}

	fn add_impl(&self, zone: ZoneNum, owner_str: &str, strict: bool) -> Result<AddOutcome> {
		let owner = Name::parse(owner_str);
		let mut maint = self.0.maintenance.write();
		let idx = zone.get() as usize;
		let desc = maint.zones[idx].as_mut().ok_or(Error::NodeNotFound)?;

		let (kind, trigger) = match classify(desc, &owner) {
			Ok(v) => v,
			Err(reason) => return self.reject(desc, zone, &owner, reason, strict),
		};

		if !desc.kind_enabled(kind) {
			debug!("rpz: trigger kind {} disabled for zone '{}', skipping '{owner}'", type2str(kind), desc.origin);
			return Ok(AddOutcome::Inserted);
		}

		let mut search = self.0.search.write();

		let (outcome, counter) = match insert_into_search(&mut search, zone, kind, &trigger) {
			Ok(v) => v,
			Err(reason) => {
				drop(search);
				return self.reject(desc, zone, &owner, reason, strict);
			}
		};

		if let InsertOutcome::AlreadyPresent = outcome {
			log!(self.0.options.reject_log_level, "invalid rpz owner '{owner}' in zone '{}': duplicate trigger", desc.origin);

			if strict {
				return Err(Error::DuplicateTrigger { owner: owner.to_string(), zone });
			}

			return Ok(AddOutcome::AlreadyExists);
		}

		if desc.counts.adjust(counter, true) {
			search.have.toggle(counter, zone, true);
			search.have.recompute_derived(&maint.zones);
		}

		Ok(AddOutcome::Inserted)
	}

	pub fn delete(&self, zone: ZoneNum, owner_str: &str) -> Result<()> {
		let owner = Name::parse(owner_str);
		let mut maint = self.0.maintenance.write();
		let idx = zone.get() as usize;
		let desc = maint.zones[idx].as_mut().ok_or(Error::NodeNotFound)?;

		let (kind, trigger) = classify(desc, &owner).map_err(|reason| Error::BadOwnerFormat { owner: owner.to_string(), zone, reason })?;

		let mut search = self.0.search.write();

		let (found, counter) = match kind {
			TriggerType::Qname => (search.names.delete(&trigger, kind, zone), CounterKind::Qname),
			TriggerType::Nsdname => (search.names.delete(&trigger, kind, zone), CounterKind::Nsdname),
			TriggerType::Ip | TriggerType::Nsip => {
				let (ip, prefix) = canon::decode(trigger.labels()).map_err(|reason| Error::BadOwnerFormat { owner: owner.to_string(), zone, reason })?;
				let counter = ip_counter(kind, &ip, prefix);
				(search.cidr.delete(&ip, prefix, kind, zone), counter)
			}
		};

		if !found {
			return Err(Error::NodeNotFound);
		}

		if desc.counts.adjust(counter, false) {
			search.have.toggle(counter, zone, false);
			search.have.recompute_derived(&maint.zones);
		}

		Ok(())
	}

	pub fn find_ip(&self, kind: IpTriggerKind, eligible: ZoneBits, addr: IpAddr) -> Option<IpHit> {
		let natural_prefix = match addr {
			IpAddr::V4(_) => 32,
			IpAddr::V6(_) => 128,
		};
		let (key, prefix) = key_from_addr(addr, natural_prefix);

		let search = self.0.search.read();
		let v4 = is_ipv4_mapped(&key, prefix);

		let have = match (kind, v4) {
			(IpTriggerKind::Ip, true) => search.have.ipv4,
			(IpTriggerKind::Ip, false) => search.have.ipv6,
			(IpTriggerKind::Nsip, true) => search.have.nsipv4,
			(IpTriggerKind::Nsip, false) => search.have.nsipv6,
		};

		let eligible = eligible & have;

		if eligible.is_empty() {
			return None;
		}

		let (zone, found_key, found_prefix) = search.cidr.longest_match(&key, prefix, kind.into(), eligible)?;
		let trigger = canon::encode(&found_key, found_prefix);

		Some(IpHit { zone, trigger, prefix: found_prefix })
	}

	pub fn find_name(&self, kind: NameTriggerKind, eligible: ZoneBits, name: &Name) -> ZoneBits {
		let search = self.0.search.read();

		let have = match kind {
			NameTriggerKind::Qname => search.have.qname,
			NameTriggerKind::Nsdname => search.have.nsdname,
		};

		let eligible = eligible & have;

		if eligible.is_empty() {
			return ZoneBits::EMPTY;
		}

		search.names.find(name, kind.into(), eligible)
	}

	/// Debug/test helper: invariant I1 (CIDR `sum` correctness) and I2
	/// (`have.*` matches the zones' own counters).
	pub fn check_invariants(&self) -> Result<()> {
		let maint = self.0.maintenance.read();
		let search = self.0.search.read();

		if !search.cidr.check_invariants() {
			return Err(Error::InternalInvariantViolated("I1: CIDR tree sum mismatch".into()));
		}

		let mut expected = search.have;
		expected.rebuild_from_counts(&maint.zones);

		if expected.qname != search.have.qname || expected.ipv4 != search.have.ipv4 || expected.ipv6 != search.have.ipv6 {
			return Err(Error::InternalInvariantViolated("I2: have.* does not match zone counters".into()));
		}

		Ok(())
	}

	fn reject(&self, desc: &ZoneDesc, zone: ZoneNum, owner: &Name, reason: String, strict: bool) -> Result<AddOutcome> {
		log!(self.0.options.reject_log_level, "invalid rpz owner '{owner}' in zone '{}': {reason}", desc.origin);

		if strict { Err(Error::BadOwnerFormat { owner: owner.to_string(), zone, reason }) } else { Ok(AddOutcome::Inserted) }
	}
}

fn ip_counter(kind: TriggerType, ip: &IpKey, prefix: Prefix) -> CounterKind {
	let v4 = is_ipv4_mapped(ip, prefix);

	match (kind, v4) {
		(TriggerType::Ip, true) => CounterKind::Ipv4,
		(TriggerType::Ip, false) => CounterKind::Ipv6,
		(TriggerType::Nsip, true) => CounterKind::Nsipv4,
		(TriggerType::Nsip, false) => CounterKind::Nsipv6,
		_ => unreachable!("only Ip/Nsip triggers live in the CIDR tree"),
	}
}

/// Classify `owner` (full, as read from the zone file) relative to
/// `desc.origin`, trying the more specific `rpz-ip`/`rpz-nsip`/
/// `rpz-nsdname` subzones before falling back to a bare QNAME trigger.
/// Returns the trigger kind and the owner's labels with that subzone
/// (and the origin) stripped off.
fn classify(desc: &ZoneDesc, owner: &Name) -> core::result::Result<(TriggerType, Name), String> {
	for kind in [TriggerType::Ip, TriggerType::Nsip, TriggerType::Nsdname] {
		let sub = desc.trigger_origin(kind);

		if let Some(rest) = owner.strip_suffix(&sub) {
			if rest.is_empty() {
				return Err(format!("owner is exactly the {} subzone apex", type2str(kind)));
			}

			return Ok((kind, Name::from_labels(rest)));
		}
	}

	match owner.strip_suffix(&desc.origin) {
		Some(rest) if !rest.is_empty() => Ok((TriggerType::Qname, Name::from_labels(rest))),
		_ => Err("owner is not under the zone's origin".to_string()),
	}
}

fn insert_into_search(search: &mut Search, zone: ZoneNum, kind: TriggerType, trigger: &Name) -> core::result::Result<(InsertOutcome, CounterKind), String> {
	insert_into(&mut search.cidr, &mut search.names, zone, kind, trigger)
}

fn insert_into(cidr: &mut CidrTree, names: &mut NamesTree, zone: ZoneNum, kind: TriggerType, trigger: &Name) -> core::result::Result<(InsertOutcome, CounterKind), String> {
	match kind {
		TriggerType::Qname => Ok((names.insert(trigger, kind, zone), CounterKind::Qname)),
		TriggerType::Nsdname => Ok((names.insert(trigger, kind, zone), CounterKind::Nsdname)),
		TriggerType::Ip | TriggerType::Nsip => {
			let (ip, prefix) = canon::decode(trigger.labels())?;
			let counter = ip_counter(kind, &ip, prefix);
			Ok((cidr.insert(&ip, prefix, kind, zone), counter))
		}
	}
}
