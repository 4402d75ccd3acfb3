//! Property-based coverage of the end-to-end invariants from spec.md §8
//! that span the whole `Index`, not just the standalone codec (whose own
//! round-trip properties live in `rpz::canon`'s test module): owner
//! round-tripping through add/find, the CIDR tree's `sum` invariant after
//! random mutation, and `find_ip` agreeing with a brute-force linear scan.

use core::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use proptest::prelude::*;

use rpz::canon;
use rpz::ipkey::key_from_ipv4;
use rpz::{Index, IndexOptions, IpTriggerKind, Name, ZoneBits, ZoneDesc, ZoneNum};

fn zone(n: u32) -> ZoneNum {
	ZoneNum::new(n).unwrap()
}

fn masked_v4(octets: [u8; 4], prefix: u32) -> u32 {
	let mask = (!0u32).checked_shl(32 - prefix).unwrap_or(0);
	u32::from_be_bytes(octets) & mask
}

/// Builds a canonical IP trigger owner for a masked IPv4 network under
/// `origin`, the way `canon::encode` would render it.
fn ipv4_owner(octets: [u8; 4], prefix: u32, origin: &str) -> String {
	let addr = Ipv4Addr::from(masked_v4(octets, prefix));
	let key = key_from_ipv4(addr);
	let name = canon::encode(&key, prefix + 96);
	format!("{name}.rpz-ip.{origin}")
}

proptest! {
	/// Round-trip law: an owner built from a masked IPv4 network always
	/// parses back to the same `(zone, prefix)` pair it was added with.
	#[test]
	fn ipv4_trigger_round_trips_through_the_index(octets in any::<[u8; 4]>(), prefix in 1u32..=32) {
		let idx = Index::new(IndexOptions::default());
		idx.describe_zone(zone(0), ZoneDesc::new(Name::parse("rpz.example.")));
		let owner = ipv4_owner(octets, prefix, "rpz.example.");

		idx.add_strict(zone(0), &owner).unwrap();

		let addr = IpAddr::V4(Ipv4Addr::from(masked_v4(octets, prefix)));
		let hit = idx.find_ip(IpTriggerKind::Ip, ZoneBits::ALL, addr);

		prop_assert!(hit.is_some());
		prop_assert_eq!(hit.unwrap().prefix, prefix + 96);
	}

	/// Invariant I1 (CIDR `sum` correctness) and I2 (`have.*` matches zone
	/// counters) hold after any sequence of adds and deletes, in any
	/// order, including ones that never existed.
	#[test]
	fn invariants_hold_after_random_add_delete_sequences(
		ops in prop::collection::vec((any::<bool>(), any::<[u8; 4]>(), 16u32..=32), 1..40)
	) {
		let idx = Index::new(IndexOptions::default());
		idx.describe_zone(zone(0), ZoneDesc::new(Name::parse("rpz.example.")));

		for (is_add, octets, prefix) in ops {
			let owner = ipv4_owner(octets, prefix, "rpz.example.");

			if is_add {
				let _ = idx.add(zone(0), &owner);
			} else {
				let _ = idx.delete(zone(0), &owner);
			}
		}

		prop_assert!(idx.check_invariants().is_ok());
	}

	/// `find_ip` agrees with a brute-force linear scan over every trigger
	/// inserted, for arbitrary lookups within the same address space.
	#[test]
	fn find_ip_matches_brute_force_longest_match(
		triggers in prop::collection::vec((any::<[u8; 4]>(), 8u32..=32, 0u32..4), 1..12),
		lookup in any::<[u8; 4]>(),
	) {
		let idx = Index::new(IndexOptions::default());
		for z in 0..4 {
			idx.describe_zone(zone(z), ZoneDesc::new(Name::parse(&format!("z{z}.example."))));
		}

		let mut added = Vec::new();
		for (octets, prefix, z) in &triggers {
			let owner = ipv4_owner(*octets, *prefix, &format!("z{z}.example."));
			if idx.add(zone(*z), &owner).unwrap() == rpz::AddOutcome::Inserted {
				added.push((masked_v4(*octets, *prefix), *prefix, *z));
			}
		}

		let lookup_val = u32::from_be_bytes(lookup);

		// Brute force: longest prefix match, ties broken by lowest zone.
		let best = added.iter()
			.filter(|(net, prefix, _)| {
				let mask: u32 = (!0u32).checked_shl(32 - prefix).unwrap_or(0);
				(lookup_val & mask) == (*net & mask)
			})
			.max_by_key(|(_, prefix, z)| (*prefix, std::cmp::Reverse(*z)));

		let got = idx.find_ip(IpTriggerKind::Ip, ZoneBits::ALL, IpAddr::V4(Ipv4Addr::from(lookup_val)));

		match best {
			Some((_, prefix, z)) => {
				let hit = got.expect("brute force found a match, index should too");
				prop_assert_eq!(hit.zone, zone(*z));
				prop_assert_eq!(hit.prefix, prefix + 96);
			}
			None => prop_assert!(got.is_none()),
		}
	}
}

#[test]
fn ipv6_trigger_round_trips_for_a_fixed_sample() {
	let idx = Index::new(IndexOptions::default());
	idx.describe_zone(zone(0), ZoneDesc::new(Name::parse("rpz.example.")));

	let addr: Ipv6Addr = "2001:db8:85a3::8a2e:370:7334".parse().unwrap();
	let key = rpz::ipkey::key_from_ipv6(addr);
	let owner = format!("{}.rpz-ip.rpz.example.", canon::encode(&key, 128));

	idx.add_strict(zone(0), &owner).unwrap();

	let hit = idx.find_ip(IpTriggerKind::Ip, ZoneBits::ALL, IpAddr::V6(addr)).unwrap();
	assert_eq!(hit.zone, zone(0));
	assert_eq!(hit.prefix, 128);
}
