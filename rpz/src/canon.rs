//! Canonical conversion between IP prefixes and the owner names RPZ stores
//! them under (`lib/dns/rpz.c`'s `ip2name`, in reverse as well as forward).
//!
//! IPv4: `prefix.d.c.b.a` (least significant octet first after the prefix).
//! IPv6: `prefix.g0.g1....g7`, 16-bit hex groups from least to most
//! significant, with one optional `zz` label collapsing the longest run of
//! two or more consecutive zero groups.

use crate::ipkey::{IpKey, Prefix, V4_PREFIX_OFFSET, is_ipv4_mapped};
use crate::name::{Label, Name};

const IPV6_GROUPS: usize = 8;

/// Render `(key, prefix)` as the label sequence that would sit under a
/// zone's trigger subdomain (not including that subdomain or the origin).
pub fn encode(key: &IpKey, prefix: Prefix) -> Name {
	if is_ipv4_mapped(key, prefix) {
		let v4 = key.0[3];
		let labels = [
			(prefix - V4_PREFIX_OFFSET).to_string(),
			(v4 & 0xff).to_string(),
			((v4 >> 8) & 0xff).to_string(),
			((v4 >> 16) & 0xff).to_string(),
			((v4 >> 24) & 0xff).to_string(),
		];
		return Name::from_labels(labels.into_iter().map(String::into_boxed_str).collect());
	}

	let groups = key_to_groups(key);
	let (run_start, run_len) = longest_zero_run(&groups);

	let mut labels: Vec<Label> = Vec::with_capacity(IPV6_GROUPS + 2);
	labels.push(prefix.to_string().into_boxed_str());

	let mut i = 0;
	while i < IPV6_GROUPS {
		if run_len >= 2 && i == run_start {
			labels.push("zz".into());
			i += run_len;
		} else {
			labels.push(format!("{:x}", groups[i]).into_boxed_str());
			i += 1;
		}
	}

	Name::from_labels(labels)
}

/// Parse an owner's labels (with the zone's trigger subdomain and origin
/// already stripped) back into `(key, prefix)`. Requires the input to be in
/// exactly the form `encode` would have produced — this is what makes the
/// format parse-then-reencode idempotent, and rejects anything else as a
/// malformed trigger.
pub fn decode(labels: &[Label]) -> Result<(IpKey, Prefix), String> {
	if labels.len() < 2 {
		return Err("fewer than 2 labels".to_string());
	}

	let prefix: u32 = labels[0].parse().map_err(|_| format!("non-numeric prefix '{}'", labels[0]))?;
	let rest = &labels[1..];

	let (key, prefix) = if rest.len() == 4 && !rest.iter().any(|l| &**l == "zz") {
		decode_v4(prefix, rest)?
	} else {
		decode_v6(prefix, rest)?
	};

	if encode(&key, prefix).labels() != labels {
		return Err("not in canonical form".to_string());
	}

	Ok((key, prefix))
}

fn decode_v4(prefix: u32, rest: &[Label]) -> Result<(IpKey, Prefix), String> {
	if !(1..=32).contains(&prefix) {
		return Err(format!("ipv4 prefix {prefix} out of range"));
	}

	let mut octets = [0u32; 4];
	for (i, l) in rest.iter().enumerate() {
		let v: u32 = l.parse().map_err(|_| format!("non-numeric octet '{l}'"))?;
		if v > 255 {
			return Err(format!("octet {v} out of range"));
		}
		octets[i] = v;
	}

	// rest is [d, c, b, a] (least significant first).
	let v4 = octets[0] | (octets[1] << 8) | (octets[2] << 16) | (octets[3] << 24);
	let mut key = IpKey([0, 0, 0xffff, v4]);
	let full_prefix = prefix + V4_PREFIX_OFFSET;
	key.mask_to_prefix(full_prefix);

	if key.0[3] != v4 {
		return Err("host bits set below prefix".to_string());
	}

	Ok((key, full_prefix))
}

fn decode_v6(prefix: u32, rest: &[Label]) -> Result<(IpKey, Prefix), String> {
	if !(1..=128).contains(&prefix) {
		return Err(format!("ipv6 prefix {prefix} out of range"));
	}

	let zz_count = rest.iter().filter(|l| &***l == "zz").count();
	if zz_count > 1 {
		return Err("more than one zz label".to_string());
	}

	let explicit = rest.len() - zz_count;
	if explicit > IPV6_GROUPS {
		return Err("too many groups".to_string());
	}

	let mut groups = [0u32; IPV6_GROUPS];
	let mut i = 0;
	for l in rest {
		if &**l == "zz" {
			i += IPV6_GROUPS - explicit;
			continue;
		}

		if i >= IPV6_GROUPS {
			return Err("too many groups".to_string());
		}

		let v = u32::from_str_radix(l, 16).map_err(|_| format!("bad hex group '{l}'"))?;
		if v > 0xffff {
			return Err(format!("hex group {v:#x} out of range"));
		}

		groups[i] = v;
		i += 1;
	}

	if i != IPV6_GROUPS {
		return Err("wrong number of groups".to_string());
	}

	let key = groups_to_key(&groups);
	let mut masked = key;
	masked.mask_to_prefix(prefix);

	if masked != key {
		return Err("host bits set below prefix".to_string());
	}

	Ok((key, prefix))
}

/// Groups in least-to-most-significant order, matching label order.
fn key_to_groups(key: &IpKey) -> [u32; IPV6_GROUPS] {
	let mut groups = [0u32; IPV6_GROUPS];

	for (i, word) in key.0.iter().rev().enumerate() {
		groups[i * 2] = word & 0xffff;
		groups[i * 2 + 1] = (word >> 16) & 0xffff;
	}

	groups
}

fn groups_to_key(groups: &[u32; IPV6_GROUPS]) -> IpKey {
	let mut words = [0u32; 4];

	for (i, word) in words.iter_mut().rev().enumerate() {
		*word = groups[i * 2] | (groups[i * 2 + 1] << 16);
	}

	IpKey(words)
}

/// Longest run of consecutive zero groups, ties broken toward the leftmost
/// (least significant) start. Returns `(start, len)`; `len < 2` means no
/// run worth collapsing.
fn longest_zero_run(groups: &[u32; IPV6_GROUPS]) -> (usize, usize) {
	let mut best = (0, 0);
	let mut cur_start = 0;
	let mut cur_len = 0;

	for (i, &g) in groups.iter().enumerate() {
		if g == 0 {
			if cur_len == 0 {
				cur_start = i;
			}
			cur_len += 1;

			if cur_len > best.1 {
				best = (cur_start, cur_len);
			}
		} else {
			cur_len = 0;
		}
	}

	best
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;
	use core::net::{Ipv4Addr, Ipv6Addr};

	use crate::ipkey::{key_from_ipv4, key_from_ipv6};

	#[test]
	fn ipv4_round_trip() {
		// A full address (prefix 128 = 96 + 32) always has an empty host
		// part, so there's no masking concern here.
		let key = key_from_ipv4("192.0.2.7".parse::<Ipv4Addr>().unwrap());
		let name = encode(&key, 128);
		assert_eq!(name.to_string(), "32.7.2.0.192");

		let (back_key, back_prefix) = decode(name.labels()).unwrap();
		assert_eq!(back_key, key);
		assert_eq!(back_prefix, 128);
	}

	#[test]
	fn ipv4_network_prefix_with_zero_host_part() {
		let key = key_from_ipv4("192.0.2.0".parse::<Ipv4Addr>().unwrap());
		let name = encode(&key, 96 + 24);

		let (back_key, back_prefix) = decode(name.labels()).unwrap();
		assert_eq!(back_key, key);
		assert_eq!(back_prefix, 120);
	}

	#[test]
	fn ipv6_collapses_longest_zero_run() {
		let key = key_from_ipv6("2001:db8::1".parse::<Ipv6Addr>().unwrap());
		let name = encode(&key, 128);

		// groups, LSB first: 1, 0,0,0,0,0, b8 0d, 1 2 0 0 -> zero run of
		// length 5 in the middle.
		assert!(name.to_string().contains(".zz."));

		let (back_key, back_prefix) = decode(name.labels()).unwrap();
		assert_eq!(back_key, key);
		assert_eq!(back_prefix, 128);
	}

	#[test]
	fn rejects_non_canonical_input() {
		// host bits set below the prefix.
		let err = decode_v4(24, &[Box::from("1"), Box::from("0"), Box::from("0"), Box::from("192")]);
		assert!(err.is_err());
	}

	#[test]
	fn rejects_double_zz() {
		let labels: Vec<Label> = vec!["128", "zz", "1", "zz"].into_iter().map(Box::from).collect();
		assert!(decode(&labels).is_err());
	}

	proptest! {
		/// Round-trip law (spec.md §8): for any `(key, prefix)` built from an
		/// arbitrary set of 16-bit groups masked to that prefix, encoding
		/// then decoding yields the same pair back.
		#[test]
		fn ipv6_arbitrary_groups_round_trip(groups in prop::array::uniform8(0u32..=0xffff), prefix in 1u32..=128) {
			let mut key = groups_to_key(&groups);
			key.mask_to_prefix(prefix);

			let name = encode(&key, prefix);
			let (back_key, back_prefix) = decode(name.labels()).unwrap();

			prop_assert_eq!(back_key, key);
			prop_assert_eq!(back_prefix, prefix);
		}

		/// Round-trip law for arbitrary masked IPv4 networks.
		#[test]
		fn ipv4_arbitrary_network_round_trip(octets in any::<[u8; 4]>(), prefix in 1u32..=32) {
			let v4 = u32::from_be_bytes(octets);
			let mut key = IpKey([0, 0, 0xffff, v4]);
			key.mask_to_prefix(prefix + 96);

			let name = encode(&key, prefix + 96);
			let (back_key, back_prefix) = decode(name.labels()).unwrap();

			prop_assert_eq!(back_key, key);
			prop_assert_eq!(back_prefix, prefix + 96);
		}
	}
}
