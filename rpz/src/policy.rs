//! CNAME-to-policy classification and the policy-verb string table.

use crate::name::Name;
use crate::zonedesc::ZoneDesc;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PolicyVerb {
	Passthru,
	Nxdomain,
	Nodata,
	/// The CNAME is returned as-is; the resolver follows it normally. This
	/// is the natural classification's fallback, not an admin override —
	/// compare `Cname`.
	Record,
	/// A longer wildcard CNAME (`*.X`, 3+ labels): the resolver
	/// synthesizes the answer by substituting the queried name under `X`.
	Wildcname,
	/// The zone itself is administratively disabled.
	Disabled,
	/// Defer entirely to whatever the CNAME encodes (the zone's override
	/// is "no override" in all but name).
	Given,
	/// An explicit zone-level `policy cname <target>;` override, distinct
	/// from `Record`'s CNAME-classification fallback.
	Cname,
	/// An unparseable or absent policy token.
	Error,
}

pub fn policy2str(p: PolicyVerb) -> &'static str {
	match p {
		PolicyVerb::Passthru => "passthru",
		PolicyVerb::Nxdomain => "nxdomain",
		PolicyVerb::Nodata => "nodata",
		PolicyVerb::Record => "local-data",
		PolicyVerb::Wildcname => "cname",
		PolicyVerb::Disabled => "disabled",
		PolicyVerb::Given => "given",
		PolicyVerb::Cname => "cname",
		PolicyVerb::Error => "error",
	}
}

/// Parse an admin-facing policy token (zone config's `policy` option).
/// Case-insensitive; `"no-op"` is a legacy alias for `passthru`. An
/// unrecognized token returns `Error` rather than `None`, matching
/// `dns_rpz_str2policy`'s contract of never returning an "absent" value
/// distinct from `ERROR`.
pub fn str2policy(s: &str) -> Option<PolicyVerb> {
	match s.to_ascii_lowercase().as_str() {
		"given" => Some(PolicyVerb::Given),
		"disabled" => Some(PolicyVerb::Disabled),
		"passthru" => Some(PolicyVerb::Passthru),
		"no-op" => Some(PolicyVerb::Passthru),
		"nxdomain" => Some(PolicyVerb::Nxdomain),
		"nodata" => Some(PolicyVerb::Nodata),
		"cname" => Some(PolicyVerb::Cname),
		_ => Some(PolicyVerb::Error),
	}
}

/// Classify a CNAME RHS found in the policy zone's local database for
/// `selfname` (the owner being looked up), per §4.6. `zone.override_policy`
/// is consulted first: `Some(Given)` always falls through to the CNAME
/// classification below; any other override short-circuits it, including
/// `Some(Cname)` — an administrator's explicit `policy cname <target>;`
/// override, which is returned here instead of ever being produced by the
/// classification below (that path's fallback result is always `Record`).
pub fn decode_cname(zone: &ZoneDesc, rhs: &Name, selfname: &Name) -> PolicyVerb {
	match zone.override_policy {
		Some(PolicyVerb::Given) | None => {}
		Some(verb) => return verb,
	}

	if rhs.is_root() {
		return PolicyVerb::Nxdomain;
	}

	if let Some(under) = rhs.strip_wildcard() {
		return if under.is_root() { PolicyVerb::Nodata } else { PolicyVerb::Wildcname };
	}

	if *rhs == zone.passthru_sentinel || rhs == selfname {
		return PolicyVerb::Passthru;
	}

	PolicyVerb::Record
}

#[cfg(test)]
mod tests {
	use super::*;

	fn desc() -> ZoneDesc {
		ZoneDesc::new(Name::parse("example.com."))
	}

	#[test]
	fn root_is_nxdomain() {
		assert_eq!(decode_cname(&desc(), &Name::root(), &Name::parse("evil.example.")), PolicyVerb::Nxdomain);
	}

	#[test]
	fn two_label_wildcard_is_nodata() {
		let rhs = Name::parse("*.");
		assert_eq!(decode_cname(&desc(), &rhs, &Name::parse("evil.example.")), PolicyVerb::Nodata);
	}

	#[test]
	fn longer_wildcard_is_wildcname() {
		let rhs = Name::parse("*.good.example.");
		assert_eq!(decode_cname(&desc(), &rhs, &Name::parse("evil.example.")), PolicyVerb::Wildcname);
	}

	#[test]
	fn self_loop_is_passthru() {
		let selfname = Name::parse("evil.example.");
		assert_eq!(decode_cname(&desc(), &selfname, &selfname), PolicyVerb::Passthru);
	}

	#[test]
	fn sentinel_is_passthru() {
		let mut d = desc();
		d.passthru_sentinel = Name::parse("rpz-passthru.");
		assert_eq!(decode_cname(&d, &Name::parse("rpz-passthru."), &Name::parse("evil.example.")), PolicyVerb::Passthru);
	}

	#[test]
	fn override_short_circuits_classification() {
		let mut d = desc();
		d.override_policy = Some(PolicyVerb::Disabled);
		assert_eq!(decode_cname(&d, &Name::parse("anything.example."), &Name::parse("evil.example.")), PolicyVerb::Disabled);
	}

	#[test]
	fn str2policy_accepts_legacy_no_op_alias() {
		assert_eq!(str2policy("NO-OP"), Some(PolicyVerb::Passthru));
		assert_eq!(str2policy("bogus"), Some(PolicyVerb::Error));
	}

	#[test]
	fn cname_override_is_distinguishable_from_natural_record_classification() {
		let natural = decode_cname(&desc(), &Name::parse("good.example."), &Name::parse("evil.example."));
		assert_eq!(natural, PolicyVerb::Record);

		let mut d = desc();
		d.override_policy = Some(PolicyVerb::Cname);
		let overridden = decode_cname(&d, &Name::parse("good.example."), &Name::parse("evil.example."));
		assert_eq!(overridden, PolicyVerb::Cname);

		assert_ne!(natural, overridden);
	}

	#[test]
	fn str2policy_cname_is_distinct_from_natural_record_token() {
		assert_eq!(str2policy("cname"), Some(PolicyVerb::Cname));
		assert_ne!(str2policy("cname"), Some(PolicyVerb::Record));
	}
}
