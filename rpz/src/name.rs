//! DNS names as label sequences.
//!
//! Labels are stored case-folded (DNS name comparison is case-insensitive)
//! in the order they're conventionally written, leaf label first
//! (`"www.example.com."` -> `["www", "example", "com"]`). The name summary
//! tree wants the opposite order — most significant label first — so that
//! names sharing a suffix share a trie prefix; `Name::root_first` provides
//! that view.

use core::fmt;

pub type Label = Box<str>;

#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Name(Vec<Label>);

impl Name {
	pub const fn root() -> Self {
		Self(Vec::new())
	}

	/// Parse a conventional dotted name. A trailing `.` (the usual
	/// fully-qualified form) is accepted and ignored; labels are
	/// lower-cased for case-insensitive comparison.
	pub fn parse(s: &str) -> Self {
		let trimmed = s.strip_suffix('.').unwrap_or(s);

		if trimmed.is_empty() {
			return Self::root();
		}

		Self(trimmed.split('.').map(|l| l.to_ascii_lowercase().into_boxed_str()).collect())
	}

	pub fn from_labels(labels: Vec<Label>) -> Self {
		Self(labels)
	}

	pub fn labels(&self) -> &[Label] {
		&self.0
	}

	pub fn is_root(&self) -> bool {
		self.0.is_empty()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Labels in most-significant-first order, for trie traversal.
	pub fn root_first(&self) -> Vec<Label> {
		self.0.iter().rev().cloned().collect()
	}

	/// If `self` ends with `suffix` (e.g. a zone origin), return the
	/// remaining leading labels; otherwise `None`.
	pub fn strip_suffix(&self, suffix: &Name) -> Option<Vec<Label>> {
		if suffix.len() > self.len() {
			return None;
		}

		let split = self.len() - suffix.len();

		if self.0[split..] != suffix.0[..] {
			return None;
		}

		Some(self.0[..split].to_vec())
	}

	/// `true` if the leading label is `*`, along with the remainder.
	pub fn strip_wildcard(&self) -> Option<Name> {
		let (first, rest) = self.0.split_first()?;

		(&**first == "*").then(|| Name(rest.to_vec()))
	}

	pub fn prepend(&self, prefix: &[Label]) -> Name {
		let mut v = Vec::with_capacity(prefix.len() + self.0.len());
		v.extend_from_slice(prefix);
		v.extend(self.0.iter().cloned());
		Name(v)
	}
}

impl fmt::Display for Name {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.0.is_empty() {
			return write!(f, ".");
		}

		for (i, l) in self.0.iter().enumerate() {
			if i > 0 {
				write!(f, ".")?;
			}

			write!(f, "{l}")?;
		}

		Ok(())
	}
}

impl fmt::Debug for Name {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Name({self})")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_lowercases_and_drops_trailing_dot() {
		let n = Name::parse("Evil.EXAMPLE.");
		assert_eq!(n.labels(), &[Box::from("evil"), Box::from("example")]);
	}

	#[test]
	fn strip_suffix_finds_origin() {
		let owner = Name::parse("24.0.2.0.192.rpz-ip.example.com.");
		let origin = Name::parse("rpz-ip.example.com.");

		let rest = owner.strip_suffix(&origin).unwrap();
		assert_eq!(rest, vec![Box::from("24"), Box::from("0"), Box::from("2"), Box::from("0"), Box::from("192")]);
	}

	#[test]
	fn wildcard_strip() {
		let n = Name::parse("*.evil.example.");
		let rest = n.strip_wildcard().unwrap();
		assert_eq!(rest.to_string(), "evil.example");

		assert!(Name::parse("evil.example.").strip_wildcard().is_none());
	}

	#[test]
	fn root_first_reverses_for_trie_order() {
		let n = Name::parse("www.example.com.");
		let rf = n.root_first();
		assert_eq!(rf, vec![Box::from("com"), Box::from("example"), Box::from("www")]);
	}
}
