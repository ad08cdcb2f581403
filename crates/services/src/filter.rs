//! Property filters.
//!
//! A [`Filter`] is a conjunction of `key = value` terms evaluated against a
//! registration's [`Properties`]. It is immutable after construction and can
//! be shared across threads freely.

use std::collections::BTreeSet;
use std::fmt;

use crate::properties::{Properties, PropertyValue};

/// Conjunction of exact-match property terms. The empty filter matches
/// everything.
///
/// Terms are kept as a set, so equal filters compare equal regardless of the
/// order they were built in. Two terms on one key with different values can
/// never both hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Filter {
	terms: BTreeSet<(String, PropertyValue)>,
}

impl Filter {
	/// Filter that matches every property map.
	pub fn any() -> Self {
		Self::default()
	}

	/// Filter with a single `key = value` term.
	pub fn equals(key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
		Self::any().add_equals(key, value)
	}

	/// Adds a `key = value` term. Every term added must hold.
	pub fn add_equals(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
		self.terms.insert((key.into(), value.into()));
		self
	}

	/// Logical AND of two filters.
	pub fn and(mut self, other: Filter) -> Self {
		self.terms.extend(other.terms);
		self
	}

	pub fn matches(&self, properties: &Properties) -> bool {
		self.terms
			.iter()
			.all(|(key, expected)| properties.get(key) == Some(expected))
	}

	pub fn is_empty(&self) -> bool {
		self.terms.is_empty()
	}

	pub fn terms(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
		self.terms.iter().map(|(key, value)| (key.as_str(), value))
	}
}

/// Renders in LDAP style, e.g. `(&(kind=utc)(zone=3))`.
impl fmt::Display for Filter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.terms.len() {
			0 => f.write_str("(*)"),
			1 => {
				let (key, value) = self.terms.iter().next().ok_or(fmt::Error)?;
				write!(f, "({key}={value})")
			}
			_ => {
				f.write_str("(&")?;
				for (key, value) in &self.terms {
					write!(f, "({key}={value})")?;
				}
				f.write_str(")")
			}
		}
	}
}

#[cfg(test)]
mod tests;
