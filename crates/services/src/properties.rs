use std::collections::BTreeMap;
use std::fmt;

/// Scalar value attached to a registration property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyValue {
	Bool(bool),
	Int(i64),
	Str(String),
}

impl fmt::Display for PropertyValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Bool(value) => write!(f, "{value}"),
			Self::Int(value) => write!(f, "{value}"),
			Self::Str(value) => f.write_str(value),
		}
	}
}

impl From<bool> for PropertyValue {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

impl From<i64> for PropertyValue {
	fn from(value: i64) -> Self {
		Self::Int(value)
	}
}

impl From<i32> for PropertyValue {
	fn from(value: i32) -> Self {
		Self::Int(value.into())
	}
}

impl From<&str> for PropertyValue {
	fn from(value: &str) -> Self {
		Self::Str(value.to_owned())
	}
}

impl From<String> for PropertyValue {
	fn from(value: String) -> Self {
		Self::Str(value)
	}
}

/// Properties attached to a registration, immutable once registered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Properties {
	entries: BTreeMap<String, PropertyValue>,
}

impl Properties {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builder-style insert.
	pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
		self.entries.insert(key.into(), value.into());
		self
	}

	pub fn get(&self, key: &str) -> Option<&PropertyValue> {
		self.entries.get(key)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
		self.entries.iter().map(|(key, value)| (key.as_str(), value))
	}
}

impl<K, V> FromIterator<(K, V)> for Properties
where
	K: Into<String>,
	V: Into<PropertyValue>,
{
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self {
			entries: iter
				.into_iter()
				.map(|(key, value)| (key.into(), value.into()))
				.collect(),
		}
	}
}
