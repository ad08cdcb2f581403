use std::collections::BTreeMap;

use proptest::prelude::*;

use super::*;

fn props() -> Properties {
	Properties::new()
		.with("kind", "utc")
		.with("zone", 3)
		.with("primary", true)
}

#[test]
fn test_empty_filter_matches_everything() {
	assert!(Filter::any().matches(&props()));
	assert!(Filter::any().matches(&Properties::new()));
}

#[test]
fn test_conjunction_requires_every_term() {
	let filter = Filter::equals("kind", "utc").add_equals("zone", 3);
	assert!(filter.matches(&props()));

	let filter = filter.and(Filter::equals("primary", false));
	assert!(!filter.matches(&props()));
}

#[test]
fn test_missing_key_does_not_match() {
	assert!(!Filter::equals("region", "eu").matches(&props()));
}

#[test]
fn test_values_compare_by_type() {
	assert!(!Filter::equals("zone", "3").matches(&props()));
	assert!(Filter::equals("zone", 3i64).matches(&props()));
}

#[test]
fn test_display_is_ldap_like() {
	assert_eq!(Filter::any().to_string(), "(*)");
	assert_eq!(Filter::equals("kind", "utc").to_string(), "(kind=utc)");
	assert_eq!(
		Filter::equals("zone", 3).add_equals("kind", "utc").to_string(),
		"(&(kind=utc)(zone=3))"
	);
}

#[test]
fn test_conflicting_terms_never_match() {
	let utc = Properties::new().with("kind", "utc");
	let local = Properties::new().with("kind", "local");

	let and = Filter::equals("kind", "utc").and(Filter::equals("kind", "local"));
	assert!(!and.matches(&utc));
	assert!(!and.matches(&local));

	let chained = Filter::equals("kind", "utc").add_equals("kind", "local");
	assert!(!chained.matches(&local));
	assert_eq!(chained.to_string(), "(&(kind=local)(kind=utc))");
}

#[test]
fn test_repeated_term_is_idempotent() {
	let twice = Filter::equals("kind", "utc").and(Filter::equals("kind", "utc"));
	assert_eq!(twice, Filter::equals("kind", "utc"));
	assert!(twice.matches(&props()));
}

#[test]
fn test_equality_ignores_build_order() {
	let a = Filter::equals("kind", "utc").add_equals("zone", 3);
	let b = Filter::equals("zone", 3).and(Filter::equals("kind", "utc"));
	assert_eq!(a, b);
}

fn pairs() -> impl Strategy<Value = Vec<(String, i64)>> {
	prop::collection::vec(("[a-d]", 0i64..4), 0..6)
}

fn build(terms: &[(String, i64)]) -> Filter {
	terms.iter().fold(Filter::any(), |f, (k, v)| f.add_equals(k.clone(), *v))
}

proptest! {
	#[test]
	fn test_matches_iff_every_term_holds(props in pairs(), terms in pairs()) {
		let properties: Properties = props.iter().cloned().collect();
		let present: BTreeMap<&str, i64> = props.iter().map(|(k, v)| (k.as_str(), *v)).collect();
		let expected = terms
			.iter()
			.all(|(key, value)| present.get(key.as_str()) == Some(value));
		prop_assert_eq!(build(&terms).matches(&properties), expected);
	}

	#[test]
	fn test_and_is_commutative(left in pairs(), right in pairs(), props in pairs()) {
		let properties: Properties = props.iter().cloned().collect();
		let ab = build(&left).and(build(&right));
		let ba = build(&right).and(build(&left));
		prop_assert_eq!(&ab, &ba);
		prop_assert_eq!(
			ab.matches(&properties),
			build(&left).matches(&properties) && build(&right).matches(&properties)
		);
	}
}
