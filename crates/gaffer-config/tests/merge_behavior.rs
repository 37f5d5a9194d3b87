//! Merge laws exercised over generated configuration trees.

use gaffer_config::{merge, merge_values, ConfigValue, Scalar};
use indexmap::IndexMap;
use proptest::prelude::*;

fn scalar() -> impl Strategy<Value = ConfigValue> {
    prop_oneof![
        any::<bool>().prop_map(|b| ConfigValue::Scalar(Scalar::Bool(b))),
        any::<i64>().prop_map(|i| ConfigValue::Scalar(Scalar::Integer(i))),
        "[a-z]{0,6}".prop_map(|s| ConfigValue::Scalar(Scalar::String(s))),
    ]
}

fn value() -> impl Strategy<Value = ConfigValue> {
    scalar().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(ConfigValue::Sequence),
            prop::collection::vec(("[a-d]", inner), 0..4).prop_map(|pairs| {
                ConfigValue::Mapping(pairs.into_iter().collect::<IndexMap<_, _>>())
            }),
        ]
    })
}

fn mapping() -> impl Strategy<Value = ConfigValue> {
    prop::collection::vec(("[a-f]", value()), 0..5)
        .prop_map(|pairs| ConfigValue::Mapping(pairs.into_iter().collect()))
}

proptest! {
    #[test]
    fn merge_is_deterministic(base in mapping(), overrides in mapping()) {
        let first = merge(&base, &overrides).to_canonical_json();
        let second = merge(&base.clone(), &overrides.clone()).to_canonical_json();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn empty_override_is_identity(base in mapping()) {
        let merged = merge(&base, &ConfigValue::mapping());
        prop_assert_eq!(merged.as_value(), &base);
    }

    #[test]
    fn merging_into_empty_base_keeps_override(overrides in mapping()) {
        let merged = merge(&ConfigValue::mapping(), &overrides);
        prop_assert_eq!(merged.as_value(), &overrides);
    }

    #[test]
    fn sequences_concatenate_without_dedup(
        left in prop::collection::vec(scalar(), 0..6),
        right in prop::collection::vec(scalar(), 0..6),
    ) {
        let merged = merge_values(
            &ConfigValue::Sequence(left.clone()),
            &ConfigValue::Sequence(right.clone()),
        );
        let expected: Vec<_> = left.into_iter().chain(right).collect();
        prop_assert_eq!(merged, ConfigValue::Sequence(expected));
    }

    #[test]
    fn keys_keep_base_order_then_new_keys(base in mapping(), overrides in mapping()) {
        let merged = merge(&base, &overrides);
        let keys: Vec<_> = merged.as_value().as_mapping().unwrap().keys().cloned().collect();

        let base_keys: Vec<_> = base.as_mapping().unwrap().keys().cloned().collect();
        let new_keys: Vec<_> = overrides
            .as_mapping()
            .unwrap()
            .keys()
            .filter(|k| !base_keys.contains(k))
            .cloned()
            .collect();
        let expected: Vec<_> = base_keys.into_iter().chain(new_keys).collect();
        prop_assert_eq!(keys, expected);
    }

    #[test]
    fn scalar_override_wins(key in "[a-f]", old in scalar(), new in scalar()) {
        let base = ConfigValue::Mapping(IndexMap::from([(key.clone(), old)]));
        let overrides = ConfigValue::Mapping(IndexMap::from([(key.clone(), new.clone())]));
        let merged = merge(&base, &overrides);
        prop_assert_eq!(merged.get(&key), Some(&new));
    }
}

#[test]
fn plugin_lists_from_three_layers() {
    let base: ConfigValue = toml::from_str(r#"plugins = ["A", "B"]"#).unwrap();
    let target: ConfigValue = toml::from_str(r#"plugins = ["C"]"#).unwrap();
    let profile: ConfigValue = toml::from_str(r#"plugins = ["D"]"#).unwrap();

    let merged = merge(&merge(&base, &target).as_value().clone(), &profile);
    assert_eq!(merged.to_canonical_json(), r#"{"plugins":["A","B","C","D"]}"#);
}
