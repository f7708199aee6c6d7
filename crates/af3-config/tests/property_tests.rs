use af3_config::{Composer, ConfigNode, ConfigRegistry, GroupSelection, Value, merge_nodes};
use proptest::prelude::*;

// Trees without nulls or placeholders: every kind is known up front, so a
// merge either succeeds or conflicts regardless of grouping.
fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::Integer),
        any::<bool>().prop_map(Value::Bool),
        "[a-z]{1,8}".prop_map(Value::String),
        prop::collection::vec(0i64..100, 0..4).prop_map(Value::from),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(3, 24, 4, |inner| {
        prop::collection::btree_map("[a-d]", inner, 0..4)
            .prop_map(|entries| Value::Node(entries.into_iter().collect()))
    })
}

fn tree() -> impl Strategy<Value = ConfigNode> {
    prop::collection::btree_map("[a-d]", value(), 0..4)
        .prop_map(|entries| entries.into_iter().collect())
}

fn merged(base: &ConfigNode, overlay: &ConfigNode) -> Option<ConfigNode> {
    let mut out = base.clone();
    merge_nodes(&mut out, overlay).ok().map(|_| out)
}

proptest! {
    #[test]
    fn test_merge_is_associative(a in tree(), b in tree(), c in tree()) {
        let left = merged(&a, &b).and_then(|ab| merged(&ab, &c));
        let right = merged(&b, &c).and_then(|bc| merged(&a, &bc));

        prop_assert_eq!(left, right);
    }

    #[test]
    fn test_merge_with_self_is_identity(a in tree()) {
        prop_assert_eq!(merged(&a, &a), Some(a));
    }

    #[test]
    fn test_defaults_fold_matches_overlay(a in tree(), b in tree(), c in tree()) {
        let mut registry = ConfigRegistry::new();
        registry.register("g", "a", a);
        registry.register("g", "b", b);
        registry.register("g", "c", c.clone());
        let composer = Composer::new(&registry);
        let select = |names: &[&str]| -> Vec<GroupSelection> {
            names.iter().map(|n| GroupSelection::new("g", *n)).collect()
        };

        let folded = composer.compose(&select(&["a", "b", "c"]), None).ok();
        let overlay: ConfigNode = [("g", Value::Node(c))].into_iter().collect();
        let layered = composer.compose(&select(&["a", "b"]), Some(&overlay)).ok();

        prop_assert_eq!(folded, layered);
    }

    #[test]
    fn test_registry_returns_what_was_stored(a in tree(), name in "[a-z]{1,6}") {
        let mut registry = ConfigRegistry::new();
        registry.register("model", name.clone(), a.clone());

        prop_assert_eq!(registry.get("model", &name).unwrap(), &a);
    }
}
