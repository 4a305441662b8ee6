// Merge engine properties: identity, commutativity, associativity, conflict policies

use map646_stat::merge::{ConflictPolicy, merge, merge_all, merge_into};
use map646_stat::models::{CounterTree, CounterValue, ValueKind};

fn tree(json: &str) -> CounterTree {
    CounterTree::from_json(json).unwrap()
}

fn samples() -> Vec<CounterTree> {
    vec![
        tree(r#"{"a": 1, "b": {"c": 2, "d": {"e": 5}}}"#),
        tree(r#"{"a": 3, "b": {"c": 4}, "x": 7}"#),
        tree(r#"{"a": 2, "b": {"d": {"f": 1}}, "v6": null}"#),
        tree(r#"{}"#),
        tree(r#"{"v6": {"2001:db8::1": {"udp_out": {"num": 4}}}}"#),
    ]
}

#[test]
fn empty_tree_is_identity_on_both_sides() {
    for t in samples() {
        assert_eq!(merge(&CounterTree::new(), t.clone()).unwrap(), t);
        assert_eq!(merge(&t, CounterTree::new()).unwrap(), t);
    }
}

#[test]
fn merge_is_commutative_for_consistent_shapes() {
    let trees = samples();
    for a in &trees {
        for b in &trees {
            let ab = merge(a, b.clone()).unwrap();
            let ba = merge(b, a.clone()).unwrap();
            assert_eq!(ab, ba, "merge({a:?}, {b:?})");
        }
    }
}

#[test]
fn fold_order_does_not_change_the_result() {
    let trees = samples();
    let (forward, _) = merge_all(&trees, ConflictPolicy::FailFast).unwrap();
    let (backward, _) = merge_all(trees.iter().rev(), ConflictPolicy::FailFast).unwrap();
    let rotated: Vec<_> = trees[2..].iter().chain(&trees[..2]).collect();
    let (rotated, _) = merge_all(rotated, ConflictPolicy::FailFast).unwrap();

    assert_eq!(forward, backward);
    assert_eq!(forward, rotated);
    assert_eq!(
        forward,
        tree(
            r#"{"a": 6, "b": {"c": 6, "d": {"e": 5, "f": 1}}, "x": 7,
                "v6": {"2001:db8::1": {"udp_out": {"num": 4}}}}"#
        )
    );
}

#[test]
fn grouping_does_not_change_the_result() {
    let t = samples();
    let left = merge(&t[2], merge(&t[1], t[0].clone()).unwrap()).unwrap();
    let right = merge(&merge(&t[2], t[1].clone()).unwrap(), t[0].clone()).unwrap();
    assert_eq!(left, right);
}

#[test]
fn source_subtree_is_copied_by_value() {
    let src = tree(r#"{"b": {"c": 1}}"#);
    let mut dst = CounterTree::new();
    merge_into(&src, &mut dst, ConflictPolicy::FailFast).unwrap();
    merge_into(&src, &mut dst, ConflictPolicy::FailFast).unwrap();

    assert_eq!(dst, tree(r#"{"b": {"c": 2}}"#));
    assert_eq!(src, tree(r#"{"b": {"c": 1}}"#));
}

#[test]
fn null_never_overwrites_and_is_replaced() {
    let with_null = tree(r#"{"v4": null, "v6": {"n": 1}}"#);
    let with_data = tree(r#"{"v4": {"n": 2}, "v6": null}"#);

    let a = merge(&with_null, with_data.clone()).unwrap();
    let b = merge(&with_data, with_null.clone()).unwrap();
    assert_eq!(a, tree(r#"{"v4": {"n": 2}, "v6": {"n": 1}}"#));
    assert_eq!(a, b);
}

#[test]
fn fail_fast_reports_path_and_kinds() {
    let err = merge(&tree(r#"{"b": {"c": {"d": 1}}}"#), tree(r#"{"b": {"c": 3}}"#)).unwrap_err();
    assert_eq!(err.path, "b/c");
    assert_eq!(err.existing, ValueKind::Count);
    assert_eq!(err.incoming, ValueKind::Tree);
}

#[test]
fn source_wins_replaces_and_records_conflict() {
    let mut dst = tree(r#"{"a": 3, "k": 1}"#);
    let conflicts = merge_into(
        &tree(r#"{"a": {"x": 1}, "k": 1}"#),
        &mut dst,
        ConflictPolicy::SourceWins,
    )
    .unwrap();

    assert_eq!(dst, tree(r#"{"a": {"x": 1}, "k": 2}"#));
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].path, "a");
}

#[test]
fn skip_keeps_destination_and_continues() {
    let mut dst = tree(r#"{"a": 3, "k": 1}"#);
    let conflicts =
        merge_into(&tree(r#"{"a": {"x": 1}, "k": 1}"#), &mut dst, ConflictPolicy::Skip).unwrap();

    assert_eq!(dst, tree(r#"{"a": 3, "k": 2}"#));
    assert_eq!(conflicts.len(), 1);
    assert_eq!(dst.get("a"), Some(&CounterValue::Count(3)));
}
