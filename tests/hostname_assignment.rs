//! Batch-level properties of hostname assignment.

use std::collections::BTreeSet;

use fleetup::hostname::{assign, has_marker, increment};
use rstest::rstest;

#[rstest]
#[case("web-%s.example.com")]
#[case("node%")]
#[case("%s-worker")]
fn marked_templates_yield_distinct_names(#[case] template: &str) {
    assert!(has_marker(template));
    let names: BTreeSet<_> = (0..50)
        .filter_map(|offset| assign(Some(template), 1, offset))
        .collect();
    assert_eq!(names.len(), 50);
}

#[rstest]
fn unmarked_template_repeats_for_every_instance() {
    let names: Vec<_> = (0..3)
        .filter_map(|offset| assign(Some("bastion"), 1, offset))
        .collect();
    assert_eq!(names, vec!["bastion"; 3]);
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(-5)]
#[case(1_000)]
fn first_name_uses_seed(#[case] seed: i64) {
    assert_eq!(assign(Some("h%s"), seed, 0), Some(increment("h%s", seed)));
    assert_eq!(assign(Some("h%s"), seed, 0), Some(format!("h{seed}")));
}

#[rstest]
fn literal_text_around_marker_is_preserved() {
    assert_eq!(increment("a-%s-b", 3), "a-3-b");
    assert_eq!(increment("50%off", 2), "502off");
}

#[rstest]
#[case("a-%s-%-b")]
#[case("db-%s-%s")]
fn template_with_several_markers_repeats_verbatim(#[case] template: &str) {
    assert!(!has_marker(template));
    let names: Vec<_> = (0..3)
        .filter_map(|offset| assign(Some(template), 1, offset))
        .collect();
    assert_eq!(names, vec![template; 3]);
}
