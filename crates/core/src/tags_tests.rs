// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn empty_filter_matches_everything() {
    assert!(TagFilter::new().matches(&Tags::new()));
    assert!(TagFilter::new().is_empty());
}

#[test]
fn filter_requires_every_pair() {
    let filter = TagFilter::new().with(TYPE, TYPE_TEMPLATE).with(TEMPLATE_VERSION, "agi-amd64-5");
    let full = from_pairs([(TYPE, TYPE_TEMPLATE), (TEMPLATE_VERSION, "agi-amd64-5"), ("x", "y")]);
    let partial = from_pairs([(TYPE, TYPE_TEMPLATE)]);
    let wrong = from_pairs([(TYPE, TYPE_TEMPLATE), (TEMPLATE_VERSION, "agi-arm64-5")]);

    assert!(filter.matches(&full));
    assert!(!filter.matches(&partial));
    assert!(!filter.matches(&wrong));
}
