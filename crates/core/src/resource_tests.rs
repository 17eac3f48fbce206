// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    aws    = { "aws",    BackendType::Aws,    false },
    gcp    = { "GCP",    BackendType::Gcp,    false },
    docker = { "docker", BackendType::Docker, true },
)]
fn backend_type_parses_and_classifies(input: &str, expected: BackendType, local: bool) {
    let parsed: BackendType = input.parse().unwrap();
    assert_eq!(parsed, expected);
    assert_eq!(parsed.is_local(), local);
}

#[test]
fn backend_type_rejects_unknown() {
    assert!("azure".parse::<BackendType>().is_err());
}

#[test]
fn resource_ref_display_names_kind_and_id() {
    let r = ResourceRef::new("i-123", "builder", ResourceKind::Instance, BackendType::Aws);
    assert_eq!(r.to_string(), "instance builder (i-123)");
}

#[test]
fn resource_tag_lookup() {
    let mut tags = Tags::new();
    tags.insert("owner".into(), "ops".into());
    let res = Resource {
        reference: ResourceRef::new("v-1", "data", ResourceKind::Volume, BackendType::Gcp)
            .with_zone("us-central1-a"),
        tags,
        created_at_ms: 10,
        state: LifecycleState::Running,
    };
    assert_eq!(res.tag("owner"), Some("ops"));
    assert_eq!(res.tag("missing"), None);
    assert!(!res.is_terminated());
    assert_eq!(res.reference.zone.as_deref(), Some("us-central1-a"));
}
