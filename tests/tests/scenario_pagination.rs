//! spec.md §8 concrete scenario: paginating `List` over 200 projects written
//! in timestamp groups of three, filtering by `min_timestamp_micros` and
//! walking `page_token` to exhaustion.

mod common;

use common::Harness;
use falken_core::{Project, ResourceId};
use falken_store::ListOptions;

#[tokio::test]
async fn pages_through_two_hundred_projects_honoring_min_timestamp() {
    let harness = Harness::new(0.5, 600).await;
    let store = harness.storage.resource_store();

    // 200 projects, three per timestamp group (so the tie-break on
    // resource id within a group is exercised), zero-padded so lexicographic
    // order within a group matches numeric order.
    for i in 0..200u32 {
        let project = Project { project_id: format!("p{i:03}") };
        let timestamp_micros = 1_000 + i64::from(i / 3);
        store.write(project, Some(timestamp_micros)).await.unwrap();
    }

    let glob = ResourceId::from_raw("projects/*");
    let options = ListOptions {
        min_timestamp_micros: 1_003,
        page_size: Some(3),
        ..Default::default()
    };

    let mut collected = Vec::new();
    let mut page_token = None;
    loop {
        let opts = ListOptions { page_token: page_token.clone(), ..options.clone() };
        let (page, next_token) = store.list(&glob, &opts).await.unwrap();
        if page.is_empty() {
            assert!(next_token.is_none());
            break;
        }
        collected.extend(page.into_iter().map(|rid| rid.path().to_string()));
        if next_token.is_none() {
            break;
        }
        page_token = next_token;
    }

    // Groups 0..2 (ids p000..p008, timestamps 1000..1002) are excluded by
    // min_timestamp_micros=1003; p009 onward (timestamp 1003+) survive.
    let expected: Vec<String> = (9..200)
        .map(|i| format!("projects/p{i:03}"))
        .collect();
    assert_eq!(collected, expected);
    assert_eq!(collected.len(), 191);

    // Out-of-range min_timestamp_micros yields an immediately empty page.
    let empty_options = ListOptions {
        min_timestamp_micros: 10_000,
        page_size: Some(3),
        ..Default::default()
    };
    let (page, next_token) = store.list(&glob, &empty_options).await.unwrap();
    assert!(page.is_empty());
    assert!(next_token.is_none());
}
