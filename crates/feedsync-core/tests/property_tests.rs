//! Property-based tests for snapshot ordering, stored names and form rules
//!
//! Uses proptest to verify invariants that must hold for any input.

use std::collections::HashSet;

use feedsync_core::media::{random_prefix, stored_name, NAME_ALPHABET, NAME_PREFIX_LEN};
use feedsync_core::sync::{RemoteDocument, SnapshotBuilder, TIMESTAMP_FIELD};
use feedsync_core::{
    CollectionRef, CreatedAt, DocId, LoginForm, MediaFile, Post, RegistrationForm, MIN_PASSWORD_LEN,
};
use proptest::prelude::*;
use serde_json::{json, Value};

// ============================================================================
// Strategy Generators
// ============================================================================

/// A document timestamp: pending (`None`) or one of a few millisecond values,
/// so ties are common
fn timestamp_strategy() -> impl Strategy<Value = Option<i64>> {
    prop_oneof![
        1 => Just(None),
        4 => (1_700_000_000_000i64..1_700_000_000_008).prop_map(Some),
    ]
}

fn snapshot_strategy(max_docs: usize) -> impl Strategy<Value = Vec<Option<i64>>> {
    prop::collection::vec(timestamp_strategy(), 0..max_docs)
}

fn original_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 ._-]{1,40}").expect("valid regex")
}

fn remote_post(index: usize, timestamp: Option<i64>) -> RemoteDocument {
    let timestamp = timestamp.map(Value::from).unwrap_or(Value::Null);
    RemoteDocument {
        id: DocId::new(format!("doc-{:03}", index)),
        fields: json!({
            "avatar": "",
            "image": "",
            "text": format!("post {}", index),
            "username": "ann",
            TIMESTAMP_FIELD: timestamp,
        })
        .as_object()
        .cloned()
        .expect("object literal"),
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Every snapshot is newest first, pending entries before all assigned ones
    #[test]
    fn prop_snapshot_is_newest_first(timestamps in snapshot_strategy(40)) {
        let docs: Vec<_> = timestamps
            .iter()
            .enumerate()
            .map(|(i, ts)| remote_post(i, *ts))
            .collect();
        let mut builder = SnapshotBuilder::new();
        let snapshot = builder.build::<Post>(&CollectionRef::Posts, docs);

        prop_assert_eq!(snapshot.len(), timestamps.len());
        for pair in snapshot.items().windows(2) {
            prop_assert!(pair[0].created_at >= pair[1].created_at);
        }

        let first_assigned = snapshot
            .iter()
            .position(|post| !post.created_at.is_pending())
            .unwrap_or(snapshot.len());
        prop_assert!(snapshot.items()[first_assigned..]
            .iter()
            .all(|post| !post.created_at.is_pending()));
    }

    /// Equal timestamps keep arrival order, earliest arrival first
    #[test]
    fn prop_ties_keep_arrival_order(timestamps in snapshot_strategy(40)) {
        let docs: Vec<_> = timestamps
            .iter()
            .enumerate()
            .map(|(i, ts)| remote_post(i, *ts))
            .collect();
        let mut builder = SnapshotBuilder::new();
        let snapshot = builder.build::<Post>(&CollectionRef::Posts, docs);

        for pair in snapshot.items().windows(2) {
            if pair[0].created_at == pair[1].created_at {
                prop_assert!(pair[0].id < pair[1].id);
            }
        }
    }

    /// A document keeps its arrival rank when it moves from pending to
    /// committed, and sequence numbers keep increasing
    #[test]
    fn prop_rebuild_is_stable(timestamps in snapshot_strategy(20), commit_at in 1_700_000_000_010i64..1_700_000_000_020) {
        let mut builder = SnapshotBuilder::new();
        let first_docs: Vec<_> = timestamps
            .iter()
            .enumerate()
            .map(|(i, ts)| remote_post(i, *ts))
            .collect();
        let first = builder.build::<Post>(&CollectionRef::Posts, first_docs);

        let committed: Vec<_> = timestamps
            .iter()
            .enumerate()
            .map(|(i, ts)| remote_post(i, Some(ts.unwrap_or(commit_at))))
            .collect();
        let second = builder.build::<Post>(&CollectionRef::Posts, committed);

        prop_assert!(second.sequence() > first.sequence());
        prop_assert!(second.iter().all(|post| !post.created_at.is_pending()));
        let ids: HashSet<_> = first.ids().into_iter().collect();
        prop_assert_eq!(ids, second.ids().into_iter().collect::<HashSet<_>>());
    }

    /// Stored names are `<16 alphabet symbols>_<original>`
    #[test]
    fn prop_stored_name_shape(original in original_name_strategy()) {
        let name = stored_name(&original);
        let (prefix, rest) = name.split_at(NAME_PREFIX_LEN);
        prop_assert!(prefix.bytes().all(|b| NAME_ALPHABET.contains(&b)));
        prop_assert_eq!(rest, format!("_{}", original));
    }

    /// Same-named uploads never share a stored name
    #[test]
    fn prop_same_name_distinct(original in original_name_strategy()) {
        let names: HashSet<_> = (0..16).map(|_| stored_name(&original)).collect();
        prop_assert_eq!(names.len(), 16);
    }

    /// Registration is submittable exactly when every field is present and
    /// the password is long enough
    #[test]
    fn prop_registration_validation(
        username in "[a-z]{0,3}",
        email in "[a-z@.]{0,3}",
        password in "\\PC{0,8}",
        with_avatar in any::<bool>(),
    ) {
        let form = RegistrationForm {
            username: username.clone(),
            email: email.clone(),
            password: password.clone(),
            avatar: with_avatar.then(|| MediaFile::new("me.png", vec![1u8])),
        };
        let expected = !username.is_empty()
            && !email.is_empty()
            && with_avatar
            && password.chars().count() >= MIN_PASSWORD_LEN;
        prop_assert_eq!(form.can_submit(), expected);

        let login = LoginForm::new(email.clone(), password.clone());
        prop_assert_eq!(
            login.can_submit(),
            !email.is_empty() && password.chars().count() >= MIN_PASSWORD_LEN
        );
    }
}

// ============================================================================
// Deterministic checks
// ============================================================================

#[test]
fn test_prefix_uses_whole_alphabet() {
    let mut seen = HashSet::new();
    for _ in 0..2_000 {
        seen.extend(random_prefix().bytes());
    }
    assert_eq!(seen.len(), NAME_ALPHABET.len());
}

#[test]
fn test_pending_is_newest() {
    let newest_assigned = CreatedAt::from_millis(4_102_444_800_000).unwrap();
    assert!(CreatedAt::Pending > newest_assigned);
}
