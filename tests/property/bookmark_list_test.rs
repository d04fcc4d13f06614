//! Property-based tests for BookmarkList and bookmark input parsing.
//!
//! These cover the list operations the controller relies on: prepending a
//! confirmed record, optimistic removal, and URL canonicalization.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use smartmarks::types::bookmark::{BookmarkList, BookmarkRecord, NewBookmark};

/// Strategy for generating valid URL strings.
/// Produces URLs with http/https scheme, alphanumeric host, and optional path.
fn arb_url() -> impl Strategy<Value = String> {
    (
        prop_oneof![Just("https"), Just("http")],
        "[a-z][a-z0-9]{2,15}",
        prop_oneof![Just(".com"), Just(".org"), Just(".dev"), Just(".io")],
        proptest::option::of("/[a-z0-9]{1,10}"),
    )
        .prop_map(|(scheme, host, tld, path)| {
            format!("{}://{}{}{}", scheme, host, tld, path.unwrap_or_default())
        })
}

/// Strategy for a newest-first list with unique ids.
fn arb_list() -> impl Strategy<Value = Vec<BookmarkRecord>> {
    proptest::collection::btree_set("[a-z0-9]{4,8}", 0..12).prop_map(|ids| {
        let count = ids.len() as i64;
        ids.into_iter()
            .enumerate()
            .map(|(i, id)| BookmarkRecord {
                url: format!("https://{}.example/", id),
                title: format!("Title {}", id),
                id,
                user_id: "u1".to_string(),
                created_at: Utc.timestamp_opt(1_700_000_000 + count - i as i64, 0).unwrap(),
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Prepending a new record puts it first and keeps everything else in order.
    #[test]
    fn prepend_puts_record_first(records in arb_list(), id in "new-[a-z0-9]{6}") {
        let mut list = BookmarkList::from_records(records.clone());
        let fresh = BookmarkRecord {
            id,
            user_id: "u1".to_string(),
            title: "Fresh".to_string(),
            url: "https://fresh.example/".to_string(),
            created_at: Utc.timestamp_opt(1_800_000_000, 0).unwrap(),
        };

        list.prepend(fresh.clone());

        prop_assert_eq!(&list.records()[0], &fresh);
        prop_assert_eq!(&list.records()[1..], records.as_slice());
    }

    /// A record a refresh already delivered is never listed twice.
    #[test]
    fn prepend_existing_id_does_not_duplicate(records in arb_list(), pick in any::<prop::sample::Index>()) {
        prop_assume!(!records.is_empty());
        let existing = records[pick.index(records.len())].clone();
        let mut list = BookmarkList::from_records(records.clone());

        list.prepend(existing.clone());

        prop_assert_eq!(list.len(), records.len());
        prop_assert_eq!(&list.records()[0], &existing);
        prop_assert_eq!(list.iter().filter(|r| r.id == existing.id).count(), 1);
    }

    /// Removing an id drops exactly that record and preserves order.
    #[test]
    fn remove_drops_exactly_one(records in arb_list(), pick in any::<prop::sample::Index>()) {
        prop_assume!(!records.is_empty());
        let target = records[pick.index(records.len())].id.clone();
        let mut list = BookmarkList::from_records(records.clone());

        prop_assert!(list.remove(&target));

        let expected: Vec<BookmarkRecord> =
            records.into_iter().filter(|r| r.id != target).collect();
        prop_assert_eq!(list.into_records(), expected);
    }

    /// Removing an unknown id changes nothing.
    #[test]
    fn remove_unknown_is_no_op(records in arb_list()) {
        let mut list = BookmarkList::from_records(records.clone());
        prop_assert!(!list.remove("missing-id"));
        prop_assert_eq!(list.into_records(), records);
    }

    /// Parsed URLs are canonical: parsing the output again yields the same string.
    #[test]
    fn parsed_url_is_canonical(url in arb_url(), title in "[a-zA-Z][a-zA-Z0-9 ]{0,20}") {
        let first = NewBookmark::parse("u1", &format!("  {}  ", title), &format!(" {} ", url)).unwrap();
        let second = NewBookmark::parse("u1", &first.title, &first.url).unwrap();

        prop_assert_eq!(&first.title, title.trim());
        prop_assert_eq!(first, second);
    }

    /// Strings without a scheme never parse.
    #[test]
    fn schemeless_input_is_rejected(host in "[a-z][a-z0-9]{2,15}\\.(com|dev)") {
        prop_assert!(NewBookmark::parse("u1", "Title", &host).is_err());
    }
}
