//! Change detection from listing summaries.
//!
//! The composite rule: an item is **New** when it has no fingerprint,
//! **Changed** when its marker is strictly newer than the stored one or its
//! sub-element count differs, and **Unchanged** otherwise. Only summary
//! fields are consulted, so classification never needs the item body.

use crate::models::{Classification, Fingerprint, RemoteItem};

pub fn classify(item: &RemoteItem, fingerprint: Option<&Fingerprint>) -> Classification {
    match fingerprint {
        None => Classification::New,
        Some(fp) if item.marker > fp.marker || item.sub_count != fp.sub_count => {
            Classification::Changed
        }
        Some(_) => Classification::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(marker: i64, sub_count: i64) -> RemoteItem {
        RemoteItem {
            source_id: "42".into(),
            marker,
            title: Some("Release notes".into()),
            sub_count,
        }
    }

    fn fp(marker: i64, sub_count: i64) -> Fingerprint {
        Fingerprint {
            source: "forum".into(),
            source_id: "42".into(),
            marker,
            sub_count,
            content_hash: "abc".into(),
            chunk_count: 2,
            synced_at: 0,
        }
    }

    #[test]
    fn test_no_fingerprint_is_new() {
        for (marker, count) in [(0, 0), (1_700_000_000, 5), (-1, 1)] {
            assert_eq!(classify(&item(marker, count), None), Classification::New);
        }
    }

    #[test]
    fn test_newer_marker_is_changed() {
        assert_eq!(
            classify(&item(101, 5), Some(&fp(100, 5))),
            Classification::Changed
        );
    }

    #[test]
    fn test_count_change_is_changed_even_with_same_marker() {
        assert_eq!(
            classify(&item(100, 7), Some(&fp(100, 5))),
            Classification::Changed
        );
        // A deleted post lowers the count
        assert_eq!(
            classify(&item(100, 4), Some(&fp(100, 5))),
            Classification::Changed
        );
    }

    #[test]
    fn test_identical_summary_is_unchanged() {
        let c = classify(&item(100, 5), Some(&fp(100, 5)));
        assert_eq!(c, Classification::Unchanged);
        assert!(!c.needs_fetch());
    }

    #[test]
    fn test_older_marker_same_count_is_unchanged() {
        assert_eq!(
            classify(&item(99, 5), Some(&fp(100, 5))),
            Classification::Unchanged
        );
    }
}
