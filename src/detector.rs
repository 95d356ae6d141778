use log::debug;

use crate::db::SeenItems;
use crate::error::StoreError;
use crate::models::{FeedRef, Item};

/// Return the items of `feed` that have not been seen before, marking each
/// one as seen as it is found.
///
/// Items keep the order the feed listed them in. Marks are written through
/// `seen` immediately, so a repeated id later in the same list is treated
/// as already seen.
pub async fn detect<S: SeenItems>(
    feed: &FeedRef,
    items: Vec<Item>,
    seen: &mut S,
) -> Result<Vec<Item>, StoreError> {
    let mut fresh = Vec::new();

    for item in items {
        if seen.contains(feed, &item.id).await? {
            continue;
        }

        debug!("new item '{}' in {}", item.id, feed);
        seen.mark_seen(feed, &item.id).await?;
        fresh.push(item);
    }

    Ok(fresh)
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::*;
    use crate::db::SeenStore;

    /// In-memory store that counts writes.
    #[derive(Default)]
    struct MemorySeen {
        items: HashMap<FeedRef, HashSet<String>>,
        writes: usize,
        fail_on: Option<String>,
    }

    impl SeenItems for MemorySeen {
        async fn ensure_partition(&mut self, feed: &FeedRef) -> Result<(), StoreError> {
            self.items.entry(feed.clone()).or_default();
            Ok(())
        }

        async fn contains(&mut self, feed: &FeedRef, item_id: &str) -> Result<bool, StoreError> {
            Ok(self
                .items
                .get(feed)
                .is_some_and(|ids| ids.contains(item_id)))
        }

        async fn mark_seen(&mut self, feed: &FeedRef, item_id: &str) -> Result<(), StoreError> {
            if self.fail_on.as_deref() == Some(item_id) {
                return Err(StoreError::Database(sqlx::Error::PoolClosed));
            }
            self.writes += 1;
            self.items
                .entry(feed.clone())
                .or_default()
                .insert(item_id.to_string());
            Ok(())
        }
    }

    fn item(id: &str) -> Item {
        Item {
            id: id.to_string(),
            title: format!("Post {id}"),
            link: format!("https://example.com/{id}"),
            published_at: None,
        }
    }

    fn ids(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[tokio::test]
    async fn reports_only_unseen_items_in_source_order() {
        let a = FeedRef::new("A");
        let mut seen = MemorySeen::default();
        seen.mark_seen(&a, "1").await.unwrap();
        seen.mark_seen(&a, "2").await.unwrap();

        let fresh = detect(&a, vec![item("3"), item("1"), item("0"), item("2")], &mut seen)
            .await
            .unwrap();

        assert_eq!(ids(&fresh), ["3", "0"]);
        assert_eq!(seen.writes, 4);
    }

    #[tokio::test]
    async fn second_pass_over_unchanged_feed_is_empty() {
        let a = FeedRef::new("A");
        let mut seen = MemorySeen::default();
        let items = vec![item("1"), item("2")];

        let first = detect(&a, items.clone(), &mut seen).await.unwrap();
        let writes_after_first = seen.writes;
        let second = detect(&a, items, &mut seen).await.unwrap();

        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
        assert_eq!(seen.writes, writes_after_first);
    }

    #[tokio::test]
    async fn duplicate_ids_are_reported_and_marked_once() {
        let a = FeedRef::new("A");
        let mut seen = MemorySeen::default();

        let fresh = detect(&a, vec![item("x"), item("y"), item("x")], &mut seen)
            .await
            .unwrap();

        assert_eq!(ids(&fresh), ["x", "y"]);
        assert_eq!(seen.writes, 2);
    }

    #[tokio::test]
    async fn store_failure_aborts_detection() {
        let a = FeedRef::new("A");
        let mut seen = MemorySeen {
            fail_on: Some("2".to_string()),
            ..Default::default()
        };

        let result = detect(&a, vec![item("1"), item("2"), item("3")], &mut seen).await;

        assert!(result.is_err());
        assert!(!seen.contains(&a, "3").await.unwrap());
    }

    #[tokio::test]
    async fn previously_seen_items_are_skipped_in_sqlite_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SeenStore::open(dir.path().join("db")).await.unwrap();
        let a = FeedRef::new("A");

        let mut tx = store.begin().await.unwrap();
        tx.ensure_partition(&a).await.unwrap();
        tx.mark_seen(&a, "1").await.unwrap();
        tx.mark_seen(&a, "2").await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let fresh = detect(&a, vec![item("1"), item("2"), item("3")], &mut tx)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(ids(&fresh), ["3"]);

        let mut tx = store.begin().await.unwrap();
        for id in ["1", "2", "3"] {
            assert!(tx.contains(&a, id).await.unwrap());
        }
    }
}
