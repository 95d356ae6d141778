use crate::models::FeedUpdate;

/// Everything new in a run, one entry per feed that had new items, in the
/// order the feeds were configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    updates: Vec<FeedUpdate>,
}

impl Report {
    pub fn updates(&self) -> &[FeedUpdate] {
        &self.updates
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Total number of new items across all feeds.
    pub fn item_count(&self) -> usize {
        self.updates.iter().map(|u| u.items.len()).sum()
    }
}

/// Build a [`Report`] from per-feed results, dropping feeds with nothing new.
pub fn aggregate(per_feed: impl IntoIterator<Item = FeedUpdate>) -> Report {
    Report {
        updates: per_feed
            .into_iter()
            .filter(|update| !update.items.is_empty())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Item;

    fn update(title: &str, ids: &[&str]) -> FeedUpdate {
        FeedUpdate {
            title: title.to_string(),
            items: ids
                .iter()
                .map(|id| Item {
                    id: id.to_string(),
                    title: id.to_string(),
                    link: format!("https://example.com/{id}"),
                    published_at: None,
                })
                .collect(),
        }
    }

    #[test]
    fn empty_input_gives_empty_report() {
        let report = aggregate(Vec::<FeedUpdate>::new());
        assert!(report.is_empty());
        assert_eq!(report.item_count(), 0);
    }

    #[test]
    fn feeds_without_new_items_are_dropped() {
        let report = aggregate(vec![update("A", &[]), update("B", &["1"])]);

        assert_eq!(report.updates().len(), 1);
        assert_eq!(report.updates()[0].title, "B");
    }

    #[test]
    fn configured_order_is_kept() {
        let report = aggregate(vec![
            update("Zeta", &["9", "8"]),
            update("Empty", &[]),
            update("Alpha", &["1"]),
        ]);

        let titles: Vec<_> = report.updates().iter().map(|u| u.title.as_str()).collect();
        assert_eq!(titles, ["Zeta", "Alpha"]);
        assert_eq!(report.updates()[0].items[0].id, "9");
        assert_eq!(report.item_count(), 3);
    }
}
