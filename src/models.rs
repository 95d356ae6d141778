use std::fmt;

use chrono::{DateTime, Utc};

/// Canonical identifier of a feed, used as the store's partition key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedRef(String);

impl FeedRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of a fetched feed. `id` is only unique within its feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// A feed as returned by a [`FeedSource`](crate::feed::FeedSource).
#[derive(Debug, Clone)]
pub struct Feed {
    pub feed_ref: FeedRef,
    pub title: String,
    pub items: Vec<Item>,
}

/// Items of one feed first seen during the current run, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedUpdate {
    pub title: String,
    pub items: Vec<Item>,
}
