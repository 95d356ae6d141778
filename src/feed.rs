use std::time::Duration;

use feed_rs::model::{Entry, Link};
use feed_rs::parser;
use log::debug;
use reqwest::Client;

use crate::error::FetchError;
use crate::models::{Feed, FeedRef, Item};

/// Something that can turn a feed URL into its current contents.
#[allow(async_fn_in_trait)]
pub trait FeedSource {
    async fn fetch(&self, url: &str) -> Result<Feed, FetchError>;
}

/// Fetches RSS/Atom documents over HTTP.
pub struct HttpFeedSource {
    client: Client,
}

impl HttpFeedSource {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Parse a fetched document. `location` is the URL the document was
    /// finally served from, used as the feed's identity when the document
    /// does not name itself.
    pub fn parse(location: &str, body: &[u8]) -> Result<Feed, FetchError> {
        let feed = parser::parse(body)?;

        let feed_ref = feed
            .links
            .iter()
            .find(|link| link.rel.as_deref() == Some("self"))
            .map(|link| FeedRef::new(link.href.trim()))
            .unwrap_or_else(|| FeedRef::new(location));

        let title = feed
            .title
            .map(|t| t.content.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| feed_ref.to_string());

        let items = feed.entries.into_iter().map(entry_to_item).collect();

        Ok(Feed {
            feed_ref,
            title,
            items,
        })
    }
}

impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str) -> Result<Feed, FetchError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let location = response.url().to_string();
        if location != url {
            debug!("{} redirected to {}", url, location);
        }
        let bytes = response.bytes().await?;
        Self::parse(&location, &bytes[..])
    }
}

fn entry_to_item(entry: Entry) -> Item {
    let link = primary_link(&entry.links)
        .map(|l| l.href.clone())
        .unwrap_or_default();

    Item {
        id: entry.id,
        title: entry
            .title
            .map(|t| t.content.trim().to_string())
            .unwrap_or_default(),
        link,
        published_at: entry.published.or(entry.updated),
    }
}

/// Prefer the `alternate` (or unlabelled) link, then whatever comes first.
fn primary_link(links: &[Link]) -> Option<&Link> {
    links
        .iter()
        .find(|l| l.rel.as_deref().is_none_or(|rel| rel == "alternate"))
        .or_else(|| links.first())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example News</title>
    <link>https://news.example.com/</link>
    <item>
      <title>Second story</title>
      <link>https://news.example.com/2</link>
      <guid>story-2</guid>
      <pubDate>Tue, 02 Jan 2024 12:00:00 +0000</pubDate>
    </item>
    <item>
      <title>First story</title>
      <link>https://news.example.com/1</link>
      <guid>story-1</guid>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Blog</title>
  <id>urn:uuid:60a76c80-d399-11d9-b93C-0003939e0af6</id>
  <link rel="self" href="https://blog.example.com/atom.xml"/>
  <link href="https://blog.example.com/"/>
  <updated>2024-03-01T10:00:00Z</updated>
  <entry>
    <title>Hello</title>
    <id>urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a</id>
    <link rel="alternate" href="https://blog.example.com/hello"/>
    <updated>2024-03-01T10:00:00Z</updated>
  </entry>
</feed>"#;

    #[test]
    fn rss_items_keep_document_order() {
        let feed = HttpFeedSource::parse("https://news.example.com/rss", RSS.as_bytes()).unwrap();

        assert_eq!(feed.title, "Example News");
        assert_eq!(feed.items.len(), 2);
        assert_eq!(feed.items[0].id, "story-2");
        assert_eq!(feed.items[0].title, "Second story");
        assert_eq!(feed.items[0].link, "https://news.example.com/2");
        assert_eq!(
            feed.items[0].published_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap())
        );
        assert_eq!(feed.items[1].id, "story-1");
        assert!(feed.items[1].published_at.is_none());
    }

    #[test]
    fn fetch_location_identifies_feed_without_self_link() {
        let feed = HttpFeedSource::parse("https://news.example.com/rss", RSS.as_bytes()).unwrap();
        assert_eq!(feed.feed_ref.as_str(), "https://news.example.com/rss");
    }

    #[test]
    fn self_link_identifies_feed_regardless_of_location() {
        let feed =
            HttpFeedSource::parse("https://mirror.example.net/feed", ATOM.as_bytes()).unwrap();

        assert_eq!(feed.feed_ref.as_str(), "https://blog.example.com/atom.xml");
        assert_eq!(feed.title, "Example Blog");
        assert_eq!(feed.items[0].link, "https://blog.example.com/hello");
        assert_eq!(
            feed.items[0].published_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = HttpFeedSource::parse("https://x.example/", b"<html>nope").unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }
}
