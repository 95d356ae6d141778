use log::{debug, info, warn};

use crate::db::{SeenItems, SeenStore, SeenTransaction};
use crate::detector::detect;
use crate::error::{NotifyError, StoreError};
use crate::feed::FeedSource;
use crate::models::{Feed, FeedUpdate};
use crate::notify::Notifier;
use crate::report::{Report, aggregate};

/// Whether a run records what it found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Commit,
    /// Detect as usual, then roll everything back.
    DryRun,
}

pub struct RunOutcome {
    pub report: Report,
    /// Result of finishing the store transaction. Detection already
    /// happened, so the report is valid either way.
    pub commit: Result<(), StoreError>,
}

/// Check every feed once inside a single store transaction.
///
/// A feed that fails to fetch, or whose store access fails, is logged and
/// skipped; everything else in the run still goes through. Failing to start
/// the transaction is an error, and so is finding the store locked by
/// another process: nothing this run does could be recorded.
pub async fn run<S: FeedSource>(
    store: &SeenStore,
    source: &S,
    feeds: &[String],
    mode: RunMode,
) -> Result<RunOutcome, StoreError> {
    let mut tx = store.begin().await?;
    let mut results = Vec::with_capacity(feeds.len());
    let mut failed = 0;

    for url in feeds {
        let feed = match source.fetch(url).await {
            Ok(feed) => feed,
            Err(e) => {
                warn!("failed fetching feed '{}': {}", url, e);
                failed += 1;
                continue;
            }
        };

        let feed_ref = feed.feed_ref.clone();
        match check_feed(&mut tx, feed).await {
            Ok(update) => {
                debug!("{}: {} new items", feed_ref, update.items.len());
                results.push(update);
            }
            Err(e) if e.is_busy() => return Err(e),
            Err(e) => {
                warn!("failed recording feed '{}': {}", feed_ref, e);
                failed += 1;
            }
        }
    }

    let report = aggregate(results);
    info!(
        "checked {} feeds: {} new items in {} feeds, {} failed",
        feeds.len(),
        report.item_count(),
        report.updates().len(),
        failed
    );

    let commit = match mode {
        RunMode::Commit => tx.commit().await,
        RunMode::DryRun => {
            info!("dry run, discarding store changes");
            tx.rollback().await
        }
    };

    Ok(RunOutcome { report, commit })
}

/// Detect one feed's new items inside its own savepoint.
async fn check_feed(tx: &mut SeenTransaction, feed: Feed) -> Result<FeedUpdate, StoreError> {
    let Feed {
        feed_ref,
        title,
        items,
    } = feed;

    let mut scope = tx.feed_scope().await?;
    scope.ensure_partition(&feed_ref).await?;
    let items = detect(&feed_ref, items, &mut scope).await?;
    scope.commit().await?;

    Ok(FeedUpdate { title, items })
}

/// Hand a non-empty report to the notifier. Returns whether anything was
/// sent.
pub async fn deliver<N: Notifier>(report: &Report, notifier: &N) -> Result<bool, NotifyError> {
    if report.is_empty() {
        info!("no new items, nothing to send");
        return Ok(false);
    }
    notifier.deliver(report).await?;
    Ok(true)
}
