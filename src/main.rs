use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};

mod config;
mod db;
mod detector;
mod error;
mod feed;
mod logger;
mod models;
mod notify;
mod report;
mod run;

use config::{MailSettings, Settings};
use db::SeenStore;
use feed::HttpFeedSource;
use notify::{Envelope, MailNotifier};
use run::RunMode;

/// Looks for new entries in RSS/Atom feeds and sends one e-mail listing them.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address the e-mail is sent to [default: user@host]
    #[arg(long)]
    to: Option<String>,

    /// Address the e-mail is sent from [default: user@host]
    #[arg(long)]
    from: Option<String>,

    /// Subject of the e-mail
    #[arg(long)]
    subject: Option<String>,

    /// SMTP server as host:port
    #[arg(long)]
    addr: Option<String>,

    /// File listing feed URLs, one per line
    #[arg(long)]
    feeds: Option<PathBuf>,

    /// Database recording which items were already sent
    #[arg(long)]
    db: Option<PathBuf>,

    /// YAML settings file; flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Per-feed fetch timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// off, error, warn, info, debug or trace
    #[arg(long)]
    log_level: Option<String>,

    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print the message instead of sending it and don't record anything
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Feed URLs to check in addition to the feed list file
    urls: Vec<String>,
}

impl Args {
    fn into_settings(self) -> Settings {
        Settings {
            feeds: self.urls,
            feeds_file: self.feeds,
            db: self.db,
            fetch_timeout_secs: self.timeout,
            log_level: self.log_level,
            log_file: self.log_file,
            mail: MailSettings {
                to: self.to,
                from: self.from,
                subject: self.subject,
                addr: self.addr,
            },
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mode = if args.dry_run {
        RunMode::DryRun
    } else {
        RunMode::Commit
    };

    let base = match &args.config {
        Some(path) => Settings::load(path).await?,
        None => Settings::default(),
    };
    let config = base.overlay(args.into_settings()).resolve().await?;
    logger::init(&config.log)?;

    if config.run.feeds.is_empty() {
        warn!("no feeds configured");
    }

    let notifier = match mode {
        RunMode::Commit => Some(MailNotifier::new(config.mail.clone())?),
        RunMode::DryRun => None,
    };

    let store = SeenStore::open(&config.run.db_path)
        .await
        .with_context(|| format!("failed to open {}", config.run.db_path.display()))?;
    let source = HttpFeedSource::new(config.run.fetch_timeout)?;

    info!("checking {} feeds", config.run.feeds.len());
    let outcome = run::run(&store, &source, &config.run.feeds, mode)
        .await
        .context("failed checking feeds")?;
    store.close().await;

    // Still worth sending: what was found is accurate, it just may be
    // reported again next time.
    if let Err(e) = &outcome.commit {
        error!("failed committing seen items: {}", e);
    }

    match &notifier {
        Some(notifier) => {
            run::deliver(&outcome.report, notifier)
                .await
                .context("failed sending notification")?;
        }
        None if !outcome.report.is_empty() => {
            print!("{}", Envelope::new(&config.mail, &outcome.report).to_text());
        }
        None => {}
    }

    outcome.commit.context("failed committing seen items")?;
    Ok(())
}
