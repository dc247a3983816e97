//! Download engine: pages through a user's timeline, routes every media item
//! to its folder and stops at the end of the timeline or at the first item
//! older than what a previous run already fetched.
//!
//! Everything is strictly sequential. Each page is processed to completion
//! (media fetched and written one at a time) before the next page is
//! requested, with a randomized pause in between to stay under the remote
//! rate limit.

pub mod error;
pub mod paths;
pub mod store;

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng as _;
use tokio_util::sync::CancellationToken;

use crate::api::{self, FetchError, MediaEntity, Page, Post, Transport};
use paths::TargetFolder;
use store::{MediaStore, PutOutcome};

/// Bounds of the randomized pause between page requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDelay {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for PageDelay {
    fn default() -> Self {
        Self {
            min_ms: 3000,
            max_ms: 7000,
        }
    }
}

impl PageDelay {
    /// Uniformly random duration in `[min_ms, max_ms]`.
    pub fn sample(&self) -> Duration {
        let ms = if self.max_ms > self.min_ms {
            rand::thread_rng().gen_range(self.min_ms..=self.max_ms)
        } else {
            self.min_ms
        };
        Duration::from_millis(ms)
    }
}

/// Subset of application config consumed by the download engine.
/// Decoupled from CLI parsing so the engine can be tested independently.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub(crate) directory: PathBuf,
    pub(crate) api_base: String,
    pub(crate) no_extra: bool,
    pub(crate) continue_on_duplicate: bool,
    pub(crate) page_delay: PageDelay,
}

/// Why a user run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The API returned no further cursor.
    Exhausted,
    /// An unpinned item older than the duplicate boundary was reached.
    DuplicateBoundary,
    /// A page request failed; the error was logged.
    Aborted,
    /// Shutdown was requested.
    Cancelled,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunOutcome::Exhausted => "end of timeline",
            RunOutcome::DuplicateBoundary => "reached previously downloaded content",
            RunOutcome::Aborted => "aborted after a fetch error",
            RunOutcome::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub pages: usize,
    pub written: usize,
    pub duplicates: usize,
    pub excluded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct UserReport {
    pub username: String,
    pub outcome: RunOutcome,
    pub stats: RunStats,
}

/// Per-user mutable state. Recreated for every user so the boundary is
/// re-armed in update-all mode.
#[derive(Debug, Default)]
struct RunState {
    /// Outer `None`: not computed yet. Inner `None`: no boundary.
    boundary: Option<Option<NaiveDate>>,
    /// Cursor of the page being processed, `None` for the first page.
    cursor: Option<String>,
    stopped: bool,
    stats: RunStats,
}

struct UserRun<'a> {
    username: &'a str,
    primary: String,
    config: &'a RunConfig,
    transport: &'a dyn Transport,
    store: MediaStore<'a>,
    shutdown: &'a CancellationToken,
    state: RunState,
}

impl<'a> UserRun<'a> {
    fn new(
        transport: &'a dyn Transport,
        username: &'a str,
        config: &'a RunConfig,
        shutdown: &'a CancellationToken,
    ) -> Self {
        Self {
            username,
            primary: username.to_lowercase(),
            config,
            transport,
            store: MediaStore::new(&config.directory, transport, config.no_extra),
            shutdown,
            state: RunState::default(),
        }
    }

    async fn run(&mut self, start_cursor: Option<&str>) -> Result<RunOutcome, FetchError> {
        self.state.cursor = start_cursor.map(str::to_string);
        let mut url = api::page_url(&self.config.api_base, self.username, start_cursor)?;

        loop {
            if self.shutdown.is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }

            tracing::info!("Fetching {}", url);
            let page = Page::from_value(self.transport.get_json(&url).await?);
            self.state.stats.pages += 1;
            tracing::debug!(posts = page.posts.len(), "Page received");

            for post in &page.posts {
                self.process_post(post).await;
                if self.state.stopped {
                    return Ok(RunOutcome::DuplicateBoundary);
                }
                if self.shutdown.is_cancelled() {
                    return Ok(RunOutcome::Cancelled);
                }
            }

            let Some(cursor) = page.after else {
                tracing::info!("No next cursor for {}, stopping", self.username);
                return Ok(RunOutcome::Exhausted);
            };
            if self.state.cursor.as_deref() == Some(cursor.as_str()) {
                tracing::warn!(
                    "API returned the cursor it was just given ({}), stopping",
                    cursor
                );
                return Ok(RunOutcome::Exhausted);
            }
            tracing::debug!(cursor = %cursor, "Next cursor found");
            url = api::page_url(&self.config.api_base, self.username, Some(&cursor))?;
            self.state.cursor = Some(cursor);

            if !pause(self.config.page_delay, self.shutdown).await {
                return Ok(RunOutcome::Cancelled);
            }
        }
    }

    async fn process_post(&mut self, post: &Post) {
        if let Some(folder) = paths::post_folder(post, &self.primary) {
            self.process_media(&post.media_entities, &post.created_at, &folder, post.pinned)
                .await;
        }

        // Replies are classified by their own author but share the pin.
        for reply in &post.conversation {
            if self.state.stopped {
                return;
            }
            match paths::conversation_folder(reply, &self.primary) {
                Some(folder) => {
                    self.process_media(&reply.media_entities, &reply.created_at, &folder, post.pinned)
                        .await
                }
                None => tracing::debug!("Skipping conversation entry without a usable author"),
            }
        }
    }

    async fn process_media(
        &mut self,
        media: &[MediaEntity],
        created_at: &DateTime<Utc>,
        folder: &TargetFolder,
        pinned: bool,
    ) {
        for item in media {
            if self.state.stopped || self.shutdown.is_cancelled() {
                return;
            }
            let Some(url) = item.download_url() else {
                continue;
            };
            let Some(basename) = paths::url_basename(url) else {
                tracing::warn!("No usable filename in media URL {}, skipping", url);
                self.state.stats.failed += 1;
                continue;
            };

            if folder.is_primary()
                && !pinned
                && self.crosses_boundary(created_at.date_naive()).await
            {
                tracing::info!(
                    "Reached media from {} which a previous run already covered, stopping",
                    created_at.format("%Y-%m-%d")
                );
                self.state.stopped = true;
                return;
            }

            match self.store.put(url, &basename, created_at, folder).await {
                Ok(PutOutcome::Written(path)) => {
                    self.state.stats.written += 1;
                    tracing::info!("Downloaded media for {}: {}", folder, path.display());
                }
                Ok(PutOutcome::Duplicate) => {
                    self.state.stats.duplicates += 1;
                    tracing::info!("Skipped download for {}: {} already exists", folder, basename);
                }
                Ok(PutOutcome::Excluded) => {
                    self.state.stats.excluded += 1;
                    tracing::debug!("Excluded {} for {}", basename, folder);
                }
                Err(e) => {
                    self.state.stats.failed += 1;
                    tracing::error!("Error downloading media {} for {}: {}", basename, folder, e);
                }
            }
        }
    }

    /// Whether `date` lies before the duplicate boundary. The boundary is
    /// computed from the primary folder on first use and cached for the run.
    async fn crosses_boundary(&mut self, date: NaiveDate) -> bool {
        if self.config.continue_on_duplicate {
            return false;
        }

        let boundary = match self.state.boundary {
            Some(boundary) => boundary,
            None => {
                let dir = self
                    .store
                    .folder_path(&TargetFolder::Primary(self.primary.clone()));
                let boundary = match store::list_filenames(&dir).await {
                    Ok(names) => paths::duplicate_boundary(names),
                    Err(e) => {
                        tracing::warn!("Could not scan {}: {}", dir.display(), e);
                        None
                    }
                };
                match boundary {
                    Some(b) => tracing::info!("Duplicate boundary for {}: {}", self.primary, b),
                    None => tracing::debug!("No duplicate boundary for {}", self.primary),
                }
                self.state.boundary = Some(boundary);
                boundary
            }
        };

        boundary.is_some_and(|b| date < b)
    }
}

/// Sleep for a random page delay. Returns `false` if shutdown interrupted it.
async fn pause(delay: PageDelay, shutdown: &CancellationToken) -> bool {
    let duration = delay.sample();
    if duration.is_zero() {
        return !shutdown.is_cancelled();
    }
    tracing::info!(
        "Waiting for {} milliseconds before next request...",
        duration.as_millis()
    );
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = shutdown.cancelled() => false,
    }
}

/// Download one user's timeline, starting at `start_cursor` if given.
///
/// Never fails: a page-level error is logged and reported as
/// [`RunOutcome::Aborted`].
pub async fn download_user(
    transport: &dyn Transport,
    username: &str,
    start_cursor: Option<&str>,
    config: &RunConfig,
    shutdown: &CancellationToken,
) -> UserReport {
    let started = Instant::now();

    if let Err(e) = store::migrate_legacy_folder(&config.directory, username).await {
        tracing::warn!("Could not migrate legacy folder for {}: {}", username, e);
    }

    let mut run = UserRun::new(transport, username, config, shutdown);
    let outcome = match run.run(start_cursor).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("Error fetching data for {}: {}", username, e);
            if e.status() == Some(429) {
                tracing::warn!("The API is rate limiting requests, try again later");
            }
            if let Some(cursor) = &run.state.cursor {
                tracing::info!("Resume with --user:{} --cursor:{}", username, cursor);
            }
            RunOutcome::Aborted
        }
    };
    let stats = run.state.stats;

    tracing::info!("── Summary for {} ──", username);
    tracing::info!(
        "  {} downloaded, {} already present, {} excluded, {} failed, {} pages",
        stats.written,
        stats.duplicates,
        stats.excluded,
        stats.failed,
        stats.pages
    );
    tracing::info!("  stopped: {}", outcome);
    tracing::info!("  elapsed: {}", format_duration(started.elapsed()));

    UserReport {
        username: username.to_string(),
        outcome,
        stats,
    }
}

/// Re-run every user folder under the media root, in name order.
pub async fn download_all(
    transport: &dyn Transport,
    config: &RunConfig,
    shutdown: &CancellationToken,
) -> Result<Vec<UserReport>> {
    let users = store::list_user_directories(&config.directory)
        .await
        .with_context(|| {
            format!(
                "Failed to list user folders in {}",
                config.directory.display()
            )
        })?;

    if users.is_empty() {
        tracing::warn!("No user folders found in {}", config.directory.display());
    }

    let mut reports = Vec::with_capacity(users.len());
    for (i, user) in users.iter().enumerate() {
        if shutdown.is_cancelled() {
            tracing::info!("Shutdown requested, skipping remaining users");
            break;
        }
        if i > 0 && !pause(config.page_delay, shutdown).await {
            break;
        }
        tracing::info!("Updating {} ({}/{})", user, i + 1, users.len());
        reports.push(download_user(transport, user, None, config, shutdown).await);
    }
    Ok(reports)
}

fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
