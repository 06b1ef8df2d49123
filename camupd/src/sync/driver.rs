use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::fingerprint::Fingerprint;
use super::media::{MediaItem, MediaLibrary};
use super::progress::{ProgressError, ProgressStore, Watermark};
use super::session::{RemoteSession, UploadError};
use super::staging::{StagedFile, WorkingDir};
use super::tree::RemoteNode;

/// Why an invocation stopped before running out of candidates.
#[derive(Debug, Error)]
pub enum DriverAbort {
    #[error("loading progress failed: {0}")]
    LoadProgress(#[source] ProgressError),
    #[error("enumerating media library failed: {0}")]
    Enumerate(#[source] io::Error),
    #[error("upload of {item} failed: {source}")]
    Upload {
        item: String,
        #[source]
        source: UploadError,
    },
    #[error("saving progress after {item} failed: {source}")]
    SaveProgress {
        item: String,
        #[source]
        source: ProgressError,
    },
}

#[derive(Debug)]
pub enum DriverOutcome {
    /// No candidates left.
    Completed,
    /// The time budget ran out before the next item was started.
    BudgetExhausted,
    Aborted(DriverAbort),
}

#[derive(Debug)]
pub struct DriverReport {
    pub uploaded: usize,
    pub skipped_duplicate: usize,
    pub skipped_unstaged: usize,
    pub skipped_no_destination: usize,
    pub watermark: Watermark,
    pub outcome: DriverOutcome,
}

#[derive(Debug)]
pub enum DriverState {
    Idle,
    Selecting,
    Staging(MediaItem),
    Uploading(MediaItem, StagedFile),
    Finalizing(MediaItem, StagedFile, Result<RemoteNode, UploadError>),
    Done(DriverOutcome),
}

/// Sequential upload loop: one item is staged and transferred at a time, and
/// the watermark only moves after the server confirmed the transfer.
///
/// The persisted watermark never reaches the capture time of an item that was
/// left behind in this run, nor of a queued item sharing the uploaded one's
/// capture time, so both are picked up again by the next invocation.
pub struct UploadDriver<'a> {
    session: &'a mut RemoteSession,
    destination: Option<RemoteNode>,
    library: Arc<dyn MediaLibrary>,
    working_dir: &'a WorkingDir,
    progress: &'a ProgressStore,
    deadline: Option<Instant>,
    queue: VecDeque<MediaItem>,
    watermark: Watermark,
    held_back: Option<Watermark>,
    counters: Counters,
}

#[derive(Debug, Default)]
struct Counters {
    uploaded: usize,
    skipped_duplicate: usize,
    skipped_unstaged: usize,
    skipped_no_destination: usize,
}

impl<'a> UploadDriver<'a> {
    pub fn new(
        session: &'a mut RemoteSession,
        destination: Option<RemoteNode>,
        library: Arc<dyn MediaLibrary>,
        working_dir: &'a WorkingDir,
        progress: &'a ProgressStore,
    ) -> Self {
        Self {
            session,
            destination,
            library,
            working_dir,
            progress,
            deadline: None,
            queue: VecDeque::new(),
            watermark: Watermark::MIN,
            held_back: None,
            counters: Counters::default(),
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub async fn run(mut self) -> DriverReport {
        let mut state = DriverState::Idle;
        loop {
            state = match state {
                DriverState::Done(outcome) => return self.report(outcome),
                other => self.step(other).await,
            };
        }
    }

    pub async fn step(&mut self, state: DriverState) -> DriverState {
        match state {
            DriverState::Idle => self.start().await,
            DriverState::Selecting => self.select(),
            DriverState::Staging(item) => self.stage(item).await,
            DriverState::Uploading(item, staged) => self.upload(item, staged).await,
            DriverState::Finalizing(item, staged, result) => {
                self.finalize(item, staged, result).await
            }
            done @ DriverState::Done(_) => done,
        }
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    async fn start(&mut self) -> DriverState {
        self.watermark = match self.progress.load().await {
            Ok(watermark) => watermark,
            Err(err) => return DriverState::Done(DriverOutcome::Aborted(DriverAbort::LoadProgress(err))),
        };
        let library = Arc::clone(&self.library);
        let items = match tokio::task::spawn_blocking(move || library.enumerate()).await {
            Ok(Ok(items)) => items,
            Ok(Err(err)) => {
                return DriverState::Done(DriverOutcome::Aborted(DriverAbort::Enumerate(err)));
            }
            Err(join) => {
                return DriverState::Done(DriverOutcome::Aborted(DriverAbort::Enumerate(
                    io::Error::other(join),
                )));
            }
        };
        let total = items.len();
        self.queue = pending_items(items, self.watermark);
        info!(
            watermark = %self.watermark,
            library = total,
            pending = self.queue.len(),
            "upload pass starting"
        );
        DriverState::Selecting
    }

    fn select(&mut self) -> DriverState {
        if self.queue.is_empty() {
            return DriverState::Done(DriverOutcome::Completed);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            info!(remaining = self.queue.len(), "time budget exhausted");
            return DriverState::Done(DriverOutcome::BudgetExhausted);
        }
        match self.queue.pop_front() {
            Some(item) => DriverState::Staging(item),
            None => DriverState::Done(DriverOutcome::Completed),
        }
    }

    async fn stage(&mut self, item: MediaItem) -> DriverState {
        match self.working_dir.stage(&item).await {
            Ok(staged) => DriverState::Uploading(item, staged),
            Err(err) => {
                warn!(item = %item.name, "staging failed, skipping: {err}");
                self.counters.skipped_unstaged += 1;
                self.leave_behind(&item);
                DriverState::Selecting
            }
        }
    }

    async fn upload(&mut self, item: MediaItem, staged: StagedFile) -> DriverState {
        let fingerprint = match Fingerprint::of_file(staged.path()).await {
            Ok(fingerprint) => fingerprint,
            Err(err) => {
                warn!(item = %item.name, "fingerprinting staged copy failed, skipping: {err}");
                self.counters.skipped_unstaged += 1;
                self.leave_behind(&item);
                discard(staged, &item).await;
                return DriverState::Selecting;
            }
        };

        if let Some(existing) = self.session.tree().find_by_fingerprint(&fingerprint) {
            debug!(item = %item.name, remote = %existing.path, "already uploaded, skipping");
            self.counters.skipped_duplicate += 1;
            discard(staged, &item).await;
            return DriverState::Selecting;
        }

        let Some(destination) = self.destination.clone() else {
            warn!(item = %item.name, "destination folder unavailable, skipping");
            self.counters.skipped_no_destination += 1;
            self.leave_behind(&item);
            discard(staged, &item).await;
            return DriverState::Selecting;
        };

        debug!(item = %item.name, %fingerprint, "uploading");
        let result = self
            .session
            .upload(staged.path(), &item.name, fingerprint, &destination)
            .await;
        DriverState::Finalizing(item, staged, result)
    }

    async fn finalize(
        &mut self,
        item: MediaItem,
        staged: StagedFile,
        result: Result<RemoteNode, UploadError>,
    ) -> DriverState {
        let node = match result {
            Ok(node) => node,
            Err(source) => {
                discard(staged, &item).await;
                return DriverState::Done(DriverOutcome::Aborted(DriverAbort::Upload {
                    item: item.name,
                    source,
                }));
            }
        };

        let captured = Watermark::from_datetime(item.captured_at);
        let target = self.persistable(captured);
        if target < captured {
            debug!(item = %item.name, %target, "watermark held below capture time");
        }
        if target > self.watermark {
            if let Err(source) = self.progress.save(target).await {
                discard(staged, &item).await;
                return DriverState::Done(DriverOutcome::Aborted(DriverAbort::SaveProgress {
                    item: item.name,
                    source,
                }));
            }
            self.watermark = target;
        }
        self.counters.uploaded += 1;
        info!(item = %item.name, remote = %node.path, watermark = %self.watermark, "uploaded");
        discard(staged, &item).await;
        DriverState::Selecting
    }

    fn leave_behind(&mut self, item: &MediaItem) {
        let captured = Watermark::from_datetime(item.captured_at);
        self.held_back = Some(self.held_back.map_or(captured, |held| held.min(captured)));
    }

    /// Highest watermark that may be stored once `captured` is confirmed.
    fn persistable(&self, captured: Watermark) -> Watermark {
        let mut target = captured;
        let sibling_queued = self
            .queue
            .front()
            .is_some_and(|next| Watermark::from_datetime(next.captured_at) == captured);
        if sibling_queued {
            target = captured.just_before();
        }
        if let Some(held) = self.held_back {
            target = target.min(held.just_before());
        }
        target
    }

    fn report(&self, outcome: DriverOutcome) -> DriverReport {
        DriverReport {
            uploaded: self.counters.uploaded,
            skipped_duplicate: self.counters.skipped_duplicate,
            skipped_unstaged: self.counters.skipped_unstaged,
            skipped_no_destination: self.counters.skipped_no_destination,
            watermark: self.watermark,
            outcome,
        }
    }
}

/// Items captured after `watermark`, oldest first; equal timestamps by name.
fn pending_items(items: Vec<MediaItem>, watermark: Watermark) -> VecDeque<MediaItem> {
    let mut pending: Vec<(Watermark, MediaItem)> = items
        .into_iter()
        .map(|item| (Watermark::from_datetime(item.captured_at), item))
        .filter(|(captured, _)| *captured > watermark)
        .collect();
    pending.sort_by(|(a_at, a), (b_at, b)| a_at.cmp(b_at).then_with(|| a.name.cmp(&b.name)));
    pending.into_iter().map(|(_, item)| item).collect()
}

async fn discard(staged: StagedFile, item: &MediaItem) {
    if let Err(err) = staged.discard().await {
        warn!(item = %item.name, "removing staged copy failed: {err}");
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
