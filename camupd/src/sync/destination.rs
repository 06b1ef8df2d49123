use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::session::RemoteSession;
use super::tree::{RemoteNode, RemoteTree};

#[derive(Debug, Clone)]
pub struct DestinationResolver {
    name: String,
    settle: Backoff,
    settle_attempts: u32,
    deadline: Option<Instant>,
}

impl DestinationResolver {
    pub fn new(
        name: impl Into<String>,
        settle_base: Duration,
        settle_max: Duration,
        settle_attempts: u32,
    ) -> Self {
        Self {
            name: name.into(),
            settle: Backoff::new(settle_base, settle_max, true),
            settle_attempts,
            deadline: None,
        }
    }

    /// Settling stops early rather than sleep past `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finds the upload folder under the root, creating it when missing.
    ///
    /// A freshly created folder is not always listed right away, so the root is
    /// re-listed with backoff. `None` means the folder is not visible yet; the
    /// caller keeps going and skips uploads for this run.
    pub async fn resolve(&self, session: &mut RemoteSession) -> Option<RemoteNode> {
        if let Some(found) = find_destination(session.tree(), &self.name) {
            debug!(path = %found.path, "destination folder found");
            return Some(found);
        }

        let root = session.tree().root().clone();
        match session.create_folder(&self.name, &root).await {
            Ok(true) => info!(folder = %self.name, "created destination folder"),
            Ok(false) => debug!(folder = %self.name, "destination folder already exists remotely"),
            Err(err) => {
                warn!(folder = %self.name, "failed to create destination folder: {err}");
                return None;
            }
        }

        debug!(
            attempts = self.settle_attempts,
            bound = ?self.settle.worst_case(self.settle_attempts),
            "waiting for destination folder to become visible"
        );
        for attempt in 0..self.settle_attempts {
            let delay = self.settle.delay(attempt);
            if self
                .deadline
                .is_some_and(|deadline| Instant::now() + delay >= deadline)
            {
                warn!(attempt, "time budget leaves no room to wait for destination folder");
                return None;
            }
            tokio::time::sleep(delay).await;
            if let Err(err) = session.refresh_children(&root.path).await {
                warn!(attempt, "re-listing root failed: {err}");
                continue;
            }
            if let Some(found) = find_destination(session.tree(), &self.name) {
                debug!(attempt, path = %found.path, "destination folder visible");
                return Some(found);
            }
        }

        warn!(folder = %self.name, "destination folder still not visible after settling");
        None
    }
}

/// First folder directly under the root whose name matches, ignoring case.
pub fn find_destination(tree: &RemoteTree, name: &str) -> Option<RemoteNode> {
    let wanted = name.to_lowercase();
    tree.children(tree.root())
        .into_iter()
        .find(|node| node.is_folder() && node.name.to_lowercase() == wanted)
        .cloned()
}
