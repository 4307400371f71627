use std::sync::Arc;

use common::Submission;
use futures::Stream;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::{MetadataError, MetadataStore, SubmissionQuery};

/// A live query: yields the full result set once immediately and again after
/// every change to the store.
///
/// Each snapshot supersedes the previous one; changes that happen while a
/// snapshot is being produced coalesce into a single follow-up delivery.
pub struct Subscription {
    store: Arc<dyn MetadataStore>,
    query: SubmissionQuery,
    changes: watch::Receiver<u64>,
    cancel: CancellationToken,
    primed: bool,
}

/// Cancels a [`Subscription`] from another task.
#[derive(Clone, Debug)]
pub struct SubscriptionHandle(CancellationToken);

impl SubscriptionHandle {
    /// Stop delivery. Snapshots in flight are discarded.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

impl Subscription {
    pub fn new(store: Arc<dyn MetadataStore>, query: SubmissionQuery) -> Self {
        let changes = store.changes();
        Self {
            store,
            query,
            changes,
            cancel: CancellationToken::new(),
            primed: false,
        }
    }

    pub fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle(self.cancel.clone())
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the next snapshot.
    ///
    /// Returns `None` once cancelled or when the store is gone.
    pub async fn next(&mut self) -> Option<Result<Vec<Submission>, MetadataError>> {
        if self.cancel.is_cancelled() {
            return None;
        }

        if self.primed {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                changed = self.changes.changed() => changed.ok()?,
            }
        } else {
            self.primed = true;
        }
        self.changes.borrow_and_update();

        let snapshot = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            snapshot = self.store.query(&self.query) => snapshot,
        };
        Some(snapshot)
    }

    /// Adapt into a stream of snapshots.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<Submission>, MetadataError>> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            let item = subscription.next().await?;
            Some((item, subscription))
        })
    }
}
