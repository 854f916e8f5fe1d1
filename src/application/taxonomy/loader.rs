//! Per-operation batching of "children of parent X" lookups.
//!
//! Every [`CascadeLoader::load`] call registers its parent id in a shared
//! pending batch and then yields once to the scheduler. Sibling futures polled
//! in the same pass (for example through `join_all`) register during that
//! yield, so whichever caller resumes first finds the whole batch, issues one
//! `list_children` call for all of them, and hands each waiter its own slice.
//!
//! A loader must not outlive the operation that created it: there is no
//! caching between batches, and mixing requests from unrelated operations
//! would merge their field projections.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use metrics::{counter, histogram};
use tokio::sync::oneshot;
use tracing::debug;

use crate::application::repos::{RepoError, TaxonomyRepo};
use crate::cache::lock::mutex_lock;
use crate::domain::taxonomy::{NodeId, TaxonomyNode, TermFields};

pub(crate) const METRIC_CASCADE_DISPATCH: &str = "arbor_cascade_dispatch_total";
pub(crate) const METRIC_CASCADE_BATCH_SIZE: &str = "arbor_cascade_batch_size";

type ChildrenResult = Result<Vec<TaxonomyNode>, RepoError>;

/// One children lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildrenRequest {
    pub parent_id: NodeId,
    pub fields: TermFields,
}

impl ChildrenRequest {
    pub fn new(parent_id: NodeId, fields: TermFields) -> Self {
        Self { parent_id, fields }
    }
}

#[derive(Default)]
struct PendingBatch {
    /// Projection of the first request; later requests are assumed to match.
    fields: Option<TermFields>,
    waiters: BTreeMap<NodeId, Vec<oneshot::Sender<ChildrenResult>>>,
}

impl PendingBatch {
    fn len(&self) -> usize {
        self.waiters.values().map(Vec::len).sum()
    }
}

pub struct CascadeLoader {
    repo: Arc<dyn TaxonomyRepo>,
    pending: Mutex<PendingBatch>,
}

impl CascadeLoader {
    pub fn new(repo: Arc<dyn TaxonomyRepo>) -> Self {
        Self {
            repo,
            pending: Mutex::new(PendingBatch::default()),
        }
    }

    /// Children of `request.parent_id`, coalesced with every other request
    /// registered before the current batch is flushed.
    pub async fn load(&self, request: ChildrenRequest) -> ChildrenResult {
        let receiver = self.register(request);

        tokio::task::yield_now().await;
        self.drain().await;

        match receiver.await {
            Ok(result) => result,
            // The caller that took our batch was dropped before answering.
            Err(_) => Err(RepoError::from_persistence(
                "children batch was abandoned before completion",
            )),
        }
    }

    /// Flush the pending batch now, if any. A fresh window opens afterwards.
    pub async fn drain(&self) {
        let batch = {
            let mut pending = mutex_lock(&self.pending, "application::taxonomy::loader", "drain");
            std::mem::take(&mut *pending)
        };

        if batch.waiters.is_empty() {
            return;
        }

        self.dispatch(batch).await;
    }

    pub fn pending_len(&self) -> usize {
        mutex_lock(&self.pending, "application::taxonomy::loader", "pending_len").len()
    }

    fn register(&self, request: ChildrenRequest) -> oneshot::Receiver<ChildrenResult> {
        let (sender, receiver) = oneshot::channel();
        let mut pending = mutex_lock(&self.pending, "application::taxonomy::loader", "register");

        match &pending.fields {
            None => pending.fields = Some(request.fields),
            Some(fields) if *fields != request.fields => {
                debug!(
                    parent_id = request.parent_id,
                    "children request projection differs from batch; using first projection"
                );
            }
            Some(_) => {}
        }

        pending
            .waiters
            .entry(request.parent_id)
            .or_default()
            .push(sender);
        receiver
    }

    async fn dispatch(&self, batch: PendingBatch) {
        let PendingBatch { fields, waiters } = batch;
        let fields = fields.unwrap_or_default();
        let parent_ids: Vec<NodeId> = waiters.keys().copied().collect();

        counter!(METRIC_CASCADE_DISPATCH).increment(1);
        histogram!(METRIC_CASCADE_BATCH_SIZE).record(parent_ids.len() as f64);
        debug!(parents = parent_ids.len(), "dispatching children batch");

        match self.repo.list_children(&parent_ids, &fields).await {
            Ok(rows) => {
                let mut by_parent: BTreeMap<NodeId, Vec<TaxonomyNode>> = BTreeMap::new();
                for row in rows {
                    by_parent.entry(row.parent_id).or_default().push(row);
                }

                for (parent_id, senders) in waiters {
                    let children = by_parent.remove(&parent_id).unwrap_or_default();
                    for sender in senders {
                        // A dropped receiver only means that caller stopped waiting.
                        let _ = sender.send(Ok(children.clone()));
                    }
                }
            }
            Err(err) => {
                debug!(error = %err, "children batch failed");
                for sender in waiters.into_values().flatten() {
                    let _ = sender.send(Err(err.clone()));
                }
            }
        }
    }
}
