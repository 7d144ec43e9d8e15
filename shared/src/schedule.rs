//! Deferred match passes.
//!
//! A pass may only run once the content tree it reads has settled, which the
//! mounting side announces through a [`ContentMount`]. Scheduling a new pass
//! aborts the one in flight, and a pass publishes its outcome only while its
//! generation is still the current one, so placements computed for a
//! superseded document never reach the live view.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::anchor::{AnchorOutcome, ContentAnchorEngine};
use crate::dto::Finding;
use crate::tree::ContentTree;

/// Held by whatever materializes the content tree.
#[derive(Debug)]
pub struct ContentMount {
    tx: watch::Sender<bool>,
}

impl ContentMount {
    /// Announce that the tree is complete and observable.
    pub fn settled(self) {
        self.tx.send_replace(true);
    }
}

/// Readiness of one content tree. Clones observe the same mount, so every
/// pass scheduled over that tree waits for it.
#[derive(Debug, Clone)]
pub struct ReadySignal {
    rx: watch::Receiver<bool>,
}

impl ReadySignal {
    /// A signal that has already fired, for trees that are complete on
    /// construction.
    pub fn settled() -> Self {
        let (_tx, rx) = watch::channel(true);
        Self { rx }
    }

    pub fn is_settled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves true once the mount settles, false if it was dropped first.
    async fn wait(mut self) -> bool {
        loop {
            if *self.rx.borrow_and_update() {
                return true;
            }
            if self.rx.changed().await.is_err() {
                return *self.rx.borrow();
            }
        }
    }
}

pub fn content_mount() -> (ContentMount, ReadySignal) {
    let (tx, rx) = watch::channel(false);
    (ContentMount { tx }, ReadySignal { rx })
}

/// Outcome of a pass that was allowed to publish.
#[derive(Debug)]
pub struct AppliedPass {
    pub generation: u64,
    pub tree: Arc<ContentTree>,
    pub findings: Arc<Vec<Finding>>,
    pub outcome: AnchorOutcome,
}

#[derive(Debug, Clone, Default)]
pub enum PassState {
    #[default]
    Idle,
    Pending {
        generation: u64,
    },
    Applied(Arc<AppliedPass>),
    /// The mount went away before the tree settled.
    Abandoned {
        generation: u64,
    },
}

impl PassState {
    pub fn generation(&self) -> Option<u64> {
        match self {
            PassState::Idle => None,
            PassState::Pending { generation } | PassState::Abandoned { generation } => {
                Some(*generation)
            }
            PassState::Applied(pass) => Some(pass.generation),
        }
    }
}

#[derive(Default)]
struct SchedulerInner {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct MatchPassScheduler {
    engine: ContentAnchorEngine,
    inner: Arc<Mutex<SchedulerInner>>,
    tx: Arc<watch::Sender<PassState>>,
}

impl MatchPassScheduler {
    pub fn new(engine: ContentAnchorEngine) -> Self {
        let (tx, _rx) = watch::channel(PassState::Idle);
        Self {
            engine,
            inner: Arc::new(Mutex::new(SchedulerInner::default())),
            tx: Arc::new(tx),
        }
    }

    /// Schedule a pass over `tree` once `ready` fires. Any earlier pass is
    /// aborted and can no longer publish. Must be called inside a Tokio
    /// runtime. Returns the generation of the new pass.
    pub fn schedule(
        &self,
        tree: Arc<ContentTree>,
        findings: Arc<Vec<Finding>>,
        ready: ReadySignal,
    ) -> u64 {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        let generation = inner.generation;
        if let Some(previous) = inner.handle.take() {
            previous.abort();
            debug!(superseded_by = generation, "aborted in-flight match pass");
        }
        self.tx.send_replace(PassState::Pending { generation });

        let engine = self.engine.clone();
        let shared = self.inner.clone();
        let tx = self.tx.clone();
        inner.handle = Some(tokio::spawn(async move {
            if !ready.wait().await {
                let current = shared.lock();
                if current.generation == generation {
                    tx.send_replace(PassState::Abandoned { generation });
                }
                debug!(generation, "content mount dropped before settling; pass discarded");
                return;
            }
            let outcome = engine.anchor(&tree, &findings);
            let current = shared.lock();
            if current.generation != generation {
                debug!(generation, current = current.generation, "stale match pass discarded");
                return;
            }
            info!(generation, placements = outcome.placements.len(), "match pass applied");
            tx.send_replace(PassState::Applied(Arc::new(AppliedPass {
                generation,
                tree,
                findings,
                outcome,
            })));
        }));
        generation
    }

    /// Abort any pass in flight and forget the published outcome.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        if let Some(previous) = inner.handle.take() {
            previous.abort();
        }
        self.tx.send_replace(PassState::Idle);
    }

    pub fn current_generation(&self) -> u64 {
        self.inner.lock().generation
    }

    pub fn state(&self) -> PassState {
        self.tx.borrow().clone()
    }

    pub fn latest(&self) -> Option<Arc<AppliedPass>> {
        match &*self.tx.borrow() {
            PassState::Applied(pass) => Some(pass.clone()),
            _ => None,
        }
    }

    /// Wait until pass `generation` is applied. Returns `None` when it was
    /// abandoned or superseded.
    pub async fn wait_for(&self, generation: u64) -> Option<Arc<AppliedPass>> {
        let mut rx = self.tx.subscribe();
        loop {
            {
                let state = rx.borrow_and_update();
                match &*state {
                    PassState::Applied(pass) if pass.generation == generation => {
                        return Some(pass.clone());
                    }
                    PassState::Abandoned { generation: g } if *g == generation => return None,
                    _ => {}
                }
            }
            if self.current_generation() != generation {
                return None;
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }
}
