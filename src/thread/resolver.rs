//! Maps a prompt node to the single active thread for its family.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::Result;
use crate::types::{OwnerId, PromptId, Thread, ThreadId};

/// Hard bound on ancestor-chain walks. Guarantees termination even if
/// the reference graph is malformed or cyclic; exceeding the bound
/// resolves to the last-seen node instead of failing.
pub const MAX_ANCESTOR_HOPS: usize = 15;

/// Read access to the prompt tree, owned by the persistence layer.
#[async_trait]
pub trait PromptStore: Send + Sync {
    /// Parent of a prompt node, or `None` at a root.
    async fn parent_of(&self, prompt_id: PromptId) -> Result<Option<PromptId>>;
}

/// Thread persistence, owned by an external collaborator.
///
/// Implementations must treat `create_active` as transactional: the
/// created thread is active on return, and no other thread for the
/// same `(root, owner)` pair may be activated concurrently.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn active_thread(&self, root: PromptId, owner: &OwnerId) -> Result<Option<Thread>>;
    async fn deactivate(&self, thread_id: &ThreadId) -> Result<()>;
    async fn create_active(&self, root: PromptId, owner: &OwnerId) -> Result<Thread>;
}

/// Resolves prompt families and their active threads.
///
/// Resolved root ids are cached in an owned map; thread switching is
/// sequenced under a resolver-owned mutex so two threads are never
/// transiently active for the same family.
pub struct ThreadResolver {
    prompts: Arc<dyn PromptStore>,
    threads: Arc<dyn ThreadStore>,
    root_cache: RwLock<HashMap<PromptId, PromptId>>,
    switch_lock: Mutex<()>,
}

impl ThreadResolver {
    pub fn new(prompts: Arc<dyn PromptStore>, threads: Arc<dyn ThreadStore>) -> Self {
        Self {
            prompts,
            threads,
            root_cache: RwLock::new(HashMap::new()),
            switch_lock: Mutex::new(()),
        }
    }

    /// Root ancestor of a prompt node.
    ///
    /// Follows parent references up to [`MAX_ANCESTOR_HOPS`]; if the
    /// bound is hit the last-seen node is returned.
    pub async fn resolve_root(&self, prompt_id: PromptId) -> Result<PromptId> {
        if let Some(root) = self.root_cache.read().unwrap().get(&prompt_id) {
            return Ok(*root);
        }

        let mut current = prompt_id;
        let mut hops = 0;
        loop {
            if hops >= MAX_ANCESTOR_HOPS {
                warn!(%prompt_id, %current, "ancestor chain exceeded hop bound");
                break;
            }
            match self.prompts.parent_of(current).await? {
                Some(parent) => {
                    current = parent;
                    hops += 1;
                }
                None => break,
            }
        }

        self.root_cache.write().unwrap().insert(prompt_id, current);
        Ok(current)
    }

    /// The active thread for a prompt's family, if one exists.
    pub async fn active_thread(
        &self,
        prompt_id: PromptId,
        owner: &OwnerId,
    ) -> Result<Option<Thread>> {
        let root = self.resolve_root(prompt_id).await?;
        self.threads.active_thread(root, owner).await
    }

    /// The active thread for a prompt's family, created if absent.
    ///
    /// Create-if-absent runs as one sequenced step, not as a
    /// check-then-create race guarded by a flag.
    pub async fn get_or_create_thread(
        &self,
        prompt_id: PromptId,
        owner: &OwnerId,
    ) -> Result<Thread> {
        let root = self.resolve_root(prompt_id).await?;
        let _guard = self.switch_lock.lock().await;
        if let Some(thread) = self.threads.active_thread(root, owner).await? {
            return Ok(thread);
        }
        self.threads.create_active(root, owner).await
    }

    /// Start a fresh thread for a prompt's family, replacing the
    /// current one.
    ///
    /// Deactivate-old-then-create-new, sequenced: at no instant do two
    /// threads for the same `(root, owner)` pair read as active.
    pub async fn start_new_thread(&self, prompt_id: PromptId, owner: &OwnerId) -> Result<Thread> {
        let root = self.resolve_root(prompt_id).await?;
        let _guard = self.switch_lock.lock().await;
        if let Some(existing) = self.threads.active_thread(root, owner).await? {
            self.threads.deactivate(&existing.thread_id).await?;
        }
        self.threads.create_active(root, owner).await
    }

    /// Drop a cached root mapping (after a prompt is re-parented).
    pub fn forget_root(&self, prompt_id: PromptId) {
        self.root_cache.write().unwrap().remove(&prompt_id);
    }
}
