//! LearningCoordinator: the only writer of learning records.
//!
//! Every mutation runs the same pipeline under the agent's lock:
//!
//! 1. load the record and check it is enabled
//! 2. authorize the caller (owner, delegate, or the record's module)
//! 3. operation-specific preconditions (stale root, rate limit, proof)
//! 4. apply the change to a working copy, recompute metrics, detect milestones
//! 5. commit the copy, its milestones and its events in one transaction
//! 6. broadcast the events
//!
//! A failure anywhere before step 5 drops the working copy, so a rejected call
//! never leaves a partial counter bump or root change behind. Locks are per
//! agent; calls for different agents never wait on each other.

use super::events::{LearningEvent, StoredEvent};
use super::store::{LearningStore, RecordCommit};
use super::{
    Account, AgentDirectory, AgentId, Clock, H256, LearningConfig, LearningError,
    LearningMetrics, LearningModule, LearningRecord, LearningUpdate, MetricsEngine, Milestone,
    MilestoneDetector, ModuleRegistry, MutationOutcome, RateLimitPolicy, SystemClock,
};

use arc_swap::ArcSwap;
use chrono::{DateTime, SubsecRound as _, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, broadcast};

use std::collections::HashMap;
use std::sync::Arc;

/// Accepts learning mutations and answers learning queries.
pub struct LearningCoordinator {
    store: Arc<LearningStore>,
    directory: Arc<dyn AgentDirectory>,
    modules: Arc<ModuleRegistry>,
    clock: Arc<dyn Clock>,
    config: ArcSwap<LearningConfig>,
    locks: AgentLocks,
    event_tx: broadcast::Sender<LearningEvent>,
}

impl LearningCoordinator {
    pub fn new(
        store: Arc<LearningStore>,
        directory: Arc<dyn AgentDirectory>,
        modules: Arc<ModuleRegistry>,
        config: LearningConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));
        Self {
            store,
            directory,
            modules,
            clock: Arc::new(SystemClock),
            config: ArcSwap::from_pointee(config),
            locks: AgentLocks::default(),
            event_tx,
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Swap in new limits and thresholds. Takes effect for the next operation;
    /// the event channel keeps its original capacity.
    ///
    /// The confidence constants are fixed for the life of the process: changing
    /// them would move every live record's score, possibly downwards.
    pub fn reload_config(&self, config: LearningConfig) -> Result<(), LearningError> {
        config
            .validate()
            .map_err(|reason| LearningError::InvalidConfig { reason })?;
        if config.confidence != self.config.load().confidence {
            return Err(LearningError::InvalidConfig {
                reason: "learning.confidence cannot change at runtime".into(),
            });
        }

        tracing::info!(
            max_updates_per_day = config.max_updates_per_day,
            rate_window_secs = config.rate_window_secs,
            "learning config reloaded"
        );
        self.config.store(Arc::new(config));
        Ok(())
    }

    pub fn config(&self) -> Arc<LearningConfig> {
        self.config.load_full()
    }

    /// Receive every event committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LearningEvent> {
        self.event_tx.subscribe()
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start a fresh learning record for `agent_id` at version 1.
    ///
    /// Only the owner may enable learning. If a disabled record exists it is
    /// replaced, counters and milestones included.
    pub async fn enable_learning(
        &self,
        caller: &Account,
        agent_id: AgentId,
        module: Account,
        initial_root: H256,
    ) -> Result<LearningRecord, LearningError> {
        let _guard = self.locks.acquire(agent_id).await;

        self.require_owner(caller, agent_id)?;
        if !self.modules.contains(&module) {
            return Err(LearningError::UnknownModule { module });
        }
        if initial_root.is_zero() {
            return Err(LearningError::InvalidRoot);
        }
        let existing = self.store.load_record(agent_id).await?;
        if existing.is_some_and(|record| record.learning_enabled) {
            return Err(LearningError::AlreadyEnabled { agent_id });
        }

        let config = self.config.load_full();
        let now = self.now();
        let mut record = LearningRecord::new(agent_id, module.clone(), initial_root, now);
        let milestones = self.derive(&mut record, &config, now);

        let mut events = vec![LearningEvent::LearningEnabled {
            agent_id,
            module,
            initial_root,
            at: now,
        }];
        events.extend(milestone_events(&record, &milestones, now));

        self.store
            .commit(RecordCommit {
                record: &record,
                reset_milestones: true,
                milestones: &milestones,
                events: &events,
            })
            .await?;

        tracing::info!(%agent_id, module = %record.module, root = %initial_root, "learning enabled");
        self.publish(events);
        Ok(record)
    }

    /// Mark the record read-only. Only the owner may disable learning.
    pub async fn disable_learning(
        &self,
        caller: &Account,
        agent_id: AgentId,
    ) -> Result<LearningRecord, LearningError> {
        let _guard = self.locks.acquire(agent_id).await;

        self.require_owner(caller, agent_id)?;
        let mut record = self.load_enabled(agent_id).await?;
        record.learning_enabled = false;

        let events = vec![LearningEvent::LearningDisabled {
            agent_id,
            at: self.now(),
        }];
        self.store
            .commit(RecordCommit {
                record: &record,
                reset_milestones: false,
                milestones: &[],
                events: &events,
            })
            .await?;

        tracing::info!(%agent_id, version = record.version, "learning disabled");
        self.publish(events);
        Ok(record)
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Count one interaction. Leaves the root and version alone and does not
    /// consume rate-limit budget.
    pub async fn record_interaction(
        &self,
        caller: &Account,
        agent_id: AgentId,
        payload_hash: H256,
    ) -> Result<MutationOutcome, LearningError> {
        let _guard = self.locks.acquire(agent_id).await;

        let mut record = self.load_enabled(agent_id).await?;
        self.authorize(caller, &record)?;

        let config = self.config.load_full();
        let now = self.now();
        record.total_interactions = record.total_interactions.saturating_add(1);
        record.last_update_timestamp = now;
        let milestones = self.derive(&mut record, &config, now);

        let mut events = vec![LearningEvent::InteractionRecorded {
            agent_id,
            payload_hash,
            total_interactions: record.total_interactions,
            at: now,
        }];
        events.extend(milestone_events(&record, &milestones, now));

        self.store
            .commit(RecordCommit {
                record: &record,
                reset_milestones: false,
                milestones: &milestones,
                events: &events,
            })
            .await?;

        tracing::debug!(
            %agent_id,
            total_interactions = record.total_interactions,
            confidence = %record.confidence_score,
            "interaction recorded"
        );
        self.publish(events);
        Ok(MutationOutcome { record, milestones })
    }

    /// Move the learning root forward by one version.
    ///
    /// Checks, in order: enabled, authorized, `previous_root` matches the
    /// current root, `new_root` is non-zero, rate limit, module proof check.
    /// The rate window is only written back when the update commits.
    pub async fn update_learning(
        &self,
        caller: &Account,
        agent_id: AgentId,
        update: LearningUpdate,
    ) -> Result<MutationOutcome, LearningError> {
        let _guard = self.locks.acquire(agent_id).await;

        let mut record = self.load_enabled(agent_id).await?;
        self.authorize(caller, &record)?;

        if update.previous_root != record.root {
            tracing::debug!(
                %agent_id,
                presented = %update.previous_root,
                current = %record.root,
                "rejected stale learning update"
            );
            return Err(LearningError::StaleRoot {
                agent_id,
                presented: update.previous_root,
                current: record.root,
                version: record.version,
            });
        }
        if update.new_root.is_zero() {
            return Err(LearningError::InvalidRoot);
        }

        let config = self.config.load_full();
        let now = self.now();
        RateLimitPolicy::from_config(&config)
            .acquire(&mut record.rate_window, now)
            .map_err(|limited| {
                tracing::warn!(%agent_id, limit = limited.limit, "learning update rate limit hit");
                LearningError::RateLimitExceeded {
                    agent_id,
                    limit: limited.limit,
                    resets_at: limited.resets_at,
                }
            })?;

        let module = self.module_for(&record)?;
        if !module.validate_update(&update) {
            tracing::warn!(%agent_id, module = module.name(), "learning update proof rejected");
            return Err(LearningError::InvalidProof { agent_id });
        }

        let previous_root = record.root;
        record.root = update.new_root;
        record.version += 1;
        record.learning_events = record.learning_events.saturating_add(1);
        record.last_update_timestamp = now;
        let milestones = self.derive(&mut record, &config, now);

        let mut events = vec![LearningEvent::LearningUpdated {
            agent_id,
            previous_root,
            new_root: record.root,
            version: record.version,
            at: now,
        }];
        events.extend(milestone_events(&record, &milestones, now));

        self.store
            .commit(RecordCommit {
                record: &record,
                reset_milestones: false,
                milestones: &milestones,
                events: &events,
            })
            .await?;

        tracing::info!(
            %agent_id,
            version = record.version,
            root = %record.root,
            daily_updates = record.rate_window.count,
            "learning updated"
        );
        self.publish(events);
        Ok(MutationOutcome { record, milestones })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The stored record, enabled or not.
    pub async fn get_record(
        &self,
        agent_id: AgentId,
    ) -> Result<Option<LearningRecord>, LearningError> {
        self.store.load_record(agent_id).await
    }

    /// False for agents that never enabled learning.
    pub async fn is_learning_enabled(&self, agent_id: AgentId) -> Result<bool, LearningError> {
        Ok(self
            .store
            .load_record(agent_id)
            .await?
            .is_some_and(|record| record.learning_enabled))
    }

    pub async fn get_learning_root(&self, agent_id: AgentId) -> Result<H256, LearningError> {
        Ok(self.load_existing(agent_id).await?.root)
    }

    pub async fn get_learning_metrics(
        &self,
        agent_id: AgentId,
    ) -> Result<LearningMetrics, LearningError> {
        Ok(self.load_existing(agent_id).await?.metrics())
    }

    /// Check a claim against the agent's current root through its module.
    /// Works on disabled records too; their root is still the latest history.
    pub async fn verify_learning(
        &self,
        agent_id: AgentId,
        claim: H256,
        proof: &[H256],
    ) -> Result<bool, LearningError> {
        let (valid, _) = self.verify_learning_with_root(agent_id, claim, proof).await?;
        Ok(valid)
    }

    /// Like [`Self::verify_learning`], also returning the root the claim was
    /// checked against.
    pub async fn verify_learning_with_root(
        &self,
        agent_id: AgentId,
        claim: H256,
        proof: &[H256],
    ) -> Result<(bool, H256), LearningError> {
        let record = self.load_existing(agent_id).await?;
        let module = self.module_for(&record)?;
        Ok((module.verify_claim(&record.root, &claim, proof), record.root))
    }

    /// Updates the record may still make in its current rate window.
    pub fn remaining_updates(&self, record: &LearningRecord) -> u32 {
        RateLimitPolicy::from_config(&self.config.load())
            .remaining(&record.rate_window, self.now())
    }

    /// Updates accepted in the current rate window; 0 once the stored window
    /// has lapsed.
    pub fn current_daily_updates(&self, record: &LearningRecord) -> u32 {
        RateLimitPolicy::from_config(&self.config.load())
            .used(&record.rate_window, self.now())
    }

    /// Most recent audit events for an agent, newest first.
    pub async fn learning_history(
        &self,
        agent_id: AgentId,
        limit: i64,
    ) -> Result<Vec<StoredEvent>, LearningError> {
        self.store.learning_history(agent_id, limit).await
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Current time at the precision the store keeps.
    fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(3)
    }

    async fn load_existing(&self, agent_id: AgentId) -> Result<LearningRecord, LearningError> {
        self.store
            .load_record(agent_id)
            .await?
            .ok_or(LearningError::AgentNotFound { agent_id })
    }

    async fn load_enabled(&self, agent_id: AgentId) -> Result<LearningRecord, LearningError> {
        match self.store.load_record(agent_id).await? {
            Some(record) if record.learning_enabled => Ok(record),
            _ => Err(LearningError::LearningNotEnabled { agent_id }),
        }
    }

    fn require_owner(&self, caller: &Account, agent_id: AgentId) -> Result<(), LearningError> {
        match self.directory.owner_of(agent_id) {
            None => Err(LearningError::AgentNotFound { agent_id }),
            Some(owner) if owner == *caller => Ok(()),
            Some(_) => Err(LearningError::Unauthorized {
                agent_id,
                caller: caller.clone(),
            }),
        }
    }

    fn authorize(&self, caller: &Account, record: &LearningRecord) -> Result<(), LearningError> {
        let agent_id = record.agent_id;
        let allowed = *caller == record.module
            || self.directory.owner_of(agent_id).as_ref() == Some(caller)
            || self.directory.is_delegate(agent_id, caller);

        if allowed {
            Ok(())
        } else {
            tracing::debug!(%agent_id, %caller, "unauthorized learning call");
            Err(LearningError::Unauthorized {
                agent_id,
                caller: caller.clone(),
            })
        }
    }

    fn module_for(&self, record: &LearningRecord) -> Result<Arc<dyn LearningModule>, LearningError> {
        self.modules
            .get(&record.module)
            .ok_or_else(|| LearningError::UnknownModule {
                module: record.module.clone(),
            })
    }

    /// Recompute metrics and collect newly reached milestones.
    fn derive(
        &self,
        record: &mut LearningRecord,
        config: &LearningConfig,
        now: DateTime<Utc>,
    ) -> Vec<Milestone> {
        MetricsEngine::from_config(config).recompute(record, now);
        MilestoneDetector::from_config(config).detect(record)
    }

    fn publish(&self, events: Vec<LearningEvent>) {
        for event in events {
            // No subscribers is fine; the audit log already has the event.
            let _ = self.event_tx.send(event);
        }
    }
}

impl std::fmt::Debug for LearningCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearningCoordinator")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

fn milestone_events(
    record: &LearningRecord,
    milestones: &[Milestone],
    now: DateTime<Utc>,
) -> Vec<LearningEvent> {
    milestones
        .iter()
        .map(|milestone| {
            tracing::info!(agent_id = %record.agent_id, %milestone, "learning milestone reached");
            LearningEvent::MilestoneAchieved {
                agent_id: record.agent_id,
                milestone: *milestone,
                value: milestone.observed_value(record),
                at: now,
            }
        })
        .collect()
}

/// One async mutex per agent, created on first use and dropped again once
/// nobody holds or waits on it.
#[derive(Debug, Default)]
struct AgentLocks {
    locks: std::sync::Mutex<HashMap<AgentId, Arc<Mutex<()>>>>,
}

impl AgentLocks {
    async fn acquire(&self, agent_id: AgentId) -> AgentLockGuard<'_> {
        let lock = self
            .locks
            .lock()
            .expect("agent lock table poisoned")
            .entry(agent_id)
            .or_default()
            .clone();
        AgentLockGuard {
            locks: self,
            agent_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().expect("agent lock table poisoned").len()
    }
}

/// Holds an agent's lock; removes the table entry on drop when it was the
/// last user.
struct AgentLockGuard<'a> {
    locks: &'a AgentLocks,
    agent_id: AgentId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for AgentLockGuard<'_> {
    fn drop(&mut self) {
        let mut table = self.locks.locks.lock().expect("agent lock table poisoned");
        // Release while the table is locked so no new waiter can clone the
        // entry between the check and the removal.
        drop(self.guard.take());
        if table
            .get(&self.agent_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.agent_id);
        }
    }
}
