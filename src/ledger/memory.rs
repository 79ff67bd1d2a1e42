use super::repository::{LaunchRepository, LaunchUpdate, RepositoryResult};
use crate::error::RepositoryError;
use crate::models::{LaunchStatus, SubWorkflowLaunch, TaskInstanceId};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

type Partition = Arc<Mutex<BTreeMap<u32, SubWorkflowLaunch>>>;

/// In-process launch repository partitioned by parent task instance id.
///
/// Each partition is guarded by its own lock, so orchestrators for different
/// parents never contend. Supports fault injection of transient failures.
#[derive(Debug, Default)]
pub struct InMemoryLaunchRepository {
    partitions: DashMap<TaskInstanceId, Partition>,
    injected_failures: AtomicU32,
}

impl InMemoryLaunchRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` operations fail with `RepositoryError::Unavailable`
    pub fn inject_unavailable(&self, count: u32) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    /// Overwrite a row unconditionally, bypassing the ledger's invariants.
    /// Intended for seeding fixtures.
    pub fn put(&self, launch: SubWorkflowLaunch) {
        self.partition(launch.parent_task_instance_id)
            .lock()
            .insert(launch.index, launch);
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    fn partition(&self, parent_task_instance_id: TaskInstanceId) -> Partition {
        self.partitions
            .entry(parent_task_instance_id)
            .or_default()
            .clone()
    }

    fn existing_partition(&self, parent_task_instance_id: TaskInstanceId) -> Option<Partition> {
        self.partitions
            .get(&parent_task_instance_id)
            .map(|entry| entry.value().clone())
    }

    fn check_available(&self) -> RepositoryResult<()> {
        let consumed = self
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if consumed {
            Err(RepositoryError::Unavailable(
                "injected repository failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LaunchRepository for InMemoryLaunchRepository {
    async fn insert_missing(&self, launches: &[SubWorkflowLaunch]) -> RepositoryResult<usize> {
        self.check_available()?;
        let mut inserted = 0;
        for launch in launches {
            let partition = self.partition(launch.parent_task_instance_id);
            let mut rows = partition.lock();
            if !rows.contains_key(&launch.index) {
                rows.insert(launch.index, launch.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn find(
        &self,
        parent_task_instance_id: TaskInstanceId,
        index: u32,
    ) -> RepositoryResult<Option<SubWorkflowLaunch>> {
        self.check_available()?;
        Ok(self
            .existing_partition(parent_task_instance_id)
            .and_then(|partition| partition.lock().get(&index).cloned()))
    }

    async fn list(
        &self,
        parent_task_instance_id: TaskInstanceId,
    ) -> RepositoryResult<Vec<SubWorkflowLaunch>> {
        self.check_available()?;
        Ok(self
            .existing_partition(parent_task_instance_id)
            .map(|partition| partition.lock().values().cloned().collect())
            .unwrap_or_default())
    }

    async fn compare_and_set(
        &self,
        parent_task_instance_id: TaskInstanceId,
        index: u32,
        expected: LaunchStatus,
        update: &LaunchUpdate,
    ) -> RepositoryResult<bool> {
        self.check_available()?;
        let Some(partition) = self.existing_partition(parent_task_instance_id) else {
            return Ok(false);
        };
        let mut rows = partition.lock();
        match rows.get_mut(&index) {
            Some(launch) if launch.status == expected => {
                update.apply_to(launch);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
