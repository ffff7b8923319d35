use async_trait::async_trait;
use cadence_cache::{Cache, CacheClass};
use cadence_config::WorkflowDef;
use tracing::debug;

use crate::{Error, RunRecord, RunStats, RunStore, WorkflowStore};

/// Decorates a store with the advisory cache.
///
/// Workflow definitions are cached under [`CacheClass::WorkflowConfig`] and
/// run listings under [`CacheClass::WorkflowRuns`]. Writes invalidate the
/// affected key after the underlying store accepts them.
pub struct CachedStore<S> {
  inner: S,
  cache: Cache,
}

impl<S> CachedStore<S> {
  pub fn new(inner: S, cache: Cache) -> Self {
    Self { inner, cache }
  }

  pub fn inner(&self) -> &S {
    &self.inner
  }

  pub fn cache(&self) -> &Cache {
    &self.cache
  }

  async fn invalidate(&self, class: CacheClass, id: &str) {
    let key = class.key(id);
    debug!(key = %key, "cache_invalidate");
    self.cache.delete(&key).await;
  }
}

#[async_trait]
impl<S: WorkflowStore> WorkflowStore for CachedStore<S> {
  async fn get_workflow(&self, workflow_id: &str) -> Result<Option<WorkflowDef>, Error> {
    let class = CacheClass::WorkflowConfig;
    let result = self
      .cache
      .get_or_compute(&class.key(workflow_id), class.ttl_secs(), || async {
        // Absent workflows are not cached.
        self
          .inner
          .get_workflow(workflow_id)
          .await?
          .ok_or_else(|| Error::NotFound(format!("workflow {}", workflow_id)))
      })
      .await;

    match result {
      Ok(workflow) => Ok(Some(workflow)),
      Err(Error::NotFound(_)) => Ok(None),
      Err(e) => Err(e),
    }
  }

  async fn save_workflow(&self, workflow: &WorkflowDef) -> Result<(), Error> {
    self.inner.save_workflow(workflow).await?;
    self
      .invalidate(CacheClass::WorkflowConfig, &workflow.id)
      .await;
    Ok(())
  }

  async fn list_workflows(&self) -> Result<Vec<WorkflowDef>, Error> {
    self.inner.list_workflows().await
  }
}

#[async_trait]
impl<S: RunStore> RunStore for CachedStore<S> {
  async fn create_run(&self, run: &RunRecord) -> Result<(), Error> {
    self.inner.create_run(run).await?;
    self
      .invalidate(CacheClass::WorkflowRuns, &run.workflow_id)
      .await;
    Ok(())
  }

  async fn finish_run(&self, run: &RunRecord) -> Result<(), Error> {
    self.inner.finish_run(run).await?;
    self
      .invalidate(CacheClass::WorkflowRuns, &run.workflow_id)
      .await;
    Ok(())
  }

  async fn get_run(&self, run_id: &str) -> Result<RunRecord, Error> {
    self.inner.get_run(run_id).await
  }

  async fn list_runs(&self, workflow_id: &str) -> Result<Vec<RunRecord>, Error> {
    let class = CacheClass::WorkflowRuns;
    self
      .cache
      .get_or_compute(&class.key(workflow_id), class.ttl_secs(), || {
        self.inner.list_runs(workflow_id)
      })
      .await
  }

  async fn stats(&self, caller_id: Option<&str>) -> Result<RunStats, Error> {
    self.inner.stats(caller_id).await
  }
}

#[cfg(test)]
mod tests {
  use cadence_cache::CacheConfig;
  use cadence_config::TriggerType;

  use super::*;
  use crate::{MemoryStore, RunStatus};

  fn memory_store(workflows: Vec<WorkflowDef>) -> CachedStore<MemoryStore> {
    CachedStore::new(
      MemoryStore::with_workflows(workflows),
      Cache::from_config(CacheConfig::Memory),
    )
  }

  #[tokio::test]
  async fn test_workflow_config_is_cached_and_invalidated() {
    let store = CachedStore::new(
      MemoryStore::with_workflows([WorkflowDef::new("wf", "v1")]),
      Cache::from_config(CacheConfig::Memory),
    );

    assert_eq!(store.get_workflow("wf").await.unwrap().unwrap().name, "v1");
    store.cache().flush().await;
    let cached: Option<WorkflowDef> = store.cache().get("workflow:config:wf").await;
    assert_eq!(cached.map(|w| w.name), Some("v1".to_string()));

    // A write that bypasses the decorator is not visible until invalidation.
    store
      .inner()
      .save_workflow(&WorkflowDef::new("wf", "v2"))
      .await
      .unwrap();
    assert_eq!(store.get_workflow("wf").await.unwrap().unwrap().name, "v1");

    store
      .save_workflow(&WorkflowDef::new("wf", "v3"))
      .await
      .unwrap();
    assert_eq!(store.get_workflow("wf").await.unwrap().unwrap().name, "v3");
  }

  #[tokio::test]
  async fn test_save_right_after_miss_is_not_shadowed() {
    let store = memory_store(vec![WorkflowDef::new("wf", "v1")]);

    assert_eq!(store.get_workflow("wf").await.unwrap().unwrap().name, "v1");
    store
      .save_workflow(&WorkflowDef::new("wf", "v2"))
      .await
      .unwrap();
    store.cache().flush().await;

    assert_eq!(store.get_workflow("wf").await.unwrap().unwrap().name, "v2");
  }

  #[tokio::test]
  async fn test_run_created_right_after_listing_is_visible() {
    let store = memory_store(vec![]);

    assert!(store.list_runs("wf").await.unwrap().is_empty());
    store
      .create_run(&RunRecord::start("r1", "wf", "u1", TriggerType::Manual))
      .await
      .unwrap();
    store.cache().flush().await;

    assert_eq!(store.list_runs("wf").await.unwrap().len(), 1);

    let mut done = store.get_run("r1").await.unwrap();
    done.status = RunStatus::Success;
    store.finish_run(&done).await.unwrap();
    store.cache().flush().await;

    assert_eq!(store.list_runs("wf").await.unwrap()[0].status, RunStatus::Success);
  }

  #[tokio::test]
  async fn test_missing_workflow_is_not_cached() {
    let store = CachedStore::new(MemoryStore::new(), Cache::from_config(CacheConfig::Memory));

    assert!(store.get_workflow("wf").await.unwrap().is_none());
    store.cache().flush().await;
    assert!(
      store
        .cache()
        .get::<WorkflowDef>("workflow:config:wf")
        .await
        .is_none()
    );

    store.save_workflow(&WorkflowDef::new("wf", "new")).await.unwrap();
    assert!(store.get_workflow("wf").await.unwrap().is_some());
  }

  #[tokio::test]
  async fn test_run_writes_invalidate_history() {
    let store = CachedStore::new(MemoryStore::new(), Cache::from_config(CacheConfig::Memory));

    let run = RunRecord::start("r1", "wf", "u1", TriggerType::Manual);
    store.create_run(&run).await.unwrap();
    assert_eq!(store.list_runs("wf").await.unwrap().len(), 1);
    store.cache().flush().await;

    let mut done = run.clone();
    done.status = RunStatus::Success;
    store.finish_run(&done).await.unwrap();

    let runs = store.list_runs("wf").await.unwrap();
    assert_eq!(runs[0].status, RunStatus::Success);
    store.cache().flush().await;

    store
      .create_run(&RunRecord::start("r2", "wf", "u1", TriggerType::Manual))
      .await
      .unwrap();
    assert_eq!(store.list_runs("wf").await.unwrap().len(), 2);
  }

  #[tokio::test]
  async fn test_disabled_cache_passes_through() {
    let store = CachedStore::new(
      MemoryStore::with_workflows([WorkflowDef::new("wf", "v1")]),
      Cache::disabled(),
    );

    store
      .inner()
      .save_workflow(&WorkflowDef::new("wf", "v2"))
      .await
      .unwrap();
    assert_eq!(store.get_workflow("wf").await.unwrap().unwrap().name, "v2");
  }
}
