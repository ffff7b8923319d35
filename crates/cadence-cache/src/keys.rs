/// Classes of cached data, each with its own key scheme and TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheClass {
  /// A user's connected-service credentials.
  ///
  /// Reserves the `user:credentials:` namespace for module functions that
  /// look up service credentials. The engine itself never reads credentials.
  Credentials,
  /// A stored workflow definition.
  WorkflowConfig,
  /// Recent run history of a workflow.
  WorkflowRuns,
}

impl CacheClass {
  pub fn key(&self, id: &str) -> String {
    match self {
      CacheClass::Credentials => format!("user:credentials:{}", id),
      CacheClass::WorkflowConfig => format!("workflow:config:{}", id),
      CacheClass::WorkflowRuns => format!("workflow:runs:{}", id),
    }
  }

  pub fn ttl_secs(&self) -> u64 {
    match self {
      CacheClass::Credentials => 300,
      CacheClass::WorkflowConfig => 600,
      CacheClass::WorkflowRuns => 60,
    }
  }
}
