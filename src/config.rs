//! Configuration for the indexing backend and its partitions.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchSyncError};
use crate::writer::WriterPolicy;

/// Default capacity of a partition's batch queue.
pub const DEFAULT_MAX_QUEUE_LENGTH: usize = 1000;

/// Whether a batch caller waits for the batch to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Block until the batch has been applied and report its outcome.
    #[default]
    Sync,
    /// Enqueue the batch and return; failures go to the error handler.
    Async,
}

/// Thresholds triggering a forced merge of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Merge after this many successfully applied operations.
    pub operation_limit: Option<u64>,

    /// Merge after this many successfully applied batches.
    pub transaction_limit: Option<u64>,
}

impl OptimizerConfig {
    pub fn is_enabled(&self) -> bool {
        self.operation_limit.is_some() || self.transaction_limit.is_some()
    }
}

/// Configuration for a specific partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Partition identifier.
    pub partition_id: String,

    /// Commit/close policy of the partition's writer.
    pub writer_policy: WriterPolicy,

    /// Worker threads applying the operations of a batch.
    /// If None, the backend default applies.
    pub thread_pool_size: Option<usize>,

    /// Capacity of the batch queue; submitters block when it is full.
    pub max_queue_length: usize,

    /// Forced merge thresholds.
    pub optimizer: OptimizerConfig,

    /// Shared policy only: close the writer when the last streaming user leaves.
    pub close_shared_writer_after_streaming: bool,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            partition_id: "default".to_string(),
            writer_policy: WriterPolicy::default(),
            thread_pool_size: None,
            max_queue_length: DEFAULT_MAX_QUEUE_LENGTH,
            optimizer: OptimizerConfig::default(),
            close_shared_writer_after_streaming: false,
        }
    }
}

impl PartitionConfig {
    /// Create a new partition configuration.
    pub fn new<S: Into<String>>(partition_id: S) -> Self {
        Self {
            partition_id: partition_id.into(),
            ..Default::default()
        }
    }

    /// Set the writer policy.
    pub fn with_writer_policy(mut self, policy: WriterPolicy) -> Self {
        self.writer_policy = policy;
        self
    }

    /// Set the worker pool size.
    pub fn with_thread_pool_size(mut self, size: usize) -> Self {
        self.thread_pool_size = Some(size);
        self
    }

    /// Set the batch queue capacity.
    pub fn with_max_queue_length(mut self, length: usize) -> Self {
        self.max_queue_length = length;
        self
    }

    /// Set the optimizer thresholds.
    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Close shared writers after streaming.
    pub fn with_close_shared_writer_after_streaming(mut self, close: bool) -> Self {
        self.close_shared_writer_after_streaming = close;
        self
    }

    /// Build a partition configuration from flat `key = value` properties.
    ///
    /// Recognized keys: `indexmanager`, `exclusive_index_use`,
    /// `worker.thread_pool.size`, `max_queue_length`,
    /// `optimizer.operation_limit.max`, `optimizer.transaction_limit.max`
    /// and `shared.close_after_streaming`. Unknown keys are ignored.
    pub fn from_properties<I, K, V>(partition_id: &str, properties: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = PartitionConfig::new(partition_id);
        let mut near_real_time = false;
        let mut exclusive = true;

        for (key, value) in properties {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            match key {
                "indexmanager" => {
                    near_real_time = match value {
                        "near-real-time" => true,
                        "" | "directory-based" => false,
                        other => {
                            return Err(SearchSyncError::invalid_config(format!(
                                "Unknown index manager '{other}'"
                            )));
                        }
                    }
                }
                "exclusive_index_use" => exclusive = parse_value(key, value)?,
                "worker.thread_pool.size" => {
                    config.thread_pool_size = Some(parse_value(key, value)?)
                }
                "max_queue_length" => config.max_queue_length = parse_value(key, value)?,
                "optimizer.operation_limit.max" => {
                    config.optimizer.operation_limit = Some(parse_value(key, value)?)
                }
                "optimizer.transaction_limit.max" => {
                    config.optimizer.transaction_limit = Some(parse_value(key, value)?)
                }
                "shared.close_after_streaming" => {
                    config.close_shared_writer_after_streaming = parse_value(key, value)?
                }
                other => warn!("Ignoring unknown property '{other}' for partition '{partition_id}'"),
            }
        }

        config.writer_policy = if near_real_time {
            WriterPolicy::NearRealTime
        } else if exclusive {
            WriterPolicy::Exclusive
        } else {
            WriterPolicy::Shared
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the backend cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.partition_id.is_empty() {
            return Err(SearchSyncError::invalid_config(
                "Partition id must not be empty",
            ));
        }
        if self.thread_pool_size == Some(0) {
            return Err(SearchSyncError::invalid_config(format!(
                "Thread pool size of partition '{}' must be positive",
                self.partition_id
            )));
        }
        if self.max_queue_length == 0 {
            return Err(SearchSyncError::invalid_config(format!(
                "Queue length of partition '{}' must be positive",
                self.partition_id
            )));
        }
        if self.optimizer.operation_limit == Some(0) || self.optimizer.transaction_limit == Some(0)
        {
            return Err(SearchSyncError::invalid_config(format!(
                "Optimizer limits of partition '{}' must be positive",
                self.partition_id
            )));
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| SearchSyncError::invalid_config(format!("Invalid value '{value}' for '{key}': {e}")))
}

/// Configuration for the indexing backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Worker pool size for partitions that do not set one.
    /// If None, uses the number of CPU cores.
    pub default_thread_pool_size: Option<usize>,

    /// Partitions registered when the backend starts.
    pub partitions: Vec<PartitionConfig>,
}

impl BackendConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: BackendConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Add a partition.
    pub fn with_partition(mut self, partition: PartitionConfig) -> Self {
        self.partitions.push(partition);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_thread_pool_size == Some(0) {
            return Err(SearchSyncError::invalid_config(
                "Default thread pool size must be positive",
            ));
        }
        let mut seen = ahash::AHashSet::new();
        for partition in &self.partitions {
            partition.validate()?;
            if !seen.insert(partition.partition_id.as_str()) {
                return Err(SearchSyncError::invalid_config(format!(
                    "Duplicate partition '{}'",
                    partition.partition_id
                )));
            }
        }
        Ok(())
    }

    /// Worker pool size of a partition: its own, else the backend default,
    /// else the number of CPU cores.
    pub fn effective_thread_pool_size(&self, partition: &PartitionConfig) -> usize {
        partition
            .thread_pool_size
            .or(self.default_thread_pool_size)
            .unwrap_or_else(num_cpus::get)
    }
}
