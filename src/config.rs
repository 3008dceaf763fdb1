//! Tunables for building and running a [`Flow`](crate::flow::Flow).

use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Flow-wide settings.
///
/// All fields have defaults, so a JSON file only needs the ones it changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Expected size of one shard, used for sort buffers and memory estimates.
    pub partition_size_mb: i64,
    /// A LocalSort buffers this many partitions' worth of rows before spilling.
    pub sort_buffer_factor: i64,
    /// Fan-in of each level of a tree merge.
    pub tree_merge_factor: usize,
    /// Chunks allowed in flight on one in-memory pipe before the writer blocks.
    pub pipe_capacity: usize,
    /// Where LocalSort spill runs go; the system temp directory when unset.
    pub spill_dir: Option<PathBuf>,
    /// Shard count used by `Dataset::partition_default` and friends.
    pub default_shards: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            partition_size_mb: 64,
            sort_buffer_factor: 3,
            tree_merge_factor: 10,
            pipe_capacity: 64,
            spill_dir: None,
            default_shards: num_cpus::get().max(2),
        }
    }
}

impl FlowConfig {
    /// Parse and validate a JSON document.
    ///
    /// # Errors
    /// [`FlowError::Config`] for malformed JSON or invalid values.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s).map_err(|e| FlowError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON file.
    ///
    /// # Errors
    /// [`FlowError::Io`] if the file cannot be read, otherwise as [`Self::from_json_str`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// # Errors
    /// [`FlowError::Config`] naming the first field that is zero or negative.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("partition_size_mb", self.partition_size_mb > 0),
            ("sort_buffer_factor", self.sort_buffer_factor > 0),
            ("tree_merge_factor", self.tree_merge_factor > 1),
            ("pipe_capacity", self.pipe_capacity > 0),
            ("default_shards", self.default_shards > 0),
        ];
        match positive.iter().find(|(_, ok)| !ok) {
            Some((field, _)) => Err(FlowError::Config(format!("{field} is out of range"))),
            None => Ok(()),
        }
    }

    /// In-memory budget of one LocalSort, in MiB.
    #[must_use]
    pub fn sort_memory_mb(&self) -> i64 {
        self.partition_size_mb.saturating_mul(self.sort_buffer_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = FlowConfig::from_json_str(r#"{"pipe_capacity": 8}"#).unwrap();
        assert_eq!(cfg.pipe_capacity, 8);
        assert_eq!(cfg.tree_merge_factor, 10);
        assert_eq!(cfg.sort_memory_mb(), 192);
    }

    #[test]
    fn single_way_tree_merge_is_rejected() {
        let cfg = FlowConfig {
            tree_merge_factor: 1,
            ..FlowConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(FlowError::Config(_))));
    }

    #[test]
    fn loads_from_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.json");
        std::fs::write(&path, r#"{"tree_merge_factor": 4, "spill_dir": "/tmp/spill"}"#).unwrap();
        let cfg = FlowConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.tree_merge_factor, 4);
        assert_eq!(cfg.spill_dir, Some(PathBuf::from("/tmp/spill")));

        std::fs::write(&path, r#"{"pipe_capacity": 0}"#).unwrap();
        assert!(matches!(FlowConfig::from_json_file(&path), Err(FlowError::Config(_))));
        assert!(matches!(
            FlowConfig::from_json_file(dir.path().join("missing.json")),
            Err(FlowError::Io(_))
        ));
    }
}
