//! Instance configuration (`spec.md` §4.2's `init`, §6.3's defaults).

use serde::{Deserialize, Serialize};

use crate::logging::Level;

/// Staging strategy selection, mirrored from `spec.md` §4.5. The byte
/// payload for `Fixed`'s caller-supplied region and `MappedFile`'s
/// directory are supplied separately to `Instance::init_mem` /
/// `Instance::init_file`; this enum only carries the parts that make sense
/// to serialize (e.g. for an embedding application's config file), the way
/// `vector_buffers::config::BufferType` separates its serializable shape
/// from the runtime objects it builds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum StagingStrategyKind {
    DynamicMemory,
    FixedMemory { capacity: usize },
    MappedFile { directory: std::path::PathBuf, capacity: Option<usize> },
}

impl Default for StagingStrategyKind {
    fn default() -> Self {
        StagingStrategyKind::DynamicMemory
    }
}

/// `spec.md` §6.3 defaults: verbosity = warning, scalar promotion = on,
/// parallel copy = on, staging strategy = dynamic memory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub verbosity: Level,
    #[serde(default = "default_true")]
    pub scalar_as_array: bool,
    #[serde(default = "default_true")]
    pub parallel_copy: bool,
    #[serde(default)]
    pub staging: StagingStrategyKind,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Config {
            verbosity: Level::default(),
            scalar_as_array: true,
            parallel_copy: true,
            staging: StagingStrategyKind::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.verbosity, Level::Warning);
        assert!(cfg.scalar_as_array);
        assert!(cfg.parallel_copy);
        assert!(matches!(cfg.staging, StagingStrategyKind::DynamicMemory));
    }
}
