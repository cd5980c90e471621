//! Explicit engine configuration, replacing the source's global `settings`/`key_names`
//! modules with a constructor-injected struct threaded through every component.

use crate::model::COORDINATING_CENTER_DFCI;
use crate::oncotree::Oncotree;
use crate::vocab::VocabularyTable;

/// Everything C1 through C9 need that is not part of the per-call input: the vocabulary
/// table (C1), the oncotree handle (C2), the coordinating-center constant used by C9, and
/// how many trials C8 evaluates concurrently.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub vocab: VocabularyTable,
    pub oncotree: Oncotree,
    pub coordinating_center_dfci: &'static str,
    /// Upper bound on trials evaluated concurrently by C8's `rayon` fan-out. `0` means
    /// "let rayon pick", matching the global thread pool default.
    pub batch_concurrency: usize,
}

impl EngineConfig {
    /// Builds a config with the built-in vocabulary table and default concurrency.
    pub fn new(oncotree: Oncotree) -> Self {
        Self {
            vocab: VocabularyTable::new(),
            oncotree,
            coordinating_center_dfci: COORDINATING_CENTER_DFCI,
            batch_concurrency: 0,
        }
    }

    /// Builds a config with an explicit concurrency bound, for batch runners that want to
    /// cap `rayon` fan-out.
    pub fn with_batch_concurrency(mut self, batch_concurrency: usize) -> Self {
        self.batch_concurrency = batch_concurrency;
        self
    }
}
