use std::path::PathBuf;

use tkb_journal::SyncMode;

/// Configuration for opening a [`crate::KnowledgeBase`].
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Path of the durable commit log. `None` keeps the store in memory.
    pub journal_path: Option<PathBuf>,
    /// Journal flush strategy.
    pub sync_mode: SyncMode,
    /// Author recorded on commits begun without an explicit author.
    pub default_author: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            journal_path: None,
            sync_mode: SyncMode::OsDefault,
            default_author: "system".to_string(),
        }
    }
}

/// Partial configuration overriding individual [`StoreConfig`] fields.
#[derive(Clone, Debug, Default)]
pub struct StoreOverrides {
    pub journal_path: Option<PathBuf>,
    pub sync_mode: Option<SyncMode>,
    pub default_author: Option<String>,
}

impl StoreConfig {
    /// Apply the set fields of `overrides` on top of this configuration.
    pub fn merge(mut self, overrides: StoreOverrides) -> Self {
        if let Some(path) = overrides.journal_path {
            self.journal_path = Some(path);
        }
        if let Some(sync_mode) = overrides.sync_mode {
            self.sync_mode = sync_mode;
        }
        if let Some(author) = overrides.default_author {
            self.default_author = author;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_memory() {
        let config = StoreConfig::default();
        assert!(config.journal_path.is_none());
        assert_eq!(config.sync_mode, SyncMode::OsDefault);
        assert_eq!(config.default_author, "system");
    }

    #[test]
    fn merge_overrides_only_set_fields() {
        let merged = StoreConfig::default().merge(StoreOverrides {
            default_author: Some("importer".into()),
            ..StoreOverrides::default()
        });
        assert_eq!(merged.default_author, "importer");
        assert!(merged.journal_path.is_none());

        let with_journal = StoreConfig::default().merge(StoreOverrides {
            journal_path: Some("/tmp/kb.journal".into()),
            sync_mode: Some(SyncMode::EveryWrite),
            ..StoreOverrides::default()
        });
        assert_eq!(with_journal.sync_mode, SyncMode::EveryWrite);
        assert!(with_journal.journal_path.is_some());
        assert_eq!(with_journal.default_author, "system");
    }
}
