use super::StoreArgs;
use anyhow::Context;
use gbp_archive::{ArchiveConfig, FsStorage, SqliteRecordStore};
use tracing::debug;

/// The collaborators a command works against.
pub struct Stores {
    pub config: ArchiveConfig,
    pub records: SqliteRecordStore,
    pub storage: FsStorage,
}

/// Defaults, then the config file, then command-line/environment overrides.
pub fn load_config(args: &StoreArgs) -> anyhow::Result<ArchiveConfig> {
    let mut config = match &args.config {
        Some(path) => ArchiveConfig::load(path)?,
        None => ArchiveConfig::default(),
    };
    if let Some(path) = &args.records_db {
        config.records_db = path.clone();
    }
    if let Some(path) = &args.storage_root {
        config.storage_root = path.clone();
    }
    Ok(config)
}

impl Stores {
    pub fn open(args: &StoreArgs) -> anyhow::Result<Self> {
        let config = load_config(args)?;
        debug!(
            records_db = %config.records_db.display(),
            storage_root = %config.storage_root.display(),
            "opening stores"
        );

        if let Some(parent) = config.records_db.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let records = SqliteRecordStore::open(&config.records_db).with_context(|| {
            format!(
                "failed to open records database {}",
                config.records_db.display()
            )
        })?;
        let storage = FsStorage::new(&config.storage_root);

        Ok(Self {
            config,
            records,
            storage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gbp-archive.yaml");
        std::fs::write(
            &path,
            "version: 1\nrecords_db: /srv/gbp/records.sqlite3\nstorage_root: /srv/gbp/storage\n",
        )
        .unwrap();

        let config = load_config(&StoreArgs {
            config: Some(path),
            records_db: None,
            storage_root: Some(PathBuf::from("/mnt/storage")),
        })
        .unwrap();

        assert_eq!(config.records_db, PathBuf::from("/srv/gbp/records.sqlite3"));
        assert_eq!(config.storage_root, PathBuf::from("/mnt/storage"));
    }

    #[test]
    fn no_config_is_defaults() {
        assert_eq!(
            load_config(&StoreArgs::default()).unwrap(),
            ArchiveConfig::default()
        );
    }
}
