use crate::config::StoreConfig;
use crate::error::Result;
use crate::state::{InMemoryStore, ResourceStore};
use std::sync::Arc;

/// Create a resource store based on configuration
pub fn create_store(config: &StoreConfig) -> Result<Arc<dyn ResourceStore>> {
    match config.snapshot_path {
        Some(ref path) => {
            tracing::info!(path = ?path, "Initializing in-memory store from snapshot");
            Ok(Arc::new(InMemoryStore::load(path)?))
        }
        None => {
            tracing::info!("Initializing empty in-memory store");
            Ok(create_in_memory_store())
        }
    }
}

/// Create an empty in-memory store
pub fn create_in_memory_store() -> Arc<dyn ResourceStore> {
    Arc::new(InMemoryStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_create_store_from_snapshot() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "repositories": [{{"id": 1, "slug": "demo", "name": "Demo"}}],
                "courses": [{{"id": 2, "repository_id": 1, "org": "MITx", "course_number": "1", "run": "r"}}],
                "resources": [{{"id": 3, "course_id": 2, "resource_type": "problem", "title": "P"}}]
            }}"#
        )
        .unwrap();

        let store = create_store(&StoreConfig {
            snapshot_path: Some(file.path().to_path_buf()),
        })
        .unwrap();

        assert_eq!(store.all_resource_ids().await.unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_create_store_without_snapshot() {
        let store = create_store(&StoreConfig::default()).unwrap();
        assert!(store.all_resource_ids().await.unwrap().is_empty());
    }
}
