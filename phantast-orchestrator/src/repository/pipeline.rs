//! Pipeline Repository
//!
//! In-memory pipeline storage shared by the API handlers.

use phantast_core::domain::pipeline::Pipeline;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

/// Thread-safe map of pipelines keyed by id
#[derive(Debug, Default)]
pub struct PipelineStore {
    pipelines: RwLock<HashMap<Uuid, Pipeline>>,
}

impl PipelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a pipeline, replacing any pipeline with the same id
    pub fn insert(&self, pipeline: Pipeline) -> Pipeline {
        let mut pipelines = self
            .pipelines
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        pipelines.insert(pipeline.id, pipeline.clone());
        pipeline
    }

    /// Find a pipeline by ID
    pub fn find_by_id(&self, id: Uuid) -> Option<Pipeline> {
        self.pipelines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// List all pipelines, newest first
    pub fn list_all(&self) -> Vec<Pipeline> {
        let mut pipelines: Vec<Pipeline> = self
            .pipelines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        pipelines.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.name.cmp(&b.name)));
        pipelines
    }

    /// Applies `edit` to a stored pipeline in place
    ///
    /// Returns `None` if the pipeline does not exist.
    pub fn update<R>(&self, id: Uuid, edit: impl FnOnce(&mut Pipeline) -> R) -> Option<R> {
        let mut pipelines = self
            .pipelines
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        pipelines.get_mut(&id).map(edit)
    }

    /// Delete a pipeline by ID
    pub fn delete(&self, id: Uuid) -> bool {
        self.pipelines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.pipelines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_find_delete() {
        let store = PipelineStore::new();
        let pipeline = store.insert(Pipeline::new("confluency"));

        assert_eq!(store.find_by_id(pipeline.id).unwrap().name, "confluency");
        assert!(store.delete(pipeline.id));
        assert!(!store.delete(pipeline.id));
        assert!(store.find_by_id(pipeline.id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_in_place() {
        let store = PipelineStore::new();
        let pipeline = store.insert(Pipeline::new("p"));

        let renamed = store.update(pipeline.id, |p| {
            p.name = "renamed".to_string();
            p.name.clone()
        });
        assert_eq!(renamed.as_deref(), Some("renamed"));
        assert_eq!(store.find_by_id(pipeline.id).unwrap().name, "renamed");
        assert!(store.update(Uuid::new_v4(), |_| ()).is_none());
    }
}
