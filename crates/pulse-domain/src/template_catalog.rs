use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::SyncResult;
use crate::repository::TemplateCatalog;
use crate::types::Template;

/// Read-through in-process cache over a `TemplateCatalog`.
///
/// Templates are read-only from the engine's perspective, so entries are kept
/// for the life of the process. Missing templates are not cached negatively;
/// a template created after the first lookup resolves on the next one.
pub struct CachingTemplateCatalog {
    inner: Arc<dyn TemplateCatalog>,
    resolved: RwLock<HashMap<String, Template>>,
}

impl CachingTemplateCatalog {
    pub fn new(inner: Arc<dyn TemplateCatalog>) -> Self {
        Self {
            inner,
            resolved: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl TemplateCatalog for CachingTemplateCatalog {
    async fn resolve(&self, template_id: &str) -> SyncResult<Option<Template>> {
        if let Some(template) = self.resolved.read().await.get(template_id) {
            return Ok(Some(template.clone()));
        }

        let template = self.inner.resolve(template_id).await?;
        if let Some(template) = &template {
            debug!(template_id = %template_id, "caching resolved template");
            self.resolved
                .write()
                .await
                .insert(template_id.to_string(), template.clone());
        }
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockTemplateCatalog;
    use crate::types::{ChannelDefinition, ChannelType};

    fn template(id: &str) -> Template {
        Template {
            id: id.to_string(),
            channels: vec![ChannelDefinition {
                name: "led".to_string(),
                channel_type: ChannelType::Boolean,
                options: Vec::new(),
            }],
        }
    }

    #[tokio::test]
    async fn resolves_through_inner_once() {
        let mut inner = MockTemplateCatalog::new();
        inner
            .expect_resolve()
            .withf(|id| id == "template-1")
            .times(1)
            .returning(|_| Ok(Some(template("template-1"))));

        let catalog = CachingTemplateCatalog::new(Arc::new(inner));

        let first = catalog.resolve("template-1").await.unwrap();
        let second = catalog.resolve("template-1").await.unwrap();
        assert_eq!(first, second);
        assert!(first.is_some());
    }

    #[tokio::test]
    async fn does_not_cache_missing_templates() {
        let mut inner = MockTemplateCatalog::new();
        inner
            .expect_resolve()
            .times(2)
            .returning(|_| Ok(None));

        let catalog = CachingTemplateCatalog::new(Arc::new(inner));

        assert!(catalog.resolve("absent").await.unwrap().is_none());
        assert!(catalog.resolve("absent").await.unwrap().is_none());
    }
}
