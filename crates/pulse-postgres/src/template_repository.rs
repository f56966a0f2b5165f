use anyhow::Context;
use async_trait::async_trait;

use pulse_domain::{ChannelDefinition, SyncError, SyncResult, Template, TemplateCatalog};

use crate::client::PostgresClient;

/// PostgreSQL-backed template catalog. Channel definitions live in a jsonb
/// column owned by the template editing surface; the engine only reads them.
#[derive(Clone)]
pub struct PostgresTemplateRepository {
    client: PostgresClient,
}

impl PostgresTemplateRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TemplateCatalog for PostgresTemplateRepository {
    async fn resolve(&self, template_id: &str) -> SyncResult<Option<Template>> {
        let conn = self.client.get_connection().await?;

        let row = conn
            .query_opt(
                "SELECT id, channels FROM templates WHERE id = $1",
                &[&template_id],
            )
            .await
            .map_err(|e| SyncError::Persistence(e.into()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let channels: serde_json::Value = row.get(1);
        let channels: Vec<ChannelDefinition> = serde_json::from_value(channels)
            .context("invalid channel definitions stored on template")?;

        Ok(Some(Template {
            id: row.get(0),
            channels,
        }))
    }
}
