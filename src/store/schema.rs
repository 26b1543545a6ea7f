use super::{DocumentStore, SCHEMA_FILE};
use crate::error::Result;
use crate::store::types::{DocumentSchema, SchemaSection};

impl DocumentStore {
    /// Current schema; empty when `schema.json` does not exist yet.
    pub async fn read_schema(&self) -> Result<DocumentSchema> {
        Ok(self
            .repo
            .read_json::<DocumentSchema>(SCHEMA_FILE)
            .await?
            .unwrap_or_default())
    }

    pub async fn write_schema(&self, schema: &DocumentSchema) -> Result<()> {
        self.repo.write_json(SCHEMA_FILE, schema).await
    }

    /// Add a section, keeping sections ordered.
    pub async fn add_section(&self, section: SchemaSection) -> Result<DocumentSchema> {
        self.repo
            .update_json(SCHEMA_FILE, move |schema: &mut DocumentSchema| {
                schema.push_section(section);
                Ok(schema.clone())
            })
            .await
    }

    /// Apply `mutate` to the schema inside one queued read-modify-write.
    pub async fn update_schema<R, F>(&self, mutate: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut DocumentSchema) -> Result<R> + Send + 'static,
    {
        self.repo.update_json(SCHEMA_FILE, mutate).await
    }
}
