use async_trait::async_trait;
use model::location::LocationSample;
use transit::database::{LocationRepo, Result};

use crate::{
    queries::location::append,
    PgDatabaseAutocommit, PgDatabaseTransaction,
};

#[async_trait]
impl LocationRepo for PgDatabaseAutocommit {
    async fn append_location(&mut self, sample: &LocationSample) -> Result<()> {
        append(&self.pool, sample).await
    }
}

#[async_trait]
impl<'a> LocationRepo for PgDatabaseTransaction<'a> {
    async fn append_location(&mut self, sample: &LocationSample) -> Result<()> {
        append(&mut *self.tx, sample).await
    }
}
