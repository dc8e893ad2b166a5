//! The record store seam consumed by the orchestrator

use async_trait::async_trait;
use nodedeck_core::{ActivityAction, ActivityRecord, App, AppPatch, NewApp, Result};

use crate::Database;

/// Durable keyed records for apps plus the activity log.
///
/// Implementations serialize their own writes. `create` and `update` must
/// reject a duplicate name with `Error::NameTaken` and a duplicate port with
/// `Error::PortTaken`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list(&self) -> Result<Vec<App>>;

    async fn get(&self, id: u32) -> Result<Option<App>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<App>>;

    async fn create(&self, new: &NewApp) -> Result<App>;

    /// Fails with `Error::AppNotFound` when the row is gone
    async fn update(&self, id: u32, patch: &AppPatch) -> Result<App>;

    /// Returns false when there was nothing to delete
    async fn delete(&self, id: u32) -> Result<bool>;

    /// Ports held by existing rows
    async fn ports(&self) -> Result<Vec<u16>> {
        Ok(self.list().await?.into_iter().map(|a| a.port).collect())
    }

    async fn append_activity(&self, app_id: u32, app_name: &str, action: ActivityAction)
        -> Result<()>;

    async fn list_activity(&self, limit: usize) -> Result<Vec<ActivityRecord>>;
}

#[async_trait]
impl RecordStore for Database {
    async fn list(&self) -> Result<Vec<App>> {
        self.apps().get_all().await
    }

    async fn get(&self, id: u32) -> Result<Option<App>> {
        self.apps().get_by_id(id).await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<App>> {
        self.apps().get_by_name(name).await
    }

    async fn create(&self, new: &NewApp) -> Result<App> {
        self.apps().insert(new).await
    }

    async fn update(&self, id: u32, patch: &AppPatch) -> Result<App> {
        self.apps().update(id, patch).await
    }

    async fn delete(&self, id: u32) -> Result<bool> {
        self.apps().delete(id).await
    }

    async fn ports(&self) -> Result<Vec<u16>> {
        self.apps().ports().await
    }

    async fn append_activity(
        &self,
        app_id: u32,
        app_name: &str,
        action: ActivityAction,
    ) -> Result<()> {
        self.activity().append(app_id, app_name, action).await
    }

    async fn list_activity(&self, limit: usize) -> Result<Vec<ActivityRecord>> {
        self.activity().recent(limit).await
    }
}
