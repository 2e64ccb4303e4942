//! Session-facing listing and consumption of cached files.

use std::path::PathBuf;
use std::sync::Arc;

use tunecache_core::models::AssociationView;
use tunecache_core::AppError;
use tunecache_db::AssociationRepository;
use tunecache_storage::Storage;

#[derive(Clone)]
pub struct ConsumptionService {
    associations: AssociationRepository,
    storage: Arc<dyn Storage>,
}

impl ConsumptionService {
    pub fn new(associations: AssociationRepository, storage: Arc<dyn Storage>) -> Self {
        Self {
            associations,
            storage,
        }
    }

    pub async fn list_associations(&self, session_token: &str) -> Result<Vec<AssociationView>, AppError> {
        Ok(self.associations.list_for_session(session_token).await?)
    }

    /// Release the session's claim on `file_name` and return the file to serve.
    /// `None` when the session holds no such file.
    #[tracing::instrument(skip(self, session_token))]
    pub async fn consume(&self, session_token: &str, file_name: &str) -> Result<Option<PathBuf>, AppError> {
        let Some(view) = self
            .associations
            .find_for_session_by_file_name(session_token, file_name)
            .await?
        else {
            return Ok(None);
        };

        let path = self.path_for(&view.file_name)?;
        self.associations.delete(view.association_id).await?;
        tracing::info!(media_id = %view.media_id, file_name = %view.file_name, "File consumed");
        Ok(Some(path))
    }

    /// Release every claim of the session in one commit. Returns the paths of
    /// files that still exist, in request order.
    #[tracing::instrument(skip(self, session_token))]
    pub async fn consume_all(&self, session_token: &str) -> Result<Vec<PathBuf>, AppError> {
        let views = self.associations.list_for_session(session_token).await?;
        let paths = views
            .iter()
            .map(|view| self.path_for(&view.file_name))
            .collect::<Result<Vec<_>, _>>()?;

        let ids: Vec<_> = views.iter().map(|view| view.association_id).collect();
        let released = self.associations.delete_all(&ids).await?;
        tracing::info!(released, "Session claims released");

        let mut existing = Vec::with_capacity(paths.len());
        for (view, path) in views.iter().zip(paths) {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                existing.push(path);
            } else {
                tracing::warn!(file_name = %view.file_name, "Consumed file is missing on disk, skipping");
            }
        }
        Ok(existing)
    }

    fn path_for(&self, file_name: &str) -> Result<PathBuf, AppError> {
        self.storage
            .path_for(file_name)
            .map_err(|e| AppError::Storage(e.to_string()))
    }
}
