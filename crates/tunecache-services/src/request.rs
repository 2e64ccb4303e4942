//! Turning a user-supplied URL into queued acquisitions.

use std::sync::Arc;
use uuid::Uuid;

use tunecache_core::models::Job;
use tunecache_core::{parse_content_url, AppError};
use tunecache_db::AssociationRepository;
use tunecache_worker::TaskQueue;

use crate::providers::MetadataProvider;

#[derive(Clone)]
pub struct RequestService {
    queue: TaskQueue,
    associations: AssociationRepository,
    metadata: Arc<dyn MetadataProvider>,
}

impl RequestService {
    pub fn new(
        queue: TaskQueue,
        associations: AssociationRepository,
        metadata: Arc<dyn MetadataProvider>,
    ) -> Self {
        Self {
            queue,
            associations,
            metadata,
        }
    }

    /// Queue one acquisition per item behind `url`, skipping items the session
    /// already holds. Returns the ids of the queued tasks; acquisition outcomes
    /// are never reported back.
    #[tracing::instrument(skip(self, session_token))]
    pub async fn submit_url(&self, url: &str, session_token: &str) -> Result<Vec<Uuid>, AppError> {
        if session_token.trim().is_empty() {
            return Err(AppError::InvalidInput("session token is empty".to_string()));
        }

        let reference = parse_content_url(url)?;
        let content_ids = if reference.is_collection {
            self.metadata
                .expand_collection(&reference.content_id)
                .await
                .map_err(|e| AppError::NotFound(format!("collection {}: {}", reference.content_id, e)))?
        } else {
            vec![reference.content_id]
        };

        let mut task_ids = Vec::with_capacity(content_ids.len());
        for content_id in content_ids {
            if self
                .associations
                .session_holds_content(session_token, &content_id)
                .await?
            {
                tracing::debug!(content_id = %content_id, "Session already holds content, not queued");
                continue;
            }
            let task_id = self
                .queue
                .submit(&Job::acquisition(content_id, session_token))
                .await?;
            task_ids.push(task_id);
        }

        Ok(task_ids)
    }
}
