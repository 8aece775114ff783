use tracing::{debug, instrument};

use crate::common::MetadataCredentials;
use crate::server::error::{HandlerError, HandlerResult};
use crate::server::service::{MetadataService, Reply};

impl MetadataService {
    /// An empty role segment is the SDK's discovery request and gets the active
    /// profile name; anything else returns credentials for the active role.
    #[instrument(skip(self))]
    pub async fn handle_credentials(&self, role: &str) -> HandlerResult<Reply> {
        if role.is_empty() {
            let profile = self.broker.active_profile().await.unwrap_or_default();
            return Ok(Reply::text(profile));
        }

        let creds = self
            .broker
            .role_credentials()
            .await
            .map_err(HandlerError::role_credentials)?;
        debug!("Issued role credentials {}", creds.access_key_id);

        let body = serde_json::to_string(&MetadataCredentials::from(creds))
            .map_err(|e| HandlerError::serialization("Error getting role credentials", e))?;
        Ok(Reply::json(body))
    }
}
