use chrono::{DateTime, Local, Utc};
use hyper::{Body, Request};
use tracing::{info, instrument};

use crate::server::error::{HandlerError, HandlerResult};
use crate::server::service::{read_body, MetadataService, Reply};
use crate::server::PROFILE_READ_LIMIT;

impl MetadataService {
    pub async fn handle_get_profile(&self) -> HandlerResult<Reply> {
        let profile = self.broker.active_profile().await.unwrap_or_default();
        Ok(Reply::text(profile))
    }

    #[instrument(skip(self, req))]
    pub async fn handle_select_profile(&self, req: Request<Body>) -> HandlerResult<Reply> {
        let mut body = req.into_body();
        let data = read_body(&mut body, PROFILE_READ_LIMIT).await?;
        let name = String::from_utf8_lossy(&data).trim().to_string();

        let expiration = self
            .broker
            .select_profile(&name)
            .await
            .map_err(HandlerError::session)?;

        info!("Profile '{}' is now active", name);
        Ok(Reply::text(local_time(expiration)))
    }
}

/// Expiration as shown to people, in the local timezone
pub(crate) fn local_time(instant: DateTime<Utc>) -> String {
    instant.with_timezone(&Local).to_string()
}
