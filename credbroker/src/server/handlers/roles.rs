use crate::server::error::{HandlerError, HandlerResult};
use crate::server::service::{MetadataService, Reply};

impl MetadataService {
    pub async fn handle_list_roles(&self) -> HandlerResult<Reply> {
        let body = serde_json::to_string(&self.available_roles().await)
            .map_err(|e| HandlerError::serialization("Error building role list", e))?;
        Ok(Reply::json(body))
    }
}
