use hyper::Method;
use tracing::info;

use crate::server::error::HandlerResult;
use crate::server::service::{MetadataService, Reply};

impl MetadataService {
    pub async fn handle_refresh(&self, method: &Method) -> HandlerResult<Reply> {
        if method == Method::POST {
            self.broker.refresh().await;
            info!("Session credentials expired on request");
        }
        Ok(Reply::text("success"))
    }
}
