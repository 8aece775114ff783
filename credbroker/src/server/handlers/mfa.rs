use hyper::{Body, Request};
use tracing::instrument;

use super::profile::local_time;
use crate::broker::MfaCode;
use crate::server::error::{HandlerError, HandlerResult};
use crate::server::service::{read_body, MetadataService, Reply};
use crate::server::MFA_READ_LIMIT;

impl MetadataService {
    #[instrument(skip(self, req))]
    pub async fn handle_mfa(&self, req: Request<Body>) -> HandlerResult<Reply> {
        let mut body = req.into_body();
        let data = read_body(&mut body, MFA_READ_LIMIT).await?;
        let code = MfaCode::parse(&data).map_err(HandlerError::session)?;

        let expiration = self
            .broker
            .submit_mfa(code)
            .await
            .map_err(HandlerError::session)?;

        Ok(Reply::text(local_time(expiration)))
    }
}
