use hyper::header::{HeaderName, HeaderValue};
use hyper::{Body, Request};
use uuid::Uuid;

use crate::server::service::{MetadataService, Reply};

pub const TOKEN_TTL_HEADER: &str = "x-aws-ec2-metadata-token-ttl-seconds";
const DEFAULT_TOKEN_TTL: &str = "21600";

impl MetadataService {
    /// Session token handshake. Tokens are handed out but never checked.
    pub fn handle_token(&self, req: &Request<Body>) -> Reply {
        let ttl = req
            .headers()
            .get(TOKEN_TTL_HEADER)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_TOKEN_TTL));

        Reply::text(Uuid::new_v4().to_string())
            .with_header(HeaderName::from_static(TOKEN_TTL_HEADER), ttl)
    }
}
