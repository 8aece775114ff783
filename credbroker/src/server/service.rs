use hyper::body::HttpBody;
use hyper::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info};

use super::error::{HandlerError, HandlerResult};
use super::{
    CREDENTIALS_PATH, LIST_ROLES_PATH, MFA_PATH, PROFILE_PATH, REFRESH_PATH, TOKEN_PATH,
};
use crate::broker::CredentialBroker;
use crate::common::ConfigResolver;

/// Successful handler output, turned into a response by `write_response`
#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub body: String,
}

impl Reply {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "text/plain",
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn json(body: String) -> Self {
        Self {
            content_type: "application/json",
            ..Self::text(body)
        }
    }

    pub fn html(body: String) -> Self {
        Self {
            content_type: "text/html",
            ..Self::text(body)
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }
}

impl From<HandlerError> for Reply {
    fn from(err: HandlerError) -> Self {
        Self {
            status: err.status,
            ..Self::text(err.message)
        }
    }
}

#[derive(Clone)]
pub struct MetadataService {
    pub broker: Arc<CredentialBroker>,
    pub resolver: Arc<dyn ConfigResolver>,
}

impl MetadataService {
    pub fn new(broker: Arc<CredentialBroker>, resolver: Arc<dyn ConfigResolver>) -> Self {
        Self { broker, resolver }
    }

    pub async fn handle_request(&self, req: Request<Body>) -> Result<Response<Body>, Infallible> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let version = req.version();

        let result = match (&method, path.as_str()) {
            (_, "/") => self.handle_home().await,
            (_, MFA_PATH) => self.handle_mfa(req).await,
            (&Method::POST, PROFILE_PATH) => self.handle_select_profile(req).await,
            (_, PROFILE_PATH) => self.handle_get_profile().await,
            (_, LIST_ROLES_PATH) => self.handle_list_roles().await,
            (_, REFRESH_PATH) => self.handle_refresh(&method).await,
            (&Method::PUT, TOKEN_PATH) => Ok(self.handle_token(&req)),
            (_, p) if p.starts_with(CREDENTIALS_PATH) => {
                let role = &p[CREDENTIALS_PATH.len()..];
                self.handle_credentials(role).await
            }
            (_, p) if p == CREDENTIALS_PATH.trim_end_matches('/') => {
                self.handle_credentials("").await
            }
            _ => Err(HandlerError::not_found()),
        };

        let reply = result.unwrap_or_else(|err| {
            err.log();
            Reply::from(err)
        });

        let length = reply.body.len();
        info!(
            "{} {} {:?} {} {}",
            method,
            path,
            version,
            reply.status.as_u16(),
            length
        );

        Ok(write_response(reply))
    }
}

pub fn write_response(reply: Reply) -> Response<Body> {
    let length = reply.body.len();
    let mut builder = Response::builder()
        .status(reply.status)
        .header(CONTENT_TYPE, reply.content_type)
        .header(CONTENT_LENGTH, length);

    for (name, value) in reply.headers {
        builder = builder.header(name, value);
    }

    builder.body(Body::from(reply.body)).unwrap_or_else(|e| {
        error!("Failed to build response: {}", e);
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

/// Read at most `limit` bytes of the request body; the rest is ignored
pub async fn read_body(body: &mut Body, limit: usize) -> HandlerResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(limit.min(1024));

    while buf.len() < limit {
        match body.data().await {
            Some(chunk) => {
                let chunk = chunk.map_err(HandlerError::read_failed)?;
                let take = (limit - buf.len()).min(chunk.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            None => break,
        }
    }

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_body_is_bounded() {
        let mut body = Body::from("x".repeat(100));
        let data = read_body(&mut body, 64).await.unwrap();
        assert_eq!(data.len(), 64);

        let mut body = Body::from("short");
        assert_eq!(read_body(&mut body, 64).await.unwrap(), b"short");
    }

    #[test]
    fn test_write_response_sets_headers() {
        let response = write_response(Reply::json("{}".to_string()));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[CONTENT_LENGTH], "2");
    }

    #[test]
    fn test_error_reply_is_plain_text() {
        let reply = Reply::from(HandlerError::not_found());
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.content_type, "text/plain");
        assert_eq!(reply.body, "Not Found");
    }
}
