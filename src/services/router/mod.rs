pub mod response;

use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::future::BoxFuture;
use http::header::ACCEPT;
use http_body::Body;
use http_body_util::{BodyExt, Full};
use tower::Service;

use super::dispatcher::types::parse_query;
use super::dispatcher::{DispatchError, DispatchRequest, RequestDispatcher};

/// 把挂载路径下的 HTTP 请求交给分发器的 tower 服务
#[derive(Debug, Clone)]
pub struct EurekaRouter {
    dispatcher: Arc<RequestDispatcher>,
    base_path: Arc<str>,
}

impl EurekaRouter {
    pub fn new(dispatcher: Arc<RequestDispatcher>, base_path: &str) -> Self {
        Self {
            dispatcher,
            base_path: normalize_base_path(base_path).into(),
        }
    }

    pub fn dispatcher(&self) -> &Arc<RequestDispatcher> {
        &self.dispatcher
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    // 去掉挂载前缀，返回以 '/' 开头的相对路径
    fn relative_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.base_path.is_empty() {
            return Some(path);
        }

        match path.strip_prefix(&*self.base_path) {
            Some("") => Some("/"),
            Some(rest) if rest.starts_with('/') => Some(rest),
            _ => None,
        }
    }

    async fn route<B>(self, req: http::Request<B>) -> http::Response<Full<Bytes>>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: std::fmt::Display,
    {
        let (parts, body) = req.into_parts();
        let full_path = parts.uri.path().to_string();

        let relative_path = self.relative_path(&full_path).map(str::to_string);
        let Some(path) = relative_path else {
            tracing::warn!(path = %full_path, base_path = %self.base_path, "Request outside mount path");
            return response::error_response(&DispatchError::Unroutable { path: full_path });
        };

        // 收集请求体
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::warn!(path = %full_path, error = %e, "Failed to collect request body");
                return response::error_response(&DispatchError::MalformedBody(format!(
                    "failed to read request body: {e}"
                )));
            }
        };

        let request = DispatchRequest {
            method: parts.method,
            path,
            query: parts.uri.query().map(parse_query).unwrap_or_default(),
            body,
            accept: parts
                .headers
                .get(ACCEPT)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
        };

        response::into_http_response(self.dispatcher.handle(&request))
    }
}

// "/eureka/v2/" -> "/eureka/v2"，"/" -> ""
fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

impl<B> Service<http::Request<B>> for EurekaRouter
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: std::fmt::Display,
{
    type Response = http::Response<Full<Bytes>>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let router = self.clone();
        Box::pin(async move { Ok(router.route(req).await) })
    }
}
