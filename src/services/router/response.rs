use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::StatusCode;
use http_body_util::Full;

use crate::services::dispatcher::{DispatchError, DispatchResponse, codec};

// 将分发结果转换为 HTTP 响应
pub fn into_http_response(response: DispatchResponse) -> http::Response<Full<Bytes>> {
    let mut builder = http::Response::builder().status(response.status);
    if let Some(content_type) = response.content_type {
        builder = builder.header(CONTENT_TYPE, content_type);
    }

    let body = response.body.map(Bytes::from).unwrap_or_default();

    // 构建失败时退回空的 500 响应
    match builder.body(Full::new(body)) {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build response");
            let mut fallback = http::Response::new(Full::new(Bytes::new()));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        }
    }
}

// 在分发器之外产生的错误（挂载路径不匹配、请求体读取失败）
pub fn error_response(error: &DispatchError) -> http::Response<Full<Bytes>> {
    into_http_response(DispatchResponse::with_content(
        error.status_code(),
        codec::JSON_CONTENT_TYPE,
        Some(codec::encode_message(&error.to_string())),
    ))
}
