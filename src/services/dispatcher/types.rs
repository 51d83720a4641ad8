use std::collections::HashMap;

use bytes::Bytes;
use http::{Method, StatusCode};

/// 进入分发器的请求，路径已去掉挂载前缀（例如 `/apps/APP/host-1`）
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Bytes,
    pub accept: Option<String>,
}

impl DispatchRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: HashMap::new(),
            body: Bytes::new(),
            accept: None,
        }
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

// 解析 `a=1&b=2` 形式的查询字符串，键和值都做百分号解码
pub fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (percent_decode(key), percent_decode(value)),
            None => (percent_decode(pair), String::new()),
        })
        .collect()
}

// `%XX` 和 `+`，非法转义原样保留
fn percent_decode(input: &str) -> String {
    if !input.contains(['%', '+']) {
        return input.to_string();
    }

    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => decoded.push(b' '),
            b'%' => match (bytes.get(i + 1).and_then(hex_value), bytes.get(i + 2).and_then(hex_value)) {
                (Some(high), Some(low)) => {
                    decoded.push((high << 4) | low);
                    i += 2;
                }
                _ => decoded.push(b'%'),
            },
            other => decoded.push(other),
        }
        i += 1;
    }

    String::from_utf8_lossy(&decoded).into_owned()
}

fn hex_value(byte: &u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// 分发结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResponse {
    pub status: StatusCode,
    pub content_type: Option<&'static str>,
    pub body: Option<String>,
}

impl DispatchResponse {
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            content_type: None,
            body: None,
        }
    }

    pub fn with_content(status: StatusCode, content_type: &'static str, body: Option<String>) -> Self {
        Self {
            status,
            content_type: Some(content_type),
            body,
        }
    }
}

/// 路由解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    ListApplications,
    AwaitInstance { app_id: String, instance_id: String },
    Heartbeat { app_id: String, instance_id: String },
    StatusChange { app_id: String, instance_id: String },
    Register { app_id: String },
    Unregister { app_id: String, instance_id: String },
    Vips,
}
