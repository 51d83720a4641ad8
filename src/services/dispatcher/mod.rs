//! Request dispatcher module
//!
//! Resolves an inbound REST call into one registry operation, consults the retry
//! ledgers for trigger values embedded in instance fields, and renders the result:
//! - `types`: dispatch request/response and routes
//! - `extractor`: path → route resolution
//! - `codec`: JSON documents and content negotiation
//! - `error`: dispatch error taxonomy

pub mod codec;
pub mod error;
pub mod extractor;
pub mod types;

pub use error::DispatchError;
pub use types::{DispatchRequest, DispatchResponse, Route};

use std::sync::Arc;

use http::StatusCode;

use crate::config::FaultInjectionConfig;
use crate::services::registry::types::{heartbeat_key, normalize_app_name};
use crate::services::registry::{InstanceStatus, ServiceInstance, ServiceRegistry};
use crate::services::retry::{RetryLedger, TriggerDirective, TriggerKind};

/// 实例元数据中覆盖心跳失败状态码的键
pub const FAIL_HEARTBEAT_RESPONSE_CODE_KEY: &str = "FailHeartbeatResponseCode";

const STATUS_VALUE_PARAM: &str = "value";

// 等待注册账本的 key：应用名|实例 ID
fn registration_wait_key(app_name: &str, instance_id: &str) -> String {
    format!("{app_name}|{instance_id}")
}

// 请求分发器
#[derive(Debug)]
pub struct RequestDispatcher {
    registry: Arc<ServiceRegistry>,
    // 三个账本相互独立，同一标识字符串在不同操作间不会冲突
    registration_wait_retries: RetryLedger,
    heartbeat_retries: RetryLedger,
    registration_retries: RetryLedger,
}

impl RequestDispatcher {
    pub fn new(registry: Arc<ServiceRegistry>, config: &FaultInjectionConfig) -> Self {
        let rearm = config.rearm_after_success;
        Self {
            registry,
            registration_wait_retries: RetryLedger::new("registration_wait", rearm),
            heartbeat_retries: RetryLedger::new("heartbeat", rearm),
            registration_retries: RetryLedger::new("registration", rearm),
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn registration_wait_retries(&self) -> &RetryLedger {
        &self.registration_wait_retries
    }

    pub fn heartbeat_retries(&self) -> &RetryLedger {
        &self.heartbeat_retries
    }

    pub fn registration_retries(&self) -> &RetryLedger {
        &self.registration_retries
    }

    // 清空所有重试账本
    pub fn reset_retries(&self) {
        self.registration_wait_retries.reset();
        self.heartbeat_retries.reset();
        self.registration_retries.reset();
    }

    /// 处理请求，所有错误都转换成带 JSON 消息体的响应
    pub fn handle(&self, request: &DispatchRequest) -> DispatchResponse {
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            accept = ?request.accept,
            query = ?request.query,
            "Eureka mock received request"
        );

        let response = match self.dispatch(request) {
            Ok(response) => response,
            Err(e) => {
                match &e {
                    DispatchError::Unroutable { .. } => {
                        tracing::warn!(method = %request.method, path = %request.path, "Unroutable request")
                    }
                    DispatchError::MalformedBody(_) => {
                        tracing::warn!(path = %request.path, error = %e, "Rejected malformed request")
                    }
                    _ => tracing::error!(path = %request.path, error = %e, "Failed to handle request"),
                }
                DispatchResponse::with_content(
                    e.status_code(),
                    codec::JSON_CONTENT_TYPE,
                    Some(codec::encode_message(&e.to_string())),
                )
            }
        };

        tracing::debug!(
            path = %request.path,
            status = response.status.as_u16(),
            body = ?response.body,
            "Eureka mock sent response"
        );
        response
    }

    /// 解析路由并执行对应操作
    pub fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchResponse, DispatchError> {
        let accept = request.accept.as_deref();

        match extractor::resolve_route(&request.method, &request.path)? {
            Route::ListApplications => self.list_applications(accept),
            Route::AwaitInstance { app_id, instance_id } => {
                self.await_instance(&app_id, &instance_id, accept)
            }
            Route::Heartbeat { app_id, instance_id } => {
                self.heartbeat(&app_id, &instance_id, accept)
            }
            Route::StatusChange { app_id, instance_id } => self.change_status(
                &app_id,
                &instance_id,
                request.query.get(STATUS_VALUE_PARAM).map(String::as_str),
                accept,
            ),
            Route::Register { app_id } => self.register(&app_id, &request.body),
            Route::Unregister { app_id, instance_id } => self.unregister(&app_id, &instance_id),
            Route::Vips => self.applications_for_vip(&request.path, accept),
        }
    }

    // GET /apps/{appId}/{instanceId}
    fn await_instance(
        &self,
        app_id: &str,
        instance_id: &str,
        accept: Option<&str>,
    ) -> Result<DispatchResponse, DispatchError> {
        let Some(instance) = self.registry.lookup_instance(app_id, instance_id) else {
            return Ok(Self::not_found(app_id, instance_id));
        };
        let content_type = codec::negotiate(accept)?;

        let status = match TriggerDirective::parse(instance_id, &[TriggerKind::FailAwaitRegistration])? {
            Some(directive) => {
                let retry_key = registration_wait_key(&instance.app, instance_id);
                if self
                    .registration_wait_retries
                    .observe(&retry_key, directive.param)
                    .is_failure()
                {
                    StatusCode::INTERNAL_SERVER_ERROR
                } else {
                    StatusCode::OK
                }
            }
            None => StatusCode::OK,
        };

        let body = codec::encode_instance(&instance)?;
        Ok(DispatchResponse::with_content(status, content_type, Some(body)))
    }

    // PUT /apps/{appId}/{instanceId}
    fn heartbeat(
        &self,
        app_id: &str,
        instance_id: &str,
        accept: Option<&str>,
    ) -> Result<DispatchResponse, DispatchError> {
        let Some(instance) = self.registry.lookup_instance(app_id, instance_id) else {
            return Ok(Self::not_found(app_id, instance_id));
        };
        let content_type = codec::negotiate(accept)?;

        let status = match TriggerDirective::parse(&instance.host_name, &[TriggerKind::FailHeartbeat])? {
            Some(directive) => {
                // 失败码先于账本解析，非法覆盖值不消耗失败预算
                let failure_code = Self::heartbeat_failure_code(&instance)?;
                let retry_key = heartbeat_key(&instance.app, &instance.host_name);
                if self
                    .heartbeat_retries
                    .observe(&retry_key, directive.param)
                    .is_failure()
                {
                    failure_code
                } else {
                    StatusCode::OK
                }
            }
            None => StatusCode::OK,
        };

        self.registry.update_heartbeat_for(
            &instance.app,
            &instance.host_name,
            status.as_u16(),
            instance.status,
        );

        tracing::debug!(
            app_name = %instance.app,
            host_name = %instance.host_name,
            status = status.as_u16(),
            "Returning heartbeat response"
        );
        Ok(DispatchResponse::with_content(status, content_type, None))
    }

    // 默认 404，可由实例元数据覆盖
    fn heartbeat_failure_code(instance: &ServiceInstance) -> Result<StatusCode, DispatchError> {
        match instance.metadata.get(FAIL_HEARTBEAT_RESPONSE_CODE_KEY) {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .ok()
                .and_then(|code| StatusCode::from_u16(code).ok())
                .ok_or_else(|| DispatchError::InvalidFailureCode {
                    value: value.clone(),
                }),
            None => Ok(StatusCode::NOT_FOUND),
        }
    }

    // PUT /apps/{appId}/{instanceId}/status?value={status}
    fn change_status(
        &self,
        app_id: &str,
        instance_id: &str,
        value: Option<&str>,
        accept: Option<&str>,
    ) -> Result<DispatchResponse, DispatchError> {
        let Some(instance) = self.registry.lookup_instance(app_id, instance_id) else {
            return Ok(Self::not_found(app_id, instance_id));
        };
        let content_type = codec::negotiate(accept)?;

        if TriggerDirective::parse(&instance.host_name, &[TriggerKind::FailStatusChange])?.is_some() {
            tracing::debug!(
                app_name = %instance.app,
                host_name = %instance.host_name,
                "Status change failure triggered"
            );
            return Ok(DispatchResponse::with_content(
                StatusCode::INTERNAL_SERVER_ERROR,
                content_type,
                None,
            ));
        }

        let status: InstanceStatus = value.ok_or(DispatchError::MissingStatusValue)?.parse()?;

        // 查找和更新之间实例可能已被注销
        if !self.registry.update_status(app_id, instance_id, status) {
            return Ok(Self::not_found(app_id, instance_id));
        }
        Ok(DispatchResponse::with_content(StatusCode::OK, content_type, None))
    }

    // POST /apps/{appId}
    fn register(&self, app_id: &str, body: &[u8]) -> Result<DispatchResponse, DispatchError> {
        // 触发值只看 vipAddress，其他字段类型不对也不影响强制状态码
        let vip_address = codec::peek_vip_address(body)?;

        let directive = TriggerDirective::parse(
            &vip_address,
            &[
                TriggerKind::RegisterUseResponseStatusCode,
                TriggerKind::FailRegistration,
            ],
        )?;

        match directive {
            Some(directive) if directive.kind == TriggerKind::RegisterUseResponseStatusCode => {
                let status = u16::try_from(directive.param)
                    .ok()
                    .and_then(|code| StatusCode::from_u16(code).ok())
                    .ok_or(DispatchError::InvalidStatusCode {
                        code: directive.param,
                    })?;
                tracing::debug!(app_id = %app_id, status = status.as_u16(), "Registration response code forced by trigger");
                return Ok(DispatchResponse::empty(status));
            }
            Some(directive) => {
                let app_name = normalize_app_name(app_id);
                if self
                    .registration_retries
                    .observe(&app_name, directive.param)
                    .is_failure()
                {
                    return Ok(DispatchResponse::empty(StatusCode::INTERNAL_SERVER_ERROR));
                }
            }
            None => {}
        }

        let instance = codec::decode_registration(body)?.into_instance(app_id)?;
        self.registry.register_application(instance);
        Ok(DispatchResponse::empty(StatusCode::NO_CONTENT))
    }

    // DELETE /apps/{appId}/{instanceId}
    fn unregister(&self, app_id: &str, instance_id: &str) -> Result<DispatchResponse, DispatchError> {
        let Some(instance) = self.registry.lookup_instance(app_id, instance_id) else {
            return Ok(Self::not_found(app_id, instance_id));
        };

        self.registry
            .unregister_application(&instance.app, &instance.host_name);

        // 注销后同一触发值重新注册会再次生效
        self.registration_wait_retries
            .forget(&registration_wait_key(&instance.app, &instance.instance_id));
        self.heartbeat_retries
            .forget(&heartbeat_key(&instance.app, &instance.host_name));
        if self.registry.application(&instance.app).is_none() {
            self.registration_retries.forget(&instance.app);
        }
        Ok(DispatchResponse::empty(StatusCode::OK))
    }

    // GET /vips/{vipAddress}
    fn applications_for_vip(
        &self,
        path: &str,
        accept: Option<&str>,
    ) -> Result<DispatchResponse, DispatchError> {
        let content_type = codec::negotiate(accept)?;
        let applications = self.registry.applications_matching_vip_from_path(path);
        let body = codec::encode_applications(&applications)?;
        Ok(DispatchResponse::with_content(StatusCode::OK, content_type, Some(body)))
    }

    // GET /apps
    fn list_applications(&self, accept: Option<&str>) -> Result<DispatchResponse, DispatchError> {
        let content_type = codec::negotiate(accept)?;
        let body = codec::encode_applications(&self.registry.applications())?;
        Ok(DispatchResponse::with_content(StatusCode::OK, content_type, Some(body)))
    }

    fn not_found(app_id: &str, instance_id: &str) -> DispatchResponse {
        tracing::trace!(app_id = %app_id, instance_id = %instance_id, "No instance found, sending 404 with no content");
        DispatchResponse::empty(StatusCode::NOT_FOUND)
    }
}
