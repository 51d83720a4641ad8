//! JSON document shapes understood by discovery clients, plus content negotiation.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::error::DispatchError;
use crate::services::registry::types::normalize_app_name;
use crate::services::registry::{
    Application, DataCenterInfo, InstanceStatus, PortInfo, ServiceInstance,
};

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// 只支持 `application/json*`，其他类型（包括缺失）属于测试配置错误
pub fn negotiate(accept: Option<&str>) -> Result<&'static str, DispatchError> {
    match accept {
        Some(accept) if accept.starts_with(JSON_CONTENT_TYPE) => Ok(JSON_CONTENT_TYPE),
        other => Err(DispatchError::UnsupportedMediaType {
            accept: other.unwrap_or("<none>").to_string(),
        }),
    }
}

#[derive(Serialize)]
struct InstanceDocument<'a> {
    instance: &'a ServiceInstance,
}

#[derive(Serialize)]
struct ApplicationsDocument<'a> {
    applications: ApplicationsBody<'a>,
}

#[derive(Serialize)]
struct ApplicationsBody<'a> {
    #[serde(rename = "versions__delta")]
    versions_delta: &'static str,
    #[serde(rename = "apps__hashcode")]
    apps_hashcode: String,
    application: &'a [Application],
}

pub fn encode_instance(instance: &ServiceInstance) -> Result<String, DispatchError> {
    serde_json::to_string(&InstanceDocument { instance }).map_err(DispatchError::Encode)
}

pub fn encode_applications(applications: &[Application]) -> Result<String, DispatchError> {
    let document = ApplicationsDocument {
        applications: ApplicationsBody {
            versions_delta: "1",
            apps_hashcode: reconcile_hash_code(applications),
            application: applications,
        },
    };
    serde_json::to_string(&document).map_err(DispatchError::Encode)
}

pub fn encode_message(message: &str) -> String {
    serde_json::json!({ "message": message }).to_string()
}

// 按状态名排序统计实例数，格式如 `DOWN_1_UP_2_`
pub fn reconcile_hash_code(applications: &[Application]) -> String {
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for instance in applications.iter().flat_map(|app| app.instances.iter()) {
        *counts.entry(instance.status.as_str()).or_default() += 1;
    }

    counts
        .into_iter()
        .map(|(status, count)| format!("{status}_{count}_"))
        .collect()
}

#[derive(Debug, Deserialize)]
struct RegistrationEnvelope {
    instance: RegistrationBody,
}

/// 注册请求体，所有字段都可缺省，真正注册前才校验主机名
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationBody {
    pub instance_id: Option<String>,
    pub host_name: Option<String>,
    pub ip_addr: Option<String>,
    pub status: Option<InstanceStatus>,
    pub port: Option<PortInfo>,
    pub secure_port: Option<PortInfo>,
    pub vip_address: Option<String>,
    pub secure_vip_address: Option<String>,
    pub home_page_url: Option<String>,
    pub status_page_url: Option<String>,
    pub health_check_url: Option<String>,
    pub data_center_info: Option<DataCenterInfo>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl RegistrationBody {
    /// 应用名取自请求路径，实例 ID 缺省时等于主机名
    pub fn into_instance(self, app_id: &str) -> Result<ServiceInstance, DispatchError> {
        let host_name = self
            .host_name
            .filter(|host| !host.is_empty())
            .ok_or_else(|| DispatchError::MalformedBody("missing instance.hostName".to_string()))?;

        Ok(ServiceInstance {
            instance_id: self
                .instance_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| host_name.clone()),
            host_name,
            app: normalize_app_name(app_id),
            ip_addr: self.ip_addr,
            status: self.status.unwrap_or_default(),
            port: self.port,
            secure_port: self.secure_port,
            vip_address: self.vip_address,
            secure_vip_address: self.secure_vip_address,
            home_page_url: self.home_page_url,
            status_page_url: self.status_page_url,
            health_check_url: self.health_check_url,
            data_center_info: self.data_center_info.unwrap_or_default(),
            metadata: self.metadata,
        })
    }
}

/// 只读取 `instance.vipAddress`，不校验其他字段
pub fn peek_vip_address(body: &[u8]) -> Result<String, DispatchError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| DispatchError::MalformedBody(e.to_string()))?;

    Ok(value
        .pointer("/instance/vipAddress")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string())
}

pub fn decode_registration(body: &[u8]) -> Result<RegistrationBody, DispatchError> {
    serde_json::from_slice::<RegistrationEnvelope>(body)
        .map(|envelope| envelope.instance)
        .map_err(|e| DispatchError::MalformedBody(e.to_string()))
}
