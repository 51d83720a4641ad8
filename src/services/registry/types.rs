use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 默认数据中心类型
const DEFAULT_DATA_CENTER_CLASS: &str = "com.netflix.appinfo.InstanceInfo$DefaultDataCenterInfo";
const DEFAULT_DATA_CENTER_NAME: &str = "MyOwn";

// 实例状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    #[default]
    Up,
    Down,
    Starting,
    OutOfService,
    #[serde(other)]
    Unknown,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Up => "UP",
            InstanceStatus::Down => "DOWN",
            InstanceStatus::Starting => "STARTING",
            InstanceStatus::OutOfService => "OUT_OF_SERVICE",
            InstanceStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown instance status: {0}")]
pub struct ParseStatusError(pub String);

// 状态变更请求中的值必须精确匹配，不做宽松解析
impl FromStr for InstanceStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UP" => Ok(InstanceStatus::Up),
            "DOWN" => Ok(InstanceStatus::Down),
            "STARTING" => Ok(InstanceStatus::Starting),
            "OUT_OF_SERVICE" => Ok(InstanceStatus::OutOfService),
            "UNKNOWN" => Ok(InstanceStatus::Unknown),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// 端口信息，线上格式为 `{"$": 8080, "@enabled": "true"}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    #[serde(rename = "$")]
    pub port: u16,
    #[serde(rename = "@enabled", default = "enabled_by_default", with = "enabled_flag")]
    pub enabled: bool,
}

impl PortInfo {
    pub fn enabled(port: u16) -> Self {
        Self { port, enabled: true }
    }
}

fn enabled_by_default() -> bool {
    true
}

// "@enabled" 在线上是字符串 "true"/"false"，兼容直接传布尔值的客户端
mod enabled_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "true" } else { "false" })
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(match Flag::deserialize(deserializer)? {
            Flag::Bool(value) => value,
            Flag::Text(text) => text.eq_ignore_ascii_case("true"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataCenterInfo {
    #[serde(rename = "@class", default = "default_data_center_class")]
    pub class: String,
    #[serde(default = "default_data_center_name")]
    pub name: String,
}

fn default_data_center_class() -> String {
    DEFAULT_DATA_CENTER_CLASS.to_string()
}

fn default_data_center_name() -> String {
    DEFAULT_DATA_CENTER_NAME.to_string()
}

impl Default for DataCenterInfo {
    fn default() -> Self {
        Self {
            class: default_data_center_class(),
            name: default_data_center_name(),
        }
    }
}

/// 服务实例
///
/// 身份字段（实例 ID、主机名、应用名）创建后不再变化，
/// 只有 `status` 会被状态变更操作原地修改。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    pub instance_id: String,
    pub host_name: String,
    pub app: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_addr: Option<String>,
    #[serde(default)]
    pub status: InstanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_port: Option<PortInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_vip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_url: Option<String>,
    #[serde(default)]
    pub data_center_info: DataCenterInfo,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ServiceInstance {
    /// 创建实例，实例 ID 默认等于主机名，应用名统一转为大写
    pub fn new(app: impl Into<String>, host_name: impl Into<String>) -> Self {
        let host_name = host_name.into();
        Self {
            instance_id: host_name.clone(),
            host_name,
            app: normalize_app_name(&app.into()),
            ip_addr: None,
            status: InstanceStatus::default(),
            port: None,
            secure_port: None,
            vip_address: None,
            secure_vip_address: None,
            home_page_url: None,
            status_page_url: None,
            health_check_url: None,
            data_center_info: DataCenterInfo::default(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    pub fn with_vip_address(mut self, vip_address: impl Into<String>) -> Self {
        self.vip_address = Some(vip_address.into());
        self
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(PortInfo::enabled(port));
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// 应用：共享同一应用名的有序实例集合
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    #[serde(rename = "instance", default)]
    pub instances: Vec<ServiceInstance>,
}

impl Application {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: normalize_app_name(&name.into()),
            instances: Vec::new(),
        }
    }

    pub fn with_instance(name: impl Into<String>, instance: ServiceInstance) -> Self {
        let mut app = Self::new(name);
        app.instances.push(instance);
        app
    }

    pub fn instance(&self, instance_id: &str) -> Option<&ServiceInstance> {
        self.instances
            .iter()
            .find(|instance| instance.instance_id == instance_id)
    }

    // 空应用视为所有实例都匹配
    pub fn all_instances_match_vip(&self, path: &str) -> bool {
        self.instances.iter().all(|instance| {
            instance
                .vip_address
                .as_deref()
                .is_some_and(|vip| path.ends_with(vip))
        })
    }
}

/// 心跳事件日志条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatEvent {
    /// `应用名|主机名`
    pub key: String,
    pub status_code: u16,
    pub timestamp: SystemTime,
}

impl HeartbeatEvent {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

pub fn normalize_app_name(name: &str) -> String {
    name.to_uppercase()
}

pub fn heartbeat_key(app_name: &str, host_name: &str) -> String {
    format!("{}|{}", normalize_app_name(app_name), host_name)
}
