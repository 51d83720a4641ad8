use std::sync::{Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::types::{
    Application, HeartbeatEvent, InstanceStatus, ServiceInstance, heartbeat_key,
    normalize_app_name,
};

/// 内存中的服务注册表
///
/// 应用表、心跳快照表、心跳历史和计数器各自独立同步，
/// 不存在跨结构的全局锁。查询不到时返回空结果而不是错误。
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    // 应用名(大写) -> 应用
    applications: DashMap<String, Application>,
    // 应用名|主机名 -> 最近一次成功心跳的实例快照
    heartbeat_apps: DashMap<String, ServiceInstance>,
    heartbeat_history: Mutex<Vec<HeartbeatEvent>>,
    heartbeat_count: AtomicU64,
    heartbeat_failure_count: AtomicU64,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // 按应用名和实例 ID 查找实例
    pub fn lookup_instance(&self, app_id: &str, instance_id: &str) -> Option<ServiceInstance> {
        self.applications
            .get(&normalize_app_name(app_id))
            .and_then(|app| app.instance(instance_id).cloned())
    }

    // 返回所有实例 VIP 均为路径后缀的应用
    pub fn applications_matching_vip_from_path(&self, path: &str) -> Vec<Application> {
        let mut matched: Vec<Application> = self
            .applications
            .iter()
            .filter(|entry| {
                let result = entry.value().all_instances_match_vip(path);
                tracing::trace!(
                    app_name = %entry.key(),
                    path = %path,
                    matched = result,
                    "Checked application instances against VIP path"
                );
                result
            })
            .map(|entry| entry.value().clone())
            .collect();
        matched.sort_by(|a, b| a.name.cmp(&b.name));
        matched
    }

    /// 注册实例
    ///
    /// 应用不存在时以该实例为唯一成员创建应用；应用已存在时不做任何事，
    /// 即使实例 ID 不同也不会追加。
    pub fn register_application(&self, instance: ServiceInstance) {
        let app_name = normalize_app_name(&instance.app);
        match self.applications.entry(app_name.clone()) {
            Entry::Vacant(vacant) => {
                tracing::info!(
                    app_name = %app_name,
                    instance_id = %instance.instance_id,
                    host_name = %instance.host_name,
                    "Registering application"
                );
                vacant.insert(Application::with_instance(app_name, instance));
            }
            Entry::Occupied(_) => {
                tracing::debug!(
                    app_name = %app_name,
                    instance_id = %instance.instance_id,
                    "Application already registered, ignoring registration"
                );
            }
        }
    }

    /// 注销实例
    ///
    /// 移除应用中主机名匹配的实例，应用为空时整体移除，同时清理对应的心跳快照。
    pub fn unregister_application(&self, app_name: &str, host_name: &str) -> bool {
        let app_name = normalize_app_name(app_name);
        let removed = match self.applications.entry(app_name.clone()) {
            Entry::Occupied(mut occupied) => {
                let before = occupied.get().instances.len();
                occupied
                    .get_mut()
                    .instances
                    .retain(|instance| instance.host_name != host_name);
                let removed = occupied.get().instances.len() != before;

                if occupied.get().instances.is_empty() {
                    occupied.remove();
                    tracing::info!(app_name = %app_name, "Removed application with no remaining instances");
                }
                removed
            }
            Entry::Vacant(_) => false,
        };

        self.heartbeat_apps.remove(&heartbeat_key(&app_name, host_name));

        if removed {
            tracing::info!(app_name = %app_name, host_name = %host_name, "Unregistered instance");
        }
        removed
    }

    /// 记录一次心跳
    ///
    /// 无论成功与否都写入历史并递增总数；非 2xx 只递增失败计数，不更新快照。
    pub fn update_heartbeat_for(
        &self,
        app_name: &str,
        host_name: &str,
        status_code: u16,
        status: InstanceStatus,
    ) {
        let key = heartbeat_key(app_name, host_name);

        {
            // 持锁递增，保证历史长度与总数一致
            let mut history = self.history();
            history.push(HeartbeatEvent {
                key: key.clone(),
                status_code,
                timestamp: SystemTime::now(),
            });
            self.heartbeat_count.fetch_add(1, Ordering::SeqCst);
        }

        if !(200..300).contains(&status_code) {
            let failures = self.heartbeat_failure_count.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::debug!(
                app_name = %app_name,
                host_name = %host_name,
                status_code,
                failure_count = failures,
                "Recorded failed heartbeat"
            );
            return;
        }

        let snapshot = ServiceInstance::new(app_name, host_name).with_status(status);
        self.heartbeat_apps.insert(key, snapshot);
    }

    // 原地修改实例状态，找不到实例时返回 false
    pub fn update_status(&self, app_id: &str, instance_id: &str, status: InstanceStatus) -> bool {
        let Some(mut app) = self.applications.get_mut(&normalize_app_name(app_id)) else {
            return false;
        };

        match app
            .instances
            .iter_mut()
            .find(|instance| instance.instance_id == instance_id)
        {
            Some(instance) => {
                tracing::info!(
                    app_name = %instance.app,
                    instance_id = %instance_id,
                    old_status = %instance.status,
                    new_status = %status,
                    "Updated instance status"
                );
                instance.status = status;
                true
            }
            None => false,
        }
    }

    /// 清空全部应用、心跳快照和历史，计数器归零
    pub fn cleanup_apps(&self) {
        self.applications.clear();
        self.heartbeat_apps.clear();
        {
            let mut history = self.history();
            history.clear();
            self.heartbeat_count.store(0, Ordering::SeqCst);
        }
        self.heartbeat_failure_count.store(0, Ordering::SeqCst);
        tracing::debug!("Cleaned up all applications and heartbeat records");
    }

    pub fn application(&self, app_name: &str) -> Option<Application> {
        self.applications
            .get(&normalize_app_name(app_name))
            .map(|entry| entry.value().clone())
    }

    // 按应用名排序，保证输出稳定
    pub fn applications(&self) -> Vec<Application> {
        let mut apps: Vec<Application> = self
            .applications
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        apps.sort_by(|a, b| a.name.cmp(&b.name));
        apps
    }

    pub fn heartbeat_count(&self) -> u64 {
        self.heartbeat_count.load(Ordering::SeqCst)
    }

    pub fn heartbeat_failure_count(&self) -> u64 {
        self.heartbeat_failure_count.load(Ordering::SeqCst)
    }

    pub fn heartbeat_history(&self) -> Vec<HeartbeatEvent> {
        self.history().clone()
    }

    // 历史只追加或清空，锁中毒后数据仍然有效
    fn history(&self) -> MutexGuard<'_, Vec<HeartbeatEvent>> {
        self.heartbeat_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn heartbeat_snapshot(&self, app_name: &str, host_name: &str) -> Option<ServiceInstance> {
        self.heartbeat_apps
            .get(&heartbeat_key(app_name, host_name))
            .map(|entry| entry.value().clone())
    }

    pub fn heartbeat_snapshots(&self) -> Vec<ServiceInstance> {
        self.heartbeat_apps
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
