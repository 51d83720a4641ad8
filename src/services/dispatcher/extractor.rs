use http::Method;

use super::error::DispatchError;
use super::types::Route;

pub const APPS_SEGMENT: &str = "apps";
pub const VIPS_SEGMENT: &str = "vips";
const STATUS_SEGMENT: &str = "status";

// 按前缀和剩余段数解析路由，空段忽略
pub fn resolve_route(method: &Method, path: &str) -> Result<Route, DispatchError> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let route = match (segments.as_slice(), method) {
        ([APPS_SEGMENT], &Method::GET) => Some(Route::ListApplications),
        ([APPS_SEGMENT, app_id], &Method::POST) => Some(Route::Register {
            app_id: app_id.to_string(),
        }),
        ([APPS_SEGMENT, app_id, instance_id], &Method::GET) => Some(Route::AwaitInstance {
            app_id: app_id.to_string(),
            instance_id: instance_id.to_string(),
        }),
        ([APPS_SEGMENT, app_id, instance_id], &Method::PUT) => Some(Route::Heartbeat {
            app_id: app_id.to_string(),
            instance_id: instance_id.to_string(),
        }),
        ([APPS_SEGMENT, app_id, instance_id], &Method::DELETE) => Some(Route::Unregister {
            app_id: app_id.to_string(),
            instance_id: instance_id.to_string(),
        }),
        ([APPS_SEGMENT, app_id, instance_id, STATUS_SEGMENT], &Method::PUT) => {
            Some(Route::StatusChange {
                app_id: app_id.to_string(),
                instance_id: instance_id.to_string(),
            })
        }
        ([VIPS_SEGMENT, _, ..], &Method::GET) => Some(Route::Vips),
        _ => None,
    };

    route.ok_or_else(|| DispatchError::Unroutable {
        path: path.to_string(),
    })
}
