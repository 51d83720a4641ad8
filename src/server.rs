use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;

use crate::config::Config;
use crate::services::dispatcher::RequestDispatcher;
use crate::services::registry::ServiceRegistry;
use crate::services::router::EurekaRouter;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to resolve local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// 绑定本地端口的模拟注册中心，停止前一直接受连接
#[derive(Debug)]
pub struct MockEurekaServer {
    local_addr: SocketAddr,
    router: EurekaRouter,
    shutdown: CancellationToken,
    task_tracker: Arc<TaskTracker>,
}

impl MockEurekaServer {
    pub async fn start(config: &Config) -> Result<Self, ServerError> {
        let registry = Arc::new(ServiceRegistry::new());
        let dispatcher = Arc::new(RequestDispatcher::new(registry, &config.fault_injection));
        let router = EurekaRouter::new(dispatcher, &config.server.base_path);

        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = match TcpListener::bind(addr.as_str()).await {
            Ok(listener) => listener,
            Err(source) => return Err(ServerError::Bind { addr, source }),
        };
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

        let shutdown = CancellationToken::new();
        let task_tracker = Arc::new(TaskTracker::new());

        task_tracker.spawn(Self::accept_loop(
            listener,
            router.clone(),
            shutdown.clone(),
            task_tracker.clone(),
        ));

        tracing::info!(
            addr = %local_addr,
            base_path = %router.base_path(),
            rearm_after_success = config.fault_injection.rearm_after_success,
            "Eureka mock server started"
        );

        Ok(Self {
            local_addr,
            router,
            shutdown,
            task_tracker,
        })
    }

    // 接受连接，每个连接在独立任务中处理
    async fn accept_loop(
        listener: TcpListener,
        router: EurekaRouter,
        shutdown: CancellationToken,
        task_tracker: Arc<TaskTracker>,
    ) {
        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
            };

            tracing::trace!(peer = %peer, "Accepted connection");
            task_tracker.spawn(Self::serve_connection(
                TokioIo::new(stream),
                peer,
                router.clone(),
                shutdown.clone(),
            ));
        }

        tracing::debug!("Accept loop stopped");
    }

    async fn serve_connection(
        io: TokioIo<tokio::net::TcpStream>,
        peer: SocketAddr,
        router: EurekaRouter,
        shutdown: CancellationToken,
    ) {
        let service = service_fn(move |req: hyper::Request<Incoming>| router.clone().oneshot(req));
        let conn = http1::Builder::new().serve_connection(io, service);
        tokio::pin!(conn);

        let mut draining = false;
        loop {
            tokio::select! {
                result = conn.as_mut() => {
                    if let Err(e) = result {
                        tracing::debug!(peer = %peer, error = %e, "Connection closed with error");
                    }
                    break;
                }
                _ = shutdown.cancelled(), if !draining => {
                    conn.as_mut().graceful_shutdown();
                    draining = true;
                }
            }
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// 例如 `http://127.0.0.1:54321/eureka/v2`
    pub fn base_uri(&self) -> String {
        format!("http://{}{}", self.local_addr, self.router.base_path())
    }

    pub fn router(&self) -> &EurekaRouter {
        &self.router
    }

    pub fn dispatcher(&self) -> &Arc<RequestDispatcher> {
        self.router.dispatcher()
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        self.router.dispatcher().registry()
    }

    /// 清空注册表和所有重试账本，用于测试之间复位
    pub fn cleanup_apps(&self) {
        self.registry().cleanup_apps();
        self.dispatcher().reset_retries();
        tracing::debug!(addr = %self.local_addr, "Eureka mock state reset");
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// 停止接受连接并等待正在处理的连接结束
    pub async fn stop(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }

        self.shutdown.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
        tracing::info!(addr = %self.local_addr, "Eureka mock server stopped");
    }
}

impl Drop for MockEurekaServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
