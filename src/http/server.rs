//! HTTP server component.
//!
//! # Responsibilities
//! - Collect routes and static mounts during configuration
//! - Bind the listener (plain or TLS) when started
//! - Serve until stopped, with handlers seeing the shared resources as state
//! - Drain in-flight requests on shutdown, force-close at the deadline
//!
//! # Design Decisions
//! - Routing errors (bad path, duplicate method/path) are configuration errors
//! - A bind or TLS failure fails only this component
//! - Shutdown is idempotent: the first outcome is cached and returned to every caller

use std::collections::HashSet;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::Request;
use axum::handler::Handler;
use axum::http::Method;
use axum::response::IntoResponse;
use axum::routing::{on, MethodFilter, Route};
use axum::Router;
use axum_server::Handle;
use tokio::sync::{watch, OnceCell};
use tokio::time::Instant;
use tower::{Layer, Service};
use tower_http::services::ServeDir;

use crate::config::{ConfigError, HttpConfig};
use crate::error::ComponentError;
use crate::http::request::apply_layers;
use crate::lifecycle::{Component, ComponentState, ShutdownStatus};
use crate::net::tls::load_tls_config;
use crate::resources::ResourceContainer;

/// State every handler can extract with `State<SharedResources>`.
pub type SharedResources = Arc<ResourceContainer>;

/// How long a forced close may take before the server counts as stuck.
const FORCE_CLOSE_GRACE: Duration = Duration::from_millis(100);

type ServeFuture = Pin<Box<dyn Future<Output = std::io::Result<()>> + Send>>;

/// Middleware registered with [`ServerComponent::layer`], applied when the
/// server starts.
type RouterLayer = Box<dyn FnOnce(Router<SharedResources>) -> Router<SharedResources> + Send>;

/// Routes collected before start. `None` once the server has taken them.
struct Routes {
    router: Option<Router<SharedResources>>,
    endpoints: HashSet<(Method, String)>,
    mounts: HashSet<String>,
    layers: Vec<RouterLayer>,
}

/// The HTTP server as a lifecycle component.
pub struct ServerComponent {
    name: String,
    config: HttpConfig,
    resources: SharedResources,
    routes: Mutex<Routes>,
    handle: Handle,
    state: watch::Sender<ComponentState>,
    local_addr: OnceLock<SocketAddr>,
    outcome: OnceCell<Result<ShutdownStatus, ComponentError>>,
}

impl ServerComponent {
    pub fn new(name: impl Into<String>, config: HttpConfig, resources: SharedResources) -> Self {
        Self {
            name: name.into(),
            config,
            resources,
            routes: Mutex::new(Routes {
                router: Some(Router::new()),
                endpoints: HashSet::new(),
                mounts: HashSet::new(),
                layers: Vec::new(),
            }),
            handle: Handle::new(),
            state: watch::channel(ComponentState::Idle).0,
            local_addr: OnceLock::new(),
            outcome: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Register `handler` for `method` on `path`.
    ///
    /// Paths use axum syntax (`/users/{id}`). Registering the same method
    /// and path twice, or routing after start, is an error.
    pub fn route<H, T>(&self, method: Method, path: &str, handler: H) -> Result<(), ConfigError>
    where
        H: Handler<T, SharedResources>,
        T: 'static,
    {
        let invalid = |reason: &str| ConfigError::InvalidRoute {
            method: method.to_string(),
            path: path.to_string(),
            reason: reason.to_string(),
        };

        check_path(path).map_err(|reason| invalid(reason))?;
        let filter = MethodFilter::try_from(method.clone())
            .map_err(|_| invalid("unsupported method"))?;

        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        if routes.router.is_none() {
            return Err(ConfigError::AlreadyRunning(self.name.clone()));
        }
        if !routes.endpoints.insert((method.clone(), path.to_string())) {
            return Err(invalid("already registered"));
        }
        if let Some(router) = routes.router.take() {
            routes.router = Some(router.route(path, on(filter, handler)));
        }

        tracing::debug!(method = %method, path = %path, "Route registered");
        Ok(())
    }

    pub fn get<H, T>(&self, path: &str, handler: H) -> Result<(), ConfigError>
    where
        H: Handler<T, SharedResources>,
        T: 'static,
    {
        self.route(Method::GET, path, handler)
    }

    pub fn post<H, T>(&self, path: &str, handler: H) -> Result<(), ConfigError>
    where
        H: Handler<T, SharedResources>,
        T: 'static,
    {
        self.route(Method::POST, path, handler)
    }

    pub fn put<H, T>(&self, path: &str, handler: H) -> Result<(), ConfigError>
    where
        H: Handler<T, SharedResources>,
        T: 'static,
    {
        self.route(Method::PUT, path, handler)
    }

    pub fn patch<H, T>(&self, path: &str, handler: H) -> Result<(), ConfigError>
    where
        H: Handler<T, SharedResources>,
        T: 'static,
    {
        self.route(Method::PATCH, path, handler)
    }

    pub fn delete<H, T>(&self, path: &str, handler: H) -> Result<(), ConfigError>
    where
        H: Handler<T, SharedResources>,
        T: 'static,
    {
        self.route(Method::DELETE, path, handler)
    }

    /// Serve files under `root` at the URL prefix `url`.
    pub fn static_files(&self, url: &str, root: impl AsRef<Path>) -> Result<(), ConfigError> {
        let root = root.as_ref();
        let invalid = |reason: &str| ConfigError::InvalidRoute {
            method: "GET".to_string(),
            path: url.to_string(),
            reason: reason.to_string(),
        };

        check_path(url).map_err(|reason| invalid(reason))?;
        if !root.is_dir() {
            return Err(ConfigError::MissingDirectory(root.display().to_string()));
        }

        let prefix = url.trim_end_matches('/');
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        if routes.router.is_none() {
            return Err(ConfigError::AlreadyRunning(self.name.clone()));
        }
        if !routes.mounts.insert(prefix.to_string()) {
            return Err(invalid("already mounted"));
        }
        if let Some(router) = routes.router.take() {
            let files = ServeDir::new(root);
            routes.router = Some(if prefix.is_empty() {
                router.fallback_service(files)
            } else {
                router.nest_service(prefix, files)
            });
        }

        tracing::debug!(url = %url, root = %root.display(), "Static directory mounted");
        Ok(())
    }

    /// Wrap every route with `layer`, including routes registered later.
    ///
    /// Layers run in registration order: the first one registered sees the
    /// request first. Request-id, trace and timeout layers stay outermost.
    pub fn layer<L>(&self, layer: L) -> Result<(), ConfigError>
    where
        L: Layer<Route> + Clone + Send + Sync + 'static,
        L::Service: Service<Request> + Clone + Send + Sync + 'static,
        <L::Service as Service<Request>>::Response: IntoResponse + 'static,
        <L::Service as Service<Request>>::Error: Into<Infallible> + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        if routes.router.is_none() {
            return Err(ConfigError::AlreadyRunning(self.name.clone()));
        }
        routes
            .layers
            .push(Box::new(move |router: Router<SharedResources>| router.layer(layer)));
        tracing::debug!(layers = routes.layers.len(), "Middleware registered");
        Ok(())
    }

    /// Serve `group` under `prefix`.
    ///
    /// The group's own routes are not checked against ones registered
    /// directly on this server.
    pub fn nest(&self, prefix: &str, group: Router<SharedResources>) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidRoute {
            method: "*".to_string(),
            path: prefix.to_string(),
            reason: reason.to_string(),
        };

        check_path(prefix).map_err(|reason| invalid(reason))?;
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return Err(invalid("cannot nest at the root"));
        }

        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        if routes.router.is_none() {
            return Err(ConfigError::AlreadyRunning(self.name.clone()));
        }
        if !routes.mounts.insert(prefix.to_string()) {
            return Err(invalid("already mounted"));
        }
        if let Some(router) = routes.router.take() {
            routes.router = Some(router.nest(prefix, group));
        }

        tracing::debug!(prefix = %prefix, "Route group nested");
        Ok(())
    }

    /// Number of registered method/path pairs.
    pub fn route_count(&self) -> usize {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .endpoints
            .len()
    }

    /// The bound address, once listening. Reflects the real port when
    /// configured with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Wait until the server is accepting connections. `None` if it stopped
    /// or failed first.
    pub async fn serving(&self) -> Option<SocketAddr> {
        let mut rx = self.state.subscribe();
        let reached = rx
            .wait_for(|s| matches!(s, ComponentState::Running) || s.is_terminal())
            .await
            .map(|s| *s);
        match reached {
            Ok(ComponentState::Running) => self.local_addr(),
            _ => None,
        }
    }

    fn set_state(&self, state: ComponentState) {
        self.state.send_replace(state);
    }

    /// Take the collected routes with every registered layer applied.
    fn take_router(&self) -> Router<SharedResources> {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        let router = routes.router.take().unwrap_or_default();
        routes
            .layers
            .drain(..)
            .rev()
            .fold(router, |router, apply| apply(router))
    }

    async fn serve(&self) -> Result<(), ComponentError> {
        let address = self.config.bind_address();
        let bind_error = |reason: String| ComponentError::Bind {
            address: address.clone(),
            reason,
        };

        let addr = tokio::net::lookup_host(address.as_str())
            .await
            .map_err(|e| bind_error(e.to_string()))?
            .next()
            .ok_or_else(|| bind_error("address did not resolve".to_string()))?;

        let app = apply_layers(
            self.take_router().with_state(self.resources.clone()),
            &self.config,
        )
        .into_make_service();

        let mut server: ServeFuture = match &self.config.tls {
            Some(tls) => {
                let rustls = load_tls_config(tls).await?;
                Box::pin(
                    axum_server::bind_rustls(addr, rustls)
                        .handle(self.handle.clone())
                        .serve(app),
                )
            }
            None => Box::pin(axum_server::bind(addr).handle(self.handle.clone()).serve(app)),
        };

        tokio::select! {
            result = &mut server => {
                return result.map_err(|e| bind_error(e.to_string()));
            }
            bound = self.handle.listening() => match bound {
                Some(local) => {
                    let _ = self.local_addr.set(local);
                    self.state.send_if_modified(|s| {
                        if *s == ComponentState::Starting {
                            *s = ComponentState::Running;
                            return true;
                        }
                        false
                    });
                    tracing::info!(
                        component = %self.name,
                        address = %local,
                        tls = self.config.tls.is_some(),
                        mode = %self.config.mode,
                        "HTTP server listening"
                    );
                }
                None => return server.await.map_err(|e| bind_error(e.to_string())),
            }
        }

        server
            .await
            .map_err(|e| ComponentError::Serve(e.to_string()))?;
        tracing::info!(component = %self.name, "HTTP server stopped");
        Ok(())
    }

    /// `true` if the state became terminal before `deadline`.
    async fn stopped_by(&self, deadline: Instant) -> bool {
        let mut rx = self.state.subscribe();
        let stopped = matches!(
            tokio::time::timeout_at(deadline, rx.wait_for(ComponentState::is_terminal)).await,
            Ok(Ok(_))
        );
        stopped
    }

    async fn stop(&self, deadline: Instant) -> Result<ShutdownStatus, ComponentError> {
        let mut prior = ComponentState::Idle;
        self.state.send_if_modified(|s| {
            prior = *s;
            match *s {
                ComponentState::Idle => {
                    *s = ComponentState::Stopped;
                    true
                }
                ComponentState::Starting | ComponentState::Running => {
                    *s = ComponentState::Stopping;
                    true
                }
                _ => false,
            }
        });

        match prior {
            ComponentState::Idle => {
                tracing::debug!(component = %self.name, "Shutdown before start");
                return Ok(ShutdownStatus::Clean);
            }
            ComponentState::Stopped | ComponentState::Failed => return Ok(ShutdownStatus::Clean),
            _ => {}
        }

        tracing::info!(
            component = %self.name,
            connections = self.handle.connection_count(),
            grace = ?deadline.saturating_duration_since(Instant::now()),
            "Draining HTTP connections"
        );
        // Untimed drain; the forced close below enforces the deadline.
        self.handle.graceful_shutdown(None);

        if self.stopped_by(deadline).await {
            return Ok(ShutdownStatus::Clean);
        }

        let open = self.handle.connection_count();
        tracing::warn!(component = %self.name, connections = open, "Deadline reached, closing connections");
        self.handle.shutdown();

        if self.stopped_by(Instant::now() + FORCE_CLOSE_GRACE).await {
            Ok(ShutdownStatus::Partial(format!("forced close of {} connection(s)", open)))
        } else {
            Err(ComponentError::DeadlineExceeded)
        }
    }
}

fn check_path(path: &str) -> Result<(), &'static str> {
    if !path.starts_with('/') {
        return Err("path must start with '/'");
    }
    if path
        .split('/')
        .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
    {
        return Err("use {name} or {*name} for captures");
    }
    Ok(())
}

#[async_trait]
impl Component for ServerComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ComponentState {
        *self.state.borrow()
    }

    async fn start(&self) -> Result<(), ComponentError> {
        let entered = self.state.send_if_modified(|s| {
            if *s == ComponentState::Idle {
                *s = ComponentState::Starting;
                return true;
            }
            false
        });
        if !entered {
            return match self.state() {
                ComponentState::Stopped => Ok(()),
                _ => Err(ComponentError::AlreadyStarted),
            };
        }

        match self.serve().await {
            Ok(()) => {
                self.set_state(ComponentState::Stopped);
                Ok(())
            }
            Err(e) => {
                tracing::error!(component = %self.name, error = %e, "HTTP server failed");
                self.set_state(ComponentState::Failed);
                Err(e)
            }
        }
    }

    async fn shutdown(&self, deadline: Instant) -> Result<ShutdownStatus, ComponentError> {
        self.outcome
            .get_or_init(|| self.stop(deadline))
            .await
            .clone()
    }
}

impl std::fmt::Debug for ServerComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerComponent")
            .field("name", &self.name)
            .field("address", &self.config.bind_address())
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .finish()
    }
}
