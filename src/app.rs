//! The application host.
//!
//! # Responsibilities
//! - Own the resources, the component registry and the shutdown handle
//! - Enable the HTTP server on first route and the scheduler on first job
//! - Run every component, stop them all on signal or request, close resources
//!
//! # Data Flow
//! ```text
//! App::new(config, source) → ResourceContainer::build
//!     → get/post/.../add_job/register_component   (configuration phase)
//!     → run(self)                                  (run phase)
//!         → SignalListener + RunLoop::launch
//!         → first of: every component exited | stop requested
//!         → ShutdownCoordinator::shutdown(deadline)
//!         → bounded fan-in wait, abort stragglers
//!         → resources.close() → RunSummary
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::handler::Handler;
use axum::http::Method;
use axum::response::IntoResponse;
use axum::routing::Route;
use axum::Router;
use tower::{Layer, Service};

use crate::config::{validate_config, AppConfig, ConfigError, ConfigSource, EnvSource};
use crate::error::{AppError, ComponentFailure};
use crate::http::{ServerComponent, SharedResources};
use crate::lifecycle::registry::{HTTP, SCHEDULER};
use crate::lifecycle::{
    Component, ComponentRegistry, RunLoop, RunReport, ShutdownCoordinator, ShutdownHandle,
    ShutdownReport, SignalListener, StopReason,
};
use crate::resources::ResourceContainer;
use crate::scheduler::{job_task, JobContext, Schedule, SchedulerComponent};

/// Extra time, past the shutdown deadline, that component tasks get to
/// return before they are aborted.
pub const JOIN_GRACE: Duration = Duration::from_secs(1);

/// How a run ended.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub reason: StopReason,
    /// How each component's `start` returned.
    pub exits: RunReport,
    pub shutdown: ShutdownReport,
}

impl RunSummary {
    /// No component failed to start, serve or stop.
    ///
    /// Partial shutdowns (abandoned job runs, force-closed connections)
    /// do not count as failures.
    pub fn is_clean(&self) -> bool {
        self.exits.all_ok() && !self.shutdown.has_failures()
    }

    /// Start-phase failures first, then shutdown-phase ones.
    pub fn failures(&self) -> Vec<ComponentFailure> {
        let mut failures = self.exits.failures();
        failures.extend(self.shutdown.failures());
        failures
    }

    pub fn into_result(self) -> Result<(), AppError> {
        let failures = self.failures();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(AppError::Run(failures))
        }
    }
}

/// Configuration-phase builder and runner.
pub struct App {
    resources: SharedResources,
    registry: ComponentRegistry,
    server: Option<Arc<ServerComponent>>,
    scheduler: Option<Arc<SchedulerComponent>>,
    shutdown: ShutdownHandle,
}

impl App {
    /// Validate `config` and build the shared resources.
    pub async fn new(config: AppConfig, source: Arc<dyn ConfigSource>) -> Result<Self, AppError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let resources = ResourceContainer::build(config, source).await?;
        Ok(Self::with_resources(Arc::new(resources)))
    }

    /// Configure from the process environment.
    pub async fn from_env() -> Result<Self, AppError> {
        let source: Arc<dyn ConfigSource> = Arc::new(EnvSource);
        let config = AppConfig::from_source(source.as_ref())?;
        Self::new(config, source).await
    }

    /// Use an already-built container.
    pub fn with_resources(resources: SharedResources) -> Self {
        let ceiling = Duration::from_secs(resources.config().shutdown.timeout_secs);
        Self {
            resources,
            registry: ComponentRegistry::new(),
            server: None,
            scheduler: None,
            shutdown: ShutdownHandle::new(ceiling),
        }
    }

    pub fn config(&self) -> &AppConfig {
        self.resources.config()
    }

    pub fn resources(&self) -> &SharedResources {
        &self.resources
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// The HTTP server, once a route or static directory enabled it.
    pub fn server(&self) -> Option<&Arc<ServerComponent>> {
        self.server.as_ref()
    }

    pub fn scheduler(&self) -> Option<&Arc<SchedulerComponent>> {
        self.scheduler.as_ref()
    }

    /// A handle that stops the App once it runs. Cloneable, usable from
    /// any task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Register a custom component. The first registration of an id wins;
    /// returns whether this one was inserted.
    pub fn register_component(&mut self, id: &str, component: Arc<dyn Component>) -> bool {
        self.registry.register(id, component)
    }

    fn http(&mut self) -> Result<Arc<ServerComponent>, ConfigError> {
        if let Some(server) = &self.server {
            return Ok(server.clone());
        }
        let server = Arc::new(ServerComponent::new(
            HTTP,
            self.config().http.clone(),
            self.resources.clone(),
        ));
        if !self.registry.register(HTTP, server.clone()) {
            return Err(ConfigError::DuplicateComponent(HTTP.to_string()));
        }
        tracing::debug!("HTTP server enabled");
        self.server = Some(server.clone());
        Ok(server)
    }

    fn jobs(&mut self) -> Result<Arc<SchedulerComponent>, ConfigError> {
        if let Some(scheduler) = &self.scheduler {
            return Ok(scheduler.clone());
        }
        let scheduler = Arc::new(SchedulerComponent::new(SCHEDULER, self.resources.clone()));
        if !self.registry.register(SCHEDULER, scheduler.clone()) {
            return Err(ConfigError::DuplicateComponent(SCHEDULER.to_string()));
        }
        tracing::debug!("Scheduler enabled");
        self.scheduler = Some(scheduler.clone());
        Ok(scheduler)
    }

    pub fn route<H, T>(&mut self, method: Method, path: &str, handler: H) -> Result<(), ConfigError>
    where
        H: Handler<T, SharedResources>,
        T: 'static,
    {
        self.http()?.route(method, path, handler)
    }

    pub fn get<H, T>(&mut self, path: &str, handler: H) -> Result<(), ConfigError>
    where
        H: Handler<T, SharedResources>,
        T: 'static,
    {
        self.route(Method::GET, path, handler)
    }

    pub fn post<H, T>(&mut self, path: &str, handler: H) -> Result<(), ConfigError>
    where
        H: Handler<T, SharedResources>,
        T: 'static,
    {
        self.route(Method::POST, path, handler)
    }

    pub fn put<H, T>(&mut self, path: &str, handler: H) -> Result<(), ConfigError>
    where
        H: Handler<T, SharedResources>,
        T: 'static,
    {
        self.route(Method::PUT, path, handler)
    }

    pub fn patch<H, T>(&mut self, path: &str, handler: H) -> Result<(), ConfigError>
    where
        H: Handler<T, SharedResources>,
        T: 'static,
    {
        self.route(Method::PATCH, path, handler)
    }

    pub fn delete<H, T>(&mut self, path: &str, handler: H) -> Result<(), ConfigError>
    where
        H: Handler<T, SharedResources>,
        T: 'static,
    {
        self.route(Method::DELETE, path, handler)
    }

    pub fn static_files(&mut self, url: &str, root: impl AsRef<Path>) -> Result<(), ConfigError> {
        self.http()?.static_files(url, root)
    }

    /// Wrap every route with a tower layer such as
    /// `axum::middleware::from_fn(..)`. See [`ServerComponent::layer`].
    pub fn layer<L>(&mut self, layer: L) -> Result<(), ConfigError>
    where
        L: Layer<Route> + Clone + Send + Sync + 'static,
        L::Service: Service<Request> + Clone + Send + Sync + 'static,
        <L::Service as Service<Request>>::Response: IntoResponse + 'static,
        <L::Service as Service<Request>>::Error: Into<Infallible> + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        self.http()?.layer(layer)
    }

    /// Serve a group of routes under a common prefix.
    pub fn nest(&mut self, prefix: &str, group: Router<SharedResources>) -> Result<(), ConfigError> {
        self.http()?.nest(prefix, group)
    }

    /// Run `task` on a cron or `@every` schedule.
    pub fn add_job<F, Fut>(&mut self, name: &str, schedule: &str, task: F) -> Result<(), ConfigError>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let schedule = schedule.parse::<Schedule>()?;
        self.add_scheduled_job(name, schedule, task)
    }

    pub fn add_scheduled_job<F, Fut>(&mut self, name: &str, schedule: Schedule, task: F) -> Result<(), ConfigError>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.jobs()?.add_scheduled_job(name, schedule, job_task(task))
    }

    /// Run until every component has exited or a stop is requested, then
    /// shut everything down within the configured ceiling.
    pub async fn run(self) -> RunSummary {
        let App {
            resources,
            registry,
            shutdown,
            ..
        } = self;
        let settings = resources.config().shutdown.clone();

        let _signals = if settings.handle_signals {
            match SignalListener::install(shutdown.clone(), settings.force_exit_on_repeat) {
                Ok(listener) => Some(listener),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install signal handlers, relying on programmatic shutdown");
                    None
                }
            }
        } else {
            None
        };

        if registry.is_empty() {
            tracing::warn!("No components registered");
        }
        tracing::info!(components = ?registry.ids().collect::<Vec<_>>(), "Starting components");

        let coordinator = ShutdownCoordinator::new(&registry);
        let mut run_loop = RunLoop::launch(registry.entries());

        tokio::select! {
            _ = run_loop.wait() => {
                shutdown.trigger(StopReason::Completed);
            }
            _ = shutdown.requested() => {}
        }
        let request = shutdown.requested().await;
        tracing::info!(reason = %request.reason, "Stopping");

        let report = coordinator.shutdown(request.deadline).await;

        if tokio::time::timeout_at(request.deadline + JOIN_GRACE, run_loop.wait())
            .await
            .is_err()
        {
            run_loop.abort_remaining();
            run_loop.wait().await;
        }

        resources.close().await;
        shutdown.publish(report.clone());

        let summary = RunSummary {
            reason: request.reason,
            exits: run_loop.into_report(),
            shutdown: report,
        };
        if summary.is_clean() {
            tracing::info!(elapsed = ?summary.shutdown.elapsed, "Shutdown complete");
        } else {
            tracing::error!(
                failures = summary.failures().len(),
                "Shutdown complete with errors"
            );
        }
        summary
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("components", &self.registry.ids().collect::<Vec<_>>())
            .field("shutdown", &self.shutdown)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapSource;
    use crate::error::{ComponentError, Phase};
    use crate::lifecycle::test_support::{Script, ScriptedComponent};
    use crate::lifecycle::ShutdownStatus;
    use crate::resources::{AbsenceReason, Resource};

    fn app(timeout_secs: u64) -> App {
        let mut config = AppConfig::default();
        config.http.host = "127.0.0.1".into();
        config.http.port = 0;
        config.shutdown.timeout_secs = timeout_secs;
        config.shutdown.handle_signals = false;
        App::with_resources(Arc::new(ResourceContainer::from_parts(
            config,
            Arc::new(MapSource::new()),
            Resource::Absent(AbsenceReason::NotConfigured),
            Resource::Absent(AbsenceReason::NotConfigured),
        )))
    }

    async fn ok() -> &'static str {
        "ok"
    }

    #[test]
    fn routes_and_jobs_enable_components_once() {
        let mut app = app(5);
        assert!(app.components().is_empty());

        app.get("/a", ok).unwrap();
        app.post("/b", ok).unwrap();
        app.add_job("tick", "@every 1s", |_| async { Ok(()) }).unwrap();
        app.add_job("tock", "*/5 * * * *", |_| async { Ok(()) }).unwrap();

        assert_eq!(app.components().ids().collect::<Vec<_>>(), vec![HTTP, SCHEDULER]);
        assert_eq!(app.server().unwrap().route_count(), 2);
        assert_eq!(app.scheduler().unwrap().job_count(), 2);
    }

    async fn passthrough(request: Request, next: axum::middleware::Next) -> axum::response::Response {
        next.run(request).await
    }

    #[test]
    fn middleware_and_groups_enable_the_server() {
        let mut app = app(5);
        app.layer(axum::middleware::from_fn(passthrough)).unwrap();
        assert_eq!(app.components().ids().collect::<Vec<_>>(), vec![HTTP]);

        let group: Router<SharedResources> = Router::new().route("/ping", axum::routing::get(ok));
        app.nest("/api", group).unwrap();
        assert!(matches!(
            app.nest("/", Router::new()),
            Err(ConfigError::InvalidRoute { .. })
        ));
        assert!(matches!(
            app.nest("/api", Router::new()),
            Err(ConfigError::InvalidRoute { .. })
        ));
    }

    #[test]
    fn invalid_schedule_does_not_enable_the_scheduler() {
        let mut app = app(5);
        assert!(matches!(
            app.add_job("bad", "whenever", |_| async { Ok(()) }),
            Err(ConfigError::InvalidSchedule { .. })
        ));
        assert!(app.components().is_empty());
    }

    #[test]
    fn custom_component_cannot_shadow_http() {
        let mut app = app(5);
        assert!(app.register_component(HTTP, ScriptedComponent::new("custom", Script::UntilStopped)));
        assert!(!app.register_component(HTTP, ScriptedComponent::new("again", Script::UntilStopped)));
        assert!(matches!(app.get("/", ok), Err(ConfigError::DuplicateComponent(_))));
    }

    #[tokio::test]
    async fn run_stops_everything_on_request() {
        let mut app = app(5);
        app.get("/", ok).unwrap();
        app.add_job("tick", "@every 50ms", |_| async { Ok(()) }).unwrap();
        let worker = ScriptedComponent::new("worker", Script::UntilStopped);
        app.register_component("worker", worker.clone());

        let handle = app.shutdown_handle();
        let resources = app.resources().clone();
        let server = app.server().unwrap().clone();
        let run = tokio::spawn(app.run());

        server.serving().await.unwrap();
        let report = handle.shutdown(Duration::from_secs(2)).await;
        assert!(report.is_clean());
        assert_eq!(report.components.len(), 3);

        let summary = run.await.unwrap();
        assert_eq!(summary.reason, StopReason::Requested);
        assert!(summary.is_clean());
        assert_eq!(worker.shutdown_calls(), 1);
        assert!(resources.is_closed());
        assert!(summary.into_result().is_ok());
    }

    #[tokio::test]
    async fn components_exiting_on_their_own_still_shut_down() {
        let mut app = app(5);
        app.register_component("a", ScriptedComponent::new("a", Script::ExitAfter(Duration::from_millis(10))));
        app.register_component("b", ScriptedComponent::new("b", Script::ExitAfter(Duration::from_millis(30))));

        let summary = app.run().await;
        assert_eq!(summary.reason, StopReason::Completed);
        assert!(summary.is_clean());
        assert_eq!(summary.exits.exits.len(), 2);
    }

    #[tokio::test]
    async fn start_failure_is_isolated_and_reported() {
        let mut app = app(5);
        let healthy = ScriptedComponent::new("healthy", Script::UntilStopped);
        app.register_component("broken", ScriptedComponent::new("broken", Script::FailStart));
        app.register_component("healthy", healthy.clone());

        let handle = app.shutdown_handle();
        let run = tokio::spawn(app.run());
        healthy.running().await;
        handle.request(Duration::from_secs(1));

        let summary = run.await.unwrap();
        assert!(!summary.is_clean());
        assert_eq!(
            summary.shutdown.outcome("healthy"),
            Some(&Ok(ShutdownStatus::Clean))
        );
        match summary.into_result() {
            Err(AppError::Run(failures)) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].component, "broken");
                assert_eq!(failures[0].phase, Phase::Start);
            }
            other => panic!("expected run error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn overrunning_component_is_reported_and_aborted() {
        let mut app = app(5);
        let stubborn = ScriptedComponent::with_stop_delay("stubborn", Script::UntilStopped, Duration::from_secs(10));
        let polite = ScriptedComponent::new("polite", Script::UntilStopped);
        app.register_component("stubborn", stubborn);
        app.register_component("polite", polite.clone());

        let handle = app.shutdown_handle();
        let run = tokio::spawn(app.run());
        polite.running().await;

        let started = tokio::time::Instant::now();
        handle.request(Duration::from_millis(100));
        let summary = run.await.unwrap();

        // deadline + coordinator overhead + join grace, with slack.
        assert!(started.elapsed() < Duration::from_millis(100) + JOIN_GRACE + Duration::from_millis(700));
        assert_eq!(
            summary.shutdown.outcome("stubborn"),
            Some(&Err(ComponentError::DeadlineExceeded))
        );
        assert_eq!(summary.shutdown.outcome("polite"), Some(&Ok(ShutdownStatus::Clean)));
        assert_eq!(
            summary.exits.exit("stubborn").unwrap().result,
            Err(ComponentError::Aborted)
        );
        assert!(summary.exits.exit("polite").unwrap().result.is_ok());
    }
}
