use std::net::SocketAddr;
use std::sync::Arc;

use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use kestrel_auth::audit::AuditLog;
use kestrel_auth::jwt::TokenLifetimes;
use kestrel_auth::login::login as authenticate;
use kestrel_core::registry::RegistryError;
use kestrel_core::StateCache;
use kestrel_http::{HttpEndpointDeclaration, HttpMethod};
use kestrel_plugin::sandbox::SandboxConfig;
use kestrel_runtime::builtin::{ClockModule, HealthModule, LoggerModule};
use kestrel_runtime::{ModuleManager, Runtime, RuntimeShutdownTimeout};
use kestrel_storage::backend_postgres::PostgresBackend;
use kestrel_storage::backend_sled::SledBackend;
use kestrel_storage::{Facade, StorageBackend};

use kestrel_daemon::config::{DaemonConfig, StorageKind};
use kestrel_daemon::http_adapter::{build_router, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = DaemonConfig::load();
    let jwt_secret = config.resolve_jwt_secret();

    let backend: Arc<dyn StorageBackend> = match config.storage_kind {
        StorageKind::Sled => Arc::new(
            SledBackend::open(&config.sled_path).expect("failed to open sled storage backend"),
        ),
        StorageKind::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .expect("KESTREL_STORAGE_KIND=postgres requires DATABASE_URL");
            Arc::new(
                PostgresBackend::connect(url)
                    .await
                    .expect("failed to connect to postgres storage backend"),
            )
        }
    };

    let state = Arc::new(StateCache::new());
    let storage = Arc::new(
        Facade::new(backend, state.clone())
            .await
            .expect("failed to initialize storage façade"),
    );

    let runtime = Arc::new(Runtime::new(
        storage,
        state,
        config.plugin_root.clone(),
        SandboxConfig::from_env(),
        vec!["system.health".to_string(), "auth.login".to_string()],
        action_scope_map(),
    ));

    register_builtin_endpoints(&runtime).await;
    register_login_service(&runtime, jwt_secret.clone())
        .await
        .expect("failed to register auth.login service");

    let mut modules = ModuleManager::new();
    modules.register(Arc::new(LoggerModule));
    modules.register(Arc::new(ClockModule::default()));
    modules.register(Arc::new(HealthModule));

    runtime
        .start(&modules)
        .await
        .expect("fatal error during module startup");

    let app_state = AppState {
        runtime: runtime.clone(),
        jwt_secret: Arc::new(jwt_secret),
    };

    let cors = build_cors_layer(&config.cors_origins);

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(6)
            .burst_size(10)
            .finish()
            .expect("invalid rate limiter configuration"),
    );

    let router = build_router(app_state)
        .await
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer { config: governor_conf })
        .layer(cors)
        .layer(SetResponseHeaderLayer::if_not_present(
            axum::http::header::HeaderName::from_static("x-content-type-options"),
            axum::http::HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            axum::http::header::HeaderName::from_static("x-frame-options"),
            axum::http::HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            axum::http::header::HeaderName::from_static("referrer-policy"),
            axum::http::HeaderValue::from_static("no-referrer"),
        ));

    let addr: SocketAddr = config.bind.parse().expect("invalid KESTREL_BIND address");
    tracing::info!(%addr, "kestrel daemon listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listening socket");

    let shutdown_runtime = runtime.clone();
    let shutdown_modules_marker = modules;

    tokio::select! {
        result = axum::serve(listener, router.into_make_service()) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "http server exited with an error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
    }

    shutdown_runtime
        .shutdown(&shutdown_modules_marker, RuntimeShutdownTimeout::default())
        .await;
}

/// Maps service actions onto the scope required to invoke them, for
/// services whose natural verb (`list`, `set_state`, ...) doesn't match
/// their scope name one-to-one. Actions absent from this map require a
/// scope equal to their own name.
fn action_scope_map() -> std::collections::HashMap<String, String> {
    std::collections::HashMap::from([
        ("devices.list".to_string(), "devices.read".to_string()),
        ("devices.set_state".to_string(), "devices.write".to_string()),
    ])
}

async fn register_builtin_endpoints(runtime: &Runtime) {
    let _ = runtime
        .http
        .register(HttpEndpointDeclaration {
            method: HttpMethod::Get,
            path: "/system/health".to_string(),
            service: "system.health".to_string(),
            version: "v1".to_string(),
            description: "Kernel and loaded-plugin health snapshot".to_string(),
            deprecated: false,
        })
        .await;

    let _ = runtime
        .http
        .register(HttpEndpointDeclaration {
            method: HttpMethod::Get,
            path: "/clock/now".to_string(),
            service: "clock.now".to_string(),
            version: "v1".to_string(),
            description: "Current kernel time".to_string(),
            deprecated: false,
        })
        .await;

    let _ = runtime
        .http
        .register(HttpEndpointDeclaration {
            method: HttpMethod::Post,
            path: "/auth/login".to_string(),
            service: "auth.login".to_string(),
            version: "v1".to_string(),
            description: "Exchange a username/password pair for a token pair".to_string(),
            deprecated: false,
        })
        .await;
}

#[derive(serde::Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

/// Registers the `auth.login.v1` service: the one path by which a
/// caller with no credential yet can obtain one. Everything it needs
/// (storage, the rate limiter, the event bus) is already owned by the
/// runtime façade; the audit log is constructed fresh here since it has
/// no other caller and so isn't worth carrying as a `Runtime` field.
async fn register_login_service(runtime: &Runtime, jwt_secret: String) -> Result<(), RegistryError> {
    let storage = runtime.storage.clone();
    let rate_limiter = runtime.rate_limiter.clone();
    let bus = runtime.bus.clone();
    let audit = Arc::new(AuditLog::new(storage.clone()));

    runtime
        .services
        .register(
            "auth.login",
            "v1",
            Arc::new(move |args: serde_json::Value| {
                let storage = storage.clone();
                let rate_limiter = rate_limiter.clone();
                let bus = bus.clone();
                let audit = audit.clone();
                let jwt_secret = jwt_secret.clone();
                async move {
                    let req: LoginRequest = serde_json::from_value(args)
                        .map_err(|e| RegistryError::CallFailed(e.to_string()))?;

                    authenticate(
                        &storage,
                        &rate_limiter,
                        &audit,
                        &bus,
                        &jwt_secret,
                        TokenLifetimes::default(),
                        &req.username,
                        &req.password,
                    )
                    .await
                    .map(|tokens| serde_json::to_value(tokens).unwrap_or(serde_json::Value::Null))
                    .map_err(|e| RegistryError::CallFailed(e.to_string()))
                }
            }),
            false,
        )
        .await
}

fn build_cors_layer(origins: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(tower_http::cors::Any);
    if origins.trim().is_empty() {
        return layer.allow_origin(AllowOrigin::list(Vec::new()));
    }

    let parsed: Vec<axum::http::HeaderValue> = origins
        .split(',')
        .filter_map(|o| o.trim().parse().ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}
