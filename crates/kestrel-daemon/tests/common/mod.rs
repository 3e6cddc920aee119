// Shared test utilities for the daemon's integration tests.
use std::sync::Arc;

use kestrel_auth::audit::AuditLog;
use kestrel_auth::credential::API_KEYS_NAMESPACE;
use kestrel_auth::jwt::TokenLifetimes;
use kestrel_auth::login::login as authenticate;
use kestrel_core::StateCache;
use kestrel_http::{HttpEndpointDeclaration, HttpMethod};
use kestrel_plugin::sandbox::SandboxConfig;
use kestrel_runtime::Runtime;
use kestrel_storage::backend_sled::SledBackend;
use kestrel_storage::{Facade, StorageBackend};

pub const TEST_JWT_SECRET: &str = "test-jwt-secret-for-testing-only";

/// Builds a fully wired `Runtime` backed by a throwaway sled directory,
/// with a single `echo`-style service registered at `v1` and exposed
/// over `/v1/echo`. The temp directory is leaked so the sled database
/// outlives the test function without threading a guard value through
/// every call site.
pub async fn test_runtime() -> Arc<Runtime> {
    let dir = tempfile::tempdir().unwrap();
    let backend: Arc<dyn StorageBackend> = Arc::new(SledBackend::open(dir.path()).unwrap());
    let state = Arc::new(StateCache::new());
    let storage = Arc::new(Facade::new(backend, state.clone()).await.unwrap());
    std::mem::forget(dir);

    let runtime = Arc::new(Runtime::new(
        storage,
        state,
        "/tmp/kestrel-daemon-test-plugins-unused",
        SandboxConfig::default(),
        vec!["system.health".to_string(), "auth.login".to_string()],
        std::collections::HashMap::from([
            ("devices.list".to_string(), "devices.read".to_string()),
            ("devices.set_state".to_string(), "devices.write".to_string()),
        ]),
    ));

    runtime
        .services
        .register(
            "system.health",
            "v1",
            Arc::new(|_args: serde_json::Value| async move {
                Ok(serde_json::json!({"status": "ok"}))
            }),
            false,
        )
        .await
        .unwrap();

    runtime
        .services
        .register(
            "echo",
            "v1",
            Arc::new(|args: serde_json::Value| async move { Ok(args) }),
            false,
        )
        .await
        .unwrap();

    runtime
        .services
        .register(
            "devices.list",
            "v1",
            Arc::new(|_args: serde_json::Value| async move { Ok(serde_json::json!([])) }),
            false,
        )
        .await
        .unwrap();

    runtime
        .services
        .register(
            "devices.set_state",
            "v1",
            Arc::new(|args: serde_json::Value| async move { Ok(args) }),
            false,
        )
        .await
        .unwrap();

    runtime
        .http
        .register(HttpEndpointDeclaration {
            method: HttpMethod::Get,
            path: "/system/health".to_string(),
            service: "system.health".to_string(),
            version: "v1".to_string(),
            description: "health snapshot".to_string(),
            deprecated: false,
        })
        .await
        .unwrap();

    runtime
        .http
        .register(HttpEndpointDeclaration {
            method: HttpMethod::Post,
            path: "/echo".to_string(),
            service: "echo".to_string(),
            version: "v1".to_string(),
            description: "echoes the request body back".to_string(),
            deprecated: false,
        })
        .await
        .unwrap();

    runtime
        .http
        .register(HttpEndpointDeclaration {
            method: HttpMethod::Get,
            path: "/devices".to_string(),
            service: "devices.list".to_string(),
            version: "v1".to_string(),
            description: "lists known devices".to_string(),
            deprecated: false,
        })
        .await
        .unwrap();

    runtime
        .http
        .register(HttpEndpointDeclaration {
            method: HttpMethod::Post,
            path: "/devices/state".to_string(),
            service: "devices.set_state".to_string(),
            version: "v1".to_string(),
            description: "updates device state".to_string(),
            deprecated: false,
        })
        .await
        .unwrap();

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
                async move {
                    let req = args
                        .as_object()
                        .ok_or_else(|| kestrel_core::registry::RegistryError::CallFailed("expected a JSON object".to_string()))?;
                    let username = req.get("username").and_then(|v| v.as_str()).unwrap_or_default();
                    let password = req.get("password").and_then(|v| v.as_str()).unwrap_or_default();

                    authenticate(
                        &storage,
                        &rate_limiter,
                        &audit,
                        &bus,
                        TEST_JWT_SECRET,
                        TokenLifetimes::default(),
                        username,
                        password,
                    )
                    .await
                    .map(|tokens| serde_json::to_value(tokens).unwrap_or(serde_json::Value::Null))
                    .map_err(|e| kestrel_core::registry::RegistryError::CallFailed(e.to_string()))
                }
            }),
            false,
        )
        .await
        .unwrap();

    runtime
        .http
        .register(HttpEndpointDeclaration {
            method: HttpMethod::Post,
            path: "/auth/login".to_string(),
            service: "auth.login".to_string(),
            version: "v1".to_string(),
            description: "exchanges a username/password pair for a token pair".to_string(),
            deprecated: false,
        })
        .await
        .unwrap();

    runtime
}

/// Plants an API key record directly in storage, bypassing whatever
/// issuance flow a real deployment would use, so tests can authenticate
/// without needing one.
pub async fn plant_api_key(runtime: &Runtime, key: &str, scopes: &[&str], is_admin: bool) {
    runtime
        .storage
        .set(
            API_KEYS_NAMESPACE,
            key,
            serde_json::json!({
                "key": key,
                "subject": "test-client",
                "scopes": scopes,
                "is_admin": is_admin,
            }),
        )
        .await
        .unwrap();
}

/// Plants a user record under `auth_users` so the `auth.login` endpoint
/// has something to authenticate against.
pub async fn plant_user(runtime: &Runtime, username: &str, password: &str, scopes: &[&str], is_admin: bool) {
    runtime
        .storage
        .set(
            kestrel_auth::login::USERS_NAMESPACE,
            username,
            serde_json::json!({
                "user_id": uuid::Uuid::new_v4(),
                "username": username,
                "password_hash": kestrel_auth::password::hash_password(password).unwrap(),
                "scopes": scopes,
                "is_admin": is_admin,
            }),
        )
        .await
        .unwrap();
}
