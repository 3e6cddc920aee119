use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post, put, MethodRouter};
use axum::{Json, Router};
use serde_json::Value;

use kestrel_auth::credential::{resolve_context, CredentialSet, RequestContext};
use kestrel_auth::policy::AuthError;
use kestrel_http::{HttpEndpointDeclaration, HttpMethod};
use kestrel_runtime::Runtime;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<Runtime>,
    pub jwt_secret: Arc<String>,
}

/// Builds the thin axum adapter by projecting whatever the Endpoint
/// Registry currently holds. A new service becomes reachable over HTTP
/// purely by registering it in the registry — this function never
/// hardcodes a route.
pub async fn build_router(state: AppState) -> Router {
    let declarations = state.runtime.http.list().await;

    let mut router = Router::new().route("/healthz", get(healthz));

    for decl in declarations {
        let route = method_router(decl.clone());
        router = router.route(&decl.effective_path(), route);
    }

    router
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

fn method_router(decl: HttpEndpointDeclaration) -> MethodRouter<AppState> {
    let service = decl.service.clone();
    let version = decl.version.clone();
    let handler = move |state: State<AppState>, ctx: axum::extract::Extension<Option<RequestContext>>, body: Option<Json<Value>>| {
        dispatch(state, ctx, service.clone(), version.clone(), body)
    };

    match decl.method {
        HttpMethod::Get => get(handler),
        HttpMethod::Post => post(handler),
        HttpMethod::Put => put(handler),
        HttpMethod::Patch => patch(handler),
        HttpMethod::Delete => delete(handler),
    }
}

async fn dispatch(
    State(state): State<AppState>,
    axum::extract::Extension(ctx): axum::extract::Extension<Option<RequestContext>>,
    service: String,
    version: String,
    body: Option<Json<Value>>,
) -> Response {
    let action = service.clone();
    if let Err(err) = state.runtime.policy.require(ctx.as_ref(), &action) {
        return kernel_error_response(err);
    }

    let qualified = format!("{service}.{version}");
    let args = body.map(|Json(v)| v).unwrap_or(Value::Null);

    match state.runtime.services.call(&qualified, args).await {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": "service_call_failed", "message": err.to_string()})),
        )
            .into_response(),
    }
}

fn kernel_error_response(err: AuthError) -> Response {
    let status = match err {
        AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
        AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
        AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
    };
    (
        status,
        Json(serde_json::json!({"error": "auth_error", "message": err.to_string()})),
    )
        .into_response()
}

/// Resolves whichever credential is present on the request (API key,
/// session cookie, bearer token — in that priority order) into a
/// `RequestContext` extension, so handlers never parse headers
/// themselves.
async fn auth_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let ctx = resolve_request_context(&state, request.headers()).await;
    request.extensions_mut().insert(ctx);
    next.run(request).await
}

async fn resolve_request_context(state: &AppState, headers: &HeaderMap) -> Option<RequestContext> {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let session = session_cookie(headers);

    resolve_context(
        &state.runtime.storage,
        &state.jwt_secret,
        CredentialSet {
            bearer_token: bearer,
            session_token: session,
        },
    )
    .await
    .ok()
}

/// Pulls `session_id` out of the `Cookie` header by hand — the adapter
/// has no other use for a cookie jar, so pulling in a whole crate for
/// one key/value pair isn't worth it.
fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    raw.split(';').map(str::trim).find_map(|pair| pair.strip_prefix("session_id="))
}
