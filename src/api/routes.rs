//! Route table and handlers.

use crate::backend::BackendId;
use crate::config::ResourceLevel;
use crate::executor::{ExecuteError, RequestOptions};
use crate::state::AppState;
use crate::translation::TranslateError;
use crate::util::{RequestId, REQUEST_ID_HEADER};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use prometheus_client::encoding::text::encode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::fmt::Display;
use tracing::{debug, error};

/// Largest request body accepted.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// A resolved route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Metrics,
    Status,
    SetStrategy,
    AddBackend,
    RemoveBackend(BackendId),
    WakeBackend(BackendId),
    SetResourceLevel,
    ResetStats,
    Translate,
    /// Forward the remaining path through the executor.
    Relay(String),
    MethodNotAllowed,
    NotFound,
}

impl Route {
    pub fn resolve(method: &Method, path: &str) -> Route {
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

        let (route, allowed) = match segments.as_slice() {
            ["relay", rest @ ..] => {
                let rest = rest.join("/");
                let path = if rest.is_empty() { rest } else { format!("/{}", rest) };
                return Route::Relay(path);
            }
            ["metrics"] => (Route::Metrics, Method::GET),
            ["status"] => (Route::Status, Method::GET),
            ["strategy"] => (Route::SetStrategy, Method::PUT),
            ["backends"] => (Route::AddBackend, Method::POST),
            ["backends", id] => match id.parse() {
                Ok(id) => (Route::RemoveBackend(id), Method::DELETE),
                Err(_) => return Route::NotFound,
            },
            ["backends", id, "wake"] => match id.parse() {
                Ok(id) => (Route::WakeBackend(id), Method::POST),
                Err(_) => return Route::NotFound,
            },
            ["keep-alive", "level"] => (Route::SetResourceLevel, Method::PUT),
            ["stats", "reset"] => (Route::ResetStats, Method::POST),
            ["translate"] => (Route::Translate, Method::POST),
            _ => return Route::NotFound,
        };

        if *method == allowed {
            route
        } else {
            Route::MethodNotAllowed
        }
    }
}

#[derive(Debug, Deserialize)]
struct StrategyBody {
    strategy: String,
}

#[derive(Debug, Deserialize)]
struct AddBackendBody {
    url: String,
    label: String,
}

#[derive(Debug, Deserialize)]
struct LevelBody {
    level: String,
}

#[derive(Debug, Deserialize)]
struct TranslateBody {
    text: String,
    target_lang: String,
    #[serde(default)]
    source_lang: Option<String>,
}

#[derive(Debug, Serialize)]
struct Failure<'a> {
    error: &'a str,
    attempts: u32,
    last_error: &'a str,
}

/// Dispatch one API request.
pub async fn handle_request<B>(
    req: Request<B>,
    state: &AppState,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let route = Route::resolve(req.method(), req.uri().path());
    debug!(method = %req.method(), path = %req.uri().path(), route = ?route, "api request");

    let response = match route {
        Route::Metrics => metrics(state),
        Route::Status => json_response(StatusCode::OK, &state.status()),
        Route::SetStrategy => set_strategy(req, state).await,
        Route::AddBackend => add_backend(req, state).await,
        Route::RemoveBackend(id) => match state.remove_backend(id) {
            Some(backend) => json_response(StatusCode::OK, &backend),
            None => error_response(StatusCode::NOT_FOUND, format!("unknown backend {}", id)),
        },
        Route::WakeBackend(id) => {
            if state.registry().get(id).is_none() {
                error_response(StatusCode::NOT_FOUND, format!("unknown backend {}", id))
            } else {
                let woke = state.keep_alive().wake_up_backend(id).await;
                json_response(StatusCode::OK, &json!({ "backend_id": id, "woke": woke }))
            }
        }
        Route::SetResourceLevel => set_resource_level(req, state).await,
        Route::ResetStats => {
            state.stats().reset();
            json_response(StatusCode::OK, &state.stats().snapshot())
        }
        Route::Translate => translate(req, state).await,
        Route::Relay(path) => relay(req, path, state).await,
        Route::MethodNotAllowed => error_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
        Route::NotFound => error_response(StatusCode::NOT_FOUND, "not found"),
    };

    Ok(response)
}

fn metrics(state: &AppState) -> Response<Full<Bytes>> {
    let mut buffer = String::new();
    if let Err(e) = encode(&mut buffer, state.metrics().registry()) {
        error!(error = %e, "failed to encode metrics");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics");
    }
    respond(
        StatusCode::OK,
        "text/plain; version=0.0.4; charset=utf-8",
        buffer,
    )
}

async fn set_strategy<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body: StrategyBody = match read_json(req).await {
        Ok(body) => body,
        Err(response) => return response,
    };

    if state.balancer().set_strategy(&body.strategy) {
        json_response(StatusCode::OK, &json!({ "strategy": state.balancer().strategy() }))
    } else {
        error_response(
            StatusCode::BAD_REQUEST,
            format!("unknown strategy '{}'", body.strategy),
        )
    }
}

async fn add_backend<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body: AddBackendBody = match read_json(req).await {
        Ok(body) => body,
        Err(response) => return response,
    };

    let url = body.url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return error_response(StatusCode::BAD_REQUEST, "url must start with http:// or https://");
    }
    if body.label.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "label must not be empty");
    }
    if let Some(existing) = state.registry().find_by_url(url) {
        return error_response(
            StatusCode::CONFLICT,
            format!("backend {} already registered at {}", existing.id, existing.base_url),
        );
    }

    json_response(StatusCode::CREATED, &state.add_backend(url, body.label.trim()))
}

async fn set_resource_level<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body: LevelBody = match read_json(req).await {
        Ok(body) => body,
        Err(response) => return response,
    };

    match body.level.parse::<ResourceLevel>() {
        Ok(level) => {
            state.keep_alive().adjust_resource_usage(level);
            json_response(StatusCode::OK, &state.keep_alive().status())
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, e),
    }
}

async fn translate<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let Some(client) = state.translation() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "translation not configured");
    };
    let body: TranslateBody = match read_json(req).await {
        Ok(body) => body,
        Err(response) => return response,
    };

    match client
        .translate(&body.text, &body.target_lang, body.source_lang.as_deref())
        .await
    {
        Ok(translation) => json_response(StatusCode::OK, &translation),
        Err(TranslateError::Exhausted { attempts, last_error }) => json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &Failure {
                error: "translation unavailable",
                attempts,
                last_error: &last_error,
            },
        ),
        Err(e) => error_response(StatusCode::BAD_REQUEST, e),
    }
}

async fn relay<B>(req: Request<B>, path: String, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let request_id = RequestId::from_header(
        req.headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok()),
    );
    let path = match req.uri().query() {
        Some(query) if !path.is_empty() => format!("{}?{}", path, query),
        _ => path,
    };

    let mut options = RequestOptions::default()
        .with_method(req.method().clone())
        .with_request_id(request_id.clone());
    if let Some(auth) = req.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        options
            .headers
            .push((AUTHORIZATION.as_str().to_string(), auth.to_string()));
    }

    let body = match read_body(req).await {
        Ok(body) => body,
        Err(response) => return response,
    };
    if !body.is_empty() {
        options.body = Some(body);
    }

    let mut response = match state.executor().execute(&path, options).await {
        Ok(upstream) => {
            let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::OK);
            respond(status, "application/json", upstream.body)
        }
        Err(ExecuteError::InvalidPath) => error_response(StatusCode::BAD_REQUEST, ExecuteError::InvalidPath),
        Err(ExecuteError::NoBackends) => error_response(StatusCode::SERVICE_UNAVAILABLE, ExecuteError::NoBackends),
        Err(ExecuteError::Exhausted { attempts, last_error }) => json_response(
            StatusCode::BAD_GATEWAY,
            &Failure {
                error: "service unavailable",
                attempts,
                last_error: &last_error,
            },
        ),
    };

    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

async fn read_body<B>(req: Request<B>) -> Result<Bytes, Response<Full<Bytes>>>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, format!("failed to read body: {}", e)))
}

async fn read_json<T, B>(req: Request<B>) -> Result<T, Response<Full<Bytes>>>
where
    T: DeserializeOwned,
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body = read_body(req).await?;
    serde_json::from_slice(&body)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, format!("invalid JSON body: {}", e)))
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => respond(status, "application/json", body),
        Err(e) => {
            error!(error = %e, "failed to serialize response");
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                "failed to serialize response\n",
            )
        }
    }
}

fn error_response(status: StatusCode, message: impl Display) -> Response<Full<Bytes>> {
    json_response(status, &json!({ "error": message.to_string() }))
}
