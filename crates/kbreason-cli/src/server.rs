//! kbreason HTTP server.
//!
//! Every route is a `GET` with URL query parameters:
//! - `/init`, `/reset`: load / reload the knowledge base (plain-text confirmation)
//! - `/ask?query=..&timeout=..`: run a query, JSON bindings + proof + time
//! - `/tell?statement=..`: add an assertion (plain-text confirmation)
//! - `/term?term=..`: transitive subclasses as a JSON array
//! - `/healthz`, `/status`: liveness and load state
//!
//! Failures are JSON `{"error": ..}` documents; no handler error escapes as a
//! dropped connection.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use kbreason_kb::{
    encode, execute_query, lookup_term, KbError, KbManager, KnowledgeBase, ResponseStatus,
    TimeBudget,
};
use kbreason_prover::SolverLimits;
use serde::Serialize;
use tokio::net::TcpListener;
use url::form_urlencoded;

const DEFAULT_QUERY: &str = "(subclass ?X Object)";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STATEMENT: &str = "Object";
const DEFAULT_TERM: &str = "Object";
/// Wire texts existing Sigma clients match on.
const INIT_CONFIRMATION: &str = "Sigma init completed";
const RESET_CONFIRMATION: &str = "Sigma reset completed";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub ready_file: Option<PathBuf>,
    pub eager_init: bool,
    pub limits: SolverLimits,
}

struct ServerState {
    manager: Arc<KbManager>,
    limits: SolverLimits,
}

pub async fn serve(config: ServerConfig, manager: Arc<KbManager>) -> Result<()> {
    if config.eager_init {
        // A failed load is reported and retried on the next request.
        if let Err(e) = manager.kb().await {
            tracing::warn!(error = %e, "eager knowledge base load failed");
        }
    }

    let state = Arc::new(ServerState {
        manager,
        limits: config.limits,
    });

    let listener = TcpListener::bind(config.listen)
        .await
        .map_err(|e| anyhow!("serve: failed to bind {}: {e}", config.listen))?;
    let bound = listener
        .local_addr()
        .map_err(|e| anyhow!("serve: failed to read bound addr: {e}"))?;

    tracing::info!(
        addr = %bound,
        kb = %state.manager.config().name,
        "listening on http://{bound}"
    );
    if let Some(path) = config.ready_file.as_ref() {
        write_ready_file(path, bound)?;
    }

    loop {
        let (stream, _peer) = listener
            .accept()
            .await
            .map_err(|e| anyhow!("serve: accept failed: {e}"))?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::warn!(error = %e, "connection error");
            }
        });
    }
}

/// Written once the listener is bound; renamed into place so readers never
/// see a partial file.
fn write_ready_file(path: &std::path::Path, bound: SocketAddr) -> Result<()> {
    let payload = serde_json::json!({
        "version": "kbreason_server_ready_v1",
        "addr": bound.to_string(),
        "pid": std::process::id(),
    });
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, serde_json::to_string_pretty(&payload)?)
        .and_then(|_| std::fs::rename(&tmp, path))
        .map_err(|e| anyhow!("serve: failed to write ready file {}: {e}", path.display()))
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<ServerState>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let params = parse_query_params(req.uri().query());

    let resp = match (method, path.as_str()) {
        (Method::GET, "/healthz") => text_response(StatusCode::OK, "ok\n"),
        (Method::GET, "/status") => json_response(StatusCode::OK, &status_payload(&state)),
        (Method::GET, "/init") => handle_init(&state).await,
        (Method::GET, "/reset") => handle_reset(&state).await,
        (Method::GET, "/ask") => handle_ask(&state, &params).await,
        (Method::GET, "/tell") => handle_tell(&state, &params).await,
        (Method::GET, "/term") => handle_term(&state, &params).await,
        _ => json_error(StatusCode::NOT_FOUND, "not found"),
    };

    Ok(resp)
}

async fn handle_init(state: &ServerState) -> Response<Full<Bytes>> {
    match state.manager.kb().await {
        Ok(_) => text_response(StatusCode::OK, INIT_CONFIRMATION),
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn handle_reset(state: &ServerState) -> Response<Full<Bytes>> {
    let result = async {
        let kb = state.manager.kb().await?;
        kb.reset().await
    }
    .await;
    match result {
        Ok(()) => text_response(StatusCode::OK, RESET_CONFIRMATION),
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn parse_timeout(value: Option<&String>) -> Result<TimeBudget, String> {
    let Some(raw) = value else {
        return TimeBudget::from_secs(DEFAULT_TIMEOUT_SECS)
            .ok_or_else(|| "invalid default timeout".to_string());
    };
    raw.trim()
        .parse::<u64>()
        .ok()
        .and_then(TimeBudget::from_secs)
        .ok_or_else(|| format!("timeout must be a positive integer number of seconds, got `{raw}`"))
}

async fn handle_ask(state: &ServerState, params: &HashMap<String, String>) -> Response<Full<Bytes>> {
    let budget = match parse_timeout(params.get("timeout")) {
        Ok(b) => b,
        Err(msg) => return json_error(StatusCode::BAD_REQUEST, &msg),
    };
    let query = params
        .get("query")
        .map(String::as_str)
        .unwrap_or(DEFAULT_QUERY);

    let kb = match state.manager.kb().await {
        Ok(kb) => kb,
        Err(e) => return json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };
    let encoded = encode(&execute_query(kb.as_ref(), query, budget, state.limits).await);
    let status = match encoded.status {
        ResponseStatus::Ok => StatusCode::OK,
        ResponseStatus::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
    };
    raw_json_response(status, encoded.body)
}

async fn handle_tell(state: &ServerState, params: &HashMap<String, String>) -> Response<Full<Bytes>> {
    let statement = params
        .get("statement")
        .map(String::as_str)
        .unwrap_or(DEFAULT_STATEMENT);
    let result = match state.manager.kb().await {
        Ok(kb) => kb.tell(statement),
        Err(e) => Err(e),
    };
    match result {
        Ok(confirmation) => text_response(StatusCode::OK, &confirmation),
        Err(e @ KbError::InvalidStatement(_)) => json_error(StatusCode::BAD_REQUEST, &e.to_string()),
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn handle_term(state: &ServerState, params: &HashMap<String, String>) -> Response<Full<Bytes>> {
    let term = params
        .get("term")
        .map(String::as_str)
        .unwrap_or(DEFAULT_TERM);
    let result = match state.manager.kb().await {
        Ok(kb) => lookup_term(kb.as_ref(), term),
        Err(e) => Err(e),
    };
    match result {
        Ok(children) => json_response(StatusCode::OK, &children),
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn status_payload(state: &ServerState) -> serde_json::Value {
    let loaded = state.manager.loaded();
    serde_json::json!({
        "version": "kbreason_status_v1",
        "kb": state.manager.config().name,
        "sources": state.manager.config().sources.len(),
        "loaded": loaded.is_some(),
        "answer_limit": state.limits.answer_limit,
        "status": loaded.map(|kb| kb.status()),
    })
}

fn parse_query_params(query: Option<&str>) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let Some(q) = query else {
        return out;
    };
    for (k, v) in form_urlencoded::parse(q.as_bytes()) {
        out.insert(k.into_owned(), v.into_owned());
    }
    out
}

fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"internal error"))))
}

fn raw_json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"{\"error\":\"internal\"}"))))
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_string(value).unwrap_or_else(|_| "{\"error\":\"serialize\"}".to_string());
    raw_json_response(status, body)
}

fn json_error(status: StatusCode, msg: &str) -> Response<Full<Bytes>> {
    raw_json_response(status, kbreason_kb::error_body(msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn query_params_are_url_decoded() {
        let params = parse_query_params(Some("query=(subclass%20%3FX%20Object)&timeout=5"));
        assert_eq!(params["query"], "(subclass ?X Object)");
        assert_eq!(params["timeout"], "5");
        assert!(parse_query_params(None).is_empty());
    }

    #[test]
    fn timeout_defaults_and_validation() {
        assert_eq!(
            parse_timeout(None).unwrap().as_duration(),
            Duration::from_secs(30)
        );
        assert_eq!(
            parse_timeout(Some(&"7".to_string())).unwrap().as_duration(),
            Duration::from_secs(7)
        );
        assert!(parse_timeout(Some(&"0".to_string())).is_err());
        assert!(parse_timeout(Some(&"-3".to_string())).is_err());
        assert!(parse_timeout(Some(&"soon".to_string())).is_err());
    }
}
