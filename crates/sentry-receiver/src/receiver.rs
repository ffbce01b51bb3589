//! HTTP ingress for envelope documents.

use std::io::{self, Read};
use std::sync::Arc;

use bytes::Bytes;
use flate2::read::{GzDecoder, ZlibDecoder};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use telemetry_model::TracesConsumer;

use crate::config::Config;
use crate::envelope_parser::parse_envelope;
use crate::models::EnvelopeType;
use crate::trace_builder::{build_traces, RequestMeta};

const BAD_REQUEST_BODY: &str = "\"Bad Request\"";
const INTERNAL_SERVER_ERROR_BODY: &str = "\"Internal Server Error\"";

#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        source: io::Error,
    },
    #[error("server error: {0}")]
    Accept(io::Error),
}

/// HTTP server that feeds decoded envelopes to the downstream traces
/// consumer. One handler serves every path; the path only matters as the
/// service-name fallback.
pub struct SentryReceiver {
    config: Arc<Config>,
    next_consumer: Arc<dyn TracesConsumer>,
    shutdown: CancellationToken,
}

impl SentryReceiver {
    pub fn new(config: Arc<Config>, next_consumer: Arc<dyn TracesConsumer>) -> SentryReceiver {
        SentryReceiver {
            config,
            next_consumer,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the accept loop when cancelled. In-flight handlers
    /// are drained before `serve` returns.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn start(&self) -> Result<(), ReceiverError> {
        let listener =
            TcpListener::bind(&self.config.endpoint)
                .await
                .map_err(|source| ReceiverError::Bind {
                    endpoint: self.config.endpoint.clone(),
                    source,
                })?;
        info!("sentry receiver listening on {}", self.config.endpoint);
        self.serve(listener).await
    }

    /// Serves connections from an already-bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ReceiverError> {
        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        loop {
            let conn = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("server error: {e}");
                        return Err(ReceiverError::Accept(e));
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("connection handler panicked: {e:?}");
                        continue;
                    }
                    Ok(()) | Err(_) => continue,
                },
            };

            let io = TokioIo::new(conn);
            let server = server.clone();
            let config = Arc::clone(&self.config);
            let consumer = Arc::clone(&self.next_consumer);
            joinset.spawn(async move {
                let service = service_fn(move |req| {
                    handle_envelope(Arc::clone(&config), Arc::clone(&consumer), req)
                });
                if let Err(e) = server.serve_connection(io, service).await {
                    debug!("connection error: {e}");
                }
            });
        }

        while joinset.join_next().await.is_some() {}
        info!("sentry receiver is shutdown");
        Ok(())
    }
}

async fn handle_envelope(
    config: Arc<Config>,
    consumer: Arc<dyn TracesConsumer>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::http::Error> {
    let (parts, body) = req.into_parts();

    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let meta = RequestMeta {
        path: parts.uri.path().to_string(),
        service_id: header("x-service-id"),
        service_name: header("x-service-name"),
    };
    let content_encoding = header("content-encoding");

    let raw = body
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();

    let (status, body) = process_envelope(&config, consumer, meta, content_encoding, &raw).await;
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(body)))
}

/// Decompress, parse, build and push one envelope; returns the response.
async fn process_envelope(
    config: &Config,
    consumer: Arc<dyn TracesConsumer>,
    meta: RequestMeta,
    content_encoding: Option<String>,
    raw: &[u8],
) -> (StatusCode, String) {
    let decoded = decompress_body(content_encoding.as_deref(), raw);
    let body = String::from_utf8_lossy(&decoded);

    let envelope = match parse_envelope(&body) {
        Ok(envelope) => envelope,
        Err(err) => {
            error!("error parsing envelope: {err}");
            return (StatusCode::NOT_ACCEPTABLE, "{}".to_string());
        }
    };

    let traces = build_traces(config, &envelope, &meta);
    debug!(
        "for {} got trace with {} spans",
        envelope.type_header.item_type,
        traces.span_count()
    );

    match consumer.consume_traces(traces).await {
        Ok(()) => {
            if envelope.envelope_type == EnvelopeType::Session {
                (StatusCode::OK, "{}".to_string())
            } else {
                (
                    StatusCode::OK,
                    format!("{{\"id\": \"{}\"}}", envelope.header.event_id),
                )
            }
        }
        Err(err) => {
            error!("consumer error: {err}");
            if err.is_permanent() {
                (StatusCode::BAD_REQUEST, BAD_REQUEST_BODY.to_string())
            } else {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    INTERNAL_SERVER_ERROR_BODY.to_string(),
                )
            }
        }
    }
}

/// Decodes the body per `Content-Encoding`. A body that fails to decompress
/// falls back to the raw bytes.
fn decompress_body(content_encoding: Option<&str>, raw: &[u8]) -> Vec<u8> {
    match content_encoding {
        Some("gzip") => {
            let mut decoded = Vec::new();
            match GzDecoder::new(raw).read_to_end(&mut decoded) {
                Ok(_) => decoded,
                Err(_) => raw.to_vec(),
            }
        }
        Some("deflate") | Some("zlib") => {
            let mut decoded = Vec::new();
            match ZlibDecoder::new(raw).read_to_end(&mut decoded) {
                Ok(_) => decoded,
                Err(_) => raw.to_vec(),
            }
        }
        _ => raw.to_vec(),
    }
}
