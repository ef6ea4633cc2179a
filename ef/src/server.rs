//! HTTP surface for the feed
//!
//! hyper 1 over a tokio `TcpListener`; one task per connection. Failures
//! reach clients only as fixed JSON envelopes, details go to the log.

use std::convert::Infallible;
use std::future::Future;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode, header};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::feed::FeedManager;

/// Path serving the rolling window
pub const WINDOW_PATH: &str = "/getECGData";

/// Path serving the feed status snapshot
pub const STATUS_PATH: &str = "/status";

pub const EMPTY_CATALOG_MESSAGE: &str = "No CSV files found in the specified directory";
pub const INTERNAL_ERROR_MESSAGE: &str = "An error occurred while processing the request";

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(bytes) => Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(bytes)))
            .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"bad response")))),
        Err(e) => {
            error!(error = %e, "Failed to serialize response body");
            let mut response = Response::new(Full::new(Bytes::from_static(b"{}")));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &ErrorBody { error: message })
}

/// Route one request to the feed
pub async fn handle_request(req: Request<Incoming>, feed: FeedManager) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    drop(req);
    route(&method, &path, &feed).await
}

async fn route(method: &Method, path: &str, feed: &FeedManager) -> Response<Full<Bytes>> {
    debug!(%method, %path, "route: called");

    let known = path == WINDOW_PATH || path == STATUS_PATH;
    if !known {
        return error_response(StatusCode::NOT_FOUND, "Not found");
    }
    if *method != Method::GET {
        return error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
    }

    if path == WINDOW_PATH {
        match feed.next_window().await {
            Ok(window) => json_response(StatusCode::OK, &window.values),
            Err(e) if e.is_empty_catalog() => {
                warn!(error = %e, "No source to serve");
                error_response(StatusCode::NOT_FOUND, EMPTY_CATALOG_MESSAGE)
            }
            Err(e) => {
                error!(error = ?e, "An error occurred while serving a window");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
            }
        }
    } else {
        match feed.status().await {
            Ok(status) => json_response(StatusCode::OK, &status),
            Err(e) => {
                error!(error = ?e, "An error occurred while reading feed status");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
            }
        }
    }
}

async fn serve_connection(stream: tokio::net::TcpStream, feed: FeedManager) -> Result<(), hyper::Error> {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| {
        let feed = feed.clone();
        async move { Ok::<_, Infallible>(handle_request(req, feed).await) }
    });
    http1::Builder::new().serve_connection(io, service).await
}

/// Accept connections until `shutdown` resolves
///
/// In-flight connections keep running on their own tasks after the accept
/// loop stops.
pub async fn serve<F>(listener: TcpListener, feed: FeedManager, shutdown: F) -> eyre::Result<()>
where
    F: Future<Output = ()>,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Feed server listening");
    }
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Feed server stopping");
                break;
            }
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer)) => {
                        debug!(%peer, "serve: accepted connection");
                        let feed = feed.clone();
                        tokio::spawn(async move {
                            if let Err(err) = serve_connection(stream, feed).await {
                                warn!(error = %err, %peer, "Connection error");
                            }
                        });
                    }
                    Err(err) => {
                        error!(error = %err, "Accept error");
                    }
                }
            }
        }
    }

    Ok(())
}
