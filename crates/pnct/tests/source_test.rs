// HTTP archive source against a local server: status mapping and the
// announced content type.

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{header, StatusCode};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;

use pnct::{ArchiveSource, Error, HttpArchiveSource, Query};

const ARCHIVE: &[u8] = b"PK\x03\x04archive";

fn router() -> Router {
    Router::new()
        .route(
            "/pnct_2022_116.zip",
            get(|| async { ([(header::CONTENT_TYPE, "application/zip")], ARCHIVE) }),
        )
        .route(
            "/pnct_2022_101.zip",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        )
}

/// Serve `router()` on a free port. The server lives as long as the runtime.
fn start_server() -> (Runtime, SocketAddr) {
    let runtime = Runtime::new().unwrap();
    let listener = runtime
        .block_on(TcpListener::bind("127.0.0.1:0"))
        .unwrap();
    let addr = listener.local_addr().unwrap();
    runtime.spawn(async move { axum::serve(listener, router()).await });
    (runtime, addr)
}

fn source(addr: SocketAddr) -> HttpArchiveSource {
    HttpArchiveSource::new(format!("http://{addr}")).with_timeout(Duration::from_secs(5))
}

#[test]
fn test_fetch_passes_content_type_through() {
    let (_runtime, addr) = start_server();
    let query = Query::new(2022, 116).unwrap();

    let archive = source(addr).fetch(&query).unwrap();

    assert_eq!(archive.url, format!("http://{addr}/pnct_2022_116.zip"));
    assert_eq!(archive.content_type.as_deref(), Some("application/zip"));
    assert_eq!(archive.bytes, ARCHIVE);
}

#[test]
fn test_fetch_404_is_dataset_not_found() {
    let (_runtime, addr) = start_server();
    let query = Query::new(2022, 999).unwrap();

    let err = source(addr).fetch(&query).unwrap_err();

    assert!(err.is_not_found());
    assert!(matches!(
        err,
        Error::DatasetNotFound { ref label, .. } if label == "BR-999 (2022)"
    ));
}

#[test]
fn test_fetch_server_error_is_http_error() {
    let (_runtime, addr) = start_server();
    let query = Query::new(2022, 101).unwrap();

    let err = source(addr).fetch(&query).unwrap_err();

    assert!(matches!(err, Error::Http { status: 503, .. }));
    assert!(!err.is_not_found());
}
