//! FCT server. Answers each flow request with the requested number of
//! filler bytes, optionally on a caller-selected congestion control
//! algorithm.
//!
//! The CCA is applied per connection with `TCP_CONGESTION` on the accepted
//! socket, so the handler needs the connection's file descriptor. It is
//! carried into the handler through axum's connect-info mechanism.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::connect_info::Connected;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::serve::IncomingStream;
use fct_common::protocol::{DEFAULT_BUF_LEN, DEFAULT_PORT};
use fct_common::{Cancel, ProtocolConfig};
use tokio::net::TcpListener;

use crate::error::ServerError;

/// Listen settings for [`Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Response bodies are streamed in chunks of this size.
    pub buf_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            buf_len: DEFAULT_BUF_LEN,
        }
    }
}

/// Connection info handed to the handler: the accepted socket and its peer.
#[derive(Debug, Clone, Copy)]
pub struct ConnSocket {
    pub fd: RawFd,
    pub peer: SocketAddr,
}

impl Connected<IncomingStream<'_, TcpListener>> for ConnSocket {
    fn connect_info(stream: IncomingStream<'_, TcpListener>) -> Self {
        ConnSocket {
            fd: stream.io().as_raw_fd(),
            peer: *stream.remote_addr(),
        }
    }
}

struct ServerState {
    protocol: ProtocolConfig,
    filler: bytes::Bytes,
}

/// A bound, not yet serving, FCT server.
pub struct Server {
    listener: TcpListener,
    router: Router,
}

impl Server {
    pub async fn bind(config: &ServerConfig, protocol: &ProtocolConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.listen).await?;
        Ok(Self {
            listener,
            router: router(protocol, config.buf_len),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn serve(self, shutdown: Cancel) -> Result<(), ServerError> {
        let addr = self.listener.local_addr()?;
        tracing::info!(%addr, "server listening");
        axum::serve(
            self.listener,
            self.router.into_make_service_with_connect_info::<ConnSocket>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
        tracing::info!(%addr, "server stopped");
        Ok(())
    }
}

/// Router serving the FCT path. Requires `ConnectInfo<ConnSocket>`.
pub fn router(protocol: &ProtocolConfig, buf_len: usize) -> Router {
    let state = Arc::new(ServerState {
        protocol: protocol.clone(),
        filler: bytes::Bytes::from(vec![0u8; buf_len.max(1)]),
    });
    Router::new()
        .route(&protocol.path, get(handle_fct))
        .with_state(state)
}

async fn handle_fct(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(conn): ConnectInfo<ConnSocket>,
    headers: HeaderMap,
) -> Response {
    let protocol = &state.protocol;

    if let Some(cca) = headers.get(&protocol.cca_header) {
        let cca = String::from_utf8_lossy(cca.as_bytes()).trim().to_string();
        if !cca.is_empty() {
            if let Err(e) = set_congestion(conn.fd, &cca) {
                tracing::warn!(peer = %conn.peer, cca = %cca, error = %e, "unable to set TCP_CONGESTION");
                return bad_request(format!("unable to use selected CCA: '{cca}'"));
            }
        }
    }

    let Some(value) = headers.get(&protocol.flow_length_header) else {
        return bad_request(format!("missing '{}' header", protocol.flow_length_header));
    };
    let raw = String::from_utf8_lossy(value.as_bytes());
    let length = match raw.trim().parse::<i64>() {
        Ok(n) if n >= 0 => n as u64,
        _ => {
            return bad_request(format!(
                "invalid {}: '{raw}'",
                protocol.flow_length_header
            ));
        }
    };

    tracing::trace!(peer = %conn.peer, length, "serving flow");
    (StatusCode::OK, filler_body(state.filler.clone(), length)).into_response()
}

fn bad_request(msg: String) -> Response {
    (StatusCode::BAD_REQUEST, msg).into_response()
}

/// Stream exactly `total` bytes, in chunks no larger than `filler`.
fn filler_body(filler: bytes::Bytes, total: u64) -> Body {
    let chunk = filler.len() as u64;
    let stream = futures::stream::unfold(total, move |remaining| {
        let filler = filler.clone();
        async move {
            if remaining == 0 {
                return None;
            }
            let n = remaining.min(chunk);
            Some((Ok::<_, Infallible>(filler.slice(..n as usize)), remaining - n))
        }
    });
    Body::from_stream(stream)
}

#[cfg(target_os = "linux")]
fn set_congestion(fd: RawFd, cca: &str) -> std::io::Result<()> {
    let name = cca.as_bytes();
    // SAFETY: `fd` is the socket of the connection this request arrived on,
    // which stays open until the handler returns. The option value points at
    // `name.len()` readable bytes.
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::IPPROTO_TCP,
            libc::TCP_CONGESTION,
            name.as_ptr() as *const libc::c_void,
            name.len() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn set_congestion(_fd: RawFd, _cca: &str) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "TCP_CONGESTION is only available on Linux",
    ))
}
