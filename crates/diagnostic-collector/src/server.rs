// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::service_fn;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::CollectorError;
use crate::handler::Collector;

/// Binds the loopback listener for `port`. Port 0 picks a free port.
pub async fn bind(port: u16) -> Result<TcpListener, CollectorError> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    TcpListener::bind(addr)
        .await
        .map_err(|source| CollectorError::Bind { addr, source })
}

/// Accepts connections until `shutdown` is cancelled. Open connections are
/// dropped on shutdown.
pub async fn serve(
    listener: TcpListener,
    collector: Arc<Collector>,
    shutdown: CancellationToken,
) -> Result<(), CollectorError> {
    let server = hyper::server::conn::http1::Builder::new();
    let mut joinset = JoinSet::new();

    let service = service_fn(move |req| {
        let collector = Arc::clone(&collector);
        async move { collector.handle(req).await }
    });

    if let Ok(addr) = listener.local_addr() {
        debug!("Diagnostic collector listening on {addr}");
    }

    loop {
        let conn = tokio::select! {
            () = shutdown.cancelled() => break,
            con_res = listener.accept() => match con_res {
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
                    error!("Server error: {e}");
                    return Err(e.into());
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
                    error!("Connection handler panicked: {:?}", e);
                    continue;
                },
                Ok(()) | Err(_) => continue,
            },
        };
        let conn = hyper_util::rt::TokioIo::new(conn);
        let server = server.clone();
        let service = service.clone();
        joinset.spawn(async move {
            if let Err(e) = server.serve_connection(conn, service).await {
                error!("Connection error: {e}");
            }
        });
    }

    debug!("Diagnostic collector shutting down");
    joinset.shutdown().await;
    Ok(())
}
