// Copyright 2025 aftsim Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Supervisor: wires the bounded pipeline queues, spawns the installer
//! and the three pipeline stages, and serves gNMI until cancelled.
//!
//! Shutdown cascades through queue closure. Cancellation stops the
//! installer; its sender wrapper drops, closing the RIB ingress queue;
//! each stage owns its output sender inside `run` and so closes its
//! output when it finishes; the broadcaster finally closes every
//! subscriber egress queue and the sessions end their streams.

use crate::config::Config;
use crate::fib::Fib;
use crate::installers::{MockInstaller, RouteInstaller};
use crate::rib::Rib;
use crate::telemetry::proto::g_nmi_server::GNmiServer;
use crate::telemetry::{proto, Broadcaster, GnmiService};
use crate::{error, info};
use std::fmt::{Display, Formatter};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;

/// Depth of the inter-stage queues. Sized for sustained churn; the
/// FIB-to-broadcaster link backpressures the whole pipeline when full.
pub const PIPELINE_QUEUE_DEPTH: usize = 10_000;

#[derive(Debug)]
pub enum ServerError {
    Bind(io::Error),
    Transport(tonic::transport::Error),
    Reflection(tonic_reflection::server::Error),
}

impl Display for ServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Bind(e) => write!(f, "failed to bind gNMI listener: {}", e),
            ServerError::Transport(e) => write!(f, "gNMI transport error: {}", e),
            ServerError::Reflection(e) => write!(f, "reflection setup error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {}

/// Run the full pipeline with the configured mock installer.
pub async fn run(config: Config, shutdown: CancellationToken) -> Result<(), ServerError> {
    let installer = MockInstaller::new(config.mock_installer.clone());
    run_with_installer(config, installer, shutdown).await
}

/// Run the full pipeline with a caller-provided route source.
pub async fn run_with_installer<I: RouteInstaller>(
    config: Config,
    installer: I,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    // Bind up front: a busy port is a fatal startup error, not
    // something to discover after the pipeline is already running.
    let listen_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.gnmi_port));
    let listener = TcpListener::bind(listen_addr)
        .await
        .map_err(ServerError::Bind)?;
    let local_addr = listener.local_addr().map_err(ServerError::Bind)?;

    let (rib_tx, rib_rx) = mpsc::channel(PIPELINE_QUEUE_DEPTH);
    let (fib_tx, fib_rx) = mpsc::channel(PIPELINE_QUEUE_DEPTH);
    let (aft_tx, aft_rx) = mpsc::channel(PIPELINE_QUEUE_DEPTH);

    let rib = Arc::new(Rib::new());
    let fib = Arc::new(Fib::new());
    let broadcaster = Arc::new(Broadcaster::new());

    let service = GnmiService::new(Arc::clone(&fib), Arc::clone(&broadcaster));
    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(proto::FILE_DESCRIPTOR_SET)
        .build_v1()
        .map_err(ServerError::Reflection)?;

    let mut tasks: JoinSet<Result<(), ServerError>> = JoinSet::new();

    {
        let token = shutdown.clone();
        tasks.spawn(async move {
            // rib_tx is owned here: when the installer returns, the
            // RIB ingress queue closes and the drain cascade begins.
            installer.run(rib_tx, token).await;
            Ok(())
        });
    }
    {
        let rib = Arc::clone(&rib);
        let token = shutdown.clone();
        tasks.spawn(async move {
            rib.run(rib_rx, fib_tx, token).await;
            Ok(())
        });
    }
    {
        let fib = Arc::clone(&fib);
        let token = shutdown.clone();
        tasks.spawn(async move {
            fib.run(fib_rx, aft_tx, token).await;
            Ok(())
        });
    }
    {
        let broadcaster = Arc::clone(&broadcaster);
        let token = shutdown.clone();
        tasks.spawn(async move {
            broadcaster.run(aft_rx, token).await;
            Ok(())
        });
    }
    {
        let token = shutdown.clone();
        tasks.spawn(async move {
            info!("gNMI server listening", "addr" => local_addr.to_string());
            tonic::transport::Server::builder()
                .add_service(GNmiServer::new(service))
                .add_service(reflection)
                .serve_with_incoming_shutdown(
                    TcpListenerStream::new(listener),
                    token.cancelled_owned(),
                )
                .await
                .map_err(ServerError::Transport)
        });
    }

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("pipeline task failed", "error" => e.to_string());
                if first_error.is_none() {
                    first_error = Some(e);
                }
                // Unwind the remaining tasks.
                shutdown.cancel();
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                error!("pipeline task panicked", "error" => e.to_string());
                shutdown.cancel();
            }
        }
    }

    info!("pipeline stopped");
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
