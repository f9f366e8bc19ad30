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

use aftsim::config::Config;
use aftsim::server;
use aftsim::{error, info, warn};
use clap::Parser;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "aftsimd")]
#[command(about = "AFT telemetry simulator daemon", version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.json")]
    config: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = Config::from_file(&args.config).unwrap_or_else(|e| {
        warn!("failed to load config, using defaults",
            "path" => &args.config,
            "error" => e.to_string());
        Config::default()
    });

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    info!("starting aftsimd",
        "gnmi_port" => config.gnmi_port,
        "mock_installer" => config.mock_installer.enabled);

    match server::run(config, shutdown).await {
        Ok(()) => {
            info!("daemon stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("daemon failed", "error" => e.to_string());
            ExitCode::FAILURE
        }
    }
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!("failed to install SIGTERM handler", "error" => e.to_string());
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("shutdown signal received");
        shutdown.cancel();
    });
}
