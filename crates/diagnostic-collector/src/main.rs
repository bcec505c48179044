// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use diagnostic_collector::{server, Collector, CollectorConfig, Stdout};
use diagnostic_relay::logger;

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let config = CollectorConfig::from_env().context("reading collector configuration")?;

    logger::init(&config.log_level).context("setting default subscriber failed")?;

    debug!("Logging subsystem enabled");

    if !config.development {
        info!("Not in development mode, every request will be refused");
    }

    let listener = server::bind(config.port).await?;
    info!(
        "Diagnostic collector accepting POST {} on port {}",
        config.path, config.port
    );

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => signal_shutdown.cancel(),
            Err(e) => error!("Failed to listen for shutdown signal: {e}"),
        }
    });

    let collector = Arc::new(Collector::new(Arc::new(config), Arc::new(Stdout)));
    server::serve(listener, collector, shutdown).await?;
    Ok(())
}
