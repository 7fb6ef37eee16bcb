//! # Gridhook Service
//!
//! Binary entry point for the gridhook HTTP service.
//!
//! This executable:
//! - Loads configuration from environment and files
//! - Initializes logging
//! - Wires the event store, fan-out publisher, and webhook processor
//! - Starts the subscriber relay and the HTTP server from gridhook-api

use gridhook_api::errors::ServiceError;
use gridhook_api::{start_server, ServiceConfig};
use gridhook_core::{
    ChannelBroadcast, EventProcessor, EventPublisher, InMemoryEventStore, InMemoryFanout,
    RetryPolicy, SubscriberRelay,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Ring size of the loopback fan-out channel.
const FANOUT_CHANNEL_CAPACITY: usize = 256;

/// Ring size of the local broadcast channel subscribers attach to.
const LOCAL_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // -------------------------------------------------------------------------
    // Load configuration
    //
    // Sources (applied in order — later sources override earlier ones):
    //  1. /etc/gridhook/service.toml            — system-wide defaults
    //  2. ./config/service.toml                 — deployment-local override
    //  3. Path given by GRIDHOOK_CONFIG_FILE env — operator-specified file
    //  4. Environment variables prefixed GRIDHOOK__ (double-underscore
    //     separator), e.g. GRIDHOOK__SERVER__PORT=9090 sets server.port = 9090
    //
    // All service configuration fields carry serde defaults, so absent files
    // or an entirely unconfigured environment produces a valid service config
    // with built-in defaults.  A malformed file or an environment variable
    // that cannot be coerced to the correct type IS a hard error because it
    // indicates deliberate-but-broken operator configuration.
    //
    // Configuration is loaded before logging is initialized (the logging
    // section decides the output format), so errors here go to stderr.
    // -------------------------------------------------------------------------
    let mut config_builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/gridhook/service")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Toml),
        );

    // Optional explicit path supplied by the operator.
    if let Ok(explicit_path) = std::env::var("GRIDHOOK_CONFIG_FILE") {
        if !explicit_path.is_empty() {
            config_builder = config_builder.add_source(
                config::File::with_name(&explicit_path)
                    .required(true)
                    .format(config::FileFormat::Toml),
            );
        }
    }

    let config = match config_builder
        .add_source(config::Environment::with_prefix("GRIDHOOK").separator("__"))
        .build()
    {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to build configuration; aborting: {e}");
            std::process::exit(3);
        }
    };

    let service_config: ServiceConfig = match config.try_deserialize() {
        Ok(sc) => sc,
        Err(e) => {
            eprintln!(
                "Could not deserialize service configuration; aborting: {e}. \
                 Fix the configuration and restart."
            );
            std::process::exit(3);
        }
    };

    init_logging(&service_config);

    info!("Starting Gridhook Service");

    if let Err(e) = service_config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(3);
    }

    // -------------------------------------------------------------------------
    // Wire the event pipeline
    //
    // The fan-out transport is the in-process loopback: what the publisher
    // sends is what the relay receives.  The relay re-emits each message to
    // the local broadcast channel subscribers attach to.
    // -------------------------------------------------------------------------
    let store = Arc::new(InMemoryEventStore::new());
    let fanout = InMemoryFanout::new(FANOUT_CHANNEL_CAPACITY);
    let publisher = Arc::new(EventPublisher::new(
        Arc::new(fanout.clone()),
        RetryPolicy::default(),
    ));
    let processor = Arc::new(EventProcessor::new(store, publisher));

    let local = Arc::new(ChannelBroadcast::new(LOCAL_CHANNEL_CAPACITY));
    let mut relay = SubscriberRelay::new(
        Arc::new(fanout.clone()),
        Arc::new(fanout),
        local,
    );

    if let Err(e) = relay.start().await {
        error!(error = %e, "Failed to start subscriber relay; aborting");
        std::process::exit(2);
    }

    info!(
        host = %service_config.server.host,
        port = service_config.server.port,
        endpoint = %service_config.webhook.endpoint_path,
        "Starting HTTP server"
    );

    let result = start_server(service_config, processor).await;

    // The relay outlives the server; tear it down once no more requests can
    // arrive.
    relay.stop().await;

    if let Err(e) = result {
        error!("Failed to start server: {}", e);

        let exit_code = match e {
            ServiceError::BindFailed { .. } => 1,
            ServiceError::ServerFailed { .. } => 2,
            ServiceError::Configuration(_) => 3,
        };

        std::process::exit(exit_code);
    }

    Ok(())
}

/// Initialize the tracing subscriber from the logging section.
///
/// `RUST_LOG` overrides the configured level filter when present.
fn init_logging(service_config: &ServiceConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "gridhook_service={level},gridhook_api={level},gridhook_core={level},tower_http=debug",
            level = service_config.logging.level
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);

    if service_config.logging.json_format {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
