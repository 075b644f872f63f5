//! actor-shim binary.
//!
//! `serve` runs the echo example actor, `print-objects` runs the typed
//! file-writing example actor, and `bus` runs the development message bus
//! the other two connect to.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use actor_shim::constants::DEFAULT_BUS_PORT;
use actor_shim::{
    ActorConfig, ActorHandle, ActorShim, Handler, HandlerError, TopicRouter, TypedSchema, bus,
    transport, types,
};

#[derive(Parser, Debug)]
#[command(about = "Request/response actor shim over a topic-based pub/sub bus")]
struct Options {
    /// Logging level, overridden by RUST_LOG when set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the echo example actor
    Serve {
        /// Service name to answer for
        #[arg(long, default_value = "example-service")]
        service_name: String,

        /// Bus address
        #[arg(long, default_value = "localhost")]
        broker: String,

        /// Bus port
        #[arg(long, default_value_t = DEFAULT_BUS_PORT)]
        port: u16,

        /// Hostname override for topic addressing
        #[arg(long)]
        hostname: Option<String>,

        /// Network interface hint for hostname resolution
        #[arg(long, default_value = "eth0")]
        host_interface: String,
    },

    /// Run the TestObject printer actor: validates requests and writes them
    /// to timestamped JSON files
    PrintObjects {
        /// Bus address
        #[arg(long, default_value = "localhost")]
        broker: String,

        /// Bus port
        #[arg(long, default_value_t = DEFAULT_BUS_PORT)]
        port: u16,

        /// Directory to write JSON files into
        #[arg(long, default_value = "./prints")]
        output_dir: PathBuf,
    },

    /// Run the development message bus
    Bus {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,

        /// Port to listen on
        #[arg(long, default_value_t = DEFAULT_BUS_PORT)]
        port: u16,
    },
}

/// Request payload for the echo example actor.
#[derive(Debug, Serialize, Deserialize)]
struct ExampleRequest {
    message: String,
    #[serde(default)]
    delay_seconds: u64,
}

/// Request payload for the printer actor.
#[derive(Debug, Serialize, Deserialize)]
struct TestObject {
    string_element: String,
    priority: f64,
    simple_object: SimpleObject,
}

#[derive(Debug, Serialize, Deserialize)]
struct SimpleObject {
    int_value: i64,
    bool_value: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let options = Options::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&options.log_level)),
        )
        .init();

    match options.command {
        Command::Serve {
            service_name,
            broker,
            port,
            hostname,
            host_interface,
        } => {
            let handler = Handler::typed(|request: ExampleRequest, _request_id| async move {
                if request.delay_seconds > 0 {
                    tokio::time::sleep(std::time::Duration::from_secs(request.delay_seconds))
                        .await;
                }
                Ok(json!({
                    "result": format!("Processed: {}", request.message),
                    "processed_at": chrono::Utc::now().to_rfc3339(),
                    "delay_applied": request.delay_seconds,
                }))
            });

            let config = ActorConfig::new(service_name)
                .with_request_schema(TypedSchema::<ExampleRequest>::shared())
                .with_host_interface(host_interface);
            let config = match hostname {
                Some(hostname) => config.with_hostname(hostname),
                None => config,
            };

            run_actor(config, handler, &broker, port).await
        }

        Command::PrintObjects {
            broker,
            port,
            output_dir,
        } => {
            let handler = Handler::typed_with_actor(
                move |object: TestObject, request_id: String, actor: ActorHandle| {
                    let output_dir = output_dir.clone();
                    async move { print_test_object(object, request_id, actor, output_dir).await }
                },
            );

            let config = ActorConfig::new("test-object-printer")
                .with_request_schema(TypedSchema::<TestObject>::shared());

            run_actor(config, handler, &broker, port).await
        }

        Command::Bus { bind, port } => bus::run_bus(&bind, port).await,
    }
}

/// Connect to the bus, run the actor until interrupted, then drain.
async fn run_actor(config: ActorConfig, handler: Handler, broker: &str, port: u16) -> Result<()> {
    let hostname = config
        .hostname
        .clone()
        .unwrap_or_else(types::local_hostname);
    let identity = types::ActorIdentity::new(hostname.clone(), config.service_name.clone());
    let filters = TopicRouter::new(identity).subscription_filters();

    // The only fatal condition: no transport at startup.
    let (transport_tx, transport_rx) = transport::connect(broker, port, &filters)
        .await
        .context("failed to connect to message bus")?;

    let config = config.with_hostname(hostname);
    let (shim, handle) = ActorShim::new(config, handler, transport_rx, transport_tx);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            handle.shutdown().await;
        }
    });

    shim.run().await;
    Ok(())
}

/// Write a validated TestObject to a timestamped JSON file and announce it.
async fn print_test_object(
    object: TestObject,
    request_id: String,
    actor: ActorHandle,
    output_dir: PathBuf,
) -> Result<serde_json::Value, HandlerError> {
    std::fs::create_dir_all(&output_dir)
        .map_err(|e| HandlerError::new(format!("could not create output directory: {e}")))?;

    let ts = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let output_path = output_dir.join(format!("test-object-{ts}-{request_id}.json"));

    let contents = serde_json::to_string_pretty(&object)
        .map_err(|e| HandlerError::new(format!("could not serialize object: {e}")))?;
    std::fs::write(&output_path, contents)
        .map_err(|e| HandlerError::new(format!("could not write {}: {e}", output_path.display())))?;

    actor.publish_sync_notice(&output_path, None).await;

    Ok(json!({
        "written": true,
        "output_file": output_path.display().to_string(),
        "string_element": object.string_element,
        "priority": object.priority,
        "simple_object": object.simple_object,
    }))
}
