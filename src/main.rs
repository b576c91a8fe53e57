//! Process entry point (part of C12): wires configuration, logging, and the
//! node's three concurrent surfaces (peer gRPC, client TCP, debug dashboard)
//! together with the background maintenance loop.
//!
//! One `tokio::spawn`'d task per listener/loop, joined at the end, with
//! `tonic_reflection` registered alongside the Chord service.

use std::error::Error;
use std::fs::OpenOptions;
use std::io::Write;
use std::process::exit;
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use log::{info, warn, LevelFilter};
use tokio::net::TcpListener;
use tonic::transport::Server;

use chordring::cli::Cli;
use chordring::client_api::serve_client_connection;
use chordring::config::NodeConfig;
use chordring::hostkey;
use chordring::node::Node;
use chordring::rpc::{chord_proto, ChordService};
use chordring::web;

/// Ring width in bits. Fixed at the reference configuration (`m = 8`, §3);
/// the identifier type itself supports any `m <= 256`.
const RING_BITS: u32 = 8;
const NETWORK_TIMEOUT: Duration = Duration::from_secs(8);

/// Minimal `log::Log` sink that appends formatted lines to a file, used when
/// `NodeConfig::log_path` is set. `simple_logger` only ever writes to
/// stderr, so the `LOG` config key needs this small alternative instead of
/// a second crate.
struct FileLogger {
    file: Mutex<std::fs::File>,
    level: LevelFilter,
}

impl log::Log for FileLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "[{}] {} - {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}

fn init_logging(config: &NodeConfig) {
    let level = LevelFilter::Debug;
    match &config.log_path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path).expect("opening LOG file");
            let logger = FileLogger { file: Mutex::new(file), level };
            log::set_boxed_logger(Box::new(logger)).expect("installing file logger");
            log::set_max_level(level);
        }
        None => {
            simple_logger::SimpleLogger::new().with_level(level).init().expect("installing stderr logger");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = match NodeConfig::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config error: {err}");
            exit(1);
        }
    };
    init_logging(&config);

    let self_id = match &config.hostkey_path {
        Some(path) => match hostkey::id_from_pem_file(path, RING_BITS) {
            Ok(id) => Some(id),
            Err(err) => {
                eprintln!("hostkey error: {err}");
                exit(1);
            }
        },
        None => None,
    };

    let peer_address = config.peer_address();
    let client_address = config.client_address();
    let fix_interval = chordring::node::stabilize_interval();

    let node = Node::with_id(&peer_address, self_id, RING_BITS, NETWORK_TIMEOUT, fix_interval);

    info!("node {} starting on peer={} client={}", node.id(), peer_address, client_address);

    let mut tasks = Vec::new();

    match config.bootstrap_peer_address() {
        Some(bootstrap) => {
            info!("joining ring via bootstrap {bootstrap}");
            let joiner = node.clone();
            if let Err(err) = joiner.join_with_bootstrap(&bootstrap).await {
                eprintln!("failed to join via {bootstrap}: {err}");
                exit(1);
            }
        }
        None => {
            info!("no bootstrap configured, starting a solo ring");
            node.join_standalone().await;
        }
    }

    tasks.push(node.spawn_background_loop());

    let grpc_node = node.clone();
    let grpc_addr = peer_address.clone();
    tasks.push(tokio::spawn(async move {
        let service = ChordService::new(grpc_node).into_server();
        let reflection = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(chord_proto::FILE_DESCRIPTOR_SET)
            .build()
            .expect("building reflection service");
        let addr = grpc_addr.parse().expect("invalid peer bind address");
        info!("peer gRPC service listening on {grpc_addr}");
        if let Err(err) = Server::builder().add_service(service).add_service(reflection).serve(addr).await {
            warn!("peer gRPC server exited: {err}");
        }
    }));

    let client_node = node.clone();
    tasks.push(tokio::spawn(async move {
        let listener = match TcpListener::bind(&client_address).await {
            Ok(l) => l,
            Err(err) => {
                warn!("failed to bind client API on {client_address}: {err}");
                return;
            }
        };
        info!("client API listening on {client_address}");
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    warn!("client accept failed: {err}");
                    continue;
                }
            };
            let node = client_node.clone();
            tokio::spawn(async move {
                if let Err(err) = serve_client_connection(socket, node).await {
                    warn!("client connection ended with error: {err:?}");
                }
            });
        }
    }));

    if config.dev_mode {
        let dashboard_node = node.clone();
        let dashboard_addr = format!("{}:{}", config.host, config.port + 1);
        tasks.push(tokio::spawn(async move {
            info!("debug dashboard listening on {dashboard_addr}");
            if let Err(err) = web::serve(dashboard_node, dashboard_addr).await {
                warn!("debug dashboard exited: {err}");
            }
        }));
    }

    for task in tasks {
        task.await?;
    }
    Ok(())
}
