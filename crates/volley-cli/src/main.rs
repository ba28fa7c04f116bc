//! Volley CLI
//!
//! Fire a file at a peer over TCP or UDP, or receive and time what arrives.

mod config;
mod progress;
mod validate;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use volley_core::{SessionController, Transport, TransferSession};
use volley_transport::{NetContext, is_valid_ipv4};

use config::Config;
use progress::{EventPrinter, PrintSummary};

/// Volley - point-to-point TCP/UDP transfer and timing
#[derive(Parser)]
#[command(name = "volley")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (default: <config dir>/volley/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print results as JSON lines
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Transport selection; falls back to the configured protocol.
#[derive(Args, Clone, Copy)]
#[group(multiple = false)]
struct TransportArgs {
    /// Use TCP
    #[arg(long)]
    tcp: bool,

    /// Use UDP
    #[arg(long)]
    udp: bool,
}

impl TransportArgs {
    fn resolve(self, config: &Config) -> Transport {
        if self.tcp {
            Transport::Tcp
        } else if self.udp {
            Transport::Udp
        } else {
            config.network.protocol
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Send a file's first packet to a peer, repeatedly
    Send {
        /// File to build the packet from
        #[arg(required = true)]
        file: PathBuf,

        /// Remote host name (tried before --ip)
        #[arg(long)]
        host: Option<String>,

        /// Remote IPv4 address
        #[arg(long)]
        ip: Option<String>,

        /// Remote port
        #[arg(short, long)]
        port: Option<u16>,

        /// Packet size in bytes
        #[arg(short, long)]
        size: Option<usize>,

        /// Times to send the packet
        #[arg(short = 'n', long)]
        count: Option<u64>,

        #[command(flatten)]
        transport: TransportArgs,
    },

    /// Receive into a file until interrupted
    Receive {
        /// Output file (appended to, created if missing)
        #[arg(required = true)]
        output: PathBuf,

        /// Listening port
        #[arg(short, long)]
        port: Option<u16>,

        /// Packet size used to count TCP receives
        #[arg(short, long)]
        expected_size: Option<usize>,

        #[command(flatten)]
        transport: TransportArgs,
    },

    /// Check whether an address is a usable IPv4 literal
    CheckIp {
        /// Address to check
        address: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };
    config.validate()?;

    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Send {
            file,
            host,
            ip,
            port,
            size,
            count,
            transport,
        } => {
            let request = SendRequest {
                transport: transport.resolve(&config),
                file,
                host,
                ip,
                port: port.unwrap_or(config.network.port),
                size: size.unwrap_or(config.transfer.packet_size),
                count: count.unwrap_or(config.transfer.packet_count),
            };
            send(request, &config, cli.json).await
        }
        Commands::Receive {
            output,
            port,
            expected_size,
            transport,
        } => {
            let transport = transport.resolve(&config);
            let expected = expected_size.unwrap_or(config.transfer.packet_size);
            receive(
                transport,
                output,
                port.unwrap_or(config.network.port),
                expected,
                &config,
                cli.json,
            )
            .await
        }
        Commands::CheckIp { address } => Ok(check_ip(&address)),
    }
}

struct SendRequest {
    transport: Transport,
    file: PathBuf,
    host: Option<String>,
    ip: Option<String>,
    port: u16,
    size: usize,
    count: u64,
}

/// Send the packet, trying the host name first and the IP second.
async fn send(request: SendRequest, config: &Config, json: bool) -> anyhow::Result<ExitCode> {
    let checked = validate::check_send(request.transport, request.port, request.size, request.count)
        .and_then(|()| validate::remote_candidates(request.host.as_deref(), request.ip.as_deref()));
    let remotes = match checked {
        Ok(remotes) => remotes,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(ExitCode::from(2));
        }
    };

    tracing::info!(
        "Sending {:?} ({} x {} bytes over {}) to port {}",
        request.file,
        request.count,
        request.size,
        request.transport,
        request.port
    );

    let net = NetContext::init();
    let (mut controller, events) = SessionController::new(&net, config.engine());
    let printer = tokio::task::spawn_blocking(move || EventPrinter::new(json, "send").run(events));

    let sent = tokio::task::spawn_blocking(move || {
        let mut started = false;
        for remote in remotes {
            let session = TransferSession::client(
                request.transport,
                remote,
                request.port,
                &request.file,
                request.size,
                request.count,
            );
            if controller.connect(session).is_ok() {
                started = true;
                break;
            }
        }
        if started {
            controller.wait();
        }
        started
    })
    .await?;

    let summary = printer.await?;
    Ok(exit_code(sent, &summary))
}

/// Receive until Ctrl+C, then print the final result.
async fn receive(
    transport: Transport,
    output: PathBuf,
    port: u16,
    expected: usize,
    config: &Config,
    json: bool,
) -> anyhow::Result<ExitCode> {
    if let Err(e) = validate::check_receive(transport, expected) {
        eprintln!("error: {e}");
        return Ok(ExitCode::from(2));
    }

    let net = NetContext::init();
    let (mut controller, events) = SessionController::new(&net, config.engine());
    let session =
        TransferSession::server(transport, port, &output).with_expected_packet_size(expected);

    let started = controller.connect(session).is_ok();
    let label = match controller.local_addr() {
        Some(addr) => format!("{transport} {addr}"),
        None => transport.to_string(),
    };
    let printer = tokio::task::spawn_blocking(move || EventPrinter::new(json, label).run(events));

    if started {
        tracing::info!("Receiving into {:?}, press Ctrl+C to stop", output);
        tokio::signal::ctrl_c().await?;
    }

    tokio::task::spawn_blocking(move || {
        controller.finish();
        drop(controller);
    })
    .await?;

    let summary = printer.await?;
    Ok(exit_code(started, &summary))
}

fn check_ip(address: &str) -> ExitCode {
    if is_valid_ipv4(address.trim()) {
        println!("{address}: valid IPv4 address");
        ExitCode::SUCCESS
    } else {
        println!("{address}: not a valid IPv4 address");
        ExitCode::FAILURE
    }
}

fn exit_code(started: bool, summary: &PrintSummary) -> ExitCode {
    if started {
        ExitCode::SUCCESS
    } else {
        tracing::debug!("Session never started ({} alert(s))", summary.alerts);
        ExitCode::FAILURE
    }
}
