use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use meshwire_core::{
    Destination, DeviceEvent, DeviceSession, DeviceStatus, PacketOptions, SessionConfig,
    StreamTransport, TracingObserver,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

const DEFAULT_PORT: u16 = 4403;

#[derive(Parser, Debug)]
#[command(author, version, about = "Mesh radio client over a TCP link", long_about = None)]
struct Args {
    /// Device address, `host` or `host:port`
    #[arg(long)]
    host: String,

    /// Session configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// How long to wait for the configuration handshake, in seconds
    #[arg(long, default_value_t = 30)]
    handshake_timeout: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print events until interrupted
    Listen,
    /// Print the node table after the handshake
    Nodes,
    /// Send a text message
    Text {
        message: String,
        /// Destination node number; broadcast when absent
        #[arg(long)]
        to: Option<u32>,
        #[arg(long, default_value_t = 0)]
        channel: u32,
    },
    /// Reboot the device
    Reboot {
        #[arg(long, default_value_t = 5)]
        seconds: i32,
    },
    /// Fetch a file from the device
    Download { name: String, output: PathBuf },
    /// Send a file to the device
    Upload { input: PathBuf, name: String },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args).await {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SessionConfig::default(),
    };

    let addr = if args.host.contains(':') {
        args.host.clone()
    } else {
        format!("{}:{}", args.host, DEFAULT_PORT)
    };
    info!(%addr, "Connecting");
    let transport = Arc::new(StreamTransport::connect_tcp(addr.as_str()).await?);
    let session = Arc::new(DeviceSession::with_observer(
        transport,
        config,
        Arc::new(TracingObserver),
    ));
    let mut events = session.subscribe();

    let reader = tokio::spawn({
        let session = session.clone();
        async move { session.run().await }
    });

    session.connect().await?;
    tokio::time::timeout(
        Duration::from_secs(args.handshake_timeout),
        wait_for_status(&mut events, DeviceStatus::Configured),
    )
    .await
    .context("device did not finish the configuration handshake")??;

    let outcome = execute(&args.command, &session, &mut events).await;
    session.disconnect().await?;
    if let Err(e) = reader.await? {
        warn!(error = %e, "Read loop ended with an error");
    }
    outcome
}

async fn execute(
    command: &Command,
    session: &DeviceSession,
    events: &mut tokio::sync::broadcast::Receiver<DeviceEvent>,
) -> Result<()> {
    match command {
        Command::Listen => loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => return Ok(()),
                event = events.recv() => match event {
                    Ok(event) => print_event(&event),
                    Err(RecvError::Lagged(missed)) => warn!(missed, "Event stream lagged"),
                    Err(RecvError::Closed) => return Ok(()),
                },
            }
        },
        Command::Nodes => {
            for node in session.nodes() {
                let name = node
                    .user
                    .as_ref()
                    .map(|user| user.long_name.as_str())
                    .unwrap_or("?");
                let hops = node
                    .hops_away
                    .map_or_else(|| "-".to_string(), |hops| hops.to_string());
                println!(
                    "!{:08x}  {:<24}  snr {:>5.1}  hops {}",
                    node.num, name, node.snr, hops
                );
            }
            Ok(())
        }
        Command::Text { message, to, channel } => {
            let destination = (*to).map_or(Destination::Broadcast, Destination::Node);
            let pending = session
                .send_text(message, PacketOptions::to(destination).on_channel(*channel))
                .await?;
            let id = pending.await?;
            info!(id, "Message delivered");
            Ok(())
        }
        Command::Reboot { seconds } => {
            session.reboot(*seconds).await?;
            info!(seconds, "Reboot requested");
            Ok(())
        }
        Command::Download { name, output } => {
            session.download_file(name).await?;
            loop {
                match events.recv().await {
                    Ok(DeviceEvent::FileReceived { data }) => {
                        std::fs::write(output, &data)?;
                        info!(bytes = data.len(), path = %output.display(), "File saved");
                        return Ok(());
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => bail!("session closed before the file arrived"),
                }
            }
        }
        Command::Upload { input, name } => {
            let data = std::fs::read(input)
                .with_context(|| format!("reading {}", input.display()))?;
            session.upload_file(name, &data).await?;
            // Device replies drive the transfer from the read loop.
            while session.is_uploading() {
                if session.status() == DeviceStatus::Disconnected {
                    bail!("device disconnected during upload");
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            info!(bytes = data.len(), "Upload finished");
            Ok(())
        }
    }
}

async fn wait_for_status(
    events: &mut tokio::sync::broadcast::Receiver<DeviceEvent>,
    target: DeviceStatus,
) -> Result<()> {
    loop {
        match events.recv().await {
            Ok(DeviceEvent::StatusChanged { to, .. }) if to == target => return Ok(()),
            Ok(DeviceEvent::StatusChanged {
                to: DeviceStatus::Disconnected,
                ..
            }) => bail!("device disconnected during handshake"),
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => bail!("event stream closed"),
        }
    }
}

fn print_event(event: &DeviceEvent) {
    match event {
        DeviceEvent::Message(packet) => {
            println!(
                "[{}] !{:08x}: {}",
                packet.meta.rx_time.format("%H:%M:%S"),
                packet.meta.from,
                packet.data
            )
        }
        DeviceEvent::StatusChanged { from, to } => println!("status {} -> {}", from, to),
        DeviceEvent::ConsoleText(text) => print!("{}", text),
        DeviceEvent::FromRadio(_)
        | DeviceEvent::MeshPacket(_)
        | DeviceEvent::MeshHeartbeat { .. } => {}
        other => println!("{}", other.kind()),
    }
}
