use clap::Parser;
use fluxtap::cache::{DecodedMessage, DecoderCache};
use fluxtap::chunk::ChunkHeader;
use fluxtap::config::AppConfig;
use fluxtap::optimize::OptimizationManager;
use fluxtap::tcp::{SignedMessage, StreamAssembler, TcpMsgHeader, TCP_HEADER_LEN};
use fluxtap::{capture, fanout, telemetry};
use log::{error, info, warn};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{mpsc, Notify};
use tokio::time;

/// Conservative default for an Ethernet + IPv4 (no options) + UDP header,
/// used only to sanity-check the configured MTU at startup.
const DEFAULT_OUTER_HEADER_LEN: u32 = 14 + 20 + 8;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Interface to tap for packet capture
    interface_name: String,

    /// Path to a unified TOML configuration file
    #[clap(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[clap(short, long)]
    verbose: bool,

    /// Enable the Prometheus telemetry endpoint
    #[clap(long)]
    telemetry: bool,

    /// Link MTU; falls back to the MTU environment variable, then the config file
    #[clap(long)]
    mtu: Option<u16>,

    /// Downstream backend URL (adapter concern, read here for completeness)
    #[clap(long)]
    backend_url: Option<String>,

    /// Path to the validator set file (adapter concern, read here for completeness)
    #[clap(long)]
    validators_file: Option<PathBuf>,
}

/// Shutdown signal shared by every spawned task: a flag plus a `Notify` so
/// tasks blocked on a channel receive wake up instead of waiting for their
/// next poll.
struct Shutdown {
    flagged: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    fn new() -> Self {
        Shutdown {
            flagged: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn trigger(&self) {
        self.flagged.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_set(&self) -> bool {
        self.flagged.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        // Register for notification before checking the flag, so a
        // `trigger()` racing with a fresh `wait()` call is never missed.
        let notified = self.notify.notified();
        if self.is_set() {
            return;
        }
        notified.await;
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let mut config = match &cli.config {
        Some(path) => match AppConfig::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                error!("failed to load config {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => AppConfig::default(),
    };

    config.capture.interface = cli.interface_name.clone();
    if let Some(mtu) = cli.mtu.or_else(|| env_u16("MTU")) {
        config.capture.mtu = mtu;
    }
    let backend_url = cli.backend_url.or_else(|| std::env::var("BACKEND_URL").ok());
    let validators_file = cli
        .validators_file
        .or_else(|| std::env::var("VALIDATORS_FILE").ok().map(PathBuf::from));

    if let Err(e) = config.validate() {
        error!("invalid configuration: {e}");
        std::process::exit(1);
    }

    match fanout::stride(
        config.capture.mtu,
        config.capture.mtu as u32,
        config.capture.mtu as u32 - DEFAULT_OUTER_HEADER_LEN,
        config.capture.mtu as u32,
    ) {
        Ok(s) => info!("configured MTU {} yields a fan-out stride of {s} bytes", config.capture.mtu),
        Err(e) => {
            error!("MTU {} leaves no room for chunk payload: {e}", config.capture.mtu);
            std::process::exit(1);
        }
    }

    info!(
        "starting on interface '{}' (backend_url={:?}, validators_file={:?})",
        config.capture.interface, backend_url, validators_file
    );

    if cli.telemetry {
        telemetry::serve("0.0.0.0:9898");
    }

    let optimizer = Arc::new(OptimizationManager::new());
    let cache = Arc::new(DecoderCache::new(config.cache));
    let assembler = Arc::new(StreamAssembler::new());
    let shutdown = Arc::new(Shutdown::new());

    let (egress_tx, egress_rx) = mpsc::channel::<DecodedMessage>(config.channel.capacity);
    let (tcp_ingest_tx, tcp_ingest_rx) = mpsc::channel::<(SocketAddr, Vec<u8>)>(config.channel.capacity);

    let capture_task = tokio::spawn(run_capture_loop(
        optimizer.clone(),
        cache.clone(),
        egress_tx.clone(),
        shutdown.clone(),
    ));

    let tcp_listen_task = tokio::spawn(run_tcp_listener(
        tcp_ingest_tx.clone(),
        shutdown.clone(),
    ));

    let tcp_ingest_task = tokio::spawn(run_tcp_ingest(
        assembler.clone(),
        tcp_ingest_rx,
        config.chunk.tcp_magic,
        cache.clone(),
        egress_tx.clone(),
        shutdown.clone(),
    ));

    let flusher_task = tokio::spawn(run_flusher(assembler.clone(), shutdown.clone()));
    let egress_task = tokio::spawn(run_egress(egress_rx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        _ = shutdown.wait() => {}
    }
    shutdown.trigger();

    let _ = capture_task.await;
    let _ = tcp_listen_task.await;
    let _ = tcp_ingest_task.await;
    let _ = flusher_task.await;

    for (flow, bytes) in assembler.flush_all() {
        info!("force-flushed {bytes} bytes from stalled flow {flow}");
    }
    drop(egress_tx);
    let _ = egress_task.await;
    drop(cache);

    if cli.telemetry {
        telemetry::flush();
    }
    info!("clean shutdown");
    Ok(())
}

fn env_u16(name: &str) -> Option<u16> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Pulls length-prefixed application records off the capture-boundary
/// socket and routes each parsed chunk header through the decoder cache.
async fn run_capture_loop(
    optimizer: Arc<OptimizationManager>,
    cache: Arc<DecoderCache>,
    egress: mpsc::Sender<DecodedMessage>,
    shutdown: Arc<Shutdown>,
) {
    let bind_addr: SocketAddr = "0.0.0.0:0".parse().unwrap();
    let using_xdp = optimizer.create_capture_socket(bind_addr).is_some();
    info!("capture fast path available: {using_xdp}");

    let socket = match UdpSocket::bind(bind_addr).await {
        Ok(s) => s,
        Err(e) => {
            error!("failed to bind capture socket: {e}");
            shutdown.trigger();
            return;
        }
    };

    let mut buf = vec![0u8; 65536];
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            result = socket.recv(&mut buf) => {
                match result {
                    Ok(n) => {
                        for record in capture::iter_records(&buf[..n]) {
                            match ChunkHeader::parse(record) {
                                Ok(header) => match cache.handle_chunk(&header) {
                                    Ok(Some(message)) => {
                                        if egress.try_send(message).is_err() {
                                            fluxtap::cache::warn_channel_full("egress");
                                        }
                                    }
                                    Ok(None) => {}
                                    Err(e) => warn!("dropping chunk: {e}"),
                                },
                                Err(e) => warn!("dropping malformed capture record: {e}"),
                            }
                        }
                    }
                    Err(e) => warn!("capture recv error: {e}"),
                }
            }
        }
    }
    info!("capture loop exiting");
}

/// Accepts application TCP connections and feeds the length-prefixed,
/// signed-message stream into the ingest channel a segment at a time.
async fn run_tcp_listener(ingest: mpsc::Sender<(SocketAddr, Vec<u8>)>, shutdown: Arc<Shutdown>) {
    let listener = match TcpListener::bind("0.0.0.0:0").await {
        Ok(l) => l,
        Err(e) => {
            error!("failed to bind TCP listener: {e}");
            shutdown.trigger();
            return;
        }
    };
    info!("TCP listener bound to {}", listener.local_addr().unwrap());

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let ingest = ingest.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(read_tcp_stream(stream, addr, ingest, shutdown));
                    }
                    Err(e) => warn!("TCP accept error: {e}"),
                }
            }
        }
    }
    info!("TCP listener exiting");
}

const STREAM_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Two-phase header-then-payload read per connection, each phase bounded
/// by the same 10 s idle timeout the reassembler uses for flushing.
async fn read_tcp_stream(
    mut stream: tokio::net::TcpStream,
    addr: SocketAddr,
    ingest: mpsc::Sender<(SocketAddr, Vec<u8>)>,
    shutdown: Arc<Shutdown>,
) {
    loop {
        if shutdown.is_set() {
            return;
        }
        let mut header_buf = [0u8; TCP_HEADER_LEN];
        match time::timeout(STREAM_READ_TIMEOUT, stream.read_exact(&mut header_buf)).await {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => return, // connection closed
            Err(_) => {
                warn!("TCP stream {addr} header read timed out");
                return;
            }
        }

        let mut segment = header_buf.to_vec();
        // The declared body length is read from the header itself; the
        // assembler/decoder boundary validates it, so just pull that many
        // bytes here with the same timeout.
        let length = u64::from_le_bytes(header_buf[8..16].try_into().unwrap());
        let mut body = vec![0u8; length as usize];
        match time::timeout(STREAM_READ_TIMEOUT, stream.read_exact(&mut body)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!("TCP stream {addr} payload read failed: {e}");
                return;
            }
            Err(_) => {
                warn!("TCP stream {addr} payload read timed out");
                return;
            }
        }
        segment.extend_from_slice(&body);

        if ingest.try_send((addr, segment)).is_err() {
            fluxtap::cache::warn_channel_full("tcp_ingest");
        }
    }
}

/// Drains raw TCP segments into the reassembler and, once a full
/// magic-validated message is framed, decodes it the same way a UDP chunk
/// would be.
async fn run_tcp_ingest(
    assembler: Arc<StreamAssembler>,
    mut ingest: mpsc::Receiver<(SocketAddr, Vec<u8>)>,
    expected_magic: u32,
    cache: Arc<DecoderCache>,
    egress: mpsc::Sender<DecodedMessage>,
    shutdown: Arc<Shutdown>,
) {
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            item = ingest.recv() => {
                let Some((addr, segment)) = item else { break };
                assembler.assemble(addr, &segment, Instant::now());

                match TcpMsgHeader::parse(&segment, expected_magic) {
                    Ok(header) => match SignedMessage::parse(&segment[TCP_HEADER_LEN..], header.length) {
                        Ok(signed) => {
                            match ChunkHeader::parse(signed.payload) {
                                Ok(chunk_header) => match cache.handle_chunk(&chunk_header) {
                                    Ok(Some(message)) => {
                                        if egress.try_send(message).is_err() {
                                            fluxtap::cache::warn_channel_full("egress");
                                        }
                                    }
                                    Ok(None) => {}
                                    Err(e) => warn!("dropping TCP-framed chunk from {addr}: {e}"),
                                },
                                Err(e) => warn!("malformed chunk in TCP stream {addr}: {e}"),
                            }
                        }
                        Err(e) => warn!("malformed signed message from {addr}: {e}"),
                    },
                    Err(e) => warn!("malformed TCP header from {addr}: {e}"),
                }
            }
        }
    }
    info!("TCP ingest task exiting");
}

/// Times out idle flows once a second, matching the periodic flusher in
/// the concurrency model.
async fn run_flusher(assembler: Arc<StreamAssembler>, shutdown: Arc<Shutdown>) {
    let mut ticker = time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = ticker.tick() => {
                for (flow, bytes) in assembler.flush_older_than(Instant::now()) {
                    warn!("flushed stalled flow {flow} ({bytes} bytes discarded)");
                }
            }
        }
    }
    info!("flusher task exiting");
}

/// Downstream emission is the adapter's concern; this build logs the
/// reconstructed message so the CLI is runnable standalone.
async fn run_egress(mut egress: mpsc::Receiver<DecodedMessage>) {
    while let Some(message) = egress.recv().await {
        info!(
            "reconstructed message fingerprint={} ({} bytes)",
            hex_fingerprint(&message.fingerprint),
            message.data.len()
        );
    }
}

fn hex_fingerprint(fp: &[u8]) -> String {
    fp.iter().map(|b| format!("{b:02x}")).collect()
}
