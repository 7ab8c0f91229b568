//! Recording proxy.
//!
//! Forwards a single client connection to an upstream server while recording
//! the client's traffic, then writes the exchange as a transcript in which
//! the client is the implementation under test.

use std::{fs::File, io::Write, path::PathBuf};

use clap::Parser;
use conformance::{
    capture::write_transcript, CaptureFormat, Perspective, RecordingConnection, Transcript,
};
use futures::{future::try_join, io::copy, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about, name = "tlsn-record-proxy", long_about = None)]
struct Cli {
    /// Address to accept the client connection on.
    #[arg(long, default_value = "127.0.0.1:10443", env = "LISTEN")]
    listen: String,
    /// Address of the upstream server.
    #[arg(long, env = "UPSTREAM")]
    upstream: String,
    /// Output file. Defaults to stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Output format.
    #[arg(long, default_value = "fixture")]
    format: CaptureFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let listener = TcpListener::bind(&cli.listen).await?;
    info!("waiting for a client on {}", cli.listen);

    let (client, peer_addr) = listener.accept().await?;
    info!("accepted {peer_addr}, connecting to {}", cli.upstream);

    let upstream = TcpStream::connect(&cli.upstream).await?;

    let client = RecordingConnection::new(client.compat());
    let log = client.log();

    let (mut client_read, mut client_write) = client.split();
    let (mut upstream_read, mut upstream_write) = upstream.compat().split();

    try_join(
        async {
            copy(&mut client_read, &mut upstream_write).await?;
            upstream_write.close().await
        },
        async {
            copy(&mut upstream_read, &mut client_write).await?;
            client_write.close().await
        },
    )
    .await?;

    let events = log.drain();
    let transcript = Transcript::from_events(&events, Perspective::Peer);
    info!(
        events = events.len(),
        segments = transcript.len(),
        "session closed"
    );

    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(std::io::stdout().lock()),
    };

    write_transcript(&transcript, cli.format, &mut out).map_err(|err| anyhow::anyhow!(err))?;

    Ok(())
}
