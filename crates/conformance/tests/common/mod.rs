//! A toy record-based handshake used as the implementation under test.
//!
//! The client sends a hello, answers the server hello with a finished record
//! whose checksum depends on the server's bytes, waits for the server
//! finished, then writes one application record and closes.
#![allow(dead_code)]

use std::io::{Error, ErrorKind, Result};

use conformance::Transcript;
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const HANDSHAKE: u8 = 0x16;
pub const FINISHED: u8 = 0x14;
pub const APPLICATION_DATA: u8 = 0x17;

#[derive(Debug, Clone)]
pub struct ToyConfig {
    pub version: u8,
    pub app_data: Vec<u8>,
}

impl Default for ToyConfig {
    fn default() -> Self {
        Self {
            version: 0x03,
            app_data: b"hello\n".to_vec(),
        }
    }
}

pub const SERVER_BODY: [u8; 4] = [0x02, 0x00, 0x2a, 0x10];

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn record(typ: u8, version: u8, body: &[u8]) -> Vec<u8> {
    let mut record = vec![typ, 0x03, version, 0x00, body.len() as u8];
    record.extend_from_slice(body);
    record
}

fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

pub fn client_hello(version: u8) -> Vec<u8> {
    record(HANDSHAKE, version, &[0x01, version])
}

pub fn server_hello(version: u8, body: &[u8]) -> Vec<u8> {
    record(HANDSHAKE, version, body)
}

pub fn client_finished(version: u8, server_body: &[u8]) -> Vec<u8> {
    record(FINISHED, version, &[checksum(server_body)])
}

pub fn server_finished(version: u8) -> Vec<u8> {
    record(FINISHED, version, &[0xff])
}

pub fn app_record(version: u8, data: &[u8]) -> Vec<u8> {
    record(APPLICATION_DATA, version, data)
}

/// The handshake as seen by the client, without the trailing application
/// record.
pub fn handshake_transcript(config: &ToyConfig) -> Transcript {
    Transcript::new()
        .expect(client_hello(config.version))
        .inject(server_hello(config.version, &SERVER_BODY))
        .expect(client_finished(config.version, &SERVER_BODY))
        .inject(server_finished(config.version))
}

/// The full session including the application record.
pub fn session_transcript(config: &ToyConfig) -> Transcript {
    handshake_transcript(config).expect(app_record(config.version, &config.app_data))
}

async fn read_record<Io: AsyncRead + Unpin>(io: &mut Io, typ: u8) -> Result<Vec<u8>> {
    let mut header = [0u8; 5];
    io.read_exact(&mut header).await?;
    if header[0] != typ {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("unexpected record type {:#04x}", header[0]),
        ));
    }

    let mut body = vec![0u8; header[4] as usize];
    io.read_exact(&mut body).await?;

    Ok(body)
}

/// Runs the client side of the toy handshake.
pub async fn toy_client<Io>(mut io: Io, config: ToyConfig) -> Result<()>
where
    Io: AsyncRead + AsyncWrite + Unpin,
{
    // The hello goes out in two writes, header and body.
    let hello = client_hello(config.version);
    io.write_all(&hello[..5]).await?;
    io.write_all(&hello[5..]).await?;

    let server_body = read_record(&mut io, HANDSHAKE).await?;
    io.write_all(&client_finished(config.version, &server_body))
        .await?;

    read_record(&mut io, FINISHED).await?;

    io.write_all(&app_record(config.version, &config.app_data))
        .await?;
    io.close().await
}

/// Runs the server side of the toy handshake and returns the application
/// data it received.
pub async fn toy_server<Io>(mut io: Io, version: u8) -> Result<Vec<u8>>
where
    Io: AsyncRead + AsyncWrite + Unpin,
{
    read_record(&mut io, HANDSHAKE).await?;
    io.write_all(&server_hello(version, &SERVER_BODY)).await?;

    read_record(&mut io, FINISHED).await?;
    io.write_all(&server_finished(version)).await?;

    let app_data = read_record(&mut io, APPLICATION_DATA).await?;

    let mut rest = Vec::new();
    io.read_to_end(&mut rest).await?;

    Ok(app_data)
}
