//! Legacy TCP remote protocol
//!
//! Keys and pairing go over the TV's remote port (default 55000). The
//! protocol frames base64 payloads with little-endian length prefixes;
//! the first connection triggers an on-screen authorization prompt and
//! the TV answers with a grant or denial.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

use super::RemoteError;

pub const DEFAULT_REMOTE_PORT: u16 = 55000;
const APP_ID: &str = "tv.control.bridge";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const PAIRING_TIMEOUT: Duration = Duration::from_secs(30);

// Authorization response payload bytes.
const AUTH_GRANTED: [u8; 4] = [0x64, 0x00, 0x01, 0x00];
const AUTH_DENIED: [u8; 4] = [0x64, 0x00, 0x00, 0x00];

fn push_b64(buf: &mut Vec<u8>, value: &str) {
    let encoded = B64.encode(value);
    buf.extend_from_slice(&(encoded.len() as u16).to_le_bytes());
    buf.extend_from_slice(encoded.as_bytes());
}

fn frame(payload: &[u8], header_byte: u8) -> Vec<u8> {
    let mut msg = Vec::with_capacity(APP_ID.len() + payload.len() + 5);
    msg.push(header_byte);
    msg.extend_from_slice(&(APP_ID.len() as u16).to_le_bytes());
    msg.extend_from_slice(APP_ID.as_bytes());
    msg.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    msg.extend_from_slice(payload);
    msg
}

async fn connect(ip: &str, port: u16, timeout: Duration) -> Result<TcpStream, RemoteError> {
    match tokio::time::timeout(timeout, TcpStream::connect((ip, port))).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(RemoteError::Io(e)),
        Err(_) => Err(RemoteError::Timeout),
    }
}

/// Quick reachability probe: can we open the remote port at all?
/// A refused or timed-out connection means "off", not an error.
pub async fn probe(ip: &str, port: u16) -> bool {
    connect(ip, port, CONNECT_TIMEOUT).await.is_ok()
}

/// Run the authorization handshake. Blocks (up to a timeout) on the
/// user accepting the prompt on the TV. Returns the granted client
/// identity, which later key traffic presents as its token.
pub async fn pair(ip: &str, port: u16, client_ip: &str, mac: &str) -> Result<String, RemoteError> {
    let mut stream = connect(ip, port, CONNECT_TIMEOUT).await?;

    let mut payload = vec![0x64, 0x00];
    push_b64(&mut payload, client_ip);
    push_b64(&mut payload, mac);
    push_b64(&mut payload, APP_ID);

    stream.write_all(&frame(&payload, 0x00)).await?;

    // The TV answers immediately when a prior grant exists, otherwise
    // only after the user reacts to the prompt.
    let mut response = [0u8; 64];
    let n = match tokio::time::timeout(PAIRING_TIMEOUT, stream.read(&mut response)).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => return Err(RemoteError::Io(e)),
        Err(_) => return Err(RemoteError::Timeout),
    };

    let body = &response[..n];
    if contains(body, &AUTH_GRANTED) {
        Ok(B64.encode(format!("{APP_ID}:{mac}")))
    } else if contains(body, &AUTH_DENIED) {
        Err(RemoteError::PairingDeclined)
    } else {
        Err(RemoteError::Protocol(format!(
            "unexpected pairing response ({n} bytes)"
        )))
    }
}

/// Send one `KEY_*` identifier over an authorized connection.
pub async fn send_key(ip: &str, port: u16, token: &str, key: &str) -> Result<(), RemoteError> {
    let mut stream = connect(ip, port, CONNECT_TIMEOUT).await?;

    // Re-present the granted identity before the key payload.
    let mut auth = vec![0x64, 0x00];
    push_b64(&mut auth, token);
    stream.write_all(&frame(&auth, 0x00)).await?;

    let mut payload = vec![0x00, 0x00, 0x00];
    push_b64(&mut payload, key);
    stream.write_all(&frame(&payload, 0x00)).await?;
    stream.flush().await?;

    Ok(())
}

/// Wake-on-LAN magic packet to the device's MAC, broadcast on port 9.
pub async fn wake_on_lan(mac: &str) -> Result<(), RemoteError> {
    let mac_bytes = parse_mac(mac)?;

    let mut packet = vec![0xFFu8; 6];
    for _ in 0..16 {
        packet.extend_from_slice(&mac_bytes);
    }

    let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
    socket.set_broadcast(true)?;
    socket.send_to(&packet, ("255.255.255.255", 9)).await?;
    Ok(())
}

fn parse_mac(mac: &str) -> Result<[u8; 6], RemoteError> {
    let parts: Vec<&str> = mac.split(|c| c == ':' || c == '-').collect();
    if parts.len() != 6 {
        return Err(RemoteError::Protocol(format!("invalid MAC address: {mac}")));
    }
    let mut bytes = [0u8; 6];
    for (i, part) in parts.iter().enumerate() {
        bytes[i] = u8::from_str_radix(part, 16)
            .map_err(|_| RemoteError::Protocol(format!("invalid MAC address: {mac}")))?;
    }
    Ok(bytes)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
