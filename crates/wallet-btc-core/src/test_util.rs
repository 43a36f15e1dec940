//! Shared test helpers for `wallet-btc-core` unit tests.
//!
//! Builders for backend-shaped transactions and one-shot in-process servers
//! standing in for the node (HTTP) and ElectrumX (line-delimited TCP).

use bitcoin::hashes::Hash;
use bitcoin::{Amount, OutPoint, Txid};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::types::{RawInput, RawOutput, RawTransaction};

// ==============================================================================
// Txid Helpers
// ==============================================================================

/// Create a deterministic `Txid` from a single distinguishing byte.
pub fn txid_from_byte(b: u8) -> Txid {
    let mut bytes = [0u8; 32];
    bytes[0] = b;
    Txid::from_byte_array(bytes)
}

// ==============================================================================
// Transaction Builders
// ==============================================================================

/// A minimal confirmed transaction; override fields after construction.
pub fn make_raw_tx(txid: Txid, inputs: Vec<RawInput>, outputs: Vec<RawOutput>) -> RawTransaction {
    RawTransaction {
        txid,
        block_hash: None,
        block_time: Some(1_231_006_505),
        confirmations: Some(1),
        inputs,
        outputs,
    }
}

pub fn coinbase_input() -> RawInput {
    RawInput { prevout: None }
}

pub fn spending_input(funding_txid: Txid, vout: u32) -> RawInput {
    RawInput {
        prevout: Some(OutPoint::new(funding_txid, vout)),
    }
}

/// A pay-to-address output, or a script without a single address for `None`.
pub fn output_to(address: Option<&str>, sats: u64) -> RawOutput {
    RawOutput {
        value: Amount::from_sat(sats),
        address: address.map(str::to_owned),
        script_type: if address.is_some() { "pubkeyhash" } else { "nonstandard" }.to_owned(),
        script_asm: String::new(),
    }
}

/// Verbose transaction JSON as both backends report it.
pub fn verbose_tx_json(
    txid: Txid,
    vin: serde_json::Value,
    vout: serde_json::Value,
) -> serde_json::Value {
    serde_json::json!({
        "txid": txid.to_string(),
        "hash": txid.to_string(),
        "version": 2,
        "size": 225,
        "locktime": 0,
        "vin": vin,
        "vout": vout,
        "blockhash": "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f",
        "confirmations": 6,
        "time": 1_231_006_505,
        "blocktime": 1_231_006_505
    })
}

// ==============================================================================
// One-shot Servers
// ==============================================================================

/// Serve exactly one HTTP request on an ephemeral port.
///
/// `respond` receives the request body and returns the response body, sent
/// with `status` (e.g. `"200 OK"`). The handle resolves to the full raw
/// request text.
pub async fn serve_http_once<F>(status: &'static str, respond: F) -> (String, JoinHandle<String>)
where
    F: FnOnce(&str) -> String + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("test listener address");
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept test connection");
        let request = read_http_request(&mut socket).await;
        let body_start = request.find("\r\n\r\n").map_or(request.len(), |i| i + 4);
        let reply = respond(&request[body_start..]);
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{reply}",
            reply.len()
        );
        socket
            .write_all(response.as_bytes())
            .await
            .expect("write test response");
        let _ = socket.shutdown().await;
        request
    });
    (format!("http://{addr}"), handle)
}

async fn read_http_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.expect("read test request");
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let content_length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Serve exactly one newline-terminated request on an ephemeral port and
/// answer with `respond(request_line)` plus a newline.
pub async fn serve_line_once<F>(respond: F) -> (u16, JoinHandle<String>)
where
    F: FnOnce(&str) -> String + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let port = listener.local_addr().expect("test listener address").port();
    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.expect("accept test connection");
        let (reader, mut writer) = socket.into_split();
        let mut line = String::new();
        BufReader::new(reader)
            .read_line(&mut line)
            .await
            .expect("read test request line");
        let reply = respond(line.trim_end());
        writer
            .write_all(format!("{reply}\n").as_bytes())
            .await
            .expect("write test response");
        line
    });
    (port, handle)
}
