//! Loopback HTTP helpers shared by the client tests.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Serve one canned HTTP response and hand back the raw request.
///
/// The request is read until its headers and `content-length` body have
/// arrived, then `response` is written and the connection closed.
pub(crate) async fn serve_once(response: Vec<u8>) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("should bind");
    let addr = listener.local_addr().expect("should have addr");
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("should accept");
        let mut raw = Vec::new();
        let mut buf = [0_u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.expect("should read");
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
            if request_complete(&raw) {
                break;
            }
        }
        socket.write_all(&response).await.expect("should write");
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&raw).to_string()
    });
    (addr, handle)
}

/// A complete `application/json` response with the given status line.
pub(crate) fn json_response(status: &str, body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    )
    .into_bytes()
}

fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some(head_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text[..head_end]
        .lines()
        .find_map(|l| {
            let (name, value) = l.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    raw.len() >= head_end + 4 + content_length
}
