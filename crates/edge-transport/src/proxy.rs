//! HTTP CONNECT tunnelling for proxied connections.

use crate::{TransportError, TransportResult};
use base64::Engine;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;
use url::Url;

/// Upper bound on the proxy's response head.
const MAX_RESPONSE_HEAD: usize = 8 * 1024;

/// Open a TCP tunnel to `host:port` through the HTTP proxy at `proxy_url`.
pub(crate) async fn connect_via_proxy(
    proxy_url: &str,
    host: &str,
    port: u16,
) -> TransportResult<TcpStream> {
    let proxy = Url::parse(proxy_url)
        .map_err(|e| TransportError::Proxy(format!("invalid proxy URL {proxy_url}: {e}")))?;
    let proxy_host = proxy
        .host_str()
        .ok_or_else(|| TransportError::Proxy("proxy URL has no host".to_string()))?;
    let proxy_port = proxy.port_or_known_default().unwrap_or(8080);

    debug!(proxy = %proxy_host, target = %host, "Opening proxy tunnel");
    let mut stream = TcpStream::connect((proxy_host, proxy_port)).await?;

    stream
        .write_all(connect_request(&proxy, host, port).as_bytes())
        .await?;

    let head = read_response_head(&mut stream).await?;
    check_status(&head)?;
    Ok(stream)
}

fn connect_request(proxy: &Url, host: &str, port: u16) -> String {
    let mut request = format!("CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n");
    if !proxy.username().is_empty() {
        let credentials = format!("{}:{}", proxy.username(), proxy.password().unwrap_or(""));
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        request.push_str(&format!("Proxy-Authorization: Basic {encoded}\r\n"));
    }
    request.push_str("\r\n");
    request
}

/// Read byte-by-byte up to the blank line so no tunnelled bytes are consumed.
async fn read_response_head(stream: &mut TcpStream) -> TransportResult<String> {
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err(TransportError::Proxy("proxy response head too large".to_string()));
        }
        if stream.read(&mut byte).await? == 0 {
            return Err(TransportError::Proxy(
                "proxy closed the connection during CONNECT".to_string(),
            ));
        }
        head.push(byte[0]);
    }

    Ok(String::from_utf8_lossy(&head).into_owned())
}

fn check_status(head: &str) -> TransportResult<()> {
    let status_line = head.lines().next().unwrap_or_default();
    let status = status_line.split_whitespace().nth(1);
    match status {
        Some("200") => Ok(()),
        _ => Err(TransportError::Proxy(format!(
            "proxy refused tunnel: {status_line}"
        ))),
    }
}
