//! `Content-Length` framed JSON-RPC over a byte stream.

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::{ProxyError, ProxyResult};

/// Write one framed message.
pub(super) async fn write_message<W>(writer: &mut W, message: &Value) -> ProxyResult<()>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_string(message)?;
    let frame = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message. `Ok(None)` on a clean end of stream.
pub(super) async fn read_message<R>(reader: &mut R) -> ProxyResult<Option<Value>>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let header = line.trim();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().ok();
            }
        }
    }

    let length =
        content_length.ok_or_else(|| ProxyError::Protocol("missing Content-Length".into()))?;
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;

    Ok(Some(serde_json::from_slice(&body)?))
}
