//! Length-prefixed framing over an async socket: a 4-byte big-endian
//! length header followed by a MessagePack-encoded body.

use crate::protocol::{self, InboundMessage, OutboundMessage};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

pub(crate) async fn write_frame(
    writer: &mut OwnedWriteHalf,
    message: &OutboundMessage,
) -> std::io::Result<()> {
    let body = protocol::encode(message)?;
    let len = u32::try_from(body.len())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "frame too large"))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await
}

pub(crate) async fn read_frame(reader: &mut OwnedReadHalf) -> std::io::Result<InboundMessage> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "frame exceeds maximum length",
        ));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    protocol::decode(&body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn loopback_pair() -> (OwnedWriteHalf, OwnedReadHalf) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let (_client_read, client_write) = client.into_split();
        let (server_read, _server_write) = server.into_split();
        (client_write, server_read)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn write_frame_length_prefix_matches_body_and_is_readable_raw() {
        let (mut writer, mut reader) = loopback_pair().await;

        let message = OutboundMessage::ReqMktData {
            reqid: 7,
            symbol: "AAPL.SMART".to_string(),
        };
        write_frame(&mut writer, &message).await.unwrap();

        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf).await.unwrap();
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body).await.unwrap();

        let decoded: OutboundMessage = rmp_serde::from_slice(&body).unwrap();
        assert!(matches!(
            decoded,
            OutboundMessage::ReqMktData { reqid: 7, ref symbol } if symbol == "AAPL.SMART"
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn read_frame_rejects_an_oversized_length_prefix() {
        let (mut writer, mut reader) = loopback_pair().await;

        writer
            .write_all(&(MAX_FRAME_LEN + 1).to_be_bytes())
            .await
            .unwrap();

        let err = read_frame(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
