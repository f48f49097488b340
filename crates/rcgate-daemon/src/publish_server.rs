//! WebSocket endpoint for the downstream consumer.

use futures_util::{SinkExt, StreamExt};
use rcgate_cache::{ChangePublisher, Outbound};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Accept downstream connections forever. Each one becomes the publisher's
/// only session, closing whichever was attached before.
pub async fn serve(listener: TcpListener, publisher: Arc<ChangePublisher>) -> anyhow::Result<()> {
    tracing::info!("Publishing on ws://{}", listener.local_addr()?);

    loop {
        let (stream, addr) = listener.accept().await?;
        let publisher = publisher.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, publisher).await {
                tracing::warn!("Downstream session {} failed: {}", addr, e);
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    publisher: Arc<ChangePublisher>,
) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();
    let mut session = publisher.attach();

    tracing::info!(generation = session.generation(), "Downstream session from {}", addr);

    loop {
        tokio::select! {
            outbound = session.recv() => match outbound {
                Some(Outbound::Text(text)) => sink.send(Message::Text(text.into())).await?,
                Some(Outbound::Binary(bytes)) => sink.send(Message::Binary(bytes.into())).await?,
                Some(Outbound::GoingAway) | None => {
                    let close = Message::Close(Some(CloseFrame {
                        code: CloseCode::Away,
                        reason: "session replaced".into(),
                    }));
                    let _ = sink.send(close).await;
                    break;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                // Receive-only channel; pings are answered by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }

    tracing::info!("Downstream session from {} closed", addr);
    Ok(())
}
