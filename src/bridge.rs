//! Line-delimited JSON bridge.
//!
//! Each input line is one of: a gateway event (`{"event": ...}`), a user
//! command (`{"action": ...}`) or a view request (`{"view": ...}`). Outbound
//! gateway events and view responses are written one per line.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::commands::{UserCommand, ViewRequest, ViewResponse};
use crate::error::{ParleyError, Result};
use crate::services::chat_gateway::ChannelGateway;
use crate::services::chat_types::{decode_inbound, encode_outbound, InboundEvent, OutboundEvent};
use crate::state::SessionHandle;

enum BridgeInput {
    Event(InboundEvent),
    Command(UserCommand),
    View(ViewRequest),
}

fn parse_line(line: &str) -> Result<BridgeInput> {
    if let Ok(event) = decode_inbound(line) {
        return Ok(BridgeInput::Event(event));
    }
    if let Ok(command) = serde_json::from_str::<UserCommand>(line) {
        return Ok(BridgeInput::Command(command));
    }
    if let Ok(view) = serde_json::from_str::<ViewRequest>(line) {
        return Ok(BridgeInput::View(view));
    }
    Err(ParleyError::MalformedEvent(format!(
        "unrecognized input: {}",
        line
    )))
}

/// Pump lines between `reader`/`writer` and the session until input ends.
pub async fn pump<R, W>(
    reader: R,
    mut writer: W,
    session: &SessionHandle,
    gateway: &ChannelGateway,
    mut outbound: mpsc::UnboundedReceiver<OutboundEvent>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match parse_line(line) {
                    Ok(BridgeInput::Event(event)) => {
                        match event {
                            InboundEvent::Connected => gateway.set_connected(true),
                            InboundEvent::Disconnected => gateway.set_connected(false),
                            _ => {}
                        }
                        session.post_inbound(event)?;
                    }
                    Ok(BridgeInput::Command(command)) => session.command(command)?,
                    Ok(BridgeInput::View(ViewRequest::Snapshot { query })) => {
                        let snapshot = session.snapshot(query).await?;
                        // everything emitted before the snapshot is already queued
                        flush_outbound(&mut writer, &mut outbound).await?;
                        let json = serde_json::to_string(&ViewResponse::Snapshot(snapshot))?;
                        write_line(&mut writer, &json).await?;
                    }
                    Err(e) => log::warn!("{}", e),
                }
            }
            Some(event) = outbound.recv() => {
                write_line(&mut writer, &encode_outbound(&event)?).await?;
            }
        }
    }

    flush_outbound(&mut writer, &mut outbound).await?;
    writer.flush().await?;
    Ok(())
}

async fn flush_outbound<W: AsyncWrite + Unpin>(
    writer: &mut W,
    outbound: &mut mpsc::UnboundedReceiver<OutboundEvent>,
) -> Result<()> {
    while let Ok(event) = outbound.try_recv() {
        write_line(writer, &encode_outbound(&event)?).await?;
    }
    Ok(())
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_dispatch() {
        assert!(matches!(
            parse_line(r#"{"event":"connect"}"#),
            Ok(BridgeInput::Event(InboundEvent::Connected))
        ));
        assert!(matches!(
            parse_line(r#"{"action":"send","content":"hi"}"#),
            Ok(BridgeInput::Command(UserCommand::Send { .. }))
        ));
        assert!(matches!(
            parse_line(r#"{"view":"snapshot","query":"bo"}"#),
            Ok(BridgeInput::View(ViewRequest::Snapshot { query: Some(_) }))
        ));
        assert!(matches!(
            parse_line(r#"{"event":"receiveMessage"}"#),
            Err(ParleyError::MalformedEvent(_))
        ));
    }
}
