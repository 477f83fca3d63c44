//! Stateful client for the duplex streaming transcription protocol.
//!
//! One client instance owns one connection and one remote task; it is
//! created per capture session and dropped with it, so no listeners outlive
//! a session. The session controller decides what to do when this client
//! fails (for example falling back to batch recognition); this layer only
//! reports.

use crate::config::RecognitionConfig;
use crate::defaults;
use crate::error::{Result, VocapError};
use crate::protocol::message::{ControlMessage, ServerEvent, decode_event, wire_id};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Protocol client lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    AwaitingStartAck,
    Streaming,
    Stopping,
    Failed,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientState::Disconnected => "Disconnected",
            ClientState::Connecting => "Connecting",
            ClientState::AwaitingStartAck => "AwaitingStartAck",
            ClientState::Streaming => "Streaming",
            ClientState::Stopping => "Stopping",
            ClientState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Events forwarded from the reader task to the session controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    /// Interim suffix replacement.
    Interim(String),
    /// A sentence became final.
    SentenceEnd(String),
    /// The remote task is finalized; the transport is done.
    Completed,
    /// Server-reported or transport failure.
    Failed(String),
}

/// Duplex streaming transcription client.
///
/// Owns the write half of the socket; a spawned reader task decodes server
/// events into a channel returned from [`ProtocolClient::connect`].
pub struct ProtocolClient {
    state: ClientState,
    task_id: String,
    appkey: String,
    writer: Option<WsWriter>,
    reader_handle: Option<JoinHandle<()>>,
}

impl ProtocolClient {
    /// Connect, negotiate a session, and enter the Streaming state.
    ///
    /// Opens the duplex transport (bearer credential on the connection URL),
    /// generates a fresh dashless task id, sends StartTranscription, and
    /// waits for the TranscriptionStarted acknowledgement before returning.
    ///
    /// # Errors
    /// Returns `VocapError::Connect` on missing credentials or transport
    /// failure, and `VocapError::TaskFailed` if the service rejects the task
    /// outright.
    pub async fn connect(
        config: &RecognitionConfig,
    ) -> Result<(Self, UnboundedReceiver<ProtocolEvent>)> {
        if config.endpoint.is_empty() {
            return Err(VocapError::Connect {
                message: "no streaming endpoint configured".to_string(),
            });
        }
        if config.appkey.is_empty() || config.token.is_empty() {
            return Err(VocapError::Connect {
                message: "missing appkey or token".to_string(),
            });
        }

        let mut client = Self {
            state: ClientState::Connecting,
            task_id: wire_id(),
            appkey: config.appkey.clone(),
            writer: None,
            reader_handle: None,
        };
        let url = format!("{}?token={}", config.endpoint, config.token);
        tracing::debug!(task_id = %client.task_id, endpoint = %config.endpoint, "connecting");

        let (socket, _response) = connect_async(&url).await.map_err(|e| VocapError::Connect {
            message: format!("transport open failed: {}", e),
        })?;
        let (mut writer, mut reader) = socket.split();

        // Negotiate: StartTranscription, then wait for the ack.
        client.state = ClientState::AwaitingStartAck;
        let start = ControlMessage::start_transcription(
            &client.appkey,
            &client.task_id,
            defaults::SAMPLE_RATE,
        );
        writer
            .send(Message::Text(start.to_json()?))
            .await
            .map_err(|e| VocapError::Connect {
                message: format!("failed to send StartTranscription: {}", e),
            })?;

        Self::await_start_ack(&mut reader).await?;
        tracing::debug!(task_id = %client.task_id, "transcription task started");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        client.state = ClientState::Streaming;
        client.writer = Some(writer);
        client.reader_handle = Some(tokio::spawn(read_loop(reader, events_tx)));
        Ok((client, events_rx))
    }

    async fn await_start_ack(reader: &mut WsReader) -> Result<()> {
        let deadline = Duration::from_millis(defaults::START_ACK_TIMEOUT_MS);
        let ack = timeout(deadline, async {
            while let Some(message) = reader.next().await {
                let message = message.map_err(|e| VocapError::Connect {
                    message: format!("transport failed awaiting start ack: {}", e),
                })?;
                match message {
                    Message::Text(text) => match decode_event(&text)? {
                        ServerEvent::TranscriptionStarted => return Ok(()),
                        ServerEvent::TaskFailed { status_text } => {
                            return Err(VocapError::TaskFailed { status_text });
                        }
                        // Anything else before the ack is out of order but
                        // harmless; keep waiting.
                        _ => {}
                    },
                    Message::Close(_) => {
                        return Err(VocapError::Connect {
                            message: "server closed the connection during negotiation"
                                .to_string(),
                        });
                    }
                    _ => {}
                }
            }
            Err(VocapError::Connect {
                message: "connection ended before TranscriptionStarted".to_string(),
            })
        })
        .await;

        match ack {
            Ok(result) => result,
            Err(_) => Err(VocapError::Connect {
                message: "timed out waiting for TranscriptionStarted".to_string(),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// The dashless correlation id tying this client to its remote task.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Send one raw PCM frame as a binary message.
    ///
    /// Fire-and-forget: there is no per-frame acknowledgement, and frame
    /// loss is not detected at this layer.
    ///
    /// # Errors
    /// Returns `VocapError::NotStreaming` outside the Streaming state (a
    /// rejection, not a transport error). A transport failure transitions
    /// the client to Failed and releases the writer.
    pub async fn send_frame(&mut self, bytes: &[u8]) -> Result<()> {
        if self.state != ClientState::Streaming {
            return Err(VocapError::NotStreaming {
                state: self.state.to_string(),
            });
        }
        let Some(writer) = self.writer.as_mut() else {
            return Err(VocapError::NotStreaming {
                state: self.state.to_string(),
            });
        };

        if let Err(e) = writer.send(Message::Binary(bytes.to_vec())).await {
            self.state = ClientState::Failed;
            self.writer = None;
            return Err(VocapError::Protocol {
                message: format!("frame send failed: {}", e),
            });
        }
        Ok(())
    }

    /// Send StopTranscription and enter the Stopping state.
    ///
    /// The caller then drains the event channel for
    /// [`ProtocolEvent::Completed`] (bounded) before calling
    /// [`ProtocolClient::shutdown`]. A no-op when already disconnected.
    pub async fn stop(&mut self) -> Result<()> {
        match self.state {
            ClientState::Streaming => {}
            // Already past streaming: nothing to tell the server.
            _ => return Ok(()),
        }
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };

        let stop = ControlMessage::stop_transcription(&self.appkey, &self.task_id);
        self.state = ClientState::Stopping;
        if let Err(e) = writer.send(Message::Text(stop.to_json()?)).await {
            self.state = ClientState::Failed;
            self.writer = None;
            return Err(VocapError::Protocol {
                message: format!("failed to send StopTranscription: {}", e),
            });
        }
        tracing::debug!(task_id = %self.task_id, "stop requested");
        Ok(())
    }

    /// Close the transport unconditionally and return to Disconnected.
    ///
    /// Safe to call from any state, any number of times.
    pub async fn shutdown(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.send(Message::Close(None)).await;
            let _ = writer.close().await;
        }
        if let Some(handle) = self.reader_handle.take() {
            handle.abort();
        }
        if self.state != ClientState::Failed {
            self.state = ClientState::Disconnected;
        }
        tracing::debug!(task_id = %self.task_id, "transport released");
    }
}

/// Decode server messages and forward them until the stream ends.
async fn read_loop(mut reader: WsReader, events: UnboundedSender<ProtocolEvent>) {
    while let Some(message) = reader.next().await {
        let message = match message {
            Ok(m) => m,
            Err(e) => {
                let _ = events.send(ProtocolEvent::Failed(format!("transport error: {}", e)));
                return;
            }
        };
        match message {
            Message::Text(text) => match decode_event(&text) {
                Ok(ServerEvent::ResultChanged { text }) => {
                    let _ = events.send(ProtocolEvent::Interim(text));
                }
                Ok(ServerEvent::SentenceEnd { text }) => {
                    let _ = events.send(ProtocolEvent::SentenceEnd(text));
                }
                Ok(ServerEvent::Completed) => {
                    let _ = events.send(ProtocolEvent::Completed);
                    return;
                }
                Ok(ServerEvent::TaskFailed { status_text }) => {
                    let _ = events.send(ProtocolEvent::Failed(status_text));
                    return;
                }
                Ok(ServerEvent::TranscriptionStarted) | Ok(ServerEvent::Ignored) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed server event");
                }
            },
            Message::Close(_) => return,
            // Binary from the server is not part of this protocol; pings are
            // answered by tungstenite itself.
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disconnected_client() -> ProtocolClient {
        ProtocolClient {
            state: ClientState::Disconnected,
            task_id: wire_id(),
            appkey: "key".to_string(),
            writer: None,
            reader_handle: None,
        }
    }

    #[tokio::test]
    async fn send_frame_while_disconnected_is_rejected_distinctly() {
        let mut client = disconnected_client();
        match client.send_frame(&[0u8; 4]).await {
            Err(VocapError::NotStreaming { state }) => assert_eq!(state, "Disconnected"),
            other => panic!("expected NotStreaming, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn stop_while_disconnected_is_a_noop() {
        let mut client = disconnected_client();
        assert!(client.stop().await.is_ok());
        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_from_any_state() {
        let mut client = disconnected_client();
        client.shutdown().await;
        client.shutdown().await;
        assert_eq!(client.state(), ClientState::Disconnected);

        let mut failed = disconnected_client();
        failed.state = ClientState::Failed;
        failed.shutdown().await;
        assert_eq!(failed.state(), ClientState::Failed);
    }

    #[tokio::test]
    async fn connect_rejects_missing_credentials() {
        let config = RecognitionConfig {
            endpoint: "ws://127.0.0.1:1/ws".to_string(),
            ..Default::default()
        };
        match ProtocolClient::connect(&config).await {
            Err(VocapError::Connect { message }) => {
                assert!(message.contains("appkey") || message.contains("token"));
            }
            other => panic!("expected Connect error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn connect_rejects_missing_endpoint() {
        let config = RecognitionConfig {
            appkey: "key".to_string(),
            token: "tok".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            ProtocolClient::connect(&config).await,
            Err(VocapError::Connect { .. })
        ));
    }

    #[tokio::test]
    async fn connect_surfaces_transport_failure() {
        // Nothing listens on this port.
        let config = RecognitionConfig {
            endpoint: "ws://127.0.0.1:9/ws".to_string(),
            appkey: "key".to_string(),
            token: "tok".to_string(),
            ..Default::default()
        };
        match ProtocolClient::connect(&config).await {
            Err(VocapError::Connect { message }) => {
                assert!(message.contains("transport open failed"));
            }
            other => panic!("expected Connect error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn client_state_displays_match_names() {
        assert_eq!(ClientState::Disconnected.to_string(), "Disconnected");
        assert_eq!(ClientState::AwaitingStartAck.to_string(), "AwaitingStartAck");
        assert_eq!(ClientState::Streaming.to_string(), "Streaming");
    }
}
