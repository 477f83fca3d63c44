//! Recognition session controller.
//!
//! Orchestrates the frame source, frame buffer, protocol client, and batch
//! adapter under one start/stop/destroy contract. Every captured frame
//! passes through a single fan-out point, network first then retention, so
//! both consumers observe frames exactly once and in the same order.
//! Reordering would corrupt both transcript segmentation and the container
//! payload.

use crate::audio::frame::SourceEvent;
use crate::audio::source::FrameSource;
use crate::audio::wav::{FrameBuffer, WavContainer};
use crate::config::Config;
use crate::defaults;
use crate::error::{ErrorKind, Result, VocapError};
use crate::protocol::client::{ProtocolClient, ProtocolEvent};
use crate::recognize::batch::BatchRecognizer;
use crate::session::transcript::TranscriptState;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Recognition mode selected at `start()` time.
///
/// Both modes share the frame source and the encoder; they differ only in
/// where the transcript comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Stream frames over the duplex protocol, receive interim results.
    Streaming,
    /// Record only, then recognize the finished container in one call.
    Batch,
}

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Capturing,
    Stopping,
    Completed,
    Failed,
    Destroyed,
}

/// Callbacks surfaced to the embedding application.
#[derive(Debug)]
pub enum SessionEvent {
    /// Capture is live.
    Started,
    /// The best-known transcript changed (server-revisable).
    InterimResult(String),
    /// The transcript is final for this session.
    FinalResult(String),
    /// The container was built from the retained frames.
    ContainerReady(WavContainer),
    /// Something failed; resources for the failed part were released.
    Error { kind: ErrorKind, detail: String },
    /// The session finished; no further events follow until the next start.
    Stopped,
}

/// The frame pump: a single task owning both frame consumers.
///
/// Runs from `start()` until the source reports Stopped or Error, then is
/// handed back to `stop()` for finalization.
struct Pump {
    source_rx: UnboundedReceiver<SourceEvent>,
    client: Option<ProtocolClient>,
    proto_rx: Option<UnboundedReceiver<ProtocolEvent>>,
    buffer: FrameBuffer,
    transcript: TranscriptState,
    events: UnboundedSender<SessionEvent>,
    retain: bool,
    completed: bool,
    capture_failed: bool,
}

enum PumpInput {
    Source(Option<SourceEvent>),
    Proto(Option<ProtocolEvent>),
}

impl Pump {
    async fn run(mut self) -> Self {
        loop {
            let input = if let Some(rx) = self.proto_rx.as_mut() {
                tokio::select! {
                    ev = self.source_rx.recv() => PumpInput::Source(ev),
                    ev = rx.recv() => PumpInput::Proto(ev),
                }
            } else {
                PumpInput::Source(self.source_rx.recv().await)
            };

            match input {
                PumpInput::Source(Some(SourceEvent::Started)) => {
                    let _ = self.events.send(SessionEvent::Started);
                }
                PumpInput::Source(Some(SourceEvent::Frame(frame))) => {
                    self.fan_out(&frame.bytes).await;
                    // Retention second, same frame, same order.
                    if self.retain {
                        self.buffer.append(&frame);
                    }
                }
                PumpInput::Source(Some(SourceEvent::Error(detail))) => {
                    tracing::warn!(%detail, "capture failed mid-session");
                    let _ = self.events.send(SessionEvent::Error {
                        kind: ErrorKind::Capture,
                        detail,
                    });
                    self.capture_failed = true;
                    break;
                }
                PumpInput::Source(Some(SourceEvent::Stopped)) | PumpInput::Source(None) => break,
                PumpInput::Proto(Some(event)) => self.handle_protocol_event(event).await,
                PumpInput::Proto(None) => {
                    // Reader task ended without a terminal event.
                    self.proto_rx = None;
                }
            }
        }
        self
    }

    /// Network leg of the fan-out. A send failure releases the transport
    /// and reports; capture and retention continue so the container is
    /// still produced.
    async fn fan_out(&mut self, bytes: &[u8]) {
        let Some(client) = self.client.as_mut() else {
            return;
        };
        if let Err(e) = client.send_frame(bytes).await {
            let _ = self.events.send(SessionEvent::Error {
                kind: e.kind(),
                detail: e.to_string(),
            });
            if let Some(mut client) = self.client.take() {
                client.shutdown().await;
            }
            self.proto_rx = None;
        }
    }

    async fn handle_protocol_event(&mut self, event: ProtocolEvent) {
        match event {
            ProtocolEvent::Interim(text) => {
                self.transcript.replace_interim(&text);
                let _ = self
                    .events
                    .send(SessionEvent::InterimResult(self.transcript.current()));
            }
            ProtocolEvent::SentenceEnd(text) => {
                self.transcript.commit_sentence(&text);
                let _ = self
                    .events
                    .send(SessionEvent::InterimResult(self.transcript.current()));
            }
            ProtocolEvent::Completed => {
                self.completed = true;
                self.proto_rx = None;
            }
            ProtocolEvent::Failed(status_text) => {
                tracing::warn!(%status_text, "transcription task failed mid-stream");
                let _ = self.events.send(SessionEvent::Error {
                    kind: ErrorKind::Protocol,
                    detail: status_text,
                });
                if let Some(mut client) = self.client.take() {
                    client.shutdown().await;
                }
                self.proto_rx = None;
            }
        }
    }
}

/// One recording activity: start, frames, stop, one container.
///
/// A controller owns at most one live session; `start()` while capturing is
/// rejected rather than queued. After `stop()` completes the controller can
/// be started again; after `destroy()` it cannot.
pub struct SessionController {
    config: Config,
    source: Box<dyn FrameSource>,
    events_tx: UnboundedSender<SessionEvent>,
    state: SessionState,
    mode: Mode,
    pump: Option<JoinHandle<Pump>>,
}

impl SessionController {
    /// Create a controller and the event stream it reports through.
    pub fn new(
        config: Config,
        source: Box<dyn FrameSource>,
    ) -> (Self, UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                config,
                source,
                events_tx,
                state: SessionState::Idle,
                mode: Mode::Streaming,
                pump: None,
            },
            events_rx,
        )
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }

    fn emit_error(&self, error: &VocapError) {
        self.emit(SessionEvent::Error {
            kind: error.kind(),
            detail: error.to_string(),
        });
    }

    /// Begin a capture session in the given mode.
    ///
    /// Resets the transcript and buffer, connects the protocol client
    /// (Streaming mode), and opens the frame source. On connect failure the
    /// error is reported through the event stream and the controller
    /// returns to Idle.
    ///
    /// # Errors
    /// `VocapError::AlreadyActive` while a session is capturing or
    /// stopping; `VocapError::Destroyed` after `destroy()`; otherwise the
    /// underlying connect/capture error.
    pub async fn start(&mut self, mode: Mode) -> Result<()> {
        match self.state {
            SessionState::Capturing | SessionState::Stopping => {
                return Err(VocapError::AlreadyActive);
            }
            SessionState::Destroyed => return Err(VocapError::Destroyed),
            SessionState::Idle | SessionState::Completed | SessionState::Failed => {}
        }
        self.config.validate()?;

        // Batch mode always retains: the adapter consumes the container.
        let retain =
            self.config.recognition.enable_container_export || mode == Mode::Batch;

        let (client, proto_rx) = if mode == Mode::Streaming {
            match ProtocolClient::connect(&self.config.recognition).await {
                Ok((client, proto_rx)) => (Some(client), Some(proto_rx)),
                Err(e) => {
                    self.emit_error(&e);
                    self.state = SessionState::Idle;
                    return Err(e);
                }
            }
        } else {
            (None, None)
        };

        let (source_tx, source_rx) = mpsc::unbounded_channel();
        if let Err(e) = self.source.start(&self.config.audio, source_tx) {
            self.emit_error(&e);
            if let Some(mut client) = client {
                client.shutdown().await;
            }
            self.state = SessionState::Idle;
            return Err(e);
        }

        let pump = Pump {
            source_rx,
            client,
            proto_rx,
            buffer: FrameBuffer::new(),
            transcript: TranscriptState::new(),
            events: self.events_tx.clone(),
            retain,
            completed: false,
            capture_failed: false,
        };
        self.pump = Some(tokio::spawn(pump.run()));
        self.mode = mode;
        self.state = SessionState::Capturing;
        tracing::info!(?mode, "session started");
        Ok(())
    }

    /// End the session: stop capture, finalize the transcript, build the
    /// container, and (Batch mode) run recognition on it.
    ///
    /// The wait for transcription completion is bounded by
    /// `completion_timeout_ms`; on timeout the container is built anyway.
    /// A no-op when no session is active.
    pub async fn stop(&mut self) -> Result<()> {
        match self.state {
            SessionState::Capturing => {}
            SessionState::Destroyed => return Err(VocapError::Destroyed),
            _ => return Ok(()),
        }
        self.state = SessionState::Stopping;

        // Source first: no further frames may enter the fan-out.
        if let Err(e) = self.source.stop() {
            self.emit_error(&e);
        }

        let Some(handle) = self.pump.take() else {
            self.state = SessionState::Failed;
            return Err(VocapError::Protocol {
                message: "no frame pump for an active session".to_string(),
            });
        };
        let mut pump = match handle.await {
            Ok(pump) => pump,
            Err(e) => {
                self.state = SessionState::Failed;
                return Err(VocapError::Protocol {
                    message: format!("frame pump task failed: {}", e),
                });
            }
        };

        if self.mode == Mode::Streaming {
            self.finish_streaming(&mut pump).await;
        }

        let container = if pump.retain {
            match pump.buffer.build(
                self.config.audio.sample_rate,
                self.config.audio.channels,
                defaults::BITS_PER_SAMPLE,
            ) {
                Ok(container) => {
                    self.emit(SessionEvent::ContainerReady(container.clone()));
                    Some(container)
                }
                Err(e) => {
                    self.emit_error(&e);
                    None
                }
            }
        } else {
            None
        };

        if self.mode == Mode::Batch
            && let Some(container) = container
        {
            self.recognize_batch(&container).await;
        }

        self.state = if pump.capture_failed {
            SessionState::Failed
        } else {
            SessionState::Completed
        };
        self.emit(SessionEvent::Stopped);
        tracing::info!(state = ?self.state, "session stopped");
        Ok(())
    }

    /// Streaming epilogue: ask the service to finalize, drain remaining
    /// events up to the bound, emit the final transcript, release the
    /// transport. The final result always precedes the container.
    async fn finish_streaming(&mut self, pump: &mut Pump) {
        let Some(mut client) = pump.client.take() else {
            // The protocol leg already failed and was released mid-stream;
            // there is no final transcript to report.
            return;
        };

        if let Err(e) = client.stop().await {
            self.emit_error(&e);
        } else if !pump.completed
            && let Some(mut proto_rx) = pump.proto_rx.take()
        {
            let bound = Duration::from_millis(self.config.recognition.completion_timeout_ms);
            let transcript = &mut pump.transcript;
            let events = &self.events_tx;
            let drained = timeout(bound, async {
                while let Some(event) = proto_rx.recv().await {
                    match event {
                        ProtocolEvent::Interim(text) => transcript.replace_interim(&text),
                        ProtocolEvent::SentenceEnd(text) => {
                            transcript.commit_sentence(&text);
                        }
                        ProtocolEvent::Completed => return true,
                        ProtocolEvent::Failed(status_text) => {
                            let _ = events.send(SessionEvent::Error {
                                kind: ErrorKind::Protocol,
                                detail: status_text,
                            });
                            return false;
                        }
                    }
                }
                false
            })
            .await;
            if drained.is_err() {
                tracing::warn!(
                    timeout_ms = self.config.recognition.completion_timeout_ms,
                    "no completion before timeout; building container anyway"
                );
            }
        }

        pump.transcript.finalize();
        self.emit(SessionEvent::FinalResult(pump.transcript.current()));
        client.shutdown().await;
    }

    /// Batch epilogue: exactly one recognition attempt for the container.
    async fn recognize_batch(&mut self, container: &WavContainer) {
        let recognizer = match BatchRecognizer::new(&self.config.recognition) {
            Ok(recognizer) => recognizer,
            Err(e) => {
                self.emit_error(&e);
                return;
            }
        };
        match recognizer.recognize(container).await {
            Ok(text) => self.emit(SessionEvent::FinalResult(text)),
            Err(e) => self.emit_error(&e),
        }
    }

    /// Unconditionally release everything: capture device, transport,
    /// buffers, and any outstanding completion wait.
    ///
    /// Safe and idempotent from any state; the controller is unusable
    /// afterwards.
    pub fn destroy(&mut self) {
        if let Some(handle) = self.pump.take() {
            // Dropping the aborted pump drops the client and with it the
            // transport; the buffer goes with it.
            handle.abort();
        }
        let _ = self.source.stop();
        if self.state != SessionState::Destroyed {
            tracing::info!("session destroyed");
        }
        self.state = SessionState::Destroyed;
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.destroy();
    }
}
