//! Real microphone capture using CPAL (Cross-Platform Audio Library).

use crate::audio::frame::{AudioFrame, SourceEvent};
use crate::audio::source::FrameSource;
use crate::config::AudioConfig;
use crate::defaults;
use crate::error::{Result, VocapError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched from the thread that calls
/// `start()`/`stop()`; the wrapper exists so the containing source can be
/// moved into the session controller.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Shared between the device callback and the source.
struct FrameCursor {
    pending: Vec<u8>,
    sequence: u64,
    frame_bytes: usize,
}

impl FrameCursor {
    /// Append raw bytes and emit every full frame that became available.
    fn push(&mut self, data: &[u8], sink: &UnboundedSender<SourceEvent>) {
        self.pending.extend_from_slice(data);
        while self.pending.len() >= self.frame_bytes {
            let rest = self.pending.split_off(self.frame_bytes);
            let bytes = std::mem::replace(&mut self.pending, rest);
            let _ = sink.send(SourceEvent::Frame(AudioFrame::new(self.sequence, bytes)));
            self.sequence += 1;
        }
    }

    /// Emit whatever partial frame remains. Called once on stop so the
    /// container keeps every captured sample.
    fn flush(&mut self, sink: &UnboundedSender<SourceEvent>) {
        if !self.pending.is_empty() {
            let bytes = std::mem::take(&mut self.pending);
            let _ = sink.send(SourceEvent::Frame(AudioFrame::new(self.sequence, bytes)));
            self.sequence += 1;
        }
    }
}

/// Microphone frame source capturing 16-bit PCM at 16kHz mono.
///
/// Tries an i16 stream first (PipeWire/PulseAudio convert transparently),
/// then falls back to f32 with clamp-scale conversion for devices that only
/// expose float formats. The stream handle is released on `stop()` and on
/// drop; the microphone is an exclusive resource, so only one source should
/// be active system-wide.
pub struct CpalFrameSource {
    device: cpal::Device,
    stream: Option<SendableStream>,
    cursor: Arc<Mutex<FrameCursor>>,
    sink: Option<UnboundedSender<SourceEvent>>,
}

impl CpalFrameSource {
    /// Create a source bound to a device.
    ///
    /// # Arguments
    /// * `device_name` - Optional device name. If None, uses the default
    ///   input device.
    ///
    /// # Errors
    /// Returns `DeviceNotFound` if the named (or default) device does not
    /// exist, or `Capture` if enumeration fails.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(name) = device_name {
            let devices = host.input_devices().map_err(|e| VocapError::Capture {
                message: format!("Failed to enumerate devices: {}", e),
            })?;

            let mut found_device = None;
            for dev in devices {
                if let Ok(dev_name) = dev.name()
                    && dev_name == name
                {
                    found_device = Some(dev);
                    break;
                }
            }

            found_device.ok_or_else(|| VocapError::DeviceNotFound {
                device: name.to_string(),
            })?
        } else {
            host.default_input_device()
                .ok_or_else(|| VocapError::DeviceNotFound {
                    device: "default".to_string(),
                })?
        };

        Ok(Self {
            device,
            stream: None,
            cursor: Arc::new(Mutex::new(FrameCursor {
                pending: Vec::new(),
                sequence: 0,
                frame_bytes: defaults::frame_bytes(defaults::SAMPLE_RATE, defaults::FRAME_MS),
            })),
            sink: None,
        })
    }

    fn build_stream(
        &self,
        config: &AudioConfig,
        sink: UnboundedSender<SourceEvent>,
    ) -> Result<cpal::Stream> {
        let stream_config = cpal::StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_sink = sink.clone();
        let err_callback = move |err| {
            let _ = err_sink.send(SourceEvent::Error(format!("audio stream error: {}", err)));
        };

        // Try i16 first: zero-copy path straight into frame bytes.
        let cursor = Arc::clone(&self.cursor);
        let data_sink = sink.clone();
        if let Ok(stream) = self.device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let mut bytes = Vec::with_capacity(data.len() * 2);
                for sample in data {
                    bytes.extend_from_slice(&sample.to_le_bytes());
                }
                if let Ok(mut cur) = cursor.lock() {
                    cur.push(&bytes, &data_sink);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        // Fallback: f32 with clamp-scale conversion.
        let err_sink = sink.clone();
        let err_callback = move |err| {
            let _ = err_sink.send(SourceEvent::Error(format!("audio stream error: {}", err)));
        };
        let cursor = Arc::clone(&self.cursor);
        self.device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mut bytes = Vec::with_capacity(data.len() * 2);
                    for sample in data {
                        let s = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                        bytes.extend_from_slice(&s.to_le_bytes());
                    }
                    if let Ok(mut cur) = cursor.lock() {
                        cur.push(&bytes, &sink);
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| VocapError::Capture {
                message: format!("Failed to build input stream: {}", e),
            })
    }
}

impl FrameSource for CpalFrameSource {
    fn start(&mut self, config: &AudioConfig, sink: UnboundedSender<SourceEvent>) -> Result<()> {
        if self.stream.is_some() {
            return Ok(()); // Already started
        }

        {
            let mut cursor = self.cursor.lock().map_err(|e| VocapError::Capture {
                message: format!("Failed to lock frame cursor: {}", e),
            })?;
            cursor.pending.clear();
            cursor.sequence = 0;
            cursor.frame_bytes = defaults::frame_bytes(config.sample_rate, config.frame_ms);
        }

        let stream = self.build_stream(config, sink.clone())?;
        stream.play().map_err(|e| VocapError::Capture {
            message: format!("Failed to start audio stream: {}", e),
        })?;

        let _ = sink.send(SourceEvent::Started);
        tracing::debug!(device = ?self.device.name().ok(), "capture stream started");
        self.stream = Some(SendableStream(stream));
        self.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(sendable_stream) = self.stream.take() else {
            return Ok(());
        };

        // Pause before flushing so no frame can arrive after Stopped.
        let pause_result = sendable_stream.0.pause();
        drop(sendable_stream);

        if let Some(sink) = self.sink.take() {
            if let Ok(mut cursor) = self.cursor.lock() {
                cursor.flush(&sink);
            }
            let _ = sink.send(SourceEvent::Stopped);
        }
        tracing::debug!("capture stream stopped");

        pause_result.map_err(|e| VocapError::Capture {
            message: format!("Failed to stop audio stream: {}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn cursor(frame_bytes: usize) -> FrameCursor {
        FrameCursor {
            pending: Vec::new(),
            sequence: 0,
            frame_bytes,
        }
    }

    #[test]
    fn cursor_slices_exact_frames() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut cur = cursor(4);

        cur.push(&[1, 2, 3, 4, 5, 6, 7, 8], &tx);

        let mut frames = Vec::new();
        while let Ok(SourceEvent::Frame(f)) = rx.try_recv() {
            frames.push(f);
        }
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].bytes, vec![1, 2, 3, 4]);
        assert_eq!(frames[0].sequence, 0);
        assert_eq!(frames[1].bytes, vec![5, 6, 7, 8]);
        assert_eq!(frames[1].sequence, 1);
    }

    #[test]
    fn cursor_carries_partial_data_across_pushes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut cur = cursor(4);

        cur.push(&[1, 2, 3], &tx);
        assert!(rx.try_recv().is_err());

        cur.push(&[4, 5], &tx);
        match rx.try_recv() {
            Ok(SourceEvent::Frame(f)) => assert_eq!(f.bytes, vec![1, 2, 3, 4]),
            other => panic!("expected frame, got {:?}", other),
        }
        assert_eq!(cur.pending, vec![5]);
    }

    #[test]
    fn flush_emits_trailing_partial_frame() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut cur = cursor(4);

        cur.push(&[1, 2, 3, 4, 5], &tx);
        let _ = rx.try_recv(); // full frame
        cur.flush(&tx);

        match rx.try_recv() {
            Ok(SourceEvent::Frame(f)) => {
                assert_eq!(f.bytes, vec![5]);
                assert_eq!(f.sequence, 1);
            }
            other => panic!("expected flushed frame, got {:?}", other),
        }
    }

    #[test]
    fn flush_with_nothing_pending_emits_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut cur = cursor(4);
        cur.flush(&tx);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn create_with_invalid_device_name() {
        let source = CpalFrameSource::new(Some("NonExistentDevice12345"));
        match source {
            Err(VocapError::DeviceNotFound { device }) => {
                assert_eq!(device, "NonExistentDevice12345");
            }
            Err(VocapError::Capture { .. }) => {
                // Acceptable on hosts where enumeration itself fails (CI).
            }
            Ok(_) => panic!("expected an error for a bogus device name"),
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn start_stop_with_default_device() {
        let mut source = CpalFrameSource::new(None).expect("Failed to create audio source");
        let (tx, mut rx) = mpsc::unbounded_channel();

        source.start(&AudioConfig::default(), tx).expect("start");
        std::thread::sleep(std::time::Duration::from_millis(200));
        source.stop().expect("stop");

        let mut saw_started = false;
        let mut saw_stopped = false;
        while let Ok(ev) = rx.try_recv() {
            match ev {
                SourceEvent::Started => saw_started = true,
                SourceEvent::Stopped => saw_stopped = true,
                _ => {}
            }
        }
        assert!(saw_started);
        assert!(saw_stopped);
    }
}
