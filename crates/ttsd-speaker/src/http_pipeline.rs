use std::io::Cursor;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::warn;

use crate::pipeline::{AudioPipeline, PipelineError, PipelineMessage, PipelineState};

enum Command {
    Load(bytes::Bytes, u8),
    Play,
    Pause,
    Stop,
    Volume(u8),
}

const EOS_POLL_INTERVAL: Duration = Duration::from_millis(100);
const IDLE_TIMEOUT: Duration = Duration::from_secs(3600);

/// Default [`AudioPipeline`]: fetches synthesized audio over HTTP with
/// `reqwest`, decodes it with `symphonia` (via `rodio`'s bundled decoder),
/// and plays it through the host's default output device via `rodio`.
///
/// Decode and playback run on a dedicated OS thread because `rodio`'s
/// output stream handle isn't `Send`; the async methods here only do the
/// network fetch and hand bytes across a channel.
pub struct HttpAudioPipeline {
    http: reqwest::Client,
    state: PipelineState,
    volume: u8,
    cmd_tx: std::sync::mpsc::Sender<Command>,
    msg_rx: tokio_mpsc::UnboundedReceiver<PipelineMessage>,
    _worker: std::thread::JoinHandle<()>,
}

impl HttpAudioPipeline {
    pub fn new() -> Self {
        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel::<Command>();
        let (msg_tx, msg_rx) = tokio_mpsc::unbounded_channel();

        let worker = std::thread::Builder::new()
            .name("ttsd-audio-playback".into())
            .spawn(move || playback_thread(cmd_rx, msg_tx))
            .expect("spawn audio playback thread");

        Self {
            http: reqwest::Client::new(),
            state: PipelineState::Null,
            volume: 100,
            cmd_tx,
            msg_rx,
            _worker: worker,
        }
    }
}

impl Default for HttpAudioPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioPipeline for HttpAudioPipeline {
    async fn set_source(&mut self, url: &str) -> Result<(), PipelineError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::Fetch(e.to_string()))?;
        let response = response
            .error_for_status()
            .map_err(|e| PipelineError::Fetch(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::Fetch(e.to_string()))?;

        self.cmd_tx
            .send(Command::Load(bytes, self.volume))
            .map_err(|_| PipelineError::Playback("audio thread gone".into()))?;
        self.state = PipelineState::Ready;
        Ok(())
    }

    async fn play(&mut self) -> Result<(), PipelineError> {
        self.cmd_tx
            .send(Command::Play)
            .map_err(|_| PipelineError::Playback("audio thread gone".into()))?;
        self.state = PipelineState::Playing;
        Ok(())
    }

    async fn pause(&mut self) -> Result<(), PipelineError> {
        if self.state != PipelineState::Playing {
            return Ok(());
        }
        self.cmd_tx
            .send(Command::Pause)
            .map_err(|_| PipelineError::Playback("audio thread gone".into()))?;
        self.state = PipelineState::Paused;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), PipelineError> {
        self.cmd_tx
            .send(Command::Stop)
            .map_err(|_| PipelineError::Playback("audio thread gone".into()))?;
        self.state = PipelineState::Null;
        Ok(())
    }

    fn set_volume(&mut self, volume: u8) {
        self.volume = volume;
        let _ = self.cmd_tx.send(Command::Volume(volume));
    }

    fn state(&self) -> PipelineState {
        self.state
    }

    async fn next_message(&mut self) -> Option<PipelineMessage> {
        self.msg_rx.recv().await
    }
}

fn playback_thread(
    cmd_rx: std::sync::mpsc::Receiver<Command>,
    msg_tx: tokio_mpsc::UnboundedSender<PipelineMessage>,
) {
    let mut stream_handle: Option<(rodio::OutputStream, rodio::OutputStreamHandle)> = None;
    let mut sink: Option<rodio::Sink> = None;
    let mut playing = false;

    loop {
        let timeout = if playing { EOS_POLL_INTERVAL } else { IDLE_TIMEOUT };
        match cmd_rx.recv_timeout(timeout) {
            Ok(Command::Load(bytes, volume)) => {
                if stream_handle.is_none() {
                    match rodio::OutputStream::try_default() {
                        Ok(handle) => stream_handle = Some(handle),
                        Err(e) => {
                            let _ = msg_tx.send(PipelineMessage::Error(format!(
                                "no audio output device: {e}"
                            )));
                            continue;
                        }
                    }
                }
                let (_, handle) = stream_handle.as_ref().expect("checked above");

                match rodio::Decoder::new(Cursor::new(bytes)) {
                    Ok(decoder) => match rodio::Sink::try_new(handle) {
                        Ok(new_sink) => {
                            new_sink.set_volume(volume as f32 / 100.0);
                            new_sink.append(decoder);
                            new_sink.pause();
                            sink = Some(new_sink);
                            playing = false;
                            let _ = msg_tx
                                .send(PipelineMessage::StateChanged(PipelineState::Ready));
                        }
                        Err(e) => {
                            let _ = msg_tx.send(PipelineMessage::Error(e.to_string()));
                        }
                    },
                    Err(e) => {
                        let _ = msg_tx
                            .send(PipelineMessage::Error(format!("decode failed: {e}")));
                    }
                }
            }
            Ok(Command::Play) => {
                if let Some(active) = &sink {
                    active.play();
                    playing = true;
                    let _ = msg_tx
                        .send(PipelineMessage::StateChanged(PipelineState::Playing));
                } else {
                    warn!("play requested with no source loaded");
                }
            }
            Ok(Command::Pause) => {
                if let Some(active) = &sink {
                    active.pause();
                }
                playing = false;
                let _ = msg_tx.send(PipelineMessage::StateChanged(PipelineState::Paused));
            }
            Ok(Command::Stop) => {
                if let Some(active) = sink.take() {
                    active.stop();
                }
                playing = false;
                let _ = msg_tx.send(PipelineMessage::StateChanged(PipelineState::Null));
            }
            Ok(Command::Volume(v)) => {
                if let Some(active) = &sink {
                    active.set_volume(v as f32 / 100.0);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if playing {
                    if let Some(active) = &sink {
                        if active.empty() {
                            playing = false;
                            let _ = msg_tx.send(PipelineMessage::Eos);
                        }
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
