use async_trait::async_trait;
use thiserror::Error;

/// Playback state of an [`AudioPipeline`], mirroring the GStreamer states
/// the engine drives its pipeline through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Null,
    Ready,
    Paused,
    Playing,
}

/// Bus messages a pipeline emits asynchronously while playing.
#[derive(Debug, Clone)]
pub enum PipelineMessage {
    Eos,
    Error(String),
    Warning(String),
    StateChanged(PipelineState),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to fetch audio source: {0}")]
    Fetch(String),
    #[error("failed to decode audio: {0}")]
    Decode(String),
    #[error("playback device error: {0}")]
    Playback(String),
}

/// The narrow interface the Speaker Engine drives. `HttpAudioPipeline` is
/// the only implementation shipped, but callers are free to swap in a
/// native GStreamer binding or a mock for tests without touching the
/// Speaker worker loop itself.
#[async_trait]
pub trait AudioPipeline: Send {
    /// Tear down any prior source and prepare to play `url`, transitioning
    /// to `Ready`.
    async fn set_source(&mut self, url: &str) -> Result<(), PipelineError>;

    /// Begin or resume playback, transitioning to `Playing`.
    async fn play(&mut self) -> Result<(), PipelineError>;

    /// Pause playback, transitioning to `Paused`. No-op if not playing.
    async fn pause(&mut self) -> Result<(), PipelineError>;

    /// Stop playback and release the source, transitioning to `Null`.
    async fn stop(&mut self) -> Result<(), PipelineError>;

    /// 0-100 volume, matching [`ttsd_config::SpeechConfig::volume`].
    fn set_volume(&mut self, volume: u8);

    fn state(&self) -> PipelineState;

    /// Receive the next bus message, or `None` once the pipeline has been
    /// dropped with nothing left to report.
    async fn next_message(&mut self) -> Option<PipelineMessage>;
}
