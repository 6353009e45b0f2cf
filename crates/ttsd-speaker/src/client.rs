use async_trait::async_trait;

/// Callbacks the Speaker Engine drives as a queued speech moves through its
/// lifecycle. A `Session` is the only implementor in this workspace, but the
/// trait keeps the Speaker decoupled from the coordinator crate.
#[async_trait]
pub trait SpeakerClient: Send + Sync {
    async fn will_speak(&self, speech_id: u32, text: &str);
    async fn spoke(&self, speech_id: u32, text: &str);
    async fn paused(&self, speech_id: u32);
    async fn resumed(&self, speech_id: u32);
    async fn cancelled(&self, speech_ids: Vec<u32>);
    async fn interrupted(&self, speech_id: u32);
    async fn network_error(&self, speech_id: u32);
    async fn playback_error(&self, speech_id: u32);
}
