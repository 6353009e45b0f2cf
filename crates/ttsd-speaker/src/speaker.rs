use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};
use ttsd_config::SpeechConfig;
use ttsd_core::{SpeechItem, SpeechState};

use crate::client::SpeakerClient;
use crate::pipeline::{AudioPipeline, PipelineMessage};
use crate::url::construct_url;

/// How long the worker waits for an EOS/error bus message before giving up
/// on a single speech and moving on, matching
/// `waitForAudioToFinishTimeout`'s 60 second ceiling.
const EOS_TIMEOUT: Duration = Duration::from_secs(60);

struct SpeechRequest {
    session_id: u32,
    speech_id: u32,
    text: String,
    secure: bool,
    client: Arc<dyn SpeakerClient>,
    /// Snapshot of the owning session's effective configuration, taken at
    /// `speak()` time. Building the URL from this snapshot rather than a
    /// shared live configuration is what makes a mid-utterance
    /// `setConfiguration` land only on the *next* speech, matching
    /// `TTSSession::setConfiguration`'s deferred-apply contract.
    config: SpeechConfig,
}

struct CurrentSpeech {
    session_id: u32,
    speech_id: u32,
    paused: bool,
}

enum Control {
    Pause(u32),
    Resume(u32),
    AbortCurrent,
    AbortCurrentIfSession(u32),
}

struct Inner {
    queue: Mutex<VecDeque<SpeechRequest>>,
    current: Mutex<Option<CurrentSpeech>>,
    wake: Notify,
    control_tx: mpsc::UnboundedSender<Control>,
}

/// The single worker that owns the audio pipeline and drains a FIFO queue
/// of speech requests one at a time. Cloning a `Speaker` handle shares the
/// same queue and worker task.
#[derive(Clone)]
pub struct Speaker {
    inner: Arc<Inner>,
}

impl Speaker {
    /// Spawn the worker task driving `pipeline`. The pipeline is shared by
    /// every session that holds this `Speaker` handle; each queued request
    /// carries its own configuration snapshot, so callers never need to
    /// hand the speaker a live, mutable default.
    pub fn spawn(pipeline: Box<dyn AudioPipeline>) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            queue: Mutex::new(VecDeque::new()),
            current: Mutex::new(None),
            wake: Notify::new(),
            control_tx,
        });

        let worker_inner = inner.clone();
        tokio::spawn(async move { run(worker_inner, pipeline, control_rx).await });

        Self { inner }
    }

    /// Queue a speech. If `preemptive` is set, first flushes every other
    /// pending speech and aborts whatever is currently playing — the
    /// engine's "pre-emptive speak" behavior.
    pub async fn speak(
        &self,
        client: Arc<dyn SpeakerClient>,
        session_id: u32,
        speech_id: u32,
        text: String,
        secure: bool,
        config: SpeechConfig,
    ) {
        if config.preemptive {
            self.flush_and_abort().await;
        }

        self.inner.queue.lock().push_back(SpeechRequest {
            session_id,
            speech_id,
            text,
            secure,
            client,
            config,
        });
        self.inner.wake.notify_one();
    }

    /// Drop every pending speech and abort the current one, regardless of
    /// owner. Used both by pre-emptive speak and by an explicit reset.
    pub async fn flush_and_abort(&self) {
        self.cancel_queue(|_| true).await;
        let _ = self.inner.control_tx.send(Control::AbortCurrent);
    }

    /// Cancel every speech (queued or in-flight) belonging to `session_id`,
    /// the way a session shut down or destroyed mid-speech does.
    pub async fn clear_all_from(&self, session_id: u32) {
        self.cancel_queue(|r| r.session_id == session_id).await;
        let _ = self
            .inner
            .control_tx
            .send(Control::AbortCurrentIfSession(session_id));
    }

    async fn cancel_queue(&self, matches: impl Fn(&SpeechRequest) -> bool) {
        let drained: Vec<SpeechRequest> = {
            let mut queue = self.inner.queue.lock();
            let (keep, drop): (VecDeque<_>, VecDeque<_>) =
                queue.drain(..).partition(|r| !matches(r));
            *queue = keep;
            drop.into_iter().collect()
        };

        let mut by_session: HashMap<u32, (Arc<dyn SpeakerClient>, Vec<u32>)> = HashMap::new();
        for req in drained {
            by_session
                .entry(req.session_id)
                .or_insert_with(|| (req.client.clone(), Vec::new()))
                .1
                .push(req.speech_id);
        }
        for (client, ids) in by_session.into_values() {
            client.cancelled(ids).await;
        }
    }

    /// `id == 0` pauses whatever is currently speaking; a nonzero `id`
    /// only pauses if it matches the in-flight speech.
    pub fn pause(&self, id: u32) {
        let _ = self.inner.control_tx.send(Control::Pause(id));
    }

    pub fn resume(&self, id: u32) {
        let _ = self.inner.control_tx.send(Control::Resume(id));
    }

    pub fn speech_state(&self, session_id: u32, speech_id: u32) -> SpeechState {
        if let Some(current) = self.inner.current.lock().as_ref() {
            if current.session_id == session_id && current.speech_id == speech_id {
                return if current.paused {
                    SpeechState::Paused
                } else {
                    SpeechState::Speaking
                };
            }
        }
        if self
            .inner
            .queue
            .lock()
            .iter()
            .any(|r| r.session_id == session_id && r.speech_id == speech_id)
        {
            return SpeechState::Pending;
        }
        SpeechState::None
    }

    pub fn is_speaking(&self, session_id: Option<u32>) -> bool {
        match (self.inner.current.lock().as_ref(), session_id) {
            (Some(_), None) => true,
            (Some(c), Some(id)) => c.session_id == id,
            (None, _) => false,
        }
    }
}

enum Outcome {
    Eos,
    Error(String),
    Timeout,
    Aborted,
}

async fn run_current_speech(
    pipeline: &mut dyn AudioPipeline,
    control_rx: &mut mpsc::UnboundedReceiver<Control>,
    inner: &Inner,
    request: &SpeechRequest,
) -> Outcome {
    let deadline = Instant::now() + EOS_TIMEOUT;

    loop {
        let paused = inner
            .current
            .lock()
            .as_ref()
            .map(|c| c.paused)
            .unwrap_or(false);

        tokio::select! {
            ctrl = control_rx.recv() => {
                match ctrl {
                    Some(Control::Pause(id)) if id == 0 || id == request.speech_id => {
                        let _ = pipeline.pause().await;
                        if let Some(c) = inner.current.lock().as_mut() { c.paused = true; }
                        request.client.paused(request.speech_id).await;
                    }
                    Some(Control::Resume(id)) if id == 0 || id == request.speech_id => {
                        let _ = pipeline.play().await;
                        if let Some(c) = inner.current.lock().as_mut() { c.paused = false; }
                        request.client.resumed(request.speech_id).await;
                    }
                    Some(Control::AbortCurrent) => return Outcome::Aborted,
                    Some(Control::AbortCurrentIfSession(sid)) if sid == request.session_id => {
                        return Outcome::Aborted;
                    }
                    Some(_) => {}
                    None => {}
                }
            }
            msg = pipeline.next_message() => {
                match msg {
                    Some(PipelineMessage::Eos) => return Outcome::Eos,
                    Some(PipelineMessage::Error(e)) => return Outcome::Error(e),
                    Some(PipelineMessage::Warning(w)) => warn!(warning = %w, "pipeline warning"),
                    Some(PipelineMessage::StateChanged(_)) => {}
                    None => return Outcome::Error("pipeline closed unexpectedly".to_string()),
                }
            }
            _ = tokio::time::sleep_until(deadline), if !paused => {
                return Outcome::Timeout;
            }
        }
    }
}

async fn run(
    inner: Arc<Inner>,
    mut pipeline: Box<dyn AudioPipeline>,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
) {
    loop {
        let next = inner.queue.lock().pop_front();
        let request = match next {
            Some(r) => r,
            None => {
                inner.wake.notified().await;
                continue;
            }
        };

        request.client.will_speak(request.speech_id, &request.text).await;
        *inner.current.lock() = Some(CurrentSpeech {
            session_id: request.session_id,
            speech_id: request.speech_id,
            paused: false,
        });

        let item = SpeechItem::new(
            request.session_id,
            request.speech_id,
            request.text.clone(),
            request.secure,
        );
        let url = construct_url(&request.config, &item);

        if let Err(e) = pipeline.set_source(&url).await {
            debug!(error = %e, "failed to set audio source");
            request.client.network_error(request.speech_id).await;
            *inner.current.lock() = None;
            continue;
        }
        if let Err(e) = pipeline.play().await {
            debug!(error = %e, "failed to start playback");
            request.client.playback_error(request.speech_id).await;
            *inner.current.lock() = None;
            continue;
        }

        let outcome = run_current_speech(&mut *pipeline, &mut control_rx, &inner, &request).await;
        let _ = pipeline.stop().await;

        match outcome {
            Outcome::Eos => request.client.spoke(request.speech_id, &request.text).await,
            Outcome::Error(e) => {
                warn!(error = %e, speech_id = request.speech_id, "playback error");
                request.client.playback_error(request.speech_id).await;
            }
            Outcome::Timeout => {
                warn!(speech_id = request.speech_id, "timed out waiting for audio to finish");
                request.client.playback_error(request.speech_id).await;
            }
            Outcome::Aborted => request.client.interrupted(request.speech_id).await,
        }

        *inner.current.lock() = None;
    }
}
