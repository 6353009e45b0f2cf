//! End-to-end scenarios from spec.md §8, exercised against a real `Manager`
//! with a fake `AudioPipeline` standing in for GStreamer/rodio so these
//! tests run with no audio hardware and no network.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use ttsd_config::SpeechConfig;
use ttsd_core::{ResourceAllocationPolicy, SessionEvent};
use ttsd_coordinator::Manager;
use ttsd_speaker::{AudioPipeline, PipelineError, PipelineMessage, PipelineState};

/// Reports `Eos` as soon as `play()` is called, recording every source URL
/// it was asked to fetch so tests can assert on the constructed request.
struct InstantEosPipeline {
    state: PipelineState,
    rx: mpsc::UnboundedReceiver<PipelineMessage>,
    tx: mpsc::UnboundedSender<PipelineMessage>,
    urls: Arc<Mutex<Vec<String>>>,
}

impl InstantEosPipeline {
    fn new(urls: Arc<Mutex<Vec<String>>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { state: PipelineState::Null, rx, tx, urls }
    }
}

#[async_trait]
impl AudioPipeline for InstantEosPipeline {
    async fn set_source(&mut self, url: &str) -> Result<(), PipelineError> {
        self.urls.lock().push(url.to_string());
        self.state = PipelineState::Ready;
        Ok(())
    }
    async fn play(&mut self) -> Result<(), PipelineError> {
        self.state = PipelineState::Playing;
        let _ = self.tx.send(PipelineMessage::Eos);
        Ok(())
    }
    async fn pause(&mut self) -> Result<(), PipelineError> {
        self.state = PipelineState::Paused;
        Ok(())
    }
    async fn stop(&mut self) -> Result<(), PipelineError> {
        self.state = PipelineState::Null;
        Ok(())
    }
    fn set_volume(&mut self, _volume: u8) {}
    fn state(&self) -> PipelineState {
        self.state
    }
    async fn next_message(&mut self) -> Option<PipelineMessage> {
        self.rx.recv().await
    }
}

/// Never reports EOS on its own: used for the pre-emption scenario, where
/// the in-flight item must be interrupted rather than finish naturally.
struct BlockingPipeline {
    state: PipelineState,
    rx: mpsc::UnboundedReceiver<PipelineMessage>,
    _tx: mpsc::UnboundedSender<PipelineMessage>,
}

impl BlockingPipeline {
    fn new() -> Self {
        let (_tx, rx) = mpsc::unbounded_channel();
        Self { state: PipelineState::Null, rx, _tx }
    }
}

#[async_trait]
impl AudioPipeline for BlockingPipeline {
    async fn set_source(&mut self, _url: &str) -> Result<(), PipelineError> {
        self.state = PipelineState::Ready;
        Ok(())
    }
    async fn play(&mut self) -> Result<(), PipelineError> {
        self.state = PipelineState::Playing;
        Ok(())
    }
    async fn pause(&mut self) -> Result<(), PipelineError> {
        self.state = PipelineState::Paused;
        Ok(())
    }
    async fn stop(&mut self) -> Result<(), PipelineError> {
        self.state = PipelineState::Null;
        Ok(())
    }
    fn set_volume(&mut self, _volume: u8) {}
    fn state(&self) -> PipelineState {
        self.state
    }
    async fn next_message(&mut self) -> Option<PipelineMessage> {
        self.rx.recv().await
    }
}

/// Records every source URL like [`InstantEosPipeline`], but only reports
/// `Eos` after a short delay once `play()` is called — giving tests a safe
/// window to observe the item as genuinely in-flight (`is_speaking()` true)
/// before it completes naturally.
struct DelayedEosPipeline {
    state: PipelineState,
    rx: mpsc::UnboundedReceiver<PipelineMessage>,
    tx: mpsc::UnboundedSender<PipelineMessage>,
    urls: Arc<Mutex<Vec<String>>>,
}

impl DelayedEosPipeline {
    fn new(urls: Arc<Mutex<Vec<String>>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { state: PipelineState::Null, rx, tx, urls }
    }
}

#[async_trait]
impl AudioPipeline for DelayedEosPipeline {
    async fn set_source(&mut self, url: &str) -> Result<(), PipelineError> {
        self.urls.lock().push(url.to_string());
        self.state = PipelineState::Ready;
        Ok(())
    }
    async fn play(&mut self) -> Result<(), PipelineError> {
        self.state = PipelineState::Playing;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            let _ = tx.send(PipelineMessage::Eos);
        });
        Ok(())
    }
    async fn pause(&mut self) -> Result<(), PipelineError> {
        self.state = PipelineState::Paused;
        Ok(())
    }
    async fn stop(&mut self) -> Result<(), PipelineError> {
        self.state = PipelineState::Null;
        Ok(())
    }
    fn set_volume(&mut self, _volume: u8) {}
    fn state(&self) -> PipelineState {
        self.state
    }
    async fn next_message(&mut self) -> Option<PipelineMessage> {
        self.rx.recv().await
    }
}

async fn drain_until<F>(rx: &mut mpsc::Receiver<SessionEvent>, mut matches: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    loop {
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event stream closed unexpectedly");
        if matches(&event) {
            return event;
        }
    }
}

/// S1: configure, enable, reserve, speak — expect the URL to carry every
/// resolved synthesis parameter and `started` then `spoke` to fire in order.
#[tokio::test]
async fn s1_configure_speak_spoke() {
    let urls = Arc::new(Mutex::new(Vec::new()));
    let mut config = SpeechConfig::default();
    config.endpoint = "http://tts/?".to_string();
    config.voice = "amy".to_string();
    config.language = "en-US".to_string();
    config.volume = 60;
    config.rate = 50;

    let manager = Manager::new(
        ResourceAllocationPolicy::Reservation,
        config,
        Box::new(InstantEosPipeline::new(urls.clone())),
    );

    manager.enable_tts(true);
    let session = manager.create_session(42, "app".to_string()).unwrap();
    manager.reserve_resource(42).unwrap();

    let (_id, mut events) = session.subscribe();
    manager.speak(session.session_id(), 7, "hello.".to_string(), false).await.unwrap();

    let started = drain_until(&mut events, |e| matches!(e, SessionEvent::Started { .. })).await;
    assert!(matches!(started, SessionEvent::Started { speech_id: 7, ref text } if text == "hello."));

    let spoke = drain_until(&mut events, |e| matches!(e, SessionEvent::Spoke { .. })).await;
    assert!(matches!(spoke, SessionEvent::Spoke { speech_id: 7, ref text } if text == "hello."));

    tokio::time::sleep(Duration::from_millis(20)).await;
    let recorded = urls.lock().clone();
    assert_eq!(recorded.len(), 1);
    assert!(recorded[0].contains("voice=amy&language=en-US&rate=50&text=hello."));
}

/// S2: a preemptive session speaking a second item interrupts the first and
/// starts the second within one scheduling cycle.
#[tokio::test]
async fn s2_preemptive_speak_interrupts_in_flight_item() {
    let mut config = SpeechConfig::default();
    config.endpoint = "http://tts/?".to_string();
    config.preemptive = true;

    let manager = Manager::new(ResourceAllocationPolicy::Reservation, config, Box::new(BlockingPipeline::new()));
    manager.enable_tts(true);
    let session = manager.create_session(1, "app".to_string()).unwrap();
    manager.reserve_resource(1).unwrap();

    let (_id, mut events) = session.subscribe();
    let mut mask = ttsd_core::ExtendedEvents::NONE;
    mask.insert(ttsd_core::ExtendedEvents::INTERRUPTED);
    mask.insert(ttsd_core::ExtendedEvents::CANCELLED);
    session.set_extended_events(mask);

    manager.speak(session.session_id(), 8, "first".to_string(), false).await.unwrap();
    drain_until(&mut events, |e| matches!(e, SessionEvent::Started { speech_id: 8, .. })).await;

    manager.speak(session.session_id(), 9, "second".to_string(), false).await.unwrap();

    let interrupted = drain_until(&mut events, |e| matches!(e, SessionEvent::Interrupted { .. })).await;
    assert!(matches!(interrupted, SessionEvent::Interrupted { speech_id: 8 }));

    let started_second = drain_until(&mut events, |e| matches!(e, SessionEvent::Started { .. })).await;
    assert!(matches!(started_second, SessionEvent::Started { speech_id: 9, .. }));
}

/// S3: claim overrides a reservation and hands the speaker to the claiming
/// app; releasing the claim restores the original reservation.
#[tokio::test]
async fn s3_claim_override_and_release_restores_reservation() {
    let mut config = SpeechConfig::default();
    config.endpoint = "http://tts/?".to_string();
    let urls = Arc::new(Mutex::new(Vec::new()));
    let manager = Manager::new(
        ResourceAllocationPolicy::Reservation,
        config,
        Box::new(InstantEosPipeline::new(urls)),
    );
    manager.enable_tts(true);

    let a = manager.create_session(1, "a".to_string()).unwrap();
    let b = manager.create_session(2, "b".to_string()).unwrap();
    manager.reserve_resource(1).unwrap();
    assert!(a.is_active());

    let (_a_id, mut a_events) = a.subscribe();
    let (_b_id, mut b_events) = b.subscribe();

    manager.claim_resource(2).unwrap();
    drain_until(&mut a_events, |e| matches!(e, SessionEvent::ResourceReleased { .. })).await;
    drain_until(&mut b_events, |e| matches!(e, SessionEvent::ResourceAcquired { .. })).await;
    assert!(!a.is_active());
    assert!(b.is_active());

    manager.release_resource(2).unwrap();
    drain_until(&mut b_events, |e| matches!(e, SessionEvent::ResourceReleased { .. })).await;
    drain_until(&mut a_events, |e| matches!(e, SessionEvent::ResourceAcquired { .. })).await;
    assert!(a.is_active());
    assert!(!b.is_active());
}

/// S6: self-claim collapses the claim into the existing reservation; a
/// later release of that same app clears the reservation outright.
#[tokio::test]
async fn s6_self_claim_collapses_then_release_clears_reservation() {
    let mut config = SpeechConfig::default();
    config.endpoint = "http://tts/?".to_string();
    let urls = Arc::new(Mutex::new(Vec::new()));
    let manager = Manager::new(
        ResourceAllocationPolicy::Reservation,
        config,
        Box::new(InstantEosPipeline::new(urls)),
    );
    manager.enable_tts(true);

    let a = manager.create_session(5, "a".to_string()).unwrap();
    manager.reserve_resource(5).unwrap();
    assert!(a.is_active());

    manager.claim_resource(5).unwrap();
    assert!(a.is_active(), "self-claim must not toggle activeness");

    manager.release_resource(5).unwrap();
    assert!(!a.is_active());
    // The reservation is gone too, not just the collapsed claim: a fresh
    // app can reserve without RESOURCE_BUSY.
    manager.create_session(6, "c".to_string()).unwrap();
    manager.reserve_resource(6).unwrap();
}

/// §8 property 3: speaking while TTS is disabled fails fast and emits
/// nothing observable on the session's event stream.
#[tokio::test]
async fn speak_while_disabled_emits_no_events() {
    let mut config = SpeechConfig::default();
    config.endpoint = "http://tts/?".to_string();
    let urls = Arc::new(Mutex::new(Vec::new()));
    let manager = Manager::new(
        ResourceAllocationPolicy::Reservation,
        config,
        Box::new(InstantEosPipeline::new(urls)),
    );

    let session = manager.create_session(1, "app".to_string()).unwrap();
    manager.reserve_resource(1).unwrap();
    let (_id, mut events) = session.subscribe();

    let err = manager.speak(session.session_id(), 1, "hi".to_string(), false).await.unwrap_err();
    assert_eq!(err, ttsd_core::TtsError::NotEnabled);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(events.try_recv().is_err());
}

/// §8 property 8: a `setConfiguration` issued while the caller's own item
/// is in flight must not change the URL for that item — it only takes
/// effect after `spoke`.
#[tokio::test]
async fn configuration_change_mid_speech_is_deferred() {
    let urls = Arc::new(Mutex::new(Vec::new()));
    let mut config = SpeechConfig::default();
    config.endpoint = "http://tts/?".to_string();
    config.voice = "amy".to_string();

    let manager = Manager::new(
        ResourceAllocationPolicy::Reservation,
        config,
        Box::new(DelayedEosPipeline::new(urls.clone())),
    );
    manager.enable_tts(true);
    let session = manager.create_session(1, "app".to_string()).unwrap();
    manager.reserve_resource(1).unwrap();
    let (_id, mut events) = session.subscribe();

    manager.speak(session.session_id(), 1, "hi".to_string(), false).await.unwrap();
    drain_until(&mut events, |e| matches!(e, SessionEvent::Started { .. })).await;

    // Wait until the item is genuinely in-flight before changing
    // configuration, so the update is guaranteed to defer rather than race
    // the speaker's own transition into "speaking".
    for _ in 0..200 {
        if session.is_speaking() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(session.is_speaking(), "item never became in-flight");

    let mut patch = ttsd_config::SpeechConfigPatch::default();
    patch.voice = Some("carol".to_string());
    manager.set_session_configuration(session.session_id(), patch).unwrap();
    // Not yet applied — the item hasn't finished.
    assert_eq!(session.configuration().voice, "amy");

    drain_until(&mut events, |e| matches!(e, SessionEvent::Spoke { .. })).await;

    let recorded = urls.lock().clone();
    assert_eq!(recorded.len(), 1);
    assert!(recorded[0].contains("voice=amy"));
    assert_eq!(session.configuration().voice, "carol");
}
