use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

/// Capacity of a listener's mailbox before it's considered "hanging" and
/// individual events start getting dropped for it (it is never removed for
/// being slow — only a closed channel removes a listener).
const DEFAULT_LISTENER_CAPACITY: usize = 64;

struct ListenerState<E> {
    listeners: HashMap<u64, mpsc::Sender<E>>,
    next_id: u64,
    dispatching: bool,
    pending_adds: Vec<(u64, mpsc::Sender<E>)>,
    pending_removes: Vec<u64>,
}

impl<E> Default for ListenerState<E> {
    fn default() -> Self {
        Self {
            listeners: HashMap::new(),
            next_id: 1,
            dispatching: false,
            pending_adds: Vec::new(),
            pending_removes: Vec::new(),
        }
    }
}

/// Per-source FIFO event queue drained by a single dispatcher task, shared
/// by `Session` and the Manager. Listener add/remove requests made while a
/// dispatch is in progress (i.e. from inside a listener's own handling of
/// an event) are queued and applied once the current drain finishes,
/// mirroring `Emit::addListenerOrQueue`/`delListenerOrQueue`.
pub struct EventSource<E: Clone + Send + 'static> {
    state: Arc<Mutex<ListenerState<E>>>,
    event_tx: mpsc::UnboundedSender<E>,
}

impl<E: Clone + Send + 'static> EventSource<E> {
    pub fn new() -> Self {
        let state = Arc::new(Mutex::new(ListenerState::default()));
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<E>();

        let dispatch_state = state.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                dispatch(&dispatch_state, event).await;
            }
        });

        Self { state, event_tx }
    }

    /// Enqueue an event for delivery; never blocks the caller.
    pub fn send_event(&self, event: E) {
        let _ = self.event_tx.send(event);
    }

    /// Register a new listener, returning an id (for `remove_listener`) and
    /// the receiving half of its mailbox.
    pub fn add_listener(&self) -> (u64, mpsc::Receiver<E>) {
        self.add_listener_with_capacity(DEFAULT_LISTENER_CAPACITY)
    }

    pub fn add_listener_with_capacity(&self, capacity: usize) -> (u64, mpsc::Receiver<E>) {
        let (tx, rx) = mpsc::channel(capacity);
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        if state.dispatching {
            state.pending_adds.push((id, tx));
        } else {
            state.listeners.insert(id, tx);
        }
        (id, rx)
    }

    /// Immediate removal, used both for a normal unsubscribe and for the
    /// "object destroyed" sentinel (a listener that wants to stop
    /// receiving events right away, even mid-dispatch).
    pub fn remove_listener(&self, id: u64) {
        let mut state = self.state.lock();
        if state.dispatching {
            state.pending_removes.push(id);
        } else {
            state.listeners.remove(&id);
        }
    }

    /// Drop every listener, e.g. when the owning session/manager is torn
    /// down.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.listeners.clear();
        state.pending_adds.clear();
        state.pending_removes.clear();
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }
}

impl<E: Clone + Send + 'static> Default for EventSource<E> {
    fn default() -> Self {
        Self::new()
    }
}

async fn dispatch<E: Clone + Send + 'static>(state: &Arc<Mutex<ListenerState<E>>>, event: E) {
    let listeners: Vec<(u64, mpsc::Sender<E>)> = {
        let mut locked = state.lock();
        locked.dispatching = true;
        locked
            .listeners
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect()
    };

    let mut broken = Vec::new();
    for (id, tx) in listeners {
        match tx.try_send(event.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(listener_id = id, "listener is hanging, dropping event for it");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                broken.push(id);
            }
        }
    }

    let mut locked = state.lock();
    locked.dispatching = false;
    for id in broken {
        locked.listeners.remove(&id);
    }
    let removes: Vec<u64> = locked.pending_removes.drain(..).collect();
    for id in removes {
        locked.listeners.remove(&id);
    }
    let adds: Vec<(u64, mpsc::Sender<E>)> = locked.pending_adds.drain(..).collect();
    for (id, tx) in adds {
        locked.listeners.insert(id, tx);
    }
}
