use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU32, Ordering};
use log::debug;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use crate::media::CaptureDevice;
use crate::mixer::Mixer;
use crate::muxer::Muxer;
use crate::stream::gate::{OutputGate, OutputSink, PublishStats};
use crate::stream::machine::Request;
use crate::stream::state::PublishState;
use crate::stream::worker::{lock_core, Message, SharedCore, StreamCore, Worker};
use crate::transport::Transport;

static NEXT_STREAM_ID: AtomicU32 = AtomicU32::new(1);

/// State changes buffered for each `state_changes` receiver
const STATE_CHANGE_CAPACITY: usize = 64;

/// Publish side of one stream on a connection.
///
/// Every call returns immediately; the work happens on the stream's worker
/// task, which is the only place state changes. The stream keeps a weak
/// reference to its connection, so whoever owns the connection decides how
/// long both live. Dropping the stream (or calling [`detach`]) stops the
/// worker and its readiness observation before it returns.
///
/// Must be created from within a tokio runtime.
///
/// [`detach`]: PublishStream::detach
pub struct PublishStream {
    /// Stream ID, unique within the process
    id: u32,

    /// Requests to the worker
    sender: mpsc::UnboundedSender<Message>,

    /// Last state the worker entered
    state: watch::Receiver<PublishState>,

    /// Every state the worker enters
    steps: broadcast::Sender<PublishState>,

    /// Shared with the worker for synchronous teardown
    core: SharedCore,

    /// Shared output counters
    gate: Arc<OutputGate>,

    /// Worker task
    task: JoinHandle<()>,
}

impl PublishStream {
    /// Create a stream bound to `transport`, taking ownership of `muxer`
    pub fn new<T: Transport>(
        transport: &Arc<T>,
        mixer: Arc<dyn Mixer>,
        mut muxer: Box<dyn Muxer>,
    ) -> Self {
        let id = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);
        let gate = Arc::new(OutputGate::default());
        let (sender, receiver) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(PublishState::Initialized);
        let (steps, _) = broadcast::channel(STATE_CHANGE_CAPACITY);

        muxer.set_output(OutputSink::new(gate.clone(), sender.clone()));

        let mut readiness = transport.readiness();
        let observed = *readiness.borrow_and_update();
        let connection = Arc::downgrade(transport);

        let core = Arc::new(Mutex::new(StreamCore::new(
            id,
            observed,
            mixer,
            muxer,
            gate.clone(),
            state_tx,
            steps.clone(),
        )));
        let worker = Worker::new(id, core.clone(), gate.clone(), connection);
        let task = tokio::spawn(worker.run(receiver, readiness));

        debug!("Stream {} created, connection ready: {}", id, observed.connected);

        PublishStream {
            id,
            sender,
            state: state_rx,
            steps,
            core,
            gate,
            task,
        }
    }

    /// Get stream ID
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Start publishing under `name`, or stop an active publish with `None`.
    ///
    /// An empty name publishes under the ingest's default. If the connection
    /// is not ready yet, the request waits for it, replacing any earlier
    /// waiting request.
    pub fn publish(&self, name: Option<&str>) {
        self.send(Message::Request(Request::Publish(name.map(String::from))));
    }

    /// Shut the stream down. Repeated calls are no-ops.
    pub fn close(&self) {
        self.send(Message::Request(Request::Close));
    }

    /// Attach a camera and expect video in the output
    pub fn attach_camera(&self, device: Option<CaptureDevice>) {
        self.send(Message::AttachCamera(device));
    }

    /// Attach a microphone and expect audio in the output
    pub fn attach_audio(&self, device: Option<CaptureDevice>) {
        self.send(Message::AttachAudio(device));
    }

    /// Get current state
    pub fn state(&self) -> PublishState {
        *self.state.borrow()
    }

    /// Observe the latest state.
    ///
    /// States entered back to back, such as `PreparingPublish` on the way to
    /// `Publishing`, fold into the last one; use [`state_changes`] to see each.
    ///
    /// [`state_changes`]: PublishStream::state_changes
    pub fn subscribe_state(&self) -> watch::Receiver<PublishState> {
        self.state.clone()
    }

    /// Observe every state the worker enters from now on, in order
    pub fn state_changes(&self) -> broadcast::Receiver<PublishState> {
        self.steps.subscribe()
    }

    /// Get output counters
    pub fn stats(&self) -> PublishStats {
        self.gate.stats()
    }

    /// Stop the worker and release the muxer.
    ///
    /// An active session is stopped before this returns, and later readiness
    /// changes have no effect.
    pub fn detach(self) {
        drop(self);
    }

    fn send(&self, message: Message) {
        if self.sender.send(message).is_err() {
            debug!("Stream {} worker is gone, request ignored", self.id);
        }
    }
}

impl Drop for PublishStream {
    fn drop(&mut self) {
        lock_core(&self.core).detach();
        self.task.abort();
        debug!("Stream {} detached", self.id);
    }
}
