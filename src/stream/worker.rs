use std::sync::{Arc, Mutex, MutexGuard, Weak};
use bytes::Bytes;
use log::{debug, info, trace, warn};
use tokio::sync::{broadcast, mpsc, watch};
use crate::media::{CaptureDevice, MediaKind};
use crate::mixer::Mixer;
use crate::muxer::Muxer;
use crate::stream::gate::{total_len, OutputGate};
use crate::stream::machine::{Effect, Event, PublishMachine, Request, Step, PUBLISH_EXIT_EFFECTS};
use crate::stream::state::PublishState;
use crate::transport::{Readiness, Transport};

/// Everything the worker serializes: application calls and muxer output
#[derive(Debug)]
pub(crate) enum Message {
    Request(Request),
    AttachCamera(Option<CaptureDevice>),
    AttachAudio(Option<CaptureDevice>),
    Output { session: u64, parts: Vec<Bytes> },
}

enum Input {
    Message(Option<Message>),
    Readiness(Option<Readiness>),
}

/// State machine, collaborators and gate of one stream.
///
/// The worker task drives it; the stream handle reaches it directly only to
/// detach, which has to finish before the handle is gone.
pub(crate) struct StreamCore {
    id: u32,
    machine: PublishMachine,
    observed: Readiness,
    mixer: Arc<dyn Mixer>,
    muxer: Box<dyn Muxer>,
    gate: Arc<OutputGate>,
    state_tx: watch::Sender<PublishState>,
    steps_tx: broadcast::Sender<PublishState>,
    detached: bool,
}

pub(crate) type SharedCore = Arc<Mutex<StreamCore>>;

pub(crate) fn lock_core(core: &Mutex<StreamCore>) -> MutexGuard<'_, StreamCore> {
    core.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl StreamCore {
    pub(crate) fn new(
        id: u32,
        observed: Readiness,
        mixer: Arc<dyn Mixer>,
        muxer: Box<dyn Muxer>,
        gate: Arc<OutputGate>,
        state_tx: watch::Sender<PublishState>,
        steps_tx: broadcast::Sender<PublishState>,
    ) -> Self {
        StreamCore {
            id,
            machine: PublishMachine::new(observed.connected),
            observed,
            mixer,
            muxer,
            gate,
            state_tx,
            steps_tx,
            detached: false,
        }
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.detached
    }

    /// Handle one message, returning output that should go to the connection
    fn on_message(&mut self, message: Message) -> Option<Vec<Bytes>> {
        match message {
            Message::Output { session, parts } => return self.take_output(session, parts),
            _ if self.detached => {}
            Message::Request(request) => {
                let steps = self.machine.handle(Event::Request(request));
                self.apply(steps);
            }
            Message::AttachCamera(device) => {
                self.muxer.expect_media(MediaKind::Video);
                if let Err(e) = self.mixer.attach_camera(device) {
                    warn!("Stream {}: camera attach failed: {}", self.id, e);
                }
            }
            Message::AttachAudio(device) => {
                self.muxer.expect_media(MediaKind::Audio);
                if let Err(e) = self.mixer.attach_audio(device) {
                    warn!("Stream {}: audio attach failed: {}", self.id, e);
                }
            }
        }
        None
    }

    fn on_readiness(&mut self, current: Readiness) {
        if self.detached {
            return;
        }

        let events = readiness_events(&self.observed, &current);
        if events.len() > 1 {
            debug!("Stream {}: replaying {} missed readiness flips", self.id, current.flips_since(&self.observed));
        }
        self.observed = current;

        for event in events {
            let steps = self.machine.handle(event);
            self.apply(steps);
        }
    }

    fn on_readiness_closed(&mut self) {
        if self.detached {
            return;
        }
        let steps = self.machine.handle(Event::Disconnected);
        self.apply(steps);
    }

    /// Chunk parts to send, if `session` is still the one publishing
    fn take_output(&mut self, session: u64, parts: Vec<Bytes>) -> Option<Vec<Bytes>> {
        let live = !self.detached
            && self.machine.state().is_publishing()
            && self.machine.session() == session;

        if !live {
            let len = total_len(&parts);
            trace!("Stream {}: dropping {} byte chunk from session {}", self.id, len, session);
            self.gate.record_dropped(len);
            return None;
        }

        Some(parts)
    }

    /// Stop reacting to anything and balance a live session
    pub(crate) fn detach(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        self.gate.close();

        if self.machine.state().is_publishing() {
            debug!("Stream {}: detached while publishing, stopping", self.id);
            for effect in PUBLISH_EXIT_EFFECTS {
                self.run_effect(effect);
            }
        }
    }

    fn apply(&mut self, steps: Vec<Step>) {
        for step in steps {
            self.enter(step.state);
            for effect in step.effects {
                self.run_effect(effect);
            }
        }
    }

    fn enter(&mut self, state: PublishState) {
        if state.is_publishing() {
            self.gate.open(self.machine.session());
            info!(
                "Stream {}: publishing '{}'",
                self.id,
                self.machine.stream_name().unwrap_or_default()
            );
        } else {
            self.gate.close();
            debug!("Stream {}: {}", self.id, state);
        }
        self.state_tx.send_replace(state);
        // No subscribers is fine
        let _ = self.steps_tx.send(state);
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::StartEncoding => self.mixer.start_encoding(self.muxer.sample_writer()),
            Effect::StartMixer => self.mixer.start_running(),
            Effect::StartMuxer => self.muxer.start_running(),
            Effect::StopMuxer => {
                if self.muxer.is_running() {
                    self.muxer.stop_running();
                } else {
                    warn!("Stream {}: muxer already stopped", self.id);
                }
            }
            Effect::StopEncoding => self.mixer.stop_encoding(),
        }
    }
}

/// Events that take the machine from `previous` to `current`, including a
/// round trip the watch channel folded into one value
fn readiness_events(previous: &Readiness, current: &Readiness) -> Vec<Event> {
    let event = |connected| if connected { Event::Connected } else { Event::Disconnected };
    let same = previous.connected == current.connected;

    match current.flips_since(previous) {
        0 if same => Vec::new(),
        _ if !same => vec![event(current.connected)],
        _ => vec![event(!current.connected), event(current.connected)],
    }
}

/// Task side of a stream: waits on requests, output and readiness
pub(crate) struct Worker {
    id: u32,
    core: SharedCore,
    gate: Arc<OutputGate>,
    transport: Weak<dyn Transport>,
}

impl Worker {
    pub(crate) fn new(id: u32, core: SharedCore, gate: Arc<OutputGate>, transport: Weak<dyn Transport>) -> Self {
        Worker {
            id,
            core,
            gate,
            transport,
        }
    }

    pub(crate) async fn run(
        self,
        mut messages: mpsc::UnboundedReceiver<Message>,
        readiness: watch::Receiver<Readiness>,
    ) {
        let mut readiness = Some(readiness);

        loop {
            let input = tokio::select! {
                message = messages.recv() => Input::Message(message),
                current = next_readiness(&mut readiness) => Input::Readiness(current),
            };

            match input {
                Input::Message(Some(message)) => {
                    let outgoing = self.lock().on_message(message);
                    if let Some(parts) = outgoing {
                        self.send(parts).await;
                    }
                }
                Input::Message(None) => break,
                Input::Readiness(Some(current)) => {
                    self.lock().on_readiness(current);
                }
                Input::Readiness(None) => {
                    debug!("Stream {}: connection dropped its readiness signal", self.id);
                    readiness = None;
                    self.lock().on_readiness_closed();
                }
            }

            if self.lock().is_detached() {
                break;
            }
        }

        debug!("Stream {}: worker stopped", self.id);
    }

    fn lock(&self) -> MutexGuard<'_, StreamCore> {
        lock_core(&self.core)
    }

    async fn send(&self, parts: Vec<Bytes>) {
        let len = total_len(&parts);

        let Some(transport) = self.transport.upgrade() else {
            trace!("Stream {}: connection released, dropping chunk", self.id);
            self.gate.record_dropped(len);
            return;
        };

        match transport.send_all(parts).await {
            Ok(()) => self.gate.record_forwarded(len),
            Err(e) if e.is_terminal() => {
                warn!("Stream {}: connection is gone, waiting for readiness to drop: {}", self.id, e);
                self.gate.record_send_failure();
            }
            Err(e) => {
                warn!("Stream {}: send failed: {}", self.id, e);
                self.gate.record_send_failure();
            }
        }
    }
}

async fn next_readiness(readiness: &mut Option<watch::Receiver<Readiness>>) -> Option<Readiness> {
    match readiness {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(*rx.borrow_and_update()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}
