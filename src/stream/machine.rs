//! Publish lifecycle as a pure transition function.
//!
//! [`PublishMachine::handle`] takes an [`Event`] and returns the ordered
//! [`Step`]s the state went through, each carrying the entry/exit
//! [`Effect`]s to run once the state is visible. Nothing here performs I/O;
//! the stream worker executes the effects.

use log::debug;
use crate::stream::state::PublishState;

/// Application request against a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `Some(name)` starts publishing, `None` stops an active publish
    Publish(Option<String>),

    /// Terminal shutdown
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Application request
    Request(Request),

    /// Connection readiness flipped to true
    Connected,

    /// Connection readiness flipped to false
    Disconnected,
}

/// Side effect bound to entering or leaving a state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Mixer starts encoding into the muxer
    StartEncoding,

    /// Mixer starts capturing
    StartMixer,

    /// Muxer starts producing output
    StartMuxer,

    /// Muxer stops producing output
    StopMuxer,

    /// Mixer stops encoding
    StopEncoding,
}

/// Effects run on entry to `PreparingPublish`, in order
pub const PUBLISH_ENTRY_EFFECTS: [Effect; 3] =
    [Effect::StartEncoding, Effect::StartMixer, Effect::StartMuxer];

/// Effects run on exit from `Publishing`, in order
pub const PUBLISH_EXIT_EFFECTS: [Effect; 2] = [Effect::StopMuxer, Effect::StopEncoding];

/// One state the machine passed through while handling an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub state: PublishState,
    pub effects: Vec<Effect>,
}

/// Single-slot mailbox for a request deferred until the connection is ready
#[derive(Debug, Default)]
pub struct PendingAction {
    slot: Option<Request>,
}

impl PendingAction {
    /// Store a request, returning the one it replaced
    pub fn set(&mut self, request: Request) -> Option<Request> {
        self.slot.replace(request)
    }

    /// Consume the stored request
    pub fn take(&mut self) -> Option<Request> {
        self.slot.take()
    }

    pub fn get(&self) -> Option<&Request> {
        self.slot.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }
}

#[derive(Debug)]
pub struct PublishMachine {
    state: PublishState,
    ready: bool,
    pending: PendingAction,
    session: u64,
    stream_name: Option<String>,
}

impl PublishMachine {
    /// Create a machine for a connection whose readiness is `ready`
    pub fn new(ready: bool) -> Self {
        PublishMachine {
            state: PublishState::Initialized,
            ready,
            pending: PendingAction::default(),
            session: 0,
            stream_name: None,
        }
    }

    pub fn state(&self) -> PublishState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Request waiting for the connection, if any
    pub fn pending(&self) -> Option<&Request> {
        self.pending.get()
    }

    /// Identifier of the latest publish session, 0 before the first one
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Name passed to the latest publish request
    pub fn stream_name(&self) -> Option<&str> {
        self.stream_name.as_deref()
    }

    /// Apply an event and return the steps taken, in order
    pub fn handle(&mut self, event: Event) -> Vec<Step> {
        let mut steps = Vec::new();

        match event {
            Event::Request(request) => self.request(request, &mut steps),
            Event::Connected => {
                if self.ready {
                    return steps;
                }
                self.ready = true;
                if let Some(request) = self.pending.take() {
                    debug!("Connection ready, replaying {:?}", request);
                    self.request(request, &mut steps);
                }
            }
            Event::Disconnected => {
                if !self.ready {
                    return steps;
                }
                self.ready = false;
                if let Some(request) = self.pending.take() {
                    debug!("Connection lost, discarding {:?}", request);
                }
                self.enter(PublishState::Open, &mut steps);
            }
        }

        steps
    }

    fn request(&mut self, request: Request, steps: &mut Vec<Step>) {
        if !self.ready {
            if let Some(replaced) = self.pending.set(request) {
                debug!("Replacing deferred {:?}", replaced);
            }
            return;
        }

        match request {
            Request::Publish(Some(name)) => {
                if self.state.can_publish() {
                    self.stream_name = Some(name);
                    self.enter(PublishState::PreparingPublish, steps);
                } else {
                    debug!("Ignoring publish while {}", self.state);
                }
            }
            Request::Publish(None) => match self.state {
                PublishState::Publishing | PublishState::PreparingPublish => {
                    self.enter(PublishState::Open, steps);
                }
                state => debug!("Ignoring unpublish while {}", state),
            },
            Request::Close => {
                if self.state.is_closed() {
                    debug!("Ignoring close while {}", self.state);
                } else {
                    self.enter(PublishState::Closed, steps);
                }
            }
        }
    }

    fn enter(&mut self, next: PublishState, steps: &mut Vec<Step>) {
        if self.state == next {
            return;
        }

        let mut effects = Vec::new();
        if self.state == PublishState::Publishing {
            effects.extend(PUBLISH_EXIT_EFFECTS);
        }
        if next == PublishState::PreparingPublish {
            self.session += 1;
            effects.extend(PUBLISH_ENTRY_EFFECTS);
        }

        self.state = next;
        steps.push(Step { state: next, effects });

        if next == PublishState::PreparingPublish {
            self.enter(PublishState::Publishing, steps);
        }
    }
}
