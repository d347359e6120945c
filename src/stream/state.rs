use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishState {
    /// Created, nothing requested yet
    #[default]
    Initialized,

    /// Bound to a connection, not publishing
    Open,

    /// Reserved for playback, no behavior
    PreparingPlay,

    /// Reserved for playback, no behavior
    Playing,

    /// Mixer and muxer are being started
    PreparingPublish,

    /// Muxed output is forwarded to the connection
    Publishing,

    /// Shut down by the application
    Closed,
}

impl PublishState {
    /// Check if output is currently forwarded
    pub fn is_publishing(&self) -> bool {
        *self == PublishState::Publishing
    }

    /// Check if a publish request would start a session from here
    pub fn can_publish(&self) -> bool {
        matches!(self,
            PublishState::Initialized |
            PublishState::Open |
            PublishState::Closed)
    }

    /// Check if close would be a no-op
    pub fn is_closed(&self) -> bool {
        matches!(self, PublishState::Closed | PublishState::Initialized)
    }
}

impl fmt::Display for PublishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PublishState::Initialized => "initialized",
            PublishState::Open => "open",
            PublishState::PreparingPlay => "preparing-play",
            PublishState::Playing => "playing",
            PublishState::PreparingPublish => "preparing-publish",
            PublishState::Publishing => "publishing",
            PublishState::Closed => "closed",
        };
        f.write_str(name)
    }
}
