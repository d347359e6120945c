use bytes::Bytes;
use crate::media::MediaKind;

/// One encoded elementary sample handed from the mixer to the muxer
#[derive(Debug, Clone)]
pub struct MediaSample {
    /// Audio or video
    pub kind: MediaKind,

    /// Presentation timestamp in milliseconds
    pub timestamp: u32,

    /// Encoded payload (FLV audio/video tag body)
    pub data: Bytes,

    /// Video keyframe flag, always false for audio
    pub keyframe: bool,
}

impl MediaSample {
    /// Create an audio sample
    pub fn audio(timestamp: u32, data: impl Into<Bytes>) -> Self {
        MediaSample {
            kind: MediaKind::Audio,
            timestamp,
            data: data.into(),
            keyframe: false,
        }
    }

    /// Create a video sample
    pub fn video(timestamp: u32, data: impl Into<Bytes>, keyframe: bool) -> Self {
        MediaSample {
            kind: MediaKind::Video,
            timestamp,
            data: data.into(),
            keyframe,
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check for empty payload
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Capture device handed to the mixer on attach
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDevice {
    /// Platform device identifier
    pub id: String,

    /// Human readable label
    pub label: String,
}

impl CaptureDevice {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        CaptureDevice {
            id: id.into(),
            label: label.into(),
        }
    }
}
