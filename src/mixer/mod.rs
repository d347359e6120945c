//! Capture and encode control surface.
//!
//! The mixer owns cameras and microphones and produces encoded samples.
//! A publish stream only drives its lifecycle; it never owns it.

use std::sync::Arc;
use crate::media::{CaptureDevice, MediaSample};
use crate::Result;

/// Receiver of encoded samples, called from the encoder's thread
pub trait SampleWriter: Send + Sync {
    fn write_sample(&self, sample: MediaSample);
}

pub trait Mixer: Send + Sync {
    /// Attach a camera, `None` detaches the current one
    fn attach_camera(&self, device: Option<CaptureDevice>) -> Result<()>;

    /// Attach a microphone, `None` detaches the current one
    fn attach_audio(&self, device: Option<CaptureDevice>) -> Result<()>;

    /// Route encoded samples into `writer`
    fn start_encoding(&self, writer: Arc<dyn SampleWriter>);

    /// Start capturing from attached devices
    fn start_running(&self);

    /// Stop routing encoded samples
    fn stop_encoding(&self);

    /// Stop capturing
    fn stop_running(&self);
}
