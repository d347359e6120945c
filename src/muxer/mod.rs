//! Container output driven by a publish stream.

use std::sync::Arc;
use crate::media::{ExpectedMedia, MediaKind};
use crate::mixer::SampleWriter;
use crate::stream::OutputSink;

mod config;
mod flv;

pub use config::*;
pub use flv::*;

/// Serializes encoded samples into transport-ready chunks.
///
/// Owned exclusively by one publish stream and only touched from its worker.
/// Samples arrive through [`Muxer::sample_writer`] on the encoder's thread;
/// chunks leave through the [`OutputSink`] installed with
/// [`Muxer::set_output`].
pub trait Muxer: Send {
    /// Media kinds that must each produce a sample before output starts
    fn expected_media(&self) -> ExpectedMedia;

    /// Add a kind to the expected set
    fn expect_media(&mut self, kind: MediaKind);

    /// Install the destination for produced chunks
    fn set_output(&mut self, output: OutputSink);

    /// Handle the mixer encodes into
    fn sample_writer(&self) -> Arc<dyn SampleWriter>;

    fn start_running(&mut self);

    fn stop_running(&mut self);

    fn is_running(&self) -> bool;
}
