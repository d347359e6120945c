use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};
use byteorder::{BigEndian, WriteBytesExt};
use bytes::Bytes;
use log::{debug, trace, warn};
use crate::media::{ExpectedMedia, MediaKind, MediaSample};
use crate::mixer::SampleWriter;
use crate::muxer::{FlvMuxerConfig, Muxer};
use crate::stream::OutputSink;
use crate::{Error, Result};

const FLV_HEADER_SIZE: u32 = 9;
const FLV_TAG_HEADER_SIZE: usize = 11;
const FLV_MAX_DATA_SIZE: usize = 0x00FF_FFFF;
const FLV_FLAG_AUDIO: u8 = 0x04;
const FLV_FLAG_VIDEO: u8 = 0x01;

/// Minimal FLV tag muxer.
///
/// Holds samples until every expected media kind has produced one, then
/// emits the file header followed by one tag per sample. Large payloads are
/// passed to the sink as shared buffers instead of being copied into the tag.
pub struct FlvMuxer {
    shared: Arc<Mutex<MuxState>>,
}

struct MuxState {
    config: FlvMuxerConfig,
    running: bool,
    expected: ExpectedMedia,
    seen: ExpectedMedia,
    ready: bool,
    header_written: bool,
    pending: VecDeque<MediaSample>,
    output: Option<OutputSink>,
}

struct FlvSampleWriter {
    shared: Arc<Mutex<MuxState>>,
}

impl FlvMuxer {
    pub fn new() -> Self {
        FlvMuxer::with_config(FlvMuxerConfig::default())
    }

    pub fn with_config(config: FlvMuxerConfig) -> Self {
        let state = MuxState {
            config,
            running: false,
            expected: ExpectedMedia::new(),
            seen: ExpectedMedia::new(),
            ready: false,
            header_written: false,
            pending: VecDeque::new(),
            output: None,
        };

        FlvMuxer {
            shared: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MuxState> {
        lock_state(&self.shared)
    }
}

impl Default for FlvMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Muxer for FlvMuxer {
    fn expected_media(&self) -> ExpectedMedia {
        self.lock().expected
    }

    fn expect_media(&mut self, kind: MediaKind) {
        if self.lock().expected.insert(kind) {
            debug!("Muxer now expects {}", kind);
        }
    }

    fn set_output(&mut self, output: OutputSink) {
        self.lock().output = Some(output);
    }

    fn sample_writer(&self) -> Arc<dyn SampleWriter> {
        Arc::new(FlvSampleWriter {
            shared: self.shared.clone(),
        })
    }

    fn start_running(&mut self) {
        let mut state = self.lock();
        if state.running {
            return;
        }
        state.running = true;
        state.seen = ExpectedMedia::new();
        state.ready = false;
        state.header_written = false;
        state.pending.clear();
    }

    fn stop_running(&mut self) {
        let mut state = self.lock();
        state.running = false;
        state.pending.clear();
    }

    fn is_running(&self) -> bool {
        self.lock().running
    }
}

impl SampleWriter for FlvSampleWriter {
    fn write_sample(&self, sample: MediaSample) {
        lock_state(&self.shared).push(sample);
    }
}

impl MuxState {
    fn push(&mut self, sample: MediaSample) {
        if !self.running {
            trace!("Muxer stopped, dropping {} sample", sample.kind);
            return;
        }

        self.seen.insert(sample.kind);

        if !self.ready {
            self.pending.push_back(sample);
            if self.pending.len() > self.config.max_pending_samples {
                self.pending.pop_front();
            }

            if !self.expected.is_satisfied_by(&self.seen) {
                return;
            }

            self.ready = true;
            debug!("All expected media seen, flushing {} samples", self.pending.len());
            while let Some(sample) = self.pending.pop_front() {
                self.emit(&sample);
            }
            return;
        }

        self.emit(&sample);
    }

    fn emit(&mut self, sample: &MediaSample) {
        let Some(output) = self.output.clone() else {
            return;
        };

        let header = match encode_tag_header(sample) {
            Ok(header) => header,
            Err(e) => {
                warn!("Dropping {} sample: {}", sample.kind, e);
                return;
            }
        };
        let trailer = ((FLV_TAG_HEADER_SIZE + sample.len()) as u32).to_be_bytes();

        if self.config.has_header && !self.header_written {
            self.header_written = true;
            output.write(encode_file_header(&self.expected));
        }

        if sample.len() >= self.config.shared_chunk_threshold {
            output.write_parts(vec![
                Bytes::from(header),
                sample.data.clone(),
                Bytes::copy_from_slice(&trailer),
            ]);
        } else {
            let mut tag = header;
            tag.extend_from_slice(&sample.data);
            tag.extend_from_slice(&trailer);
            output.write(tag);
        }
    }
}

fn lock_state(shared: &Mutex<MuxState>) -> MutexGuard<'_, MuxState> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// FLV file header plus the zero previous-tag-size that follows it
pub fn encode_file_header(media: &ExpectedMedia) -> Vec<u8> {
    let mut flags = 0;
    if media.contains(MediaKind::Audio) {
        flags |= FLV_FLAG_AUDIO;
    }
    if media.contains(MediaKind::Video) {
        flags |= FLV_FLAG_VIDEO;
    }
    if flags == 0 {
        flags = FLV_FLAG_AUDIO | FLV_FLAG_VIDEO;
    }

    let mut header = Vec::with_capacity(FLV_HEADER_SIZE as usize + 4);
    header.extend_from_slice(b"FLV");
    header.push(1);
    header.push(flags);
    header.extend_from_slice(&FLV_HEADER_SIZE.to_be_bytes());
    header.extend_from_slice(&0u32.to_be_bytes());
    header
}

/// 11-byte FLV tag header for `sample`
pub fn encode_tag_header(sample: &MediaSample) -> Result<Vec<u8>> {
    if sample.len() > FLV_MAX_DATA_SIZE {
        return Err(Error::muxer(format!("{} byte payload does not fit an FLV tag", sample.len())));
    }

    let mut header = Vec::with_capacity(FLV_TAG_HEADER_SIZE);
    header.write_u8(sample.kind.tag_type())?;
    header.write_u24::<BigEndian>(sample.len() as u32)?;
    header.write_u24::<BigEndian>(sample.timestamp & 0x00FF_FFFF)?;
    header.write_u8((sample.timestamp >> 24) as u8)?;
    // Stream ID, always 0
    header.write_all(&[0, 0, 0])?;
    Ok(header)
}
