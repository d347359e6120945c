// Common test utilities shared by the integration tests
//
// Recording stand-ins for the mixer, muxer and transport so lifecycle tests
// can observe exactly which collaborator calls happen, and in what order.

#![allow(dead_code)]

use bytes::Bytes;
use publish::{
    CaptureDevice, Error, ExpectedMedia, MediaKind, Mixer, Muxer, OutputSink, PublishState,
    PublishStream, Readiness, ReadinessSignal, Result, SampleWriter, MediaSample, Transport,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Collaborator call, in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    AttachCamera,
    AttachAudio,
    StartEncoding,
    MixerStartRunning,
    StopEncoding,
    MixerStopRunning,
    MuxerStartRunning,
    MuxerStopRunning,
    ExpectMedia(MediaKind),
}

pub const START_SEQUENCE: [Call; 3] =
    [Call::StartEncoding, Call::MixerStartRunning, Call::MuxerStartRunning];

pub const STOP_SEQUENCE: [Call; 2] = [Call::MuxerStopRunning, Call::StopEncoding];

#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallLog {
    pub fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

pub struct RecordingMixer {
    log: CallLog,
    fail_attach: AtomicBool,
    writer: Mutex<Option<Arc<dyn SampleWriter>>>,
}

impl RecordingMixer {
    pub fn new(log: CallLog) -> Arc<Self> {
        Arc::new(RecordingMixer {
            log,
            fail_attach: AtomicBool::new(false),
            writer: Mutex::new(None),
        })
    }

    pub fn fail_attach(&self, fail: bool) {
        self.fail_attach.store(fail, Ordering::SeqCst);
    }

    /// Push a sample as if the encoder produced it
    pub fn encode(&self, sample: MediaSample) -> bool {
        match self.writer.lock().unwrap().as_ref() {
            Some(writer) => {
                writer.write_sample(sample);
                true
            }
            None => false,
        }
    }

    fn attach(&self, call: Call) -> Result<()> {
        self.log.push(call);
        if self.fail_attach.load(Ordering::SeqCst) {
            return Err(Error::stream("device unavailable"));
        }
        Ok(())
    }
}

impl Mixer for RecordingMixer {
    fn attach_camera(&self, _device: Option<CaptureDevice>) -> Result<()> {
        self.attach(Call::AttachCamera)
    }

    fn attach_audio(&self, _device: Option<CaptureDevice>) -> Result<()> {
        self.attach(Call::AttachAudio)
    }

    fn start_encoding(&self, writer: Arc<dyn SampleWriter>) {
        self.log.push(Call::StartEncoding);
        *self.writer.lock().unwrap() = Some(writer);
    }

    fn start_running(&self) {
        self.log.push(Call::MixerStartRunning);
    }

    fn stop_encoding(&self) {
        self.log.push(Call::StopEncoding);
        self.writer.lock().unwrap().take();
    }

    fn stop_running(&self) {
        self.log.push(Call::MixerStopRunning);
    }
}

/// Handle the test keeps to drive a `RecordingMuxer` after the stream owns it
#[derive(Clone, Default)]
pub struct MuxerControl {
    output: Arc<Mutex<Option<OutputSink>>>,
    expected: Arc<Mutex<ExpectedMedia>>,
    emit_on_start: Arc<Mutex<Option<Vec<u8>>>>,
    emit_on_stop: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MuxerControl {
    /// Emit a chunk through the installed sink
    pub fn emit(&self, data: &[u8]) {
        if let Some(output) = self.output.lock().unwrap().as_ref() {
            output.write(data.to_vec());
        }
    }

    /// Emit a chunk through the zero-copy path
    pub fn emit_shared(&self, data: Bytes) {
        if let Some(output) = self.output.lock().unwrap().as_ref() {
            output.write_shared(data);
        }
    }

    pub fn expected(&self) -> ExpectedMedia {
        *self.expected.lock().unwrap()
    }

    /// Emit `data` from inside `start_running`
    pub fn emit_on_start(&self, data: &[u8]) {
        *self.emit_on_start.lock().unwrap() = Some(data.to_vec());
    }

    /// Emit `data` from inside `stop_running`
    pub fn emit_on_stop(&self, data: &[u8]) {
        *self.emit_on_stop.lock().unwrap() = Some(data.to_vec());
    }
}

pub struct RecordingMuxer {
    log: CallLog,
    control: MuxerControl,
    running: bool,
}

impl RecordingMuxer {
    pub fn new(log: CallLog) -> (Box<Self>, MuxerControl) {
        let control = MuxerControl::default();
        let muxer = RecordingMuxer {
            log,
            control: control.clone(),
            running: false,
        };
        (Box::new(muxer), control)
    }
}

struct NullWriter;

impl SampleWriter for NullWriter {
    fn write_sample(&self, _sample: MediaSample) {}
}

impl Muxer for RecordingMuxer {
    fn expected_media(&self) -> ExpectedMedia {
        self.control.expected()
    }

    fn expect_media(&mut self, kind: MediaKind) {
        self.log.push(Call::ExpectMedia(kind));
        self.control.expected.lock().unwrap().insert(kind);
    }

    fn set_output(&mut self, output: OutputSink) {
        *self.control.output.lock().unwrap() = Some(output);
    }

    fn sample_writer(&self) -> Arc<dyn SampleWriter> {
        Arc::new(NullWriter)
    }

    fn start_running(&mut self) {
        self.log.push(Call::MuxerStartRunning);
        self.running = true;
        let chunk = self.control.emit_on_start.lock().unwrap().clone();
        if let Some(chunk) = chunk {
            self.control.emit(&chunk);
        }
    }

    fn stop_running(&mut self) {
        self.log.push(Call::MuxerStopRunning);
        self.running = false;
        let chunk = self.control.emit_on_stop.lock().unwrap().clone();
        if let Some(chunk) = chunk {
            self.control.emit(&chunk);
        }
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

/// In-memory transport with a controllable connected flag
pub struct MockTransport {
    connected: ReadinessSignal,
    sent: Mutex<Vec<Bytes>>,
    fail_sends: AtomicBool,
}

impl MockTransport {
    pub fn new(connected: bool) -> Arc<Self> {
        Arc::new(MockTransport {
            connected: ReadinessSignal::new(connected),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
        })
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.set(connected);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    fn readiness(&self) -> watch::Receiver<Readiness> {
        self.connected.subscribe()
    }

    async fn send(&self, data: Bytes) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::connection("rejected"));
        }
        self.sent.lock().unwrap().push(data);
        Ok(())
    }
}

/// Everything a lifecycle test needs
pub struct Harness {
    pub transport: Arc<MockTransport>,
    pub mixer: Arc<RecordingMixer>,
    pub control: MuxerControl,
    pub log: CallLog,
    pub stream: PublishStream,
}

impl Harness {
    pub fn new(connected: bool) -> Self {
        init_logging();

        let log = CallLog::default();
        let transport = MockTransport::new(connected);
        let mixer = RecordingMixer::new(log.clone());
        let (muxer, control) = RecordingMuxer::new(log.clone());
        let stream = PublishStream::new(&transport, mixer.clone(), muxer);

        Harness {
            transport,
            mixer,
            control,
            log,
            stream,
        }
    }

    /// Wait until the worker reaches `state`
    pub async fn wait_for(&self, state: PublishState) {
        let mut rx = self.stream.subscribe_state();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
            .await
            .expect("Timed out waiting for state")
            .expect("Stream worker stopped");
    }
}

/// Let the worker drain everything queued so far
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn sent_strings(transport: &MockTransport) -> Vec<String> {
    transport
        .sent()
        .iter()
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .collect()
}
