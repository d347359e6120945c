// Publish demo
//
// This demo:
// - Connects a TcpConnection to an ingest endpoint
// - Attaches a synthetic camera and microphone
// - Publishes FLV-muxed fake samples for a few seconds, then closes
//
// Usage:
//   nc -l 1935 > out.flv &
//   cargo run --example publish_tcp -- tcp://127.0.0.1:1935 mystream

use publish::{
    CaptureDevice, ConnectionConfig, FlvMuxer, MediaSample, Mixer, PublishState, Result,
    SampleWriter, TcpConnection,
};
use log::{error, info};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Produces placeholder AAC and AVC tag bodies on its own thread
struct SyntheticMixer {
    writer: Arc<Mutex<Option<Arc<dyn SampleWriter>>>>,
    running: Arc<AtomicBool>,
}

impl SyntheticMixer {
    fn new() -> Self {
        SyntheticMixer {
            writer: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Mixer for SyntheticMixer {
    fn attach_camera(&self, device: Option<CaptureDevice>) -> Result<()> {
        info!("Camera attached: {:?}", device.map(|d| d.label));
        Ok(())
    }

    fn attach_audio(&self, device: Option<CaptureDevice>) -> Result<()> {
        info!("Microphone attached: {:?}", device.map(|d| d.label));
        Ok(())
    }

    fn start_encoding(&self, writer: Arc<dyn SampleWriter>) {
        *self.writer.lock().unwrap() = Some(writer);
    }

    fn start_running(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let writer = self.writer.clone();
        let running = self.running.clone();
        thread::spawn(move || {
            let start = Instant::now();
            let mut frame = 0u32;
            while running.load(Ordering::SeqCst) {
                let timestamp = start.elapsed().as_millis() as u32;
                if let Some(writer) = writer.lock().unwrap().as_ref() {
                    writer.write_sample(MediaSample::audio(timestamp, vec![0xAF, 0x01, 0x21, 0x00]));
                    let keyframe = frame % 30 == 0;
                    let header = if keyframe { 0x17 } else { 0x27 };
                    writer.write_sample(MediaSample::video(
                        timestamp,
                        vec![header, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x65],
                        keyframe,
                    ));
                }
                frame += 1;
                thread::sleep(Duration::from_millis(33));
            }
        });
    }

    fn stop_encoding(&self) {
        self.writer.lock().unwrap().take();
    }

    fn stop_running(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <url> [stream_name]", args[0]);
        eprintln!("Example: {} tcp://127.0.0.1:1935 mystream", args[0]);
        std::process::exit(1);
    }

    let url = &args[1];
    let stream_name = args.get(2).map(|s| s.as_str()).unwrap_or("");

    let config = ConnectionConfig::builder()
        .connect_timeout(Duration::from_secs(5))
        .build()?;
    let connection = TcpConnection::with_config(config)?;

    let mixer = Arc::new(SyntheticMixer::new());
    let stream = connection.create_stream(mixer.clone(), Box::new(FlvMuxer::new()));

    stream.attach_camera(Some(CaptureDevice::new("synthetic-video", "Test pattern")));
    stream.attach_audio(Some(CaptureDevice::new("synthetic-audio", "Silence")));

    // Queued until the connection is up
    stream.publish(Some(stream_name));

    info!("Connecting to {}", url);
    if let Err(e) = connection.connect(url).await {
        error!("Connect failed: {}", e);
        return Err(e);
    }

    let mut state = stream.subscribe_state();
    let _ = state.wait_for(|s| *s == PublishState::Publishing).await;

    tokio::time::sleep(Duration::from_secs(5)).await;

    stream.close();
    let _ = state.wait_for(|s| *s == PublishState::Closed).await;
    mixer.stop_running();

    let stats = stream.stats();
    info!(
        "Published {} chunks ({} bytes), dropped {}",
        stats.chunks_forwarded, stats.bytes_forwarded, stats.chunks_dropped
    );

    stream.detach();
    connection.close();
    Ok(())
}
