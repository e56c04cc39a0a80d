use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::wav::pcm_bytes_to_samples;

/// Captured candidate audio (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Little-endian PCM bytes, as sent to the agent
    pub fn to_pcm_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Capture format
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frame length in milliseconds (affects latency)
    pub frame_duration_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // Agent input expects 16kHz
            channels: 1,        // Mono
            frame_duration_ms: 100,
        }
    }
}

/// Local candidate audio capture
///
/// A device is held exclusively by one session between `start` and `stop`.
/// Disabling it pauses capture without releasing the device.
#[async_trait::async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Acquire the device and start producing frames
    async fn start(&self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Release the device
    async fn stop(&self) -> Result<()>;

    /// Gate frame production (pause/resume)
    fn set_enabled(&self, enabled: bool);

    fn is_enabled(&self) -> bool;

    fn is_capturing(&self) -> bool;

    /// Device name for logging
    fn name(&self) -> &str;
}

/// Capture fed by an external producer, e.g. PCM posted by the browser
pub struct PushCapture {
    config: CaptureConfig,
    tx: Mutex<Option<mpsc::Sender<AudioFrame>>>,
    enabled: AtomicBool,
    capturing: AtomicBool,
    samples_pushed: AtomicU64,
}

impl PushCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            tx: Mutex::new(None),
            enabled: AtomicBool::new(true),
            capturing: AtomicBool::new(false),
            samples_pushed: AtomicU64::new(0),
        }
    }

    /// Offer samples to the session. Returns false when they were dropped
    /// (device paused, not started, or the session is not keeping up).
    pub fn push(&self, samples: Vec<i16>) -> bool {
        if samples.is_empty() || !self.is_enabled() || !self.is_capturing() {
            return false;
        }

        let Ok(guard) = self.tx.lock() else {
            return false;
        };
        let Some(tx) = guard.as_ref() else {
            return false;
        };

        let per_second = self.config.sample_rate as u64 * self.config.channels.max(1) as u64;
        let offset = self.samples_pushed.fetch_add(samples.len() as u64, Ordering::SeqCst);
        let frame = AudioFrame {
            samples,
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            timestamp_ms: offset * 1000 / per_second.max(1),
        };

        match tx.try_send(frame) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping captured frame: {}", e);
                false
            }
        }
    }

    /// Push raw little-endian PCM16 bytes; a trailing odd byte is ignored
    pub fn push_pcm_bytes(&self, bytes: &[u8]) -> bool {
        self.push(pcm_bytes_to_samples(bytes))
    }
}

#[async_trait::async_trait]
impl CaptureDevice for PushCapture {
    async fn start(&self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.capturing.swap(true, Ordering::SeqCst) {
            anyhow::bail!("Capture device already acquired");
        }

        let (tx, rx) = mpsc::channel(64);
        *self
            .tx
            .lock()
            .map_err(|_| anyhow::anyhow!("capture lock poisoned"))? = Some(tx);
        self.samples_pushed.store(0, Ordering::SeqCst);

        info!("Push capture started ({}Hz, {}ch)", self.config.sample_rate, self.config.channels);
        Ok(rx)
    }

    async fn stop(&self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
        info!("Push capture stopped");
        Ok(())
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "push"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_capture_delivers_frames() {
        let capture = PushCapture::new(CaptureConfig::default());
        let mut rx = capture.start().await.unwrap();

        assert!(capture.push(vec![1; 1600]));
        assert!(capture.push(vec![2; 1600]));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.timestamp_ms, 0);
        assert_eq!(second.timestamp_ms, 100);
        assert_eq!(second.samples[0], 2);
    }

    #[tokio::test]
    async fn test_paused_capture_drops_frames() {
        let capture = PushCapture::new(CaptureConfig::default());
        let mut rx = capture.start().await.unwrap();

        capture.set_enabled(false);
        assert!(!capture.push(vec![1; 160]));

        capture.set_enabled(true);
        assert!(capture.push(vec![7; 160]));
        assert_eq!(rx.recv().await.unwrap().samples[0], 7);
    }

    #[tokio::test]
    async fn test_capture_is_exclusive() {
        let capture = PushCapture::new(CaptureConfig::default());
        let _rx = capture.start().await.unwrap();

        assert!(capture.start().await.is_err());

        capture.stop().await.unwrap();
        assert!(!capture.push(vec![1; 16]));
        assert!(capture.start().await.is_ok());
    }

    #[test]
    fn test_pcm_bytes_are_little_endian() {
        let frame = AudioFrame {
            samples: vec![1, -2],
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: 0,
        };
        assert_eq!(frame.to_pcm_bytes(), vec![0x01, 0x00, 0xFE, 0xFF]);
    }
}
