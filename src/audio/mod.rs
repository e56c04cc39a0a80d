pub mod buffer;
pub mod capture;
pub mod wav;

pub use buffer::{AudioBurst, AudioChunk, AudioChunkBuffer, BufferConfig};
pub use capture::{AudioFrame, CaptureConfig, CaptureDevice, PushCapture};
pub use wav::{encode_wav, pcm_bytes_to_samples, AudioFile};
