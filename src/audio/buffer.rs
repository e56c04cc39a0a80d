//! Reassembly of agent audio chunks into bursts
//!
//! Chunks arrive tagged with the agent's event id and may be delivered out of
//! order. A burst ends once no chunk has arrived for the quiet period; at that
//! point chunks are ordered by event id and concatenated.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{Result, SessionError};

/// Buffer tuning
#[derive(Debug, Clone, Copy)]
pub struct BufferConfig {
    /// Silence after the last chunk that completes a burst (default: 500ms)
    pub quiet_period: Duration,
    /// How often the owner should call [`AudioChunkBuffer::poll`] (default: 100ms)
    pub poll_interval: Duration,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            quiet_period: Duration::from_millis(500),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// A single buffered chunk of agent audio
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub event_id: u64,
    pub bytes: Vec<u8>,
    pub arrived_at: Instant,
}

/// A reassembled utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBurst {
    /// Chunk payloads concatenated in event-id order
    pub bytes: Vec<u8>,
    pub chunk_count: usize,
    /// Flushed early because the turn was interrupted
    pub salvaged: bool,
}

impl AudioBurst {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub struct AudioChunkBuffer {
    config: BufferConfig,
    pending: BTreeMap<u64, AudioChunk>,
    first_arrival: Option<Instant>,
    last_arrival: Option<Instant>,
}

impl AudioChunkBuffer {
    pub fn new(config: BufferConfig) -> Self {
        Self {
            config,
            pending: BTreeMap::new(),
            first_arrival: None,
            last_arrival: None,
        }
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Buffer a chunk. Zero-length payloads are rejected and never buffered.
    pub fn add_chunk(&mut self, event_id: u64, bytes: Vec<u8>, now: Instant) -> Result<()> {
        if bytes.is_empty() {
            warn!("Rejecting empty audio chunk (event {})", event_id);
            return Err(SessionError::EmptyAudio);
        }

        if self.pending.contains_key(&event_id) {
            warn!("Duplicate audio chunk for event {}, keeping first", event_id);
            self.last_arrival = Some(now);
            return Ok(());
        }

        self.pending.insert(
            event_id,
            AudioChunk {
                event_id,
                bytes,
                arrived_at: now,
            },
        );
        self.first_arrival.get_or_insert(now);
        self.last_arrival = Some(now);

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending_chunks(&self) -> usize {
        self.pending.len()
    }

    /// Arrival time of the first chunk of the burst in progress
    pub fn burst_started_at(&self) -> Option<Instant> {
        self.first_arrival
    }

    /// Whether the quiet period has elapsed since the last chunk
    pub fn is_quiet(&self, now: Instant) -> bool {
        match self.last_arrival {
            Some(last) if !self.pending.is_empty() => {
                now.saturating_duration_since(last) >= self.config.quiet_period
            }
            _ => false,
        }
    }

    /// Flush the burst if it has gone quiet
    pub fn poll(&mut self, now: Instant) -> Option<Result<AudioBurst>> {
        if self.is_quiet(now) {
            Some(self.flush())
        } else {
            None
        }
    }

    /// Concatenate pending chunks in event-id order and clear the buffer
    pub fn flush(&mut self) -> Result<AudioBurst> {
        self.take_burst(false)
    }

    /// Flush whatever is buffered after an interruption
    pub fn salvage(&mut self) -> Result<AudioBurst> {
        self.take_burst(true)
    }

    /// Drop buffered chunks without emitting them
    pub fn clear(&mut self) {
        self.pending.clear();
        self.first_arrival = None;
        self.last_arrival = None;
    }

    fn take_burst(&mut self, salvaged: bool) -> Result<AudioBurst> {
        let chunks = std::mem::take(&mut self.pending);
        self.first_arrival = None;
        self.last_arrival = None;

        let chunk_count = chunks.len();
        let total: usize = chunks.values().map(|c| c.bytes.len()).sum();
        if total == 0 {
            return Err(SessionError::EmptyAudio);
        }

        // BTreeMap iterates in ascending event id
        let mut bytes = Vec::with_capacity(total);
        for chunk in chunks.into_values() {
            bytes.extend_from_slice(&chunk.bytes);
        }

        debug!(
            "Burst complete: {} chunks, {} bytes (salvaged={})",
            chunk_count, total, salvaged
        );

        Ok(AudioBurst {
            bytes,
            chunk_count,
            salvaged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> AudioChunkBuffer {
        AudioChunkBuffer::new(BufferConfig::default())
    }

    #[test]
    fn test_out_of_order_chunks_reassemble_by_event_id() {
        let mut buf = buffer();
        let t0 = Instant::now();

        buf.add_chunk(2, b"C".to_vec(), t0).unwrap();
        buf.add_chunk(0, b"A".to_vec(), t0 + Duration::from_millis(50)).unwrap();
        buf.add_chunk(1, b"B".to_vec(), t0 + Duration::from_millis(120)).unwrap();

        let burst = buf
            .poll(t0 + Duration::from_millis(620))
            .expect("quiet period elapsed")
            .unwrap();

        assert_eq!(burst.bytes, b"ABC");
        assert_eq!(burst.chunk_count, 3);
        assert!(!burst.salvaged);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_every_permutation_yields_ascending_concatenation() {
        let payloads: Vec<Vec<u8>> = vec![b"a1".to_vec(), b"b22".to_vec(), b"c".to_vec(), b"d4444".to_vec()];
        let expected: Vec<u8> = payloads.concat();

        let mut order: Vec<usize> = (0..payloads.len()).collect();
        let mut seen = 0;
        permute(&mut order, 0, &mut |perm| {
            let mut buf = buffer();
            let t0 = Instant::now();
            for &id in perm {
                buf.add_chunk(id as u64, payloads[id].clone(), t0).unwrap();
            }
            assert_eq!(buf.flush().unwrap().bytes, expected, "permutation {:?}", perm);
            seen += 1;
        });
        assert_eq!(seen, 24);
    }

    fn permute(items: &mut Vec<usize>, k: usize, visit: &mut dyn FnMut(&[usize])) {
        if k == items.len() {
            visit(items);
            return;
        }
        for i in k..items.len() {
            items.swap(k, i);
            permute(items, k + 1, visit);
            items.swap(k, i);
        }
    }

    #[test]
    fn test_no_flush_before_quiet_period() {
        let mut buf = buffer();
        let t0 = Instant::now();
        buf.add_chunk(0, vec![1, 2], t0).unwrap();

        assert!(buf.poll(t0 + Duration::from_millis(499)).is_none());
        assert_eq!(buf.pending_chunks(), 1);
    }

    #[test]
    fn test_flushes_exactly_once_after_quiet_period() {
        let mut buf = buffer();
        let t0 = Instant::now();
        buf.add_chunk(0, vec![1, 2], t0).unwrap();

        assert!(buf.poll(t0 + Duration::from_millis(500)).is_some());
        assert!(buf.poll(t0 + Duration::from_millis(600)).is_none());
        assert!(buf.poll(t0 + Duration::from_secs(5)).is_none());
    }

    #[test]
    fn test_late_chunk_extends_quiet_window() {
        let mut buf = buffer();
        let t0 = Instant::now();
        buf.add_chunk(0, vec![1], t0).unwrap();
        buf.add_chunk(1, vec![2], t0 + Duration::from_millis(400)).unwrap();

        assert!(buf.poll(t0 + Duration::from_millis(700)).is_none());
        assert!(buf.poll(t0 + Duration::from_millis(900)).is_some());
    }

    #[test]
    fn test_empty_chunk_rejected() {
        let mut buf = buffer();
        let err = buf.add_chunk(0, Vec::new(), Instant::now()).unwrap_err();

        assert_eq!(err, SessionError::EmptyAudio);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_flush_of_nothing_is_empty_audio() {
        let mut buf = buffer();
        assert_eq!(buf.flush().unwrap_err(), SessionError::EmptyAudio);
        assert_eq!(buf.salvage().unwrap_err(), SessionError::EmptyAudio);
    }

    #[test]
    fn test_salvage_after_interruption_keeps_partial_burst() {
        let mut buf = buffer();
        let t0 = Instant::now();
        buf.add_chunk(1, b"B".to_vec(), t0).unwrap();
        buf.add_chunk(0, b"A".to_vec(), t0).unwrap();

        let burst = buf.salvage().unwrap();
        assert_eq!(burst.bytes, b"AB");
        assert_eq!(burst.chunk_count, 2);
        assert!(burst.salvaged);
    }

    #[test]
    fn test_duplicate_event_id_keeps_first_payload() {
        let mut buf = buffer();
        let t0 = Instant::now();
        buf.add_chunk(0, b"first".to_vec(), t0).unwrap();
        buf.add_chunk(0, b"second".to_vec(), t0).unwrap();

        assert_eq!(buf.flush().unwrap().bytes, b"first");
    }

    #[test]
    fn test_burst_start_tracks_first_arrival() {
        let mut buf = buffer();
        let t0 = Instant::now();
        assert!(buf.burst_started_at().is_none());

        buf.add_chunk(3, vec![9], t0).unwrap();
        buf.add_chunk(2, vec![8], t0 + Duration::from_millis(10)).unwrap();
        assert_eq!(buf.burst_started_at(), Some(t0));

        buf.flush().unwrap();
        assert!(buf.burst_started_at().is_none());
    }
}
