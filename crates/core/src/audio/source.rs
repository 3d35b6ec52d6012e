use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::{analysis::AnalyserTap, audio::DecodedAudio};

const NO_SEEK: usize = usize::MAX;
/// Mono frames collected before they are handed to the analyser.
const TAP_BATCH: usize = 32;
/// Upper bound for samples kept while the analyser is busy.
const TAP_BACKLOG: usize = crate::analysis::FFT_SIZE;

/// Playback cursor shared between the control thread and the thread that
/// pulls samples. Seeks are requested here and applied by the source at the
/// next frame boundary so that channel order is never disturbed.
#[derive(Debug)]
pub struct Transport {
    cursor: AtomicUsize,
    pending_seek: AtomicUsize,
    frames: usize,
    sample_rate: u32,
}

impl Transport {
    fn new(frames: usize, sample_rate: u32) -> Self {
        Self {
            cursor: AtomicUsize::new(0),
            pending_seek: AtomicUsize::new(NO_SEEK),
            frames,
            sample_rate,
        }
    }

    /// Current frame, taking a not yet applied seek into account.
    pub fn position_frames(&self) -> usize {
        match self.pending_seek.load(Ordering::Acquire) {
            NO_SEEK => self.cursor.load(Ordering::Acquire),
            frame => frame,
        }
    }

    pub fn position_seconds(&self) -> f64 {
        self.position_frames() as f64 / self.sample_rate as f64
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    /// Requests a jump to `frame`, clamped to the end of the track.
    pub fn seek_frame(&self, frame: usize) {
        self.pending_seek
            .store(frame.min(self.frames), Ordering::Release);
    }

    /// Requests a jump to `fraction * duration`. Fractions outside [0, 1]
    /// land on the start or the end of the track.
    pub fn seek_fraction(&self, fraction: f64) {
        let target = if fraction.is_nan() {
            0.0
        } else {
            (fraction * self.frames as f64).clamp(0.0, self.frames as f64)
        };
        self.seek_frame(target as usize);
    }

    pub fn is_finished(&self) -> bool {
        self.position_frames() >= self.frames
    }

    fn take_seek(&self) -> Option<usize> {
        match self.pending_seek.swap(NO_SEEK, Ordering::AcqRel) {
            NO_SEEK => None,
            frame => Some(frame),
        }
    }
}

/// Interleaved sample stream over a decoded track. Every frame that is
/// emitted is also downmixed and fed to the analyser. Once the end of the
/// track is reached the source keeps emitting silence, so an output never
/// drops it and it can be restarted by seeking.
pub struct TrackSource {
    audio: DecodedAudio,
    transport: Arc<Transport>,
    tap: AnalyserTap,
    frame: usize,
    channel: usize,
    frame_sum: f32,
    pending: Vec<f32>,
}

impl TrackSource {
    pub fn new(audio: DecodedAudio, tap: AnalyserTap) -> Self {
        let transport = Arc::new(Transport::new(audio.frames(), audio.sample_rate()));
        Self {
            audio,
            transport,
            tap,
            frame: 0,
            channel: 0,
            frame_sum: 0.0,
            pending: Vec::with_capacity(TAP_BATCH),
        }
    }

    pub fn transport(&self) -> Arc<Transport> {
        self.transport.clone()
    }

    pub fn channels(&self) -> u16 {
        self.audio.channels()
    }

    pub fn sample_rate(&self) -> u32 {
        self.audio.sample_rate()
    }

    /// Hands any buffered mono frames to the analyser.
    pub fn flush_analysis(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        if self.tap.try_push(&self.pending) {
            self.pending.clear();
        } else if self.pending.len() > TAP_BACKLOG {
            let overflow = self.pending.len() - TAP_BACKLOG;
            self.pending.drain(0..overflow);
        }
    }

    fn finish_frame(&mut self) {
        let mono = self.frame_sum / self.audio.channels() as f32;
        self.frame_sum = 0.0;
        self.pending.push(mono);
        if self.pending.len() >= TAP_BATCH {
            self.flush_analysis();
        }

        if self.frame < self.audio.frames() {
            self.transport
                .cursor
                .store(self.frame + 1, Ordering::Release);
        }
    }
}

impl Iterator for TrackSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let channels = self.audio.channels() as usize;

        if self.channel == 0 {
            if let Some(frame) = self.transport.take_seek() {
                self.transport.cursor.store(frame, Ordering::Release);
                self.pending.clear();
            }
            self.frame = self.transport.cursor.load(Ordering::Acquire);
        }

        let sample = if self.frame < self.audio.frames() {
            self.audio.samples()[self.frame * channels + self.channel]
        } else {
            0.0
        };

        self.frame_sum += sample;
        self.channel += 1;
        if self.channel == channels {
            self.channel = 0;
            self.finish_frame();
        }

        Some(sample)
    }
}

impl std::fmt::Debug for TrackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackSource")
            .field("audio", &self.audio)
            .field("frame", &self.frame)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalyserNode, FFT_SIZE};

    fn stereo_ramp(frames: usize) -> DecodedAudio {
        let samples = (0..frames)
            .flat_map(|i| [i as f32, -(i as f32)])
            .collect();
        DecodedAudio::new(samples, 2, 100).unwrap()
    }

    #[test]
    fn advances_cursor_per_frame() {
        let mut analyser = AnalyserNode::new();
        let mut source = TrackSource::new(stereo_ramp(10), analyser.connect());
        let transport = source.transport();

        let pulled: Vec<f32> = source.by_ref().take(6).collect();
        assert_eq!(pulled, vec![0.0, -0.0, 1.0, -1.0, 2.0, -2.0]);
        assert_eq!(transport.position_frames(), 3);
        assert!((transport.position_seconds() - 0.03).abs() < 1e-9);
    }

    #[test]
    fn seeks_apply_on_frame_boundaries() {
        let mut analyser = AnalyserNode::new();
        let mut source = TrackSource::new(stereo_ramp(10), analyser.connect());
        let transport = source.transport();

        assert_eq!(source.next(), Some(0.0));
        transport.seek_frame(7);
        assert_eq!(transport.position_frames(), 7);

        // Right channel of frame 0 is still delivered before the jump.
        assert_eq!(source.next(), Some(-0.0));
        assert_eq!(source.next(), Some(7.0));
        assert_eq!(source.next(), Some(-7.0));
    }

    #[test]
    fn emits_silence_after_the_end() {
        let mut analyser = AnalyserNode::new();
        let mut source = TrackSource::new(stereo_ramp(2), analyser.connect());
        let transport = source.transport();

        let pulled: Vec<f32> = source.by_ref().take(8).collect();
        assert_eq!(&pulled[4..], &[0.0, 0.0, 0.0, 0.0]);
        assert!(transport.is_finished());
        assert_eq!(transport.position_frames(), 2);
    }

    #[test]
    fn fraction_seeks_are_clamped() {
        let mut analyser = AnalyserNode::new();
        let source = TrackSource::new(stereo_ramp(10), analyser.connect());
        let transport = source.transport();

        transport.seek_fraction(1.7);
        assert_eq!(transport.position_frames(), 10);
        transport.seek_fraction(-0.3);
        assert_eq!(transport.position_frames(), 0);
        transport.seek_fraction(0.5);
        assert_eq!(transport.position_frames(), 5);
    }

    #[test]
    fn frames_buffered_before_a_seek_are_not_analysed() {
        let samples = (0..100).map(|i| if i < 50 { 1.0 } else { -1.0 }).collect();
        let audio = DecodedAudio::new(samples, 1, 100).unwrap();
        let mut analyser = AnalyserNode::new();
        let mut source = TrackSource::new(audio, analyser.connect());
        let transport = source.transport();

        source.by_ref().take(10).for_each(drop);
        analyser.clear_history();
        transport.seek_frame(60);
        source.by_ref().take(32).for_each(drop);
        source.flush_analysis();

        let mut waveform = vec![0; FFT_SIZE];
        analyser.get_byte_time_domain_data(&mut waveform);
        assert!(!waveform.contains(&255));
        assert_eq!(waveform.iter().filter(|&&b| b == 0).count(), 32);
    }

    #[test]
    fn feeds_downmixed_frames_to_the_analyser() {
        let mut analyser = AnalyserNode::new();
        let mut source = TrackSource::new(stereo_ramp(64), analyser.connect());

        source.by_ref().take(64 * 2).for_each(drop);
        source.flush_analysis();

        assert_eq!(analyser.samples_written(), 64);
        let mut waveform = vec![0; 4];
        analyser.get_byte_time_domain_data(&mut waveform);
        // L and R cancel out, so every frame is the zero crossing.
        assert!(waveform.iter().all(|&b| b == 128));
    }
}
