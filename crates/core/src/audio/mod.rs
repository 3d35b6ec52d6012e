use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};

use crate::{AnalyserNode, PlayerError, Result};

mod decode;
mod output;
mod source;

pub use decode::{decode, DecodedAudio};
pub use output::{AudioOutput, OfflineOutput, OfflineVoice, Voice};
pub use source::{TrackSource, Transport};

/// Returns whether a MIME type names something the decoder should be handed.
/// Only the top-level category is inspected.
pub fn is_playable_type(mime_type: &str) -> bool {
    matches!(mime_type.split('/').next(), Some("audio" | "video"))
}

/// Two-state transport. `Active` maps to a voice that is pulling samples,
/// `Inactive` to a paused voice or a track that has played to its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Active,
    Inactive,
}

/// Name and declared type of the loaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub mime_type: String,
}

/// Borrowed per-frame view of the analyser output and the transport.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub frequency: &'a [u8],
    pub time_domain: &'a [u8],
    /// Playback position in seconds.
    pub position: f64,
    /// Track duration in seconds.
    pub duration: f64,
}

impl Snapshot<'_> {
    /// Position as a fraction of the duration, 0 when the duration is unknown.
    pub fn progress(&self) -> f64 {
        if self.duration > 0.0 && self.duration.is_finite() {
            self.position / self.duration
        } else {
            0.0
        }
    }
}

/// Anything that can hand the renderer a snapshot once per frame.
pub trait SnapshotSource {
    fn sample(&mut self) -> Option<Snapshot<'_>>;
}

/// Identifies one `load_source` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadTicket(u64);

/// Completion of an asynchronous load.
#[derive(Debug)]
pub enum LoadEvent {
    Loaded {
        ticket: LoadTicket,
        info: FileInfo,
        duration: f64,
    },
    Failed {
        ticket: LoadTicket,
        info: FileInfo,
        error: PlayerError,
    },
}

struct DecodeResult {
    ticket: u64,
    info: FileInfo,
    result: Result<DecodedAudio>,
}

struct ActiveSource<V> {
    voice: V,
    transport: Arc<Transport>,
    info: FileInfo,
}

/// Owns the analysis point, the currently playing source and the audio
/// output it plays on.
pub struct AudioEngine<O: AudioOutput> {
    output: O,
    analyser: AnalyserNode,
    active: Option<ActiveSource<O::Voice>>,
    frequency: Vec<u8>,
    time_domain: Vec<u8>,
    next_ticket: u64,
    latest_ticket: Option<u64>,
    completions_tx: Sender<DecodeResult>,
    completions_rx: Receiver<DecodeResult>,
}

impl<O: AudioOutput> AudioEngine<O> {
    /// Creates the engine and its analysis point on top of `output`.
    pub fn initialize(output: O) -> Self {
        let analyser = AnalyserNode::new();
        let (completions_tx, completions_rx) = crossbeam_channel::unbounded();
        tracing::info!(
            fft_size = analyser.fft_size(),
            bins = analyser.frequency_bin_count(),
            "audio engine initialised"
        );

        Self {
            output,
            analyser,
            active: None,
            frequency: Vec::new(),
            time_domain: Vec::new(),
            next_ticket: 0,
            latest_ticket: None,
            completions_tx,
            completions_rx,
        }
    }

    /// Stops playback, disconnects the analyser and hands the output back.
    pub fn shutdown(mut self) -> O {
        self.disconnect_active();
        self.latest_ticket = None;
        tracing::info!("audio engine shut down");
        self.output
    }

    /// Starts decoding `payload` on a worker thread. The result arrives
    /// through [`poll_load`] or [`wait_for_load`]; a later request supersedes
    /// this one. The MIME type is not validated here, see
    /// [`is_playable_type`].
    ///
    /// [`poll_load`]: AudioEngine::poll_load
    /// [`wait_for_load`]: AudioEngine::wait_for_load
    pub fn load_source(
        &mut self,
        payload: Vec<u8>,
        mime_type: &str,
        name: &str,
    ) -> Result<LoadTicket> {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let info = FileInfo {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
        };
        let sender = self.completions_tx.clone();

        tracing::info!(ticket, name, mime_type, bytes = payload.len(), "decoding payload");
        thread::Builder::new()
            .name(format!("decode-{ticket}"))
            .spawn(move || {
                let result = decode(payload, &info.mime_type);
                let _ = sender.send(DecodeResult {
                    ticket,
                    info,
                    result,
                });
            })?;

        self.latest_ticket = Some(ticket);
        Ok(LoadTicket(ticket))
    }

    /// Delivers the next finished load, if any, without blocking.
    pub fn poll_load(&mut self) -> Option<LoadEvent> {
        while let Ok(done) = self.completions_rx.try_recv() {
            if let Some(event) = self.complete(done) {
                return Some(event);
            }
        }
        None
    }

    /// Blocks until the latest load finishes or `timeout` elapses.
    pub fn wait_for_load(&mut self, timeout: Duration) -> Option<LoadEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.completions_rx.recv_timeout(remaining) {
                Ok(done) => {
                    if let Some(event) = self.complete(done) {
                        return Some(event);
                    }
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Connects already decoded audio, replacing the current source, and
    /// starts playing it. When the output refuses the new voice the current
    /// source is left untouched.
    pub fn load_decoded(&mut self, audio: DecodedAudio, info: FileInfo) -> Result<()> {
        let tap = self.analyser.reserve();
        let source = TrackSource::new(audio, tap.clone());
        let transport = source.transport();
        let mut voice = self.output.connect(source)?;

        self.stop_active();
        self.analyser.activate(&tap);
        voice.play();

        let bins = self.analyser.frequency_bin_count();
        self.frequency = vec![0; bins];
        self.time_domain = vec![128; bins];

        tracing::info!(
            name = %info.name,
            duration = transport.duration_seconds(),
            "source connected"
        );
        self.active = Some(ActiveSource {
            voice,
            transport,
            info,
        });
        Ok(())
    }

    /// Reads the analyser into the engine's buffers. Returns `None` until a
    /// source has been connected. Does not advance playback.
    pub fn sample(&mut self) -> Option<Snapshot<'_>> {
        let active = self.active.as_ref()?;

        self.analyser
            .get_byte_time_domain_data(&mut self.time_domain);
        self.analyser.get_byte_frequency_data(&mut self.frequency);

        Some(Snapshot {
            frequency: &self.frequency,
            time_domain: &self.time_domain,
            position: active.transport.position_seconds(),
            duration: active.transport.duration_seconds(),
        })
    }

    /// Flips between playing and paused and returns the new state, or `None`
    /// when nothing is loaded. Resuming a finished track restarts it.
    pub fn toggle_playback(&mut self) -> Option<PlaybackState> {
        let current = self.playback_state()?;
        let active = self.active.as_mut()?;

        let next = match current {
            PlaybackState::Active => {
                active.voice.pause();
                PlaybackState::Inactive
            }
            PlaybackState::Inactive => {
                if active.transport.is_finished() {
                    active.transport.seek_frame(0);
                    self.analyser.clear_history();
                }
                active.voice.play();
                PlaybackState::Active
            }
        };

        tracing::debug!(?next, "playback toggled");
        Some(next)
    }

    /// Jumps to `fraction * duration`. Does nothing without a source.
    pub fn seek(&mut self, fraction: f64) {
        let Some(active) = self.active.as_ref() else {
            return;
        };

        active.transport.seek_fraction(fraction);
        self.analyser.clear_history();
        tracing::debug!(fraction, "seek");
    }

    pub fn playback_state(&self) -> Option<PlaybackState> {
        let active = self.active.as_ref()?;
        if active.voice.is_paused() || active.transport.is_finished() {
            Some(PlaybackState::Inactive)
        } else {
            Some(PlaybackState::Active)
        }
    }

    pub fn has_source(&self) -> bool {
        self.active.is_some()
    }

    pub fn file_info(&self) -> Option<&FileInfo> {
        self.active.as_ref().map(|active| &active.info)
    }

    pub fn bin_count(&self) -> usize {
        self.analyser.frequency_bin_count()
    }

    pub fn analyser(&self) -> &AnalyserNode {
        &self.analyser
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    fn complete(&mut self, done: DecodeResult) -> Option<LoadEvent> {
        if self.latest_ticket != Some(done.ticket) {
            tracing::warn!(ticket = done.ticket, "discarding superseded load");
            return None;
        }
        self.latest_ticket = None;

        let ticket = LoadTicket(done.ticket);
        let connected = done
            .result
            .and_then(|audio| {
                let duration = audio.duration_seconds();
                self.load_decoded(audio, done.info.clone()).map(|_| duration)
            });

        Some(match connected {
            Ok(duration) => LoadEvent::Loaded {
                ticket,
                info: done.info,
                duration,
            },
            Err(error) => {
                tracing::warn!(name = %done.info.name, %error, "load failed");
                LoadEvent::Failed {
                    ticket,
                    info: done.info,
                    error,
                }
            }
        })
    }

    fn stop_active(&mut self) {
        if let Some(mut previous) = self.active.take() {
            previous.voice.stop();
            tracing::debug!(name = %previous.info.name, "source disconnected");
        }
    }

    fn disconnect_active(&mut self) {
        self.stop_active();
        self.analyser.disconnect();
    }
}

impl<O: AudioOutput> SnapshotSource for AudioEngine<O> {
    fn sample(&mut self) -> Option<Snapshot<'_>> {
        AudioEngine::sample(self)
    }
}

impl<O: AudioOutput> std::fmt::Debug for AudioEngine<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioEngine")
            .field("analyser", &self.analyser)
            .field("file_info", &self.file_info())
            .field("latest_ticket", &self.latest_ticket)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::BIN_COUNT;
    use decode::tests::wav_payload;

    const LOAD_TIMEOUT: Duration = Duration::from_secs(10);

    fn engine() -> AudioEngine<OfflineOutput> {
        AudioEngine::initialize(OfflineOutput::new())
    }

    fn load_tone(engine: &mut AudioEngine<OfflineOutput>, name: &str) -> LoadEvent {
        engine
            .load_source(wav_payload(1.0, 8_000, 1), "audio/wav", name)
            .unwrap();
        engine.wait_for_load(LOAD_TIMEOUT).expect("load should finish")
    }

    #[test]
    fn classifies_mime_types() {
        assert!(is_playable_type("audio/mpeg"));
        assert!(is_playable_type("video/mp4"));
        assert!(!is_playable_type("text/plain"));
        assert!(!is_playable_type(""));
        assert!(!is_playable_type("audiox/foo"));
    }

    #[test]
    fn sample_is_none_before_a_source_is_loaded() {
        let mut engine = engine();
        assert!(engine.sample().is_none());
        assert!(engine.toggle_playback().is_none());
        assert!(engine.playback_state().is_none());
        engine.seek(0.5);
    }

    #[test]
    fn loads_and_samples_fixed_length_buffers() {
        let mut engine = engine();
        let event = load_tone(&mut engine, "tone.wav");
        assert!(matches!(event, LoadEvent::Loaded { .. }));
        assert_eq!(engine.playback_state(), Some(PlaybackState::Active));

        for _ in 0..3 {
            engine.output_mut().render(512);
            let snapshot = engine.sample().expect("snapshot after load");
            assert_eq!(snapshot.frequency.len(), BIN_COUNT);
            assert_eq!(snapshot.time_domain.len(), BIN_COUNT);
            assert!((snapshot.duration - 1.0).abs() < 1e-6);
        }
        let snapshot = engine.sample().unwrap();
        assert!((snapshot.position - 1536.0 / 8_000.0).abs() < 1e-9);
        assert!(snapshot.frequency.iter().any(|&b| b > 0));
    }

    #[test]
    fn repeated_samples_without_playback_match() {
        let mut engine = engine();
        load_tone(&mut engine, "tone.wav");
        engine.output_mut().render(1024);

        let first = engine.sample().map(|s| s.frequency.to_vec()).unwrap();
        let second = engine.sample().map(|s| s.frequency.to_vec()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn second_load_replaces_the_first_connection() {
        let mut engine = engine();
        load_tone(&mut engine, "first.wav");
        assert_eq!(engine.output().active_voices(), 1);

        load_tone(&mut engine, "second.wav");
        engine.output_mut().render(64);

        assert_eq!(engine.output().active_voices(), 1);
        assert_eq!(engine.output().total_connections(), 2);
        assert_eq!(engine.analyser().connection_count(), 1);
        assert_eq!(engine.file_info().unwrap().name, "second.wav");
    }

    #[test]
    fn decode_failure_keeps_the_previous_source() {
        let mut engine = engine();
        load_tone(&mut engine, "good.wav");
        engine.output_mut().render(800);

        engine
            .load_source(b"garbage".to_vec(), "audio/mpeg", "bad.mp3")
            .unwrap();
        let event = engine.wait_for_load(LOAD_TIMEOUT).unwrap();

        match event {
            LoadEvent::Failed { error, info, .. } => {
                assert!(matches!(error, PlayerError::DecodeFailure { .. }));
                assert_eq!(info.name, "bad.mp3");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(engine.file_info().unwrap().name, "good.wav");
        assert_eq!(engine.playback_state(), Some(PlaybackState::Active));

        engine.output_mut().render(800);
        let snapshot = engine.sample().unwrap();
        assert!((snapshot.position - 0.2).abs() < 1e-9);
    }

    /// Offline output that can be told to refuse new voices.
    struct RefusingOutput {
        inner: OfflineOutput,
        refuse: bool,
    }

    impl AudioOutput for RefusingOutput {
        type Voice = OfflineVoice;

        fn connect(&mut self, source: TrackSource) -> Result<OfflineVoice> {
            if self.refuse {
                return Err(PlayerError::Output("device unavailable".into()));
            }
            self.inner.connect(source)
        }
    }

    fn tone(name: &str) -> (DecodedAudio, FileInfo) {
        let samples = (0..8_000).map(|i| (i as f32 * 0.1).sin() * 0.5).collect();
        (
            DecodedAudio::new(samples, 1, 8_000).unwrap(),
            FileInfo {
                name: name.into(),
                mime_type: "audio/wav".into(),
            },
        )
    }

    #[test]
    fn refused_voice_keeps_the_previous_source() {
        let mut engine = AudioEngine::initialize(RefusingOutput {
            inner: OfflineOutput::new(),
            refuse: false,
        });
        let (audio, info) = tone("good.wav");
        engine.load_decoded(audio, info).unwrap();
        engine.output_mut().inner.render(800);

        engine.output_mut().refuse = true;
        let (audio, info) = tone("other.wav");
        let err = engine.load_decoded(audio, info).unwrap_err();
        assert!(matches!(err, PlayerError::Output(_)));

        assert!(engine.has_source());
        assert_eq!(engine.file_info().unwrap().name, "good.wav");
        assert_eq!(engine.playback_state(), Some(PlaybackState::Active));
        assert_eq!(engine.output().inner.active_voices(), 1);
        assert_eq!(engine.analyser().connection_count(), 1);

        let written = engine.analyser().samples_written();
        engine.output_mut().inner.render(800);
        assert!(engine.analyser().samples_written() > written);
        let snapshot = engine.sample().unwrap();
        assert!((snapshot.position - 0.2).abs() < 1e-9);
    }

    #[test]
    fn superseded_loads_are_discarded() {
        let mut engine = engine();
        engine
            .load_source(wav_payload(0.5, 8_000, 1), "audio/wav", "old.wav")
            .unwrap();
        engine
            .load_source(wav_payload(0.25, 8_000, 1), "audio/wav", "new.wav")
            .unwrap();

        match engine.wait_for_load(LOAD_TIMEOUT).unwrap() {
            LoadEvent::Loaded { info, duration, .. } => {
                assert_eq!(info.name, "new.wav");
                assert!((duration - 0.25).abs() < 1e-6);
            }
            other => panic!("expected load, got {other:?}"),
        }
        assert!(engine.poll_load().is_none());
        assert_eq!(engine.output().total_connections(), 1);
    }

    #[test]
    fn toggle_alternates_state() {
        let mut engine = engine();
        load_tone(&mut engine, "tone.wav");

        assert_eq!(engine.toggle_playback(), Some(PlaybackState::Inactive));
        engine.output_mut().render(400);
        let paused_at = engine.sample().unwrap().position;
        assert_eq!(paused_at, 0.0);

        assert_eq!(engine.toggle_playback(), Some(PlaybackState::Active));
        assert_eq!(engine.toggle_playback(), Some(PlaybackState::Inactive));
        assert_eq!(engine.toggle_playback(), Some(PlaybackState::Active));
    }

    #[test]
    fn finished_tracks_restart_when_resumed() {
        let mut engine = engine();
        load_tone(&mut engine, "tone.wav");
        engine.output_mut().render_seconds(1.5);
        assert_eq!(engine.playback_state(), Some(PlaybackState::Inactive));

        assert_eq!(engine.toggle_playback(), Some(PlaybackState::Active));
        assert_eq!(engine.sample().unwrap().position, 0.0);
    }

    #[test]
    fn seek_moves_the_position() {
        let mut engine = engine();
        load_tone(&mut engine, "tone.wav");

        engine.seek(0.25);
        assert!((engine.sample().unwrap().position - 0.25).abs() < 1e-9);
        engine.seek(3.0);
        assert!((engine.sample().unwrap().position - 1.0).abs() < 1e-9);
    }

    #[test]
    fn shutdown_stops_playback() {
        let mut engine = engine();
        load_tone(&mut engine, "tone.wav");
        let output = engine.shutdown();
        assert_eq!(output.active_voices(), 0);
    }
}
