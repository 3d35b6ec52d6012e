use std::time::Duration;

use rodio::{OutputStream, OutputStreamBuilder, Sink, Source};
use spectrum_player_core::{AudioOutput, PlayerError, Result, TrackSource, Voice};

/// Plays sources on the default output device.
pub struct RodioOutput {
    stream: OutputStream,
}

impl RodioOutput {
    pub fn open_default() -> Result<Self> {
        let stream = OutputStreamBuilder::from_default_device()
            .and_then(|builder| builder.open_stream_or_fallback())
            .map_err(|err| PlayerError::Output(err.to_string()))?;
        tracing::info!("opened default audio device");
        Ok(Self { stream })
    }
}

impl AudioOutput for RodioOutput {
    type Voice = SinkVoice;

    fn connect(&mut self, source: TrackSource) -> Result<SinkVoice> {
        let sink = Sink::connect_new(self.stream.mixer());
        sink.pause();
        sink.append(RodioTrack(source));
        Ok(SinkVoice { sink })
    }
}

pub struct SinkVoice {
    sink: Sink,
}

impl Voice for SinkVoice {
    fn play(&mut self) {
        self.sink.play();
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn is_paused(&self) -> bool {
        self.sink.is_paused()
    }

    fn stop(&mut self) {
        self.sink.stop();
    }
}

/// Adapts a track to rodio's source trait. The track never ends on its own,
/// so no total duration is reported.
struct RodioTrack(TrackSource);

impl Iterator for RodioTrack {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        self.0.next()
    }
}

impl Source for RodioTrack {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.0.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.0.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}
