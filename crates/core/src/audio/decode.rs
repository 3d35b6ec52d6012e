use std::{fmt, io::Cursor, sync::Arc};

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use crate::{PlayerError, Result};

/// Fully decoded PCM, interleaved by channel.
#[derive(Clone)]
pub struct DecodedAudio {
    samples: Arc<[f32]>,
    channels: u16,
    sample_rate: u32,
}

impl DecodedAudio {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Result<Self> {
        if channels == 0 || sample_rate == 0 {
            return Err(PlayerError::decode("stream has no channels or sample rate"));
        }
        if samples.is_empty() {
            return Err(PlayerError::decode("stream contains no audio"));
        }

        let whole = samples.len() - samples.len() % channels as usize;
        let mut samples = samples;
        samples.truncate(whole);

        Ok(Self {
            samples: samples.into(),
            channels,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of multi-channel frames.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

impl fmt::Debug for DecodedAudio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedAudio")
            .field("frames", &self.frames())
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

/// Decodes a complete payload. The MIME type is only used as a probing hint;
/// the container is detected from the bytes themselves.
pub fn decode(payload: Vec<u8>, mime_type: &str) -> Result<DecodedAudio> {
    if payload.is_empty() {
        return Err(PlayerError::decode("payload is empty"));
    }

    let stream = MediaSourceStream::new(Box::new(Cursor::new(payload)), Default::default());
    let mut hint = Hint::new();
    hint.mime_type(mime_type);

    let probed = symphonia::default::get_probe().format(
        &hint,
        stream,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let (track_id, params) = format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .map(|track| (track.id, track.codec_params.clone()))
        .ok_or_else(|| PlayerError::decode("no decodable audio track"))?;

    let mut decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;
    let mut sample_rate = params.sample_rate;
    let mut channels = params.channels.map(|channels| channels.count() as u16);
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(err.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(buffer) => {
                let spec = *buffer.spec();
                sample_rate.get_or_insert(spec.rate);
                channels.get_or_insert(spec.channels.count() as u16);

                let mut interleaved = SampleBuffer::<f32>::new(buffer.capacity() as u64, spec);
                interleaved.copy_interleaved_ref(buffer);
                samples.extend_from_slice(interleaved.samples());
            }
            Err(SymphoniaError::DecodeError(reason)) => {
                tracing::debug!(reason, "skipping undecodable packet");
            }
            Err(err) => return Err(err.into()),
        }
    }

    DecodedAudio::new(
        samples,
        channels.unwrap_or_default(),
        sample_rate.unwrap_or_default(),
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds an in-memory 16-bit PCM WAV file containing a sine tone.
    pub(crate) fn wav_payload(seconds: f32, sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut bytes = Vec::new();
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
            let frames = (seconds * sample_rate as f32) as usize;
            for i in 0..frames {
                let t = i as f32 / sample_rate as f32;
                let value = (t * 440.0 * std::f32::consts::TAU).sin() * 0.5;
                for _ in 0..channels {
                    writer.write_sample((value * i16::MAX as f32) as i16).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        bytes
    }

    #[test]
    fn decodes_wav_payloads() {
        let audio = decode(wav_payload(0.5, 8_000, 2), "audio/wav").unwrap();

        assert_eq!(audio.channels(), 2);
        assert_eq!(audio.sample_rate(), 8_000);
        assert_eq!(audio.frames(), 4_000);
        assert!((audio.duration_seconds() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn rejects_garbage() {
        let err = decode(b"definitely not audio".to_vec(), "audio/mpeg").unwrap_err();
        assert!(matches!(err, PlayerError::DecodeFailure { .. }));
    }

    #[test]
    fn rejects_empty_payloads() {
        let err = decode(Vec::new(), "audio/wav").unwrap_err();
        assert!(matches!(err, PlayerError::DecodeFailure { .. }));
    }
}
