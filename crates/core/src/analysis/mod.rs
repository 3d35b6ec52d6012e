use std::{
    collections::VecDeque,
    f32::consts::PI,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

/// Transform size of the analysis point.
pub const FFT_SIZE: usize = 256;
/// Number of frequency bins exposed by the analyser.
pub const BIN_COUNT: usize = FFT_SIZE / 2;

pub const MIN_DECIBELS: f32 = -100.0;
pub const MAX_DECIBELS: f32 = -30.0;
pub const SMOOTHING_TIME_CONSTANT: f32 = 0.8;

const BLACKMAN_ALPHA: f32 = 0.16;

struct TapState {
    generation: u64,
    history: VecDeque<f32>,
    written: u64,
}

impl TapState {
    fn reset(&mut self) {
        self.history.clear();
        self.history.resize(FFT_SIZE, 0.0);
        self.written = 0;
    }
}

/// Write side of the analyser, owned by whichever source is currently
/// connected. Samples pushed through a tap whose connection has since been
/// replaced are silently dropped.
#[derive(Clone)]
pub struct AnalyserTap {
    shared: Arc<Mutex<TapState>>,
    generation: u64,
}

impl AnalyserTap {
    /// Appends mono samples without blocking. Returns `false` when the
    /// analyser is busy, in which case the caller should keep the samples and
    /// retry with the next batch.
    pub fn try_push(&self, samples: &[f32]) -> bool {
        let Ok(mut state) = self.shared.try_lock() else {
            return false;
        };

        if state.generation != self.generation {
            return true;
        }

        for &sample in samples {
            if state.history.len() >= FFT_SIZE {
                state.history.pop_front();
            }
            state.history.push_back(sample);
        }
        state.written += samples.len() as u64;
        true
    }

    /// Whether this tap still feeds the analyser.
    pub fn is_connected(&self) -> bool {
        self.shared
            .lock()
            .map(|state| state.generation == self.generation)
            .unwrap_or(false)
    }
}

impl fmt::Debug for AnalyserTap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyserTap")
            .field("generation", &self.generation)
            .finish()
    }
}

/// Fixed-size analysis point. Keeps the most recent [`FFT_SIZE`] mono samples
/// that reached the output and converts them into byte-domain frequency
/// magnitudes and waveform values, following the conventions of the Web Audio
/// analyser node.
pub struct AnalyserNode {
    shared: Arc<Mutex<TapState>>,
    generation: u64,
    connected: bool,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    frequency_bytes: Vec<u8>,
    /// Value of the written counter when `frequency_bytes` was last computed.
    computed_at: Option<u64>,
    fft: FftResources,
}

impl AnalyserNode {
    pub fn new() -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(FFT_SIZE);
        let fft = FftResources {
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        };

        let mut state = TapState {
            generation: 0,
            history: VecDeque::with_capacity(FFT_SIZE),
            written: 0,
        };
        state.reset();

        Self {
            shared: Arc::new(Mutex::new(state)),
            generation: 0,
            connected: false,
            window: (0..FFT_SIZE).map(blackman_value).collect(),
            smoothed: vec![0.0; BIN_COUNT],
            frequency_bytes: vec![0; BIN_COUNT],
            computed_at: None,
            fft,
        }
    }

    pub fn fft_size(&self) -> usize {
        FFT_SIZE
    }

    pub fn frequency_bin_count(&self) -> usize {
        BIN_COUNT
    }

    /// Opens a new connection and returns its write side. Any previous
    /// connection is invalidated and the analysis history is cleared.
    pub fn connect(&mut self) -> AnalyserTap {
        let tap = self.reserve();
        self.activate(&tap);
        tap
    }

    /// Hands out the write side of the next connection without switching to
    /// it. Samples pushed through the tap are dropped until it is activated;
    /// the current connection keeps feeding the analyser meanwhile.
    pub fn reserve(&mut self) -> AnalyserTap {
        self.generation += 1;
        AnalyserTap {
            shared: self.shared.clone(),
            generation: self.generation,
        }
    }

    /// Makes `tap` the connection feeding the analyser, invalidating the
    /// previous one and clearing the analysis history.
    pub fn activate(&mut self, tap: &AnalyserTap) {
        {
            let mut state = self.lock();
            state.generation = tap.generation;
            state.reset();
        }
        self.connected = true;
        self.reset_smoothing();
    }

    /// Drops the current connection. Taps handed out earlier stop feeding the
    /// analyser immediately.
    pub fn disconnect(&mut self) {
        if !self.connected {
            return;
        }

        self.generation += 1;
        {
            let mut state = self.lock();
            state.generation = self.generation;
            state.reset();
        }
        self.connected = false;
        self.reset_smoothing();
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Number of sources currently feeding the analyser (0 or 1).
    pub fn connection_count(&self) -> usize {
        usize::from(self.connected)
    }

    /// Forgets buffered samples, e.g. after the playback position jumped.
    pub fn clear_history(&mut self) {
        let mut state = self.lock();
        state.history.clear();
        state.history.resize(FFT_SIZE, 0.0);
    }

    /// Total number of samples written through the current connection.
    pub fn samples_written(&self) -> u64 {
        self.lock().written
    }

    /// Copies the waveform into `out` as bytes where 128 is the zero
    /// crossing. Only the first `out.len()` values of the window are copied.
    pub fn get_byte_time_domain_data(&self, out: &mut [u8]) {
        let state = self.lock();
        for (byte, sample) in out.iter_mut().zip(state.history.iter()) {
            *byte = time_domain_byte(*sample);
        }
    }

    /// Copies smoothed frequency magnitudes into `out` as bytes between
    /// [`MIN_DECIBELS`] and [`MAX_DECIBELS`]. The transform only runs again
    /// once new samples have arrived, so repeated reads within one audio
    /// quantum return identical bytes.
    pub fn get_byte_frequency_data(&mut self, out: &mut [u8]) {
        let written = {
            let state = lock_state(&self.shared);
            for (slot, sample) in self.fft.input.iter_mut().zip(state.history.iter()) {
                *slot = *sample;
            }
            state.written
        };

        if self.computed_at != Some(written) {
            self.compute_frequency();
            self.computed_at = Some(written);
        }

        let len = out.len().min(self.frequency_bytes.len());
        out[..len].copy_from_slice(&self.frequency_bytes[..len]);
    }

    fn compute_frequency(&mut self) {
        for (sample, weight) in self.fft.input.iter_mut().zip(self.window.iter()) {
            *sample *= weight;
        }

        if let Err(err) = self.fft.plan.process_with_scratch(
            &mut self.fft.input,
            &mut self.fft.spectrum,
            &mut self.fft.scratch,
        ) {
            tracing::warn!(%err, "frequency transform failed");
            return;
        }

        let scale = 1.0 / FFT_SIZE as f32;
        let range = MAX_DECIBELS - MIN_DECIBELS;

        for (bin, (smoothed, byte)) in self
            .smoothed
            .iter_mut()
            .zip(self.frequency_bytes.iter_mut())
            .enumerate()
        {
            let magnitude = self.fft.spectrum[bin].norm() * scale;
            let mut value = SMOOTHING_TIME_CONSTANT * *smoothed
                + (1.0 - SMOOTHING_TIME_CONSTANT) * magnitude;
            if !value.is_finite() {
                value = 0.0;
            }
            *smoothed = value;

            let decibels = 20.0 * value.log10();
            let scaled = 255.0 * (decibels - MIN_DECIBELS) / range;
            *byte = if scaled.is_nan() {
                0
            } else {
                scaled.clamp(0.0, 255.0) as u8
            };
        }
    }

    fn reset_smoothing(&mut self) {
        self.smoothed.iter_mut().for_each(|v| *v = 0.0);
        self.frequency_bytes.iter_mut().for_each(|b| *b = 0);
        self.computed_at = None;
    }

    fn lock(&self) -> MutexGuard<'_, TapState> {
        lock_state(&self.shared)
    }
}

fn lock_state(shared: &Mutex<TapState>) -> MutexGuard<'_, TapState> {
    shared
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Default for AnalyserNode {
    fn default() -> Self {
        Self::new()
    }
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for AnalyserNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyserNode")
            .field("fft_size", &FFT_SIZE)
            .field("generation", &self.generation)
            .field("connected", &self.connected)
            .field("computed_at", &self.computed_at)
            .finish()
    }
}

fn time_domain_byte(sample: f32) -> u8 {
    let scaled = 128.0 * (sample + 1.0);
    if scaled.is_nan() {
        return 128;
    }
    scaled.clamp(0.0, 255.0) as u8
}

fn blackman_value(index: usize) -> f32 {
    let a0 = 0.5 * (1.0 - BLACKMAN_ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * BLACKMAN_ALPHA;
    let x = index as f32 / FFT_SIZE as f32;

    a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
}
