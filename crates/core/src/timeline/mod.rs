use std::{
    collections::VecDeque,
    ops::ControlFlow,
    thread,
    time::{Duration, Instant},
};

use crate::{FrameRenderer, Result, SnapshotSource, Surface};

const TARGET_FPMS: f64 = 0.06;
/// Frames slower than this are reported as 10 FPS.
const MAX_ELAPSED_MS: f64 = 100.0;

/// Frame-rate counter driven by the same timestamps as the render loop.
#[derive(Debug, Clone)]
pub struct FpsTicker {
    last_time: f64,
    elapsed_ms: f64,
}

impl FpsTicker {
    pub fn new() -> Self {
        Self {
            last_time: 0.0,
            elapsed_ms: 1.0 / TARGET_FPMS,
        }
    }

    pub fn update(&mut self, now_ms: f64) {
        if now_ms > self.last_time {
            self.elapsed_ms = (now_ms - self.last_time).min(MAX_ELAPSED_MS);
        } else {
            self.elapsed_ms = 0.0;
        }
        self.last_time = now_ms;
    }

    pub fn fps(&self) -> f64 {
        if self.elapsed_ms > 0.0 {
            1000.0 / self.elapsed_ms
        } else {
            0.0
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }
}

impl Default for FpsTicker {
    fn default() -> Self {
        Self::new()
    }
}

/// Source of display-frame timestamps in milliseconds.
pub trait TickSource {
    /// Waits for the next frame. `None` ends the loop.
    fn next_tick(&mut self) -> Option<f64>;
}

/// Real-time ticks at a fixed interval. Ticks that were missed because a
/// frame took too long are dropped rather than delivered in a burst.
#[derive(Debug)]
pub struct IntervalTicks {
    start: Instant,
    interval: Duration,
    next: Instant,
}

impl IntervalTicks {
    pub fn new(interval: Duration) -> Self {
        let start = Instant::now();
        Self {
            start,
            interval: interval.max(Duration::from_millis(1)),
            next: start,
        }
    }
}

impl TickSource for IntervalTicks {
    fn next_tick(&mut self) -> Option<f64> {
        let now = Instant::now();
        if self.next > now {
            thread::sleep(self.next - now);
        }

        let now = Instant::now();
        self.next += self.interval;
        while self.next <= now {
            self.next += self.interval;
        }

        Some(now.duration_since(self.start).as_secs_f64() * 1000.0)
    }
}

/// Predetermined timestamps, for driving the loop deterministically.
#[derive(Debug, Clone, Default)]
pub struct ManualTicks {
    ticks: VecDeque<f64>,
}

impl ManualTicks {
    pub fn new(ticks: impl IntoIterator<Item = f64>) -> Self {
        Self {
            ticks: ticks.into_iter().collect(),
        }
    }

    /// `count` ticks spaced `interval_ms` apart, starting at one interval.
    pub fn every(interval_ms: f64, count: usize) -> Self {
        Self::new((1..=count).map(|i| i as f64 * interval_ms))
    }

    pub fn remaining(&self) -> usize {
        self.ticks.len()
    }
}

impl TickSource for ManualTicks {
    fn next_tick(&mut self) -> Option<f64> {
        self.ticks.pop_front()
    }
}

/// Drives a renderer from a tick source. Before each frame `between` runs
/// with the tick timestamp so the caller can handle input and loads; it ends
/// the loop by returning `ControlFlow::Break`. A frame is only drawn while
/// the renderer has one pending, so ticks that arrive while it is stopped are
/// dropped. Frame errors are logged and do not stop the loop.
///
/// Returns the number of frames drawn.
pub fn run_frame_loop<S, A, T, F>(
    renderer: &mut FrameRenderer<S>,
    audio: &mut A,
    ticks: &mut T,
    mut between: F,
) -> Result<u64>
where
    S: Surface,
    A: SnapshotSource,
    T: TickSource,
    F: FnMut(&mut FrameRenderer<S>, &mut A, f64) -> Result<ControlFlow<()>>,
{
    let mut frames = 0;

    while let Some(now) = ticks.next_tick() {
        if between(renderer, audio, now)?.is_break() {
            break;
        }

        match renderer.render_frame(audio, now) {
            Ok(true) => frames += 1,
            Ok(false) => {}
            Err(err) => tracing::warn!(%err, "frame failed"),
        }
    }

    tracing::debug!(frames, "frame loop finished");
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_follows_frame_spacing() {
        let mut ticker = FpsTicker::new();
        ticker.update(20.0);
        ticker.update(40.0);
        assert!((ticker.fps() - 50.0).abs() < 1e-9);
        assert!((ticker.elapsed_ms() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn slow_frames_are_capped() {
        let mut ticker = FpsTicker::new();
        ticker.update(10.0);
        ticker.update(2_000.0);
        assert!((ticker.fps() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn repeated_timestamps_report_zero() {
        let mut ticker = FpsTicker::new();
        ticker.update(16.0);
        ticker.update(16.0);
        assert_eq!(ticker.fps(), 0.0);
    }

    #[test]
    fn manual_ticks_are_evenly_spaced() {
        let mut ticks = ManualTicks::every(16.0, 3);
        assert_eq!(ticks.next_tick(), Some(16.0));
        assert_eq!(ticks.next_tick(), Some(32.0));
        assert_eq!(ticks.next_tick(), Some(48.0));
        assert_eq!(ticks.next_tick(), None);
    }

    struct Silence;

    impl SnapshotSource for Silence {
        fn sample(&mut self) -> Option<crate::Snapshot<'_>> {
            None
        }
    }

    fn renderer() -> FrameRenderer<crate::PixelSurface> {
        FrameRenderer::initialize(crate::PixelSurface::new(64, 64), 1.0)
    }

    #[test]
    fn loop_drops_ticks_while_stopped() {
        let mut renderer = renderer();
        renderer.start();
        let mut ticks = ManualTicks::every(16.0, 6);

        let frames = run_frame_loop(&mut renderer, &mut Silence, &mut ticks, |renderer, _, now| {
            if now == 32.0 {
                renderer.stop();
            } else if now == 80.0 {
                renderer.start();
            }
            Ok(ControlFlow::Continue(()))
        })
        .unwrap();

        // 16 drawn, 32..64 dropped, 80 and 96 drawn
        assert_eq!(frames, 3);
        assert_eq!(renderer.surface().frames_presented(), 3);
        assert_eq!(ticks.remaining(), 0);
    }

    #[test]
    fn loop_ends_on_break() {
        let mut renderer = renderer();
        renderer.start();
        let mut ticks = ManualTicks::every(16.0, 10);

        let frames = run_frame_loop(&mut renderer, &mut Silence, &mut ticks, |_, _, now| {
            Ok(if now >= 48.0 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            })
        })
        .unwrap();

        assert_eq!(frames, 2);
        assert_eq!(ticks.remaining(), 7);
    }

    #[test]
    fn interval_ticks_move_forward() {
        let mut ticks = IntervalTicks::new(Duration::from_millis(2));
        let first = ticks.next_tick().unwrap();
        let second = ticks.next_tick().unwrap();
        assert!(second > first);
    }
}
