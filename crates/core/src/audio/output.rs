use std::{cell::RefCell, rc::Rc};

use crate::{audio::TrackSource, Result};

/// Handle to one source playing on an [`AudioOutput`].
pub trait Voice {
    fn play(&mut self);
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    /// Silences the voice and detaches it from the output for good.
    fn stop(&mut self);
}

/// Audible destination that sources are connected to. The output decides
/// when samples are pulled; the engine only observes the resulting
/// position through the source's transport.
pub trait AudioOutput {
    type Voice: Voice;

    /// Starts pulling samples from `source`. New voices begin paused.
    fn connect(&mut self, source: TrackSource) -> Result<Self::Voice>;
}

struct OfflineSlot {
    source: TrackSource,
    paused: bool,
    stopped: bool,
}

/// Output without a device. Samples are only pulled when [`render`] is
/// called, which makes playback deterministic for tests and for rendering
/// single frames ahead of time.
///
/// [`render`]: OfflineOutput::render
#[derive(Default)]
pub struct OfflineOutput {
    slots: Vec<Rc<RefCell<OfflineSlot>>>,
    connections: usize,
}

impl OfflineOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pulls `frames` frames from every playing voice.
    pub fn render(&mut self, frames: usize) {
        self.slots.retain(|slot| !slot.borrow().stopped);

        for slot in &self.slots {
            let mut slot = slot.borrow_mut();
            if slot.paused {
                continue;
            }

            let samples = frames * slot.source.channels() as usize;
            slot.source.by_ref().take(samples).for_each(drop);
            slot.source.flush_analysis();
        }
    }

    /// Pulls `seconds` worth of audio from every playing voice.
    pub fn render_seconds(&mut self, seconds: f64) {
        let rate = self
            .slots
            .iter()
            .map(|slot| slot.borrow().source.sample_rate())
            .max()
            .unwrap_or(0);
        self.render((seconds.max(0.0) * rate as f64).round() as usize);
    }

    /// Voices that are connected and not stopped.
    pub fn active_voices(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| !slot.borrow().stopped)
            .count()
    }

    /// Total number of connections made over the lifetime of the output.
    pub fn total_connections(&self) -> usize {
        self.connections
    }
}

impl AudioOutput for OfflineOutput {
    type Voice = OfflineVoice;

    fn connect(&mut self, source: TrackSource) -> Result<OfflineVoice> {
        let slot = Rc::new(RefCell::new(OfflineSlot {
            source,
            paused: true,
            stopped: false,
        }));
        self.slots.push(slot.clone());
        self.connections += 1;
        Ok(OfflineVoice { slot })
    }
}

impl std::fmt::Debug for OfflineOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineOutput")
            .field("active_voices", &self.active_voices())
            .field("connections", &self.connections)
            .finish()
    }
}

pub struct OfflineVoice {
    slot: Rc<RefCell<OfflineSlot>>,
}

impl Voice for OfflineVoice {
    fn play(&mut self) {
        self.slot.borrow_mut().paused = false;
    }

    fn pause(&mut self) {
        self.slot.borrow_mut().paused = true;
    }

    fn is_paused(&self) -> bool {
        self.slot.borrow().paused
    }

    fn stop(&mut self) {
        let mut slot = self.slot.borrow_mut();
        slot.paused = true;
        slot.stopped = true;
    }
}

impl std::fmt::Debug for OfflineVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot.borrow();
        f.debug_struct("OfflineVoice")
            .field("paused", &slot.paused)
            .field("stopped", &slot.stopped)
            .finish()
    }
}
