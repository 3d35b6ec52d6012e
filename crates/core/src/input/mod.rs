//! Translates user gestures into transport and load calls.

use crate::{
    audio::{is_playable_type, AudioEngine, AudioOutput, LoadEvent, LoadTicket, PlaybackState},
    render::{
        FrameRenderer, Surface, TRACK_BAR_WIDTH, TRACK_INSET, TRACK_ROW_HEIGHT, TRACK_ROW_WIDTH,
    },
    PlayerError, Result,
};

/// Whatever shows the play/pause state to the user.
pub trait ControlAffordance {
    fn refresh(&mut self, state: PlaybackState);
}

impl<F: FnMut(PlaybackState)> ControlAffordance for F {
    fn refresh(&mut self, state: PlaybackState) {
        self(state)
    }
}

/// Seek fraction for a track-local x coordinate.
pub fn track_fraction(x: f32) -> f64 {
    let fraction = f64::from((x - TRACK_INSET) / TRACK_BAR_WIDTH);
    if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    }
}

/// Routes gestures to the engine and keeps a control affordance in sync
/// with the resulting playback state.
#[derive(Debug)]
pub struct InputBridge<C: ControlAffordance> {
    affordance: C,
}

impl<C: ControlAffordance> InputBridge<C> {
    pub fn new(affordance: C) -> Self {
        Self { affordance }
    }

    /// Seeks to the fraction under a track-local point. Points outside the
    /// progress row are ignored. Returns the fraction that was applied.
    pub fn on_track_gesture<O: AudioOutput>(
        &mut self,
        engine: &mut AudioEngine<O>,
        x: f32,
        y: f32,
    ) -> Option<f64> {
        let on_row =
            (0.0..TRACK_ROW_WIDTH).contains(&x) && (0.0..TRACK_ROW_HEIGHT).contains(&y);
        if !on_row || !engine.has_source() {
            return None;
        }

        let fraction = track_fraction(x);
        engine.seek(fraction);
        Some(fraction)
    }

    /// Handles a pointer press in surface coordinates.
    pub fn on_pointer_down<O: AudioOutput, S: Surface>(
        &mut self,
        engine: &mut AudioEngine<O>,
        renderer: &FrameRenderer<S>,
        x: f32,
        y: f32,
    ) -> Option<f64> {
        let local = renderer.track_hit(x, y)?;
        self.on_track_gesture(engine, local.x, local.y)
    }

    /// Flips playback and refreshes the affordance with the new state.
    pub fn on_toggle_gesture<O: AudioOutput>(
        &mut self,
        engine: &mut AudioEngine<O>,
    ) -> Option<PlaybackState> {
        let state = engine.toggle_playback()?;
        self.affordance.refresh(state);
        Some(state)
    }

    /// Starts loading a user-selected file. Types outside the audio and video
    /// categories are rejected before anything is decoded.
    pub fn on_file_selected<O: AudioOutput>(
        &mut self,
        engine: &mut AudioEngine<O>,
        payload: Vec<u8>,
        mime_type: &str,
        name: &str,
    ) -> Result<LoadTicket> {
        if !is_playable_type(mime_type) {
            return Err(PlayerError::UnplayableType {
                mime: mime_type.to_string(),
            });
        }
        engine.load_source(payload, mime_type, name)
    }

    /// Reflects a finished load in the info layer and the affordance.
    pub fn on_load_event<S: Surface>(
        &mut self,
        renderer: &mut FrameRenderer<S>,
        event: &LoadEvent,
    ) {
        match event {
            LoadEvent::Loaded { info, .. } => {
                renderer.show_file_info(Some(info.clone()));
                self.affordance.refresh(PlaybackState::Active);
            }
            LoadEvent::Failed { error, .. } => self.report(renderer, error),
        }
    }

    /// Logs an error and shows user-facing ones as a notice.
    pub fn report<S: Surface>(&mut self, renderer: &mut FrameRenderer<S>, error: &PlayerError) {
        if error.is_user_facing() {
            tracing::warn!(%error, "rejected input");
            renderer.notify(error.to_string());
        } else {
            tracing::error!(%error, "input handling failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        audio::{DecodedAudio, FileInfo, OfflineOutput},
        render::PixelSurface,
    };

    fn engine_with_source(seconds: f64) -> AudioEngine<OfflineOutput> {
        let rate = 8_000;
        let frames = (seconds * f64::from(rate)) as usize;
        let samples = (0..frames)
            .map(|i| (i as f32 * 0.05).sin() * 0.5)
            .collect();
        let mut engine = AudioEngine::initialize(OfflineOutput::new());
        engine
            .load_decoded(
                DecodedAudio::new(samples, 1, rate).unwrap(),
                FileInfo {
                    name: "tone.wav".into(),
                    mime_type: "audio/wav".into(),
                },
            )
            .unwrap();
        engine
    }

    fn position(engine: &mut AudioEngine<OfflineOutput>) -> f64 {
        engine.sample().unwrap().position
    }

    #[test]
    fn track_fraction_clamps_to_the_bar() {
        assert_eq!(track_fraction(12.0), 0.0);
        assert_eq!(track_fraction(204.0), 0.5);
        assert_eq!(track_fraction(396.0), 1.0);
        assert_eq!(track_fraction(2.0), 0.0);
        assert_eq!(track_fraction(404.0), 1.0);
    }

    #[test]
    fn track_gesture_seeks_proportionally() {
        let mut engine = engine_with_source(10.0);
        let mut bridge = InputBridge::new(|_: PlaybackState| {});

        assert_eq!(bridge.on_track_gesture(&mut engine, 204.0, 16.0), Some(0.5));
        engine.output_mut().render(1);
        assert!((position(&mut engine) - 5.0).abs() < 0.01);

        assert_eq!(bridge.on_track_gesture(&mut engine, 500.0, 16.0), None);
        assert_eq!(bridge.on_track_gesture(&mut engine, 100.0, 40.0), None);
    }

    #[test]
    fn gestures_without_a_source_do_nothing() {
        let mut engine = AudioEngine::initialize(OfflineOutput::new());
        let mut refreshed = Vec::new();
        let mut bridge = InputBridge::new(|state: PlaybackState| refreshed.push(state));

        assert_eq!(bridge.on_track_gesture(&mut engine, 100.0, 10.0), None);
        assert_eq!(bridge.on_toggle_gesture(&mut engine), None);
        drop(bridge);
        assert!(refreshed.is_empty());
    }

    #[test]
    fn toggle_refreshes_the_affordance() {
        let mut engine = engine_with_source(1.0);
        let mut refreshed = Vec::new();
        let mut bridge = InputBridge::new(|state: PlaybackState| refreshed.push(state));

        assert_eq!(
            bridge.on_toggle_gesture(&mut engine),
            Some(PlaybackState::Inactive)
        );
        assert_eq!(
            bridge.on_toggle_gesture(&mut engine),
            Some(PlaybackState::Active)
        );
        drop(bridge);
        assert_eq!(
            refreshed,
            vec![PlaybackState::Inactive, PlaybackState::Active]
        );
    }

    #[test]
    fn unplayable_types_are_rejected_before_loading() {
        let mut engine = AudioEngine::initialize(OfflineOutput::new());
        let mut bridge = InputBridge::new(|_: PlaybackState| {});

        let err = bridge
            .on_file_selected(&mut engine, vec![1, 2, 3], "text/plain", "notes.txt")
            .unwrap_err();
        assert!(matches!(err, PlayerError::UnplayableType { ref mime } if mime == "text/plain"));
        assert!(engine.wait_for_load(Duration::from_millis(50)).is_none());
        assert!(!engine.has_source());
    }

    #[test]
    fn failed_loads_surface_as_notices() {
        let mut engine = AudioEngine::initialize(OfflineOutput::new());
        let mut renderer = FrameRenderer::initialize(PixelSurface::new(200, 200), 1.0);
        let mut bridge = InputBridge::new(|_: PlaybackState| {});

        bridge
            .on_file_selected(&mut engine, vec![0; 64], "audio/mpeg", "broken.mp3")
            .unwrap();
        let event = engine.wait_for_load(Duration::from_secs(10)).unwrap();
        assert!(matches!(event, LoadEvent::Failed { .. }));

        bridge.on_load_event(&mut renderer, &event);
        assert!(renderer.notice().unwrap().starts_with("could not decode audio"));
        assert!(!engine.has_source());
    }

    #[test]
    fn pointer_presses_are_routed_through_the_track_layer() {
        let mut engine = engine_with_source(8.0);
        let mut renderer = FrameRenderer::initialize(PixelSurface::new(840, 600), 1.0);
        let mut bridge = InputBridge::new(|_: PlaybackState| {});

        renderer.start();
        renderer.render_frame(&mut engine, 16.0).unwrap();

        // track row starts at x = 232, the bar at x = 244
        assert_eq!(
            bridge.on_pointer_down(&mut engine, &renderer, 244.0 + 96.0, 370.0),
            Some(0.25)
        );
        assert_eq!(bridge.on_pointer_down(&mut engine, &renderer, 10.0, 10.0), None);
    }
}
