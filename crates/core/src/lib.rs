//! Core library for the Spectrum Player.
//!
//! Decoded audio is played through an [`AudioOutput`] while an
//! [`AnalyserNode`] taps the same samples. Once per display frame the
//! [`FrameRenderer`] pulls a [`Snapshot`] from the engine and redraws a
//! retained [`Scene`] of spectrum bars, waveform and progress track, which a
//! [`Surface`] then presents. User gestures reach the engine through the
//! [`InputBridge`].

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod input;
pub mod render;
pub mod scene;
pub mod timeline;

pub use analysis::{AnalyserNode, AnalyserTap, BIN_COUNT, FFT_SIZE};
pub use audio::{
    decode, is_playable_type, AudioEngine, AudioOutput, DecodedAudio, FileInfo, LoadEvent,
    LoadTicket, OfflineOutput, PlaybackState, Snapshot, SnapshotSource, TrackSource, Transport,
    Voice,
};
pub use config::{AppConfig, RenderConfig, TerminalConfig};
pub use error::{PlayerError, Result};
pub use input::{ControlAffordance, InputBridge};
pub use render::{Color, FrameRenderer, PixelSurface, RenderState, Surface};
pub use scene::{LayerKind, Point, Scene, Shape};
pub use timeline::{run_frame_loop, FpsTicker, IntervalTicks, ManualTicks, TickSource};
