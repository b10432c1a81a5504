//! Capabilities the player needs from whatever actually draws pixels.
//!
//! The transition and seek logic only ever talks to these traits, so the same
//! core runs against the framebuffer binding, a browser bridge, or the
//! recording mocks used in tests.

use std::path::Path;

use crate::error::SurfaceError;

/// Something that can be placed in the visual tree and faded.
pub trait VisualLayer {
    /// Inserts the layer into the visual tree. Layers are created at opacity 0.
    fn attach(&mut self);

    /// Removes the layer from the visual tree and releases what it holds.
    fn detach(&mut self);

    /// Starts animating towards `opacity` over the surface's fade duration.
    fn set_opacity(&mut self, opacity: f32);
}

pub trait Playhead {
    /// Current position in seconds.
    fn position(&self) -> f64;
    fn set_position(&mut self, seconds: f64);
    fn playback_rate(&self) -> f64;
    fn set_playback_rate(&mut self, rate: f64);
}

pub trait VideoLayer: VisualLayer + Playhead {
    /// Begins playback. The binding may finish starting asynchronously.
    fn play(&mut self) -> Result<(), SurfaceError>;
    fn pause(&mut self);
    fn set_muted(&mut self, muted: bool);
    /// `volume` is already clamped to `[0, 1]`.
    fn set_volume(&mut self, volume: f64);
    fn has_ended(&self) -> bool;
}

pub trait Surface {
    type Image: VisualLayer;
    type Video: VideoLayer;

    fn create_image(&mut self, path: &Path) -> Self::Image;
    fn create_video(&mut self, path: &Path) -> Self::Video;

    /// Shows a message to whoever is standing in front of the kiosk.
    fn show_error(&mut self, message: &str);
}
