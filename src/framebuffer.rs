//! Linux framebuffer binding for the player.
//!
//! [`Framebuffer`] pushes finished frames to `/dev/fb*` (memory-mapped when
//! possible, plain writes otherwise, a raw file when there is no device).
//! [`FramebufferSurface`] implements [`Surface`] on top of it: layers share a
//! scene with the surface, opacity changes animate with an ease-in-out curve
//! over the fade duration, and [`FramebufferSurface::render`] composites
//! whatever is attached.
//!
//! There is no decoder here. Video layers keep a software playhead so seeking
//! and rate changes behave, and draw as black.

use image::{imageops, Rgba, RgbaImage};
use memmap2::MmapMut;
use rayon::prelude::*;
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Result as IoResult, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::SurfaceError;
use crate::surface::{Playhead, Surface, VideoLayer, VisualLayer};
use crate::text;

pub const DEFAULT_WIDTH: u32 = 1920;
pub const DEFAULT_HEIGHT: u32 = 1080;
/// Roughly 30 frames per second while something is animating.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(33);
const FALLBACK_OUTPUT: &str = "framebuffer_output.raw";

pub struct Framebuffer {
    file: Option<File>,
    mmap: Option<MmapMut>,
    width: u32,
    height: u32,
    fallback_file: Option<BufWriter<File>>,
}

impl Framebuffer {
    pub fn open(framebuffer_path: &Path, width: u32, height: u32) -> IoResult<Self> {
        let f = match OpenOptions::new().read(true).write(true).open(framebuffer_path) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %framebuffer_path.display(), error = %e, "failed to open framebuffer, writing frames to {}", FALLBACK_OUTPUT);
                let fallback = File::create(FALLBACK_OUTPUT)?;
                return Ok(Self {
                    file: None,
                    mmap: None,
                    width,
                    height,
                    fallback_file: Some(BufWriter::new(fallback)),
                });
            }
        };

        if let Ok(metadata) = f.metadata() {
            debug!(size = metadata.len(), "framebuffer device opened");
        }

        // SAFETY: the mapping is only written through `present`, and nothing
        // in this process truncates the device.
        let mmap = match unsafe { MmapMut::map_mut(&f) } {
            Ok(mmap) if !mmap.is_empty() => {
                info!(size = mmap.len(), "memory-mapped framebuffer device");
                Some(mmap)
            }
            Ok(_) => {
                info!("memory-mapped framebuffer has 0 bytes, falling back to direct writes");
                None
            }
            Err(e) => {
                info!(error = %e, "memory mapping failed, trying direct writes");
                None
            }
        };

        Ok(Self {
            file: Some(f),
            mmap,
            width,
            height,
            fallback_file: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn present(&mut self, frame: &RgbaImage) -> IoResult<()> {
        let buffer = self.to_bgra(frame);
        self.display_buffer(&buffer)
    }

    fn display_buffer(&mut self, buffer: &[u8]) -> IoResult<()> {
        if let Some(ref mut mmap) = self.mmap {
            let copy_len = buffer.len().min(mmap.len());
            mmap[..copy_len].copy_from_slice(&buffer[..copy_len]);
            mmap.flush()?;
        } else if let Some(ref mut file) = self.file {
            file.seek(SeekFrom::Start(0))?;

            const CHUNK_SIZE: usize = 65536;
            for chunk in buffer.chunks(CHUNK_SIZE) {
                file.write_all(chunk)?;
            }
            file.sync_data()?;
        } else if let Some(ref mut fallback) = self.fallback_file {
            fallback.write_all(buffer)?;
            fallback.flush()?;
        }
        Ok(())
    }

    /// RGBA to the device's BGRA, padding with black where the frame is smaller.
    fn to_bgra(&self, frame: &RgbaImage) -> Vec<u8> {
        let mut buffer = Vec::with_capacity((self.width * self.height * 4) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let pixel = if x < frame.width() && y < frame.height() {
                    *frame.get_pixel(x, y)
                } else {
                    Rgba([0, 0, 0, 255])
                };
                buffer.extend_from_slice(&[pixel[2], pixel[1], pixel[0], pixel[3]]);
            }
        }
        buffer
    }
}

pub fn ease_in_out(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - 2.0 * (1.0 - t) * (1.0 - t)
    }
}

/// Blends `layer` over `base` at `alpha` in place.
pub fn blend_over(base: &mut RgbaImage, layer: &RgbaImage, alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    base.par_chunks_mut(4)
        .zip(layer.par_chunks(4))
        .for_each(|(dst, src)| mix(dst, src, alpha));
}

fn fill_over(base: &mut RgbaImage, color: Rgba<u8>, alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    base.par_chunks_mut(4).for_each(|dst| mix(dst, &color.0, alpha));
}

fn mix(dst: &mut [u8], src: &[u8], alpha: f32) {
    for channel in 0..3 {
        dst[channel] = (dst[channel] as f32 * (1.0 - alpha) + src[channel] as f32 * alpha).round() as u8;
    }
}

#[derive(Debug, Clone, Copy)]
struct Fade {
    from: f32,
    to: f32,
    start: Duration,
}

impl Fade {
    fn value(&self, now: Duration, length: Duration) -> f32 {
        if length.is_zero() || now >= self.start + length {
            return self.to;
        }
        let t = now.saturating_sub(self.start).as_secs_f32() / length.as_secs_f32();
        self.from + (self.to - self.from) * ease_in_out(t)
    }

    fn is_running(&self, now: Duration, length: Duration) -> bool {
        self.from != self.to && now < self.start + length
    }
}

enum Content {
    Image(Option<RgbaImage>),
    Video,
}

struct LayerState {
    fade: Fade,
    content: Content,
}

struct Scene {
    now: Duration,
    fade_length: Duration,
    layers: Vec<Rc<RefCell<LayerState>>>,
    error: Option<String>,
    dirty: bool,
}

pub struct FbLayer {
    scene: Rc<RefCell<Scene>>,
    state: Rc<RefCell<LayerState>>,
}

impl FbLayer {
    fn new(scene: &Rc<RefCell<Scene>>, content: Content) -> Self {
        Self {
            scene: scene.clone(),
            state: Rc::new(RefCell::new(LayerState {
                fade: Fade {
                    from: 0.0,
                    to: 0.0,
                    start: Duration::ZERO,
                },
                content,
            })),
        }
    }

    fn now(&self) -> Duration {
        self.scene.borrow().now
    }

    /// Opacity as currently drawn.
    pub fn opacity(&self) -> f32 {
        let scene = self.scene.borrow();
        self.state.borrow().fade.value(scene.now, scene.fade_length)
    }

    pub fn is_attached(&self) -> bool {
        self.scene
            .borrow()
            .layers
            .iter()
            .any(|layer| Rc::ptr_eq(layer, &self.state))
    }
}

impl VisualLayer for FbLayer {
    fn attach(&mut self) {
        let mut scene = self.scene.borrow_mut();
        if !scene.layers.iter().any(|layer| Rc::ptr_eq(layer, &self.state)) {
            scene.layers.push(self.state.clone());
            scene.dirty = true;
        }
    }

    fn detach(&mut self) {
        let mut scene = self.scene.borrow_mut();
        scene.layers.retain(|layer| !Rc::ptr_eq(layer, &self.state));
        scene.dirty = true;
        if let Content::Image(pixels) = &mut self.state.borrow_mut().content {
            *pixels = None;
        }
    }

    fn set_opacity(&mut self, opacity: f32) {
        let current = self.opacity();
        let now = self.now();
        self.state.borrow_mut().fade = Fade {
            from: current,
            to: opacity.clamp(0.0, 1.0),
            start: now,
        };
        self.scene.borrow_mut().dirty = true;
    }
}

/// A rate-aware clock standing in for a decoder.
#[derive(Debug, Clone, Copy)]
struct SoftPlayhead {
    anchor_position: f64,
    anchor_time: Duration,
    rate: f64,
    playing: bool,
}

impl SoftPlayhead {
    fn position(&self, now: Duration) -> f64 {
        if self.playing {
            let elapsed = now.saturating_sub(self.anchor_time).as_secs_f64();
            self.anchor_position + elapsed * self.rate
        } else {
            self.anchor_position
        }
    }

    fn rebase(&mut self, now: Duration) {
        self.anchor_position = self.position(now).max(0.0);
        self.anchor_time = now;
    }
}

pub struct FbVideo {
    layer: FbLayer,
    path: PathBuf,
    playhead: SoftPlayhead,
    muted: bool,
    volume: f64,
}

impl FbVideo {
    pub fn is_playing(&self) -> bool {
        self.playhead.playing
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }
}

impl VisualLayer for FbVideo {
    fn attach(&mut self) {
        self.layer.attach();
    }

    fn detach(&mut self) {
        self.layer.detach();
    }

    fn set_opacity(&mut self, opacity: f32) {
        self.layer.set_opacity(opacity);
    }
}

impl Playhead for FbVideo {
    fn position(&self) -> f64 {
        self.playhead.position(self.layer.now())
    }

    fn set_position(&mut self, seconds: f64) {
        self.playhead.anchor_position = seconds.max(0.0);
        self.playhead.anchor_time = self.layer.now();
    }

    fn playback_rate(&self) -> f64 {
        self.playhead.rate
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.playhead.rebase(self.layer.now());
        self.playhead.rate = rate;
    }
}

impl VideoLayer for FbVideo {
    fn play(&mut self) -> Result<(), SurfaceError> {
        if !self.path.is_file() {
            return Err(SurfaceError::Playback {
                path: self.path.clone(),
                reason: "file not found".to_string(),
            });
        }
        self.playhead.rebase(self.layer.now());
        self.playhead.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.playhead.rebase(self.layer.now());
        self.playhead.playing = false;
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn set_volume(&mut self, volume: f64) {
        self.volume = volume;
    }

    fn has_ended(&self) -> bool {
        // Without a decoder the stream length is unknown.
        false
    }
}

pub struct FramebufferSurface {
    device: Framebuffer,
    scene: Rc<RefCell<Scene>>,
    background: Option<RgbaImage>,
    rotate_180: bool,
}

impl FramebufferSurface {
    pub fn new(device: Framebuffer, fade_length: Duration) -> Self {
        Self {
            device,
            scene: Rc::new(RefCell::new(Scene {
                now: Duration::ZERO,
                fade_length,
                layers: Vec::new(),
                error: None,
                dirty: true,
            })),
            background: None,
            rotate_180: false,
        }
    }

    pub fn with_background(mut self, path: Option<&Path>) -> Self {
        self.background = path.and_then(|path| self.load_scaled(path));
        self
    }

    pub fn with_rotation(mut self, rotate_180: bool) -> Self {
        self.rotate_180 = rotate_180;
        self
    }

    /// Moves the surface clock. Fades and playheads read it.
    pub fn set_time(&mut self, now: Duration) {
        self.scene.borrow_mut().now = now;
    }

    pub fn attached_layers(&self) -> usize {
        self.scene.borrow().layers.len()
    }

    pub fn error_message(&self) -> Option<String> {
        self.scene.borrow().error.clone()
    }

    /// True while a fade is running or the scene changed since the last frame.
    pub fn needs_redraw(&self) -> bool {
        let scene = self.scene.borrow();
        scene.dirty
            || scene
                .layers
                .iter()
                .any(|layer| layer.borrow().fade.is_running(scene.now, scene.fade_length))
    }

    pub fn compose(&self) -> RgbaImage {
        let (width, height) = (self.device.width(), self.device.height());
        let mut frame = match &self.background {
            Some(background) => background.clone(),
            None => RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255])),
        };

        let scene = self.scene.borrow();
        for layer in &scene.layers {
            let layer = layer.borrow();
            let alpha = layer.fade.value(scene.now, scene.fade_length);
            if alpha <= 0.0 {
                continue;
            }
            match &layer.content {
                Content::Image(Some(pixels)) => blend_over(&mut frame, pixels, alpha),
                Content::Image(None) => {}
                Content::Video => fill_over(&mut frame, Rgba([0, 0, 0, 255]), alpha),
            }
        }

        if let Some(message) = &scene.error {
            text::draw_banner(&mut frame, message, (height / 180).max(2));
        }

        if self.rotate_180 {
            imageops::rotate180_in_place(&mut frame);
        }
        frame
    }

    pub fn render(&mut self) -> IoResult<()> {
        let frame = self.compose();
        self.device.present(&frame)?;
        self.scene.borrow_mut().dirty = false;
        Ok(())
    }

    fn load_scaled(&self, path: &Path) -> Option<RgbaImage> {
        let (width, height) = (self.device.width(), self.device.height());
        match image::open(path) {
            Ok(img) if img.width() == width && img.height() == height => Some(img.to_rgba8()),
            Ok(img) => Some(
                img.resize_exact(width, height, imageops::FilterType::Triangle)
                    .to_rgba8(),
            ),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load image");
                None
            }
        }
    }
}

impl Surface for FramebufferSurface {
    type Image = FbLayer;
    type Video = FbVideo;

    fn create_image(&mut self, path: &Path) -> FbLayer {
        let pixels = self.load_scaled(path);
        FbLayer::new(&self.scene, Content::Image(pixels))
    }

    fn create_video(&mut self, path: &Path) -> FbVideo {
        FbVideo {
            layer: FbLayer::new(&self.scene, Content::Video),
            path: path.to_path_buf(),
            playhead: SoftPlayhead {
                anchor_position: 0.0,
                anchor_time: self.scene.borrow().now,
                rate: 1.0,
                playing: false,
            },
            muted: false,
            volume: 1.0,
        }
    }

    fn show_error(&mut self, message: &str) {
        let mut scene = self.scene.borrow_mut();
        scene.error = (!message.is_empty()).then(|| message.to_string());
        scene.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FADE: Duration = Duration::from_secs(1);

    fn surface(dir: &tempfile::TempDir) -> FramebufferSurface {
        let device_path = dir.path().join("fb0");
        File::create(&device_path).unwrap();
        FramebufferSurface::new(Framebuffer::open(&device_path, 4, 2).unwrap(), FADE)
    }

    fn write_png(dir: &tempfile::TempDir, name: &str, color: Rgba<u8>) -> PathBuf {
        let path = dir.path().join(name);
        RgbaImage::from_pixel(8, 4, color).save(&path).unwrap();
        path
    }

    #[test]
    fn easing_is_symmetric_and_bounded() {
        assert_eq!(ease_in_out(0.0), 0.0);
        assert_eq!(ease_in_out(0.5), 0.5);
        assert_eq!(ease_in_out(1.0), 1.0);
        assert_eq!(ease_in_out(2.0), 1.0);
        assert!((ease_in_out(0.25) + ease_in_out(0.75) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn image_fades_in_over_the_fade_length() {
        let dir = tempfile::tempdir().unwrap();
        let mut surface = surface(&dir);
        let path = write_png(&dir, "white.png", Rgba([255, 255, 255, 255]));

        let mut layer = surface.create_image(&path);
        layer.attach();
        assert_eq!(*surface.compose().get_pixel(0, 0), Rgba([0, 0, 0, 255]));

        layer.set_opacity(1.0);
        surface.set_time(Duration::from_millis(500));
        assert_eq!(layer.opacity(), 0.5);
        assert_eq!(surface.compose().get_pixel(0, 0)[0], 128);
        assert!(surface.needs_redraw());

        surface.set_time(Duration::from_millis(1_000));
        surface.render().unwrap();
        assert_eq!(*surface.compose().get_pixel(3, 1), Rgba([255, 255, 255, 255]));
        assert!(!surface.needs_redraw());

        assert_eq!(surface.attached_layers(), 1);
        layer.detach();
        assert!(!layer.is_attached());
        assert_eq!(*surface.compose().get_pixel(0, 0), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn render_writes_bgra_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut surface = surface(&dir);
        let path = write_png(&dir, "red.png", Rgba([255, 0, 0, 255]));

        let mut layer = surface.create_image(&path);
        layer.attach();
        layer.set_opacity(1.0);
        surface.set_time(FADE);
        surface.render().unwrap();

        let written = std::fs::read(dir.path().join("fb0")).unwrap();
        assert_eq!(written.len(), 4 * 2 * 4);
        assert_eq!(&written[..4], &[0, 0, 255, 255]);
    }

    #[test]
    fn rotation_flips_the_frame() {
        let dir = tempfile::tempdir().unwrap();
        let background = dir.path().join("bg.png");
        let mut img = RgbaImage::from_pixel(4, 2, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([0, 255, 0, 255]));
        img.save(&background).unwrap();

        let surface = surface(&dir)
            .with_background(Some(&background))
            .with_rotation(true);
        let frame = surface.compose();
        assert_eq!(*frame.get_pixel(3, 1), Rgba([0, 255, 0, 255]));
        assert_eq!(*frame.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn software_playhead_follows_rate_and_pause() {
        let dir = tempfile::tempdir().unwrap();
        let mut surface = surface(&dir);
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"").unwrap();

        let mut video = surface.create_video(&path);
        video.play().unwrap();
        surface.set_time(Duration::from_secs(2));
        assert_eq!(video.position(), 2.0);

        video.set_playback_rate(1.5);
        surface.set_time(Duration::from_secs(4));
        assert_eq!(video.position(), 5.0);

        video.pause();
        surface.set_time(Duration::from_secs(10));
        assert_eq!(video.position(), 5.0);

        video.set_position(1.0);
        assert_eq!(video.position(), 1.0);

        video.set_muted(true);
        video.set_volume(0.5);
        assert!(video.is_muted());
        assert_eq!(video.volume(), 0.5);
    }

    #[test]
    fn missing_video_file_fails_to_play() {
        let dir = tempfile::tempdir().unwrap();
        let mut surface = surface(&dir);
        let mut video = surface.create_video(&dir.path().join("gone.mp4"));
        assert!(matches!(video.play(), Err(SurfaceError::Playback { .. })));
        assert!(!video.is_playing());
    }

    #[test]
    fn error_message_is_drawn_until_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let mut surface = surface(&dir);
        surface.show_error("media 9 missing");
        assert_eq!(surface.error_message().as_deref(), Some("media 9 missing"));
        surface.show_error("");
        assert_eq!(surface.error_message(), None);
    }
}
