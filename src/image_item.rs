use std::path::{Path, PathBuf};

use crate::surface::VisualLayer;
use crate::transition::FadeItem;

/// A still image on the surface. It has no timers of its own.
pub struct ImageItem<L> {
    layer: L,
    path: PathBuf,
}

impl<L: VisualLayer> ImageItem<L> {
    pub fn new(layer: L, path: impl Into<PathBuf>) -> Self {
        Self {
            layer,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
    }
}

impl<L: VisualLayer> FadeItem for ImageItem<L> {
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
