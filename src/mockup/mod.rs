// src/mockup/mod.rs
pub mod compositor;
pub mod crop;
pub mod editor;
pub mod persistence;
pub mod scene;
pub mod units;

pub use compositor::{Compositor, PixelRect, RenderSurface};
pub use crop::{CropPreview, crop_preview};
pub use editor::{EditorServices, LaunchOptions, MockupEditor};
pub use persistence::{MockupStore, SavedMockupRef};
pub use scene::{MockupScene, PhotoRef, PrintId};
