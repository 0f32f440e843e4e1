pub mod canvas;
pub mod font;
pub mod render;

pub use canvas::Canvas;
pub use font::{find_font, load_font};
pub use render::{FrameContent, FrameStats, PhaseRenderer, Renderer, SkiaRenderer, render_text_pixmap};
