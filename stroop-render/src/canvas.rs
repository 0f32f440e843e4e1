//! Offscreen RGBA canvas with dirty-rectangle bookkeeping.
//!
//! Everything is premultiplied and the background is opaque, so clearing and
//! presenting are plain row copies.

use anyhow::{Context, Result};
use bytemuck::{cast_slice, cast_slice_mut};
use tiny_skia::{Color, Pixmap, Rect};

pub const BACKGROUND: [u8; 4] = [0, 0, 0, 255];

pub struct Canvas {
    pixmap: Pixmap,
    dirty: Vec<Rect>,
    clear_buffer: Vec<u8>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let mut pixmap = Pixmap::new(width.max(1), height.max(1))
            .with_context(|| format!("cannot allocate {}x{} canvas", width, height))?;
        pixmap.fill(Color::from_rgba8(
            BACKGROUND[0],
            BACKGROUND[1],
            BACKGROUND[2],
            BACKGROUND[3],
        ));
        let clear_buffer = pixmap.data().to_vec();
        Ok(Self {
            pixmap,
            dirty: Vec::with_capacity(16),
            clear_buffer,
        })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn data(&self) -> &[u8] {
        self.pixmap.data()
    }

    /// Regions drawn since the last `take_dirty`
    pub fn dirty(&self) -> &[Rect] {
        &self.dirty
    }

    pub fn take_dirty(&mut self) -> Vec<Rect> {
        std::mem::take(&mut self.dirty)
    }

    /// Resets the whole canvas to the background colour
    pub fn clear_all(&mut self) {
        self.pixmap.data_mut().copy_from_slice(&self.clear_buffer);
        self.dirty.clear();
    }

    pub fn clear_dirty(&mut self, dirty: &[Rect]) {
        let stride = self.width() as usize * 4;
        let (w, h) = (self.width(), self.height());
        let data = self.pixmap.data_mut();
        for rect in dirty {
            let Some((x0, y0, x1, y1)) = pixel_bounds(rect, w, h) else {
                continue;
            };
            for y in y0..y1 {
                let off = y * stride + x0 * 4;
                let len = (x1 - x0) * 4;
                data[off..off + len].copy_from_slice(&self.clear_buffer[off..off + len]);
            }
        }
    }

    /// Copies `rect` from the canvas into a frame buffer of the same size
    pub fn copy_region(&self, rect: &Rect, frame_buffer: &mut [u8]) {
        let Some((x0, y0, x1, y1)) = pixel_bounds(rect, self.width(), self.height()) else {
            return;
        };
        let stride = self.width() as usize * 4;
        let src = self.pixmap.data();
        for y in y0..y1 {
            let off = y * stride + x0 * 4;
            let len = (x1 - x0) * 4;
            if off + len > frame_buffer.len() {
                return;
            }
            frame_buffer[off..off + len].copy_from_slice(&src[off..off + len]);
        }
    }

    /// Draws `src` centred on `center`, clipped to the canvas. Returns the
    /// region touched, which is also queued as dirty.
    pub fn blit(&mut self, src: &Pixmap, center: (f32, f32)) -> Option<Rect> {
        let (cw, ch) = (self.width() as i64, self.height() as i64);
        let (sw, sh) = (src.width() as i64, src.height() as i64);
        let x = (center.0 - sw as f32 * 0.5).floor() as i64;
        let y = (center.1 - sh as f32 * 0.5).floor() as i64;

        if x + sw <= 0 || y + sh <= 0 || x >= cw || y >= ch {
            return None;
        }
        let dst_x = x.max(0) as usize;
        let dst_y = y.max(0) as usize;
        let src_x = (-x).max(0) as usize;
        let src_y = (-y).max(0) as usize;
        let copy_w = (sw as usize - src_x).min(cw as usize - dst_x);
        let copy_h = (sh as usize - src_y).min(ch as usize - dst_y);

        let src_px: &[[u8; 4]] = cast_slice(src.data());
        let dst_px: &mut [[u8; 4]] = cast_slice_mut(self.pixmap.data_mut());
        let (src_stride, dst_stride) = (sw as usize, cw as usize);

        for row in 0..copy_h {
            let s = (src_y + row) * src_stride + src_x;
            let d = (dst_y + row) * dst_stride + dst_x;
            let src_row = &src_px[s..s + copy_w];
            let dst_row = &mut dst_px[d..d + copy_w];
            if src_row.iter().all(|p| p[3] == 255) {
                dst_row.copy_from_slice(src_row);
            } else {
                for (dp, sp) in dst_row.iter_mut().zip(src_row) {
                    *dp = blend_over(*sp, *dp);
                }
            }
        }

        let rect = Rect::from_xywh(dst_x as f32, dst_y as f32, copy_w as f32, copy_h as f32)?;
        self.dirty.push(rect);
        Some(rect)
    }
}

/// Porter-Duff "over" on premultiplied RGBA
pub fn blend_over(src: [u8; 4], dst: [u8; 4]) -> [u8; 4] {
    let inv = 255 - src[3] as u32;
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = (src[i] as u32 + (dst[i] as u32 * inv + 127) / 255).min(255) as u8;
    }
    out
}

/// Integer pixel span of `rect` clipped to a `width` x `height` surface
pub fn pixel_bounds(rect: &Rect, width: u32, height: u32) -> Option<(usize, usize, usize, usize)> {
    let (w, h) = (width as f32, height as f32);
    let x0 = rect.x().floor().clamp(0.0, w) as usize;
    let y0 = rect.y().floor().clamp(0.0, h) as usize;
    let x1 = (rect.x() + rect.width()).ceil().clamp(0.0, w) as usize;
    let y1 = (rect.y() + rect.height()).ceil().clamp(0.0, h) as usize;
    (x1 > x0 && y1 > y0).then_some((x0, y0, x1, y1))
}

/// Merges rectangles that share a row band and touch horizontally
pub fn coalesce_dirty(rects: &mut Vec<Rect>) {
    rects.sort_by(|a, b| a.y().total_cmp(&b.y()).then(a.x().total_cmp(&b.x())));
    let mut out: Vec<Rect> = Vec::with_capacity(rects.len());
    for r in rects.drain(..) {
        if let Some(last) = out.last_mut() {
            let same_row = (r.y() - last.y()).abs() < 1.0 && (r.height() - last.height()).abs() < 1.0;
            let touching = r.x() <= last.x() + last.width() + 1.0;
            if same_row && touching {
                let nx = last.x().min(r.x());
                let nx2 = (last.x() + last.width()).max(r.x() + r.width());
                if let Some(merged) = Rect::from_xywh(nx, last.y(), nx2 - nx, last.height()) {
                    *last = merged;
                    continue;
                }
            }
        }
        out.push(r);
    }
    *rects = out;
}
