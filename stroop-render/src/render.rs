use crate::canvas::{Canvas, blend_over, coalesce_dirty};
use ab_glyph::{Font, FontVec, Glyph, PxScale, ScaleFont, point};
use anyhow::{Context, Result, bail};
use bytemuck::cast_slice_mut;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use stroop_core::{InkColor, PALETTE, Phase, ResponseOutcome, ResponseRecord, Trial, TrialState};
use stroop_timing::{CalibrationStats, HighPrecisionTimer, Timer};
use tiny_skia::{Color, Paint, Pixmap, Rect, Transform};

const WHITE: [u8; 4] = [255, 255, 255, 255];
const WORD_SIZE: f32 = 96.0;
const LABEL_SIZE: f32 = 32.0;
const SMALL_SIZE: f32 = 24.0;
const LINE_HEIGHT: f32 = 52.0;
const FIXATION_EXTENT: u32 = 40;

#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheIndex {
    Calibrating = 0,
    Practice = 1,
    Correct = 2,
    Incorrect = 3,
    TooSlow = 4,
    InvalidKey = 5,
    FixationCross = 6,
}

impl CacheIndex {
    const STATIC_COUNT: usize = 7;

    fn label(self) -> Option<(&'static str, [u8; 4])> {
        Some(match self {
            CacheIndex::Calibrating => ("CALIBRATING...", WHITE),
            CacheIndex::Practice => ("PRACTICE", [180, 180, 180, 255]),
            CacheIndex::Correct => ("Correct", [80, 220, 80, 255]),
            CacheIndex::Incorrect => ("Incorrect", [230, 70, 70, 255]),
            CacheIndex::TooSlow => ("Too slow", [230, 180, 60, 255]),
            CacheIndex::InvalidKey => ("Use the colour keys", [230, 180, 60, 255]),
            CacheIndex::FixationCross => return None,
        })
    }

    fn for_feedback(record: &ResponseRecord) -> Self {
        match record.outcome {
            ResponseOutcome::Answered if record.correct => CacheIndex::Correct,
            ResponseOutcome::Answered => CacheIndex::Incorrect,
            ResponseOutcome::TimedOut => CacheIndex::TooSlow,
            ResponseOutcome::Invalid => CacheIndex::InvalidKey,
        }
    }
}

pub fn progress_label(current: usize, total: usize) -> String {
    format!("Trial {}/{}", current, total)
}

/// Rasterises `text` into a tight transparent pixmap, `color` straight RGBA
pub fn render_text_pixmap<F: Font>(text: &str, font_size: f32, font: &F, color: [u8; 4]) -> Result<Pixmap> {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);

    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::new();
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += sf.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, sf.ascent()),
        });
        pen_x += sf.h_advance(id);
    }

    let outlined: Vec<_> = glyphs
        .into_iter()
        .filter_map(|g| font.outline_glyph(g))
        .collect();
    let Some(first) = outlined.first() else {
        return Pixmap::new(1, 1).context("allocating empty text pixmap");
    };
    let mut bounds = first.px_bounds();
    for out in &outlined {
        let b = out.px_bounds();
        bounds.min.x = bounds.min.x.min(b.min.x);
        bounds.min.y = bounds.min.y.min(b.min.y);
        bounds.max.x = bounds.max.x.max(b.max.x);
        bounds.max.y = bounds.max.y.max(b.max.y);
    }

    let w = (bounds.max.x.ceil() - bounds.min.x.floor()).max(1.0) as u32;
    let h = (bounds.max.y.ceil() - bounds.min.y.floor()).max(1.0) as u32;
    let mut pm = Pixmap::new(w, h).with_context(|| format!("allocating {}x{} text pixmap", w, h))?;
    let stride = w as usize;
    let dst: &mut [[u8; 4]] = cast_slice_mut(pm.data_mut());

    for out in &outlined {
        let b = out.px_bounds();
        out.draw(|x, y, cov| {
            if cov <= f32::EPSILON {
                return;
            }
            let ix = (x as f32 + b.min.x - bounds.min.x.floor()) as i64;
            let iy = (y as f32 + b.min.y - bounds.min.y.floor()) as i64;
            if ix < 0 || iy < 0 || ix >= w as i64 || iy >= h as i64 {
                return;
            }
            let a = (cov * color[3] as f32 / 255.0).clamp(0.0, 1.0);
            let src = [
                (color[0] as f32 * a) as u8,
                (color[1] as f32 * a) as u8,
                (color[2] as f32 * a) as u8,
                (a * 255.0) as u8,
            ];
            let i = iy as usize * stride + ix as usize;
            dst[i] = blend_over(src, dst[i]);
        });
    }

    Ok(pm)
}

struct TextCache {
    font: FontVec,
    map: HashMap<(String, u32, [u8; 4]), Arc<Pixmap>>,
}

impl TextCache {
    fn new(font: FontVec) -> Self {
        Self {
            font,
            map: HashMap::new(),
        }
    }

    fn get_or_render(&mut self, text: &str, size_px: f32, color: [u8; 4]) -> Result<Arc<Pixmap>> {
        let key = (text.to_string(), size_px.to_bits(), color);
        if let Some(p) = self.map.get(&key) {
            return Ok(Arc::clone(p));
        }
        let pm = Arc::new(render_text_pixmap(text, size_px, &self.font, color)?);
        self.map.insert(key, Arc::clone(&pm));
        Ok(pm)
    }
}

pub struct FrameStats {
    pub clear: Duration,
    pub phase: Duration,
    pub copy: Duration,
    pub total: Duration,
    pub dirty_count: usize,
}

/// What the current frame should show
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameContent<'a> {
    pub trial: Option<&'a Trial>,
    pub trial_state: Option<TrialState>,
    pub feedback: Option<&'a ResponseRecord>,
    pub progress: Option<(usize, usize)>,
    /// Centred text block for welcome and debrief screens
    pub lines: &'a [String],
}

pub trait Renderer {
    fn clear_dirty(&mut self, dirty: &[Rect]);
    fn blit_cached(&mut self, index: usize, pos: (f32, f32));
    fn blit_text(&mut self, text: &str, size_px: f32, color: [u8; 4], pos: (f32, f32)) -> Result<()>;
}

pub trait PhaseRenderer<P: Phase>: Renderer {
    fn render_phase(&mut self, phase: &P, content: &FrameContent<'_>) -> Result<()>;
}

pub struct SkiaRenderer {
    center: (f32, f32),
    canvas: Canvas,
    static_cache: Vec<Pixmap>,
    word_cache: HashMap<(InkColor, InkColor), Pixmap>,
    text_cache: TextCache,
    first_frame: bool,
    component_timers: HashMap<&'static str, HighPrecisionTimer>,
}

impl SkiaRenderer {
    pub fn new(width: u32, height: u32, font: FontVec) -> Result<Self> {
        let mut renderer = SkiaRenderer {
            center: (width as f32 / 2.0, height as f32 / 2.0),
            canvas: Canvas::new(width, height)?,
            static_cache: Vec::with_capacity(CacheIndex::STATIC_COUNT),
            word_cache: HashMap::new(),
            text_cache: TextCache::new(font),
            first_frame: true,
            component_timers: ["phase", "clear", "copy"]
                .iter()
                .map(|&k| (k, HighPrecisionTimer::new()))
                .collect(),
        };
        renderer.init_cache()?;
        Ok(renderer)
    }

    pub fn resize(&mut self, new_width: u32, new_height: u32) -> Result<()> {
        self.center = (new_width as f32 / 2.0, new_height as f32 / 2.0);
        self.canvas = Canvas::new(new_width, new_height)?;
        self.first_frame = true;
        Ok(())
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Per-component frame timings collected so far
    pub fn component_stats(&self) -> Vec<(&'static str, CalibrationStats)> {
        let mut stats: Vec<_> = self
            .component_timers
            .iter()
            .map(|(k, t)| (*k, t.calibration_stats()))
            .collect();
        stats.sort_by_key(|(k, _)| *k);
        stats
    }

    fn init_cache(&mut self) -> Result<()> {
        self.static_cache.clear();
        for index in 0..CacheIndex::STATIC_COUNT {
            let pm = match cache_index(index).and_then(CacheIndex::label) {
                Some((text, color)) => render_text_pixmap(text, LABEL_SIZE, &self.text_cache.font, color)?,
                None => fixation_pixmap()?,
            };
            self.static_cache.push(pm);
        }
        for word in PALETTE {
            for ink in PALETTE {
                let pm = render_text_pixmap(word.name(), WORD_SIZE, &self.text_cache.font, ink.rgba())?;
                self.word_cache.insert((word, ink), pm);
            }
        }
        Ok(())
    }

    fn blit_word(&mut self, trial: &Trial) {
        if let Some(pm) = self.word_cache.get(&(trial.word(), trial.ink_color())) {
            self.canvas.blit(pm, self.center);
        }
    }

    fn blit_lines(&mut self, lines: &[String]) -> Result<()> {
        let top = self.center.1 - (lines.len() as f32 - 1.0) * LINE_HEIGHT * 0.5;
        for (i, line) in lines.iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            let pos = (self.center.0, top + i as f32 * LINE_HEIGHT);
            self.blit_text(line, LABEL_SIZE, WHITE, pos)?;
        }
        Ok(())
    }

    pub fn render_frame<P, T>(
        &mut self,
        phase: &P,
        content: &FrameContent<'_>,
        frame_buffer: &mut [u8],
        timer: &mut T,
    ) -> Result<FrameStats>
    where
        P: Phase,
        T: Timer<Timestamp = u64>,
    {
        if frame_buffer.len() != self.canvas.data().len() {
            bail!(
                "frame buffer holds {} bytes, canvas {}",
                frame_buffer.len(),
                self.canvas.data().len()
            );
        }
        if self.first_frame {
            self.first_frame = false;
            self.canvas.clear_all();
            frame_buffer.copy_from_slice(self.canvas.data());
        }

        let old_dirty = self.canvas.take_dirty();
        let t_clear = {
            let t = timer.now();
            self.canvas.clear_dirty(&old_dirty);
            timer.elapsed(t)
        };

        let t_phase = {
            let t = timer.now();
            self.render_phase(phase, content)?;
            timer.elapsed(t)
        };

        let mut present_rects = old_dirty;
        present_rects.extend_from_slice(self.canvas.dirty());
        coalesce_dirty(&mut present_rects);

        let t_copy = {
            let t = timer.now();
            for rect in &present_rects {
                self.canvas.copy_region(rect, frame_buffer);
            }
            timer.elapsed(t)
        };

        let total = t_clear + t_phase + t_copy;
        for (key, d) in [("phase", t_phase), ("clear", t_clear), ("copy", t_copy)] {
            if let Some(component) = self.component_timers.get_mut(key) {
                component.record_frame(d);
            }
        }
        timer.record_frame(total);

        Ok(FrameStats {
            clear: t_clear,
            phase: t_phase,
            copy: t_copy,
            total,
            dirty_count: self.canvas.dirty().len(),
        })
    }
}

fn cache_index(index: usize) -> Option<CacheIndex> {
    use CacheIndex::*;
    [Calibrating, Practice, Correct, Incorrect, TooSlow, InvalidKey, FixationCross]
        .get(index)
        .copied()
}

fn fixation_pixmap() -> Result<Pixmap> {
    let size = FIXATION_EXTENT as f32;
    let mut pm = Pixmap::new(FIXATION_EXTENT, FIXATION_EXTENT).context("allocating fixation cross")?;
    let mut paint = Paint::default();
    paint.anti_alias = false;
    paint.set_color(Color::from_rgba8(255, 255, 255, 255));

    let bars = [
        Rect::from_xywh(0.0, (size - 4.0) * 0.5, size, 4.0),
        Rect::from_xywh((size - 4.0) * 0.5, 0.0, 4.0, size),
    ];
    for bar in bars.into_iter().flatten() {
        pm.fill_rect(bar, &paint, Transform::identity(), None);
    }
    Ok(pm)
}

impl Renderer for SkiaRenderer {
    fn clear_dirty(&mut self, dirty: &[Rect]) {
        self.canvas.clear_dirty(dirty);
    }

    fn blit_cached(&mut self, index: usize, pos: (f32, f32)) {
        if let Some(pm) = self.static_cache.get(index) {
            self.canvas.blit(pm, pos);
        }
    }

    fn blit_text(&mut self, text: &str, size_px: f32, color: [u8; 4], pos: (f32, f32)) -> Result<()> {
        let pm = self.text_cache.get_or_render(text, size_px, color)?;
        self.canvas.blit(&pm, pos);
        Ok(())
    }
}

impl<P> PhaseRenderer<P> for SkiaRenderer
where
    P: Phase,
{
    fn render_phase(&mut self, phase: &P, content: &FrameContent<'_>) -> Result<()> {
        match phase {
            p if p.is_welcome() || p.is_debrief() => {
                self.blit_lines(content.lines)?;
            }
            p if p.requires_calibration() => {
                self.blit_cached(CacheIndex::Calibrating as usize, self.center);
            }
            p if p.runs_trials() => {
                match content.trial_state {
                    Some(TrialState::Fixation) => {
                        self.blit_cached(CacheIndex::FixationCross as usize, self.center);
                    }
                    Some(TrialState::Presented) => {
                        if let Some(trial) = content.trial {
                            self.blit_word(trial);
                        }
                    }
                    Some(TrialState::Feedback) => {
                        if let Some(record) = content.feedback {
                            self.blit_cached(CacheIndex::for_feedback(record) as usize, self.center);
                        }
                    }
                    // Blank inter-trial interval
                    Some(TrialState::Recorded) | None => {}
                }
                if let Some((current, total)) = content.progress {
                    self.blit_text(&progress_label(current, total), SMALL_SIZE, WHITE, (90.0, 30.0))?;
                }
                if p.is_practice() {
                    self.blit_cached(CacheIndex::Practice as usize, (self.center.0, 30.0));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::find_font;
    use stroop_core::StandardPhase;
    use stroop_timing::ManualTimer;

    fn record(correct: bool, outcome: ResponseOutcome) -> ResponseRecord {
        ResponseRecord {
            trial: Trial::new(0, InkColor::Red, InkColor::Blue, 0),
            response_color: None,
            reaction_time_ms: 0,
            correct,
            outcome,
        }
    }

    #[test]
    fn feedback_label_follows_outcome() {
        assert_eq!(CacheIndex::for_feedback(&record(true, ResponseOutcome::Answered)), CacheIndex::Correct);
        assert_eq!(CacheIndex::for_feedback(&record(false, ResponseOutcome::Answered)), CacheIndex::Incorrect);
        assert_eq!(CacheIndex::for_feedback(&record(false, ResponseOutcome::TimedOut)), CacheIndex::TooSlow);
        assert_eq!(CacheIndex::for_feedback(&record(false, ResponseOutcome::Invalid)), CacheIndex::InvalidKey);
    }

    #[test]
    fn cache_indices_line_up() {
        for i in 0..CacheIndex::STATIC_COUNT {
            assert_eq!(cache_index(i).map(|c| c as usize), Some(i));
        }
        assert!(cache_index(CacheIndex::STATIC_COUNT).is_none());
    }

    #[test]
    fn fixation_cross_is_centred() {
        let pm = fixation_pixmap().unwrap();
        let mid = (FIXATION_EXTENT / 2) as usize;
        let px = |x: usize, y: usize| pm.data()[(y * FIXATION_EXTENT as usize + x) * 4 + 3];
        assert_eq!(px(mid, 0), 255);
        assert_eq!(px(0, mid), 255);
        assert_eq!(px(0, 0), 0);
    }

    #[test]
    fn progress_text() {
        assert_eq!(progress_label(3, 40), "Trial 3/40");
    }

    // Needs a system font; skipped on machines without one.
    #[test]
    fn presented_word_is_drawn_in_its_ink() {
        let Ok(font) = find_font(None) else {
            return;
        };
        let mut renderer = SkiaRenderer::new(320, 200, font).unwrap();
        let trial = Trial::new(0, InkColor::Red, InkColor::Green, 0);
        let content = FrameContent {
            trial: Some(&trial),
            trial_state: Some(TrialState::Presented),
            ..Default::default()
        };
        let mut frame = vec![0u8; 320 * 200 * 4];
        let mut timer = ManualTimer::new();
        let stats = renderer
            .render_frame(&StandardPhase::Experiment, &content, &mut frame, &mut timer)
            .unwrap();
        assert!(stats.dirty_count >= 1);
        let green = InkColor::Green.rgba();
        let near = |p: &[u8]| p.iter().zip(green).all(|(a, b)| a.abs_diff(b) <= 2);
        assert!(frame.chunks_exact(4).any(near));
        let red = InkColor::Red.rgba();
        assert!(!frame.chunks_exact(4).any(|p| p[0] > 200 && p[0].abs_diff(red[0]) <= 2 && p[1] < 60));
        assert_eq!(timer.frame_count(), 1);
    }

    #[test]
    fn mismatched_frame_buffer_is_rejected() {
        let Ok(font) = find_font(None) else {
            return;
        };
        let mut renderer = SkiaRenderer::new(64, 64, font).unwrap();
        let mut frame = vec![0u8; 16];
        let result = renderer.render_frame(
            &StandardPhase::Welcome,
            &FrameContent::default(),
            &mut frame,
            &mut ManualTimer::new(),
        );
        assert!(result.is_err());
    }
}
