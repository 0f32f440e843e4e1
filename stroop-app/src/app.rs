use crate::results::{debrief_lines, save_results, welcome_lines};
use ab_glyph::FontVec;
use anyhow::{Context, Result, anyhow};
use pixels::{Pixels, SurfaceTexture};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Instant;
use stroop_core::{Phase, ResponseToken, StandardPhase};
use stroop_experiment::{ExperimentConfig, ExperimentEvent, ExperimentStateMachine, Session};
use stroop_render::{FrameContent, SkiaRenderer};
use stroop_timing::{HighPrecisionTimer, Timer};
use tracing::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{Key, KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowId},
};

type Experiment = ExperimentStateMachine<StandardPhase, HighPrecisionTimer, StdRng>;

pub struct App {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    experiment: Experiment,
    session: Session,
    renderer: Option<SkiaRenderer>,
    font: Option<FontVec>,
    frame_timer: HighPrecisionTimer,
    last_frame: Option<Instant>,
    welcome: Vec<String>,
    debrief: Vec<String>,
    refresh_rate: Option<f64>,
    saved: bool,
    failure: Option<anyhow::Error>,
}

impl App {
    pub fn new(config: ExperimentConfig, seed: u64, session: Session, font: FontVec) -> Result<Self> {
        let welcome = welcome_lines(&config.keys);
        let experiment = ExperimentStateMachine::new(
            config,
            seed,
            HighPrecisionTimer::new(),
            StdRng::seed_from_u64(seed),
        );

        Ok(Self {
            window: None,
            pixels: None,
            experiment,
            session,
            renderer: None,
            font: Some(font),
            frame_timer: HighPrecisionTimer::new(),
            last_frame: None,
            welcome,
            debrief: Vec::new(),
            refresh_rate: None,
            saved: false,
            failure: None,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        info!(
            "Platform {} ({}); press SPACE to start or ESC to exit",
            std::env::consts::OS,
            std::env::consts::ARCH
        );

        event_loop.run_app(&mut self)?;

        // Window closed without passing through the usual exit paths
        if !self.saved {
            self.experiment.abort();
            self.save();
        }
        match self.failure.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let primary_monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow!("No monitor available"))?;

        self.refresh_rate = primary_monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let window_attributes = Window::default_attributes()
            .with_title("Stroop")
            .with_fullscreen(Some(Fullscreen::Borderless(Some(primary_monitor.clone()))))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let physical_size = window.inner_size();

        info!(
            "Display {}x{} at scale {:.2}",
            physical_size.width,
            physical_size.height,
            window.scale_factor()
        );
        if let Some(refresh_rate) = self.refresh_rate {
            info!("Reported refresh rate {:.1} Hz", refresh_rate);
        }

        let surface_texture =
            SurfaceTexture::new(physical_size.width, physical_size.height, window.clone());
        self.pixels = Some(Pixels::new(
            physical_size.width,
            physical_size.height,
            surface_texture,
        )?);

        let font = self
            .font
            .take()
            .ok_or_else(|| anyhow!("renderer already created"))?;
        self.renderer = Some(SkiaRenderer::new(
            physical_size.width,
            physical_size.height,
            font,
        )?);

        window.set_cursor_visible(false);
        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        let (Some(pix), Some(renderer)) = (self.pixels.as_mut(), self.renderer.as_mut()) else {
            return Ok(());
        };

        let experiment = &self.experiment;
        let phase = experiment.current_phase();
        let lines: &[String] = if phase.is_welcome() {
            &self.welcome
        } else if phase.is_debrief() {
            &self.debrief
        } else {
            &[]
        };
        let content = FrameContent {
            trial: experiment.current_trial(),
            trial_state: experiment.current_trial_state(),
            feedback: experiment.feedback(),
            progress: experiment.trial_progress(),
            lines,
        };

        let stats = renderer.render_frame(phase, &content, pix.frame_mut(), &mut self.frame_timer)?;
        let t = self.frame_timer.now();
        pix.render()?;
        debug!(
            "present {:.3}ms, clear {:.3}ms, phase {:.3}ms, copy {:.3}ms, total {:.3}ms, dirty {}",
            self.frame_timer.elapsed(t).as_secs_f64() * 1e3,
            stats.clear.as_secs_f64() * 1e3,
            stats.phase.as_secs_f64() * 1e3,
            stats.copy.as_secs_f64() * 1e3,
            stats.total.as_secs_f64() * 1e3,
            stats.dirty_count,
        );
        Ok(())
    }

    fn update(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_frame.replace(now) {
            if self.experiment.phase.requires_calibration() {
                self.experiment.timer.record_frame(now - last);
            }
        }

        for event in self.experiment.update() {
            self.experiment.handle_event(event);
        }

        if self.experiment.phase.is_debrief() && self.debrief.is_empty() {
            self.debrief = debrief_lines(&self.experiment.summary());
            self.save();
        }
    }

    fn handle_input(&mut self, event: &KeyEvent, event_loop: &ActiveEventLoop) {
        if event.repeat {
            return;
        }
        let phase = *self.experiment.current_phase();
        match event.physical_key {
            PhysicalKey::Code(KeyCode::Escape) => {
                if !self.experiment.is_finished() {
                    self.experiment.abort();
                }
                self.cleanup_and_exit(event_loop);
            }
            PhysicalKey::Code(KeyCode::Space) if phase.is_welcome() => {
                self.experiment.handle_event(ExperimentEvent::SpacePressed);
            }
            PhysicalKey::Code(KeyCode::Space) if phase.is_debrief() => {
                self.cleanup_and_exit(event_loop);
            }
            _ if phase.runs_trials() => {
                if let Key::Character(text) = &event.logical_key {
                    let token = ResponseToken::new(text.as_str());
                    self.experiment
                        .handle_event(ExperimentEvent::ResponseReceived(token));
                }
            }
            _ => {}
        }
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(new_size.width, new_size.height) {
                warn!("Failed to resize surface: {}", e);
            }
            if let Err(e) = pixels.resize_buffer(new_size.width, new_size.height) {
                warn!("Failed to resize buffer: {}", e);
            }
        }
        if let Some(renderer) = &mut self.renderer {
            if let Err(e) = renderer.resize(new_size.width, new_size.height) {
                warn!("Failed to resize canvas: {:#}", e);
            }
        }
        info!("Display resized to {}x{}", new_size.width, new_size.height);
    }

    fn save(&mut self) {
        if self.saved {
            return;
        }
        self.saved = true;
        if let Err(e) = save_results(&self.session, &self.experiment).context("saving session results") {
            error!("{:#}", e);
            self.failure.get_or_insert(e);
        }
    }

    fn fail(&mut self, e: anyhow::Error, event_loop: &ActiveEventLoop) {
        error!("{:#}", e);
        self.failure.get_or_insert(e);
        self.experiment.abort();
        self.cleanup_and_exit(event_loop);
    }

    fn cleanup_and_exit(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        self.save();
        if let Some(renderer) = &self.renderer {
            for (name, stats) in renderer.component_stats() {
                debug!(
                    "{} time: mean {:.3} ms, max {:.3} ms",
                    name,
                    stats.average_frame_time_ns / 1e6,
                    stats.max_frame_time_ns / 1e6
                );
            }
        }
        info!("Session {} finished", self.session.id());
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_surface(event_loop) {
                self.fail(e.context("creating window and surface"), event_loop);
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                if !self.experiment.is_finished() {
                    self.experiment.abort();
                }
                self.cleanup_and_exit(event_loop);
            }
            WindowEvent::RedrawRequested => {
                self.update();
                if let Err(e) = self.render() {
                    self.fail(e, event_loop);
                    return;
                }
                if let Some(win) = &self.window {
                    win.request_redraw();
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                self.handle_input(&event, event_loop);
            }
            WindowEvent::Resized(size) => self.handle_resize(size),
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(size) = self.window.as_ref().map(|w| w.inner_size()) {
                    self.handle_resize(size);
                }
            }
            _ => {}
        }
    }
}
