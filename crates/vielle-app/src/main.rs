// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod scene;

use anyhow::{Context as _, Result};
use clap::{Parser, ValueEnum};
use scene::{DemoConfig, Scene};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};
use vielle_core::{init_tracing, load_config};
use vielle_gpu::{
    vk, Context, ContextConfig, FrameStatus, PresentPolicy, Surface, SurfaceConfig,
    MAX_FRAMES_IN_FLIGHT,
};
use vielle_platform::{
    drawable_size, is_zero_area, open_window,
    winit::{
        application::ApplicationHandler,
        event::WindowEvent,
        event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
        window::{Window, WindowId},
    },
    WindowSpec,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML file with [context], [surface] and [demo] sections
    #[arg(long, default_value = "vielle.toml")]
    config: PathBuf,
    /// Overrides surface.frames_in_flight
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=MAX_FRAMES_IN_FLIGHT as u64))]
    frames_in_flight: Option<u64>,
    /// Overrides surface.present_policy
    #[arg(long, value_enum)]
    present: Option<PresentArg>,
    /// Image to put on the triangle instead of the checkerboard
    #[arg(long)]
    texture: Option<PathBuf>,
    /// Horizontal-cross cubemap blended over the texture
    #[arg(long)]
    cubemap: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PresentArg {
    Fifo,
    Mailbox,
    Immediate,
}

impl From<PresentArg> for PresentPolicy {
    fn from(arg: PresentArg) -> Self {
        match arg {
            PresentArg::Fifo => PresentPolicy::Fifo,
            PresentArg::Mailbox => PresentPolicy::Mailbox,
            PresentArg::Immediate => PresentPolicy::Immediate,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AppConfig {
    context: ContextConfig,
    surface: SurfaceConfig,
    demo: DemoConfig,
}

impl AppConfig {
    /// Command-line flags win over the file.
    fn override_with(mut self, args: &Args) -> Self {
        if let Some(n) = args.frames_in_flight {
            self.surface.frames_in_flight = n as usize;
        }
        if let Some(present) = args.present {
            self.surface.present_policy = present.into();
        }
        self
    }
}

fn extent_of((width, height): (u32, u32)) -> vk::Extent2D {
    vk::Extent2D { width, height }
}

// Field order is drop order: the scene and surface go before the window
// their swapchain images were made for.
struct App<'ctx> {
    ctx: &'ctx Context,
    config: AppConfig,
    texture: Option<PathBuf>,
    cubemap: Option<PathBuf>,

    scene: Option<Scene<'ctx>>,
    surface: Option<Surface<'ctx>>,
    window: Option<Window>,

    paused: bool,
    out_of_date: bool,
    exiting: bool,
    frames: u32,
    last_fps_instant: Instant,
}

impl<'ctx> App<'ctx> {
    fn new(ctx: &'ctx Context, config: AppConfig, args: Args) -> Self {
        App {
            ctx,
            config,
            texture: args.texture,
            cubemap: args.cubemap,
            scene: None,
            surface: None,
            window: None,
            paused: false,
            out_of_date: false,
            exiting: false,
            frames: 0,
            last_fps_instant: Instant::now(),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = open_window(event_loop, &WindowSpec::default())?;
        let (width, height) = drawable_size(&window);
        let surface = Surface::create(
            self.ctx,
            &window,
            &window,
            extent_of((width.max(1), height.max(1))),
            self.config.surface,
        )
        .context("creating the window surface")?;
        let scene = Scene::create(
            self.ctx,
            surface.frames_in_flight(),
            surface.extent(),
            self.config.demo,
            self.texture.as_deref(),
            self.cubemap.as_deref(),
        )
        .context("building the scene")?;

        self.window = Some(window);
        self.surface = Some(surface);
        self.scene = Some(scene);
        Ok(())
    }

    /// Rebuilds the swapchain after an out-of-date frame. Returns false while
    /// the window has no area to present to.
    fn recover(&mut self) -> Result<bool> {
        let (Some(window), Some(surface), Some(scene)) =
            (&self.window, self.surface.as_mut(), self.scene.as_mut())
        else {
            return Ok(false);
        };
        self.ctx.wait_idle()?;
        let size = drawable_size(window);
        if is_zero_area(size) {
            self.paused = true;
            return Ok(false);
        }
        surface.resize(extent_of(size))?;
        scene.set_extent(surface.extent());
        self.out_of_date = false;
        info!(
            "swapchain rebuilt at {}x{}",
            surface.extent().width,
            surface.extent().height
        );
        Ok(true)
    }

    fn redraw(&mut self) -> Result<()> {
        if self.paused {
            return Ok(());
        }
        if self.out_of_date && !self.recover()? {
            return Ok(());
        }
        let (Some(surface), Some(scene)) = (self.surface.as_mut(), self.scene.as_ref()) else {
            return Ok(());
        };

        let cmd = match surface.begin_frame()? {
            FrameStatus::Ready(cmd) => cmd,
            FrameStatus::OutOfDate => {
                self.out_of_date = true;
                return Ok(());
            }
        };
        let slot = surface.frame_slot();
        // The frame still has to be ended if this fails.
        let updated = scene.update(slot);
        scene.record(surface, cmd, slot);
        let presented = surface.end_frame()?;
        updated?;

        if presented.is_out_of_date() {
            self.out_of_date = true;
        }
        self.frames = self.frames.saturating_add(1);
        Ok(())
    }

    fn shut_down(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        if let Err(e) = self.ctx.wait_idle() {
            warn!("shutdown: {e}");
        }
        self.scene = None;
        self.surface = None;
        self.window = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App<'_> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init(event_loop) {
                error!("startup failed: {e:#}");
                self.shut_down(event_loop);
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shut_down(event_loop);
            }

            WindowEvent::Resized(size) => {
                let paused = is_zero_area((size.width, size.height));
                if self.paused != paused {
                    info!("Resized → {}x{} (paused={paused})", size.width, size.height);
                }
                self.paused = paused;
                // The swapchain is rebuilt on the next frame, not per event.
                self.out_of_date = true;
            }

            WindowEvent::RedrawRequested => {
                if self.exiting {
                    return;
                }
                if let Err(e) = self.redraw() {
                    error!("frame failed: {e:#}");
                    self.shut_down(event_loop);
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        if self.paused {
            event_loop.set_control_flow(ControlFlow::Wait);
            self.frames = 0;
            return;
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = load_config::<AppConfig>(&args.config).override_with(&args);
    info!(
        "{} frames in flight, {:?} presentation",
        config.surface.frames_in_flight, config.surface.present_policy
    );

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut slot = None;
    let ctx = Context::create_in(&mut slot, Some(&event_loop), &config.context)
        .context("creating the Vulkan context")?;

    let mut app = App::new(ctx, config, args);
    event_loop.run_app(&mut app)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[context]
app_name = "demo"
validation = false

[surface]
frames_in_flight = 3
present_policy = "mailbox"
frame_timeout_ms = 250

[demo]
clear_color = [0.1, 0.2, 0.3, 1.0]
spin_speed = 1.5
"#;

    #[test]
    fn config_sections_parse() {
        let config: AppConfig = vielle_core::parse_config(SAMPLE).unwrap();
        assert_eq!(config.context.app_name, "demo");
        assert!(!config.context.validation);
        assert_eq!(config.surface.frames_in_flight, 3);
        assert_eq!(config.surface.present_policy, PresentPolicy::Mailbox);
        assert_eq!(config.surface.frame_timeout_ms, 250);
        assert_eq!(config.demo.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(config.demo.spin_speed, 1.5);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: AppConfig = vielle_core::parse_config("").unwrap();
        assert_eq!(config.surface.frames_in_flight, 2);
        assert_eq!(config.surface.present_policy, PresentPolicy::Fifo);
    }

    #[test]
    fn flags_override_the_file() {
        let args = Args::try_parse_from([
            "vielle-app",
            "--frames-in-flight",
            "1",
            "--present",
            "immediate",
        ])
        .unwrap();
        let config = vielle_core::parse_config::<AppConfig>(SAMPLE)
            .unwrap()
            .override_with(&args);
        assert_eq!(config.surface.frames_in_flight, 1);
        assert_eq!(config.surface.present_policy, PresentPolicy::Immediate);
        assert_eq!(config.surface.frame_timeout_ms, 250);
    }

    #[test]
    fn frames_in_flight_flag_is_bounded() {
        assert!(Args::try_parse_from(["vielle-app", "--frames-in-flight", "0"]).is_err());
        let too_many = (MAX_FRAMES_IN_FLIGHT + 1).to_string();
        assert!(Args::try_parse_from(["vielle-app", "--frames-in-flight", &too_many]).is_err());
    }

    #[test]
    fn unknown_present_policy_is_rejected() {
        assert!(Args::try_parse_from(["vielle-app", "--present", "vsync"]).is_err());
    }
}
