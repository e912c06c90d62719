// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod config;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use cave_assets::FileAssets;
use cave_core::init_tracing;
use cave_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};
use cave_platform::{open_window, raw_handles};
use cave_render::mock::{MockBackend, MockSummary};
use cave_render::{AssetPaths, RenderSize, Renderer, RendererConfig};
use cave_render_vk::AshBackend;
use clap::{Parser, ValueEnum};
use tracing::{error, info};

use config::{load_cfg, validation_override, AppCfg};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BackendChoice {
    /// Real Vulkan driver, windowed
    Vk,
    /// In-memory recording backend, no window
    Mock,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Choose renderer backend: vk | mock
    #[arg(long, value_enum, default_value_t = BackendChoice::Vk)]
    backend: BackendChoice,
    /// Stop after this many frames; overrides render.max_frames (0 runs until closed)
    #[arg(long)]
    frames: Option<u64>,
    /// Configuration file
    #[arg(long, default_value = "cave.toml")]
    config: PathBuf,
    /// Directory holding shaders/, textures/ and models/
    #[arg(long, default_value = "assets")]
    assets: PathBuf,
}

struct App {
    cfg: AppCfg,
    env_validation: Option<bool>,
    max_frames: u64,
    assets: AssetPaths,

    // Field order matters: the renderer holds raw handles into the window.
    renderer: Option<Renderer<AshBackend>>,
    window: Option<Window>,

    exiting: bool,
    frames: u32,
    last_fps_instant: Instant,
    failure: Option<anyhow::Error>,
}

impl App {
    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = open_window(event_loop, &self.cfg.window_spec())?;
        let size = window.inner_size();
        let render_cfg = self.cfg.renderer_config(
            RenderSize {
                width: size.width.max(1),
                height: size.height.max(1),
            },
            self.env_validation,
        );

        let (display, handle) = raw_handles(&window)?;
        // SAFETY: the window lives in `self.window` and is dropped after the renderer.
        let gpu = unsafe { AshBackend::new(display, handle) }.context("opening Vulkan")?;
        let renderer = Renderer::new(gpu, &render_cfg, &self.assets, &FileAssets)
            .context("building the renderer")?;
        info!(
            validation = render_cfg.validation,
            present = ?render_cfg.present_mode,
            "backend = vk"
        );

        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn shut_down(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        if let Some(r) = &self.renderer {
            info!("{} frames rendered", r.frames_rendered());
        }
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("{e:#}");
        self.failure = Some(e);
        self.shut_down(event_loop);
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() && !self.exiting {
            if let Err(e) = self.start(event_loop) {
                self.fail(event_loop, e);
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

            WindowEvent::RedrawRequested => {
                if self.exiting {
                    return;
                }
                let Some(renderer) = &mut self.renderer else {
                    return;
                };
                if let Err(e) = renderer.render_frame() {
                    self.fail(event_loop, anyhow::Error::new(e).context("render_frame"));
                    return;
                }
                // count only frames that were actually rendered
                self.frames = self.frames.saturating_add(1);
                if self.max_frames > 0 && renderer.frames_rendered() >= self.max_frames {
                    info!("reached {} frames", self.max_frames);
                    self.shut_down(event_loop);
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
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

/// Drives the renderer against the recording backend and reports what it saw.
fn run_headless(
    render_cfg: &RendererConfig,
    assets: &AssetPaths,
    frames: u64,
) -> Result<MockSummary> {
    let gpu = MockBackend::new();
    let rec = gpu.recorder();
    let mut renderer = Renderer::new(gpu, render_cfg, assets, &FileAssets)
        .context("building the renderer on the mock backend")?;
    info!("backend = mock");

    for _ in 0..frames.max(1) {
        renderer.render_frame().context("render_frame")?;
    }
    let rendered = renderer.frames_rendered();
    drop(renderer);

    let summary = rec.summary();
    println!(
        "frames={rendered} creates={} destroys={} submits={} presents={} live={} violations={}",
        summary.creates,
        summary.destroys,
        summary.submits,
        summary.presents,
        summary.live,
        summary.violations
    );
    if summary.live != 0 || summary.violations != 0 {
        for v in rec.violations() {
            error!("{v}");
        }
        bail!(
            "mock backend reported {} live objects and {} violations",
            summary.live,
            summary.violations
        );
    }
    Ok(summary)
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = load_cfg(&args.config);
    let env_validation = validation_override(std::env::var("CAVE_VALIDATION").ok().as_deref());
    let max_frames = args.frames.unwrap_or(cfg.render.max_frames);
    let assets = AssetPaths::under(&args.assets);

    if args.backend == BackendChoice::Mock {
        let size = RenderSize {
            width: cfg.window.width,
            height: cfg.window.height,
        };
        run_headless(&cfg.renderer_config(size, env_validation), &assets, max_frames)?;
        return Ok(());
    }

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App {
        cfg,
        env_validation,
        max_frames,
        assets,
        renderer: None,
        window: None,
        exiting: false,
        frames: 0,
        last_fps_instant: Instant::now(),
        failure: None,
    };

    event_loop.run_app(&mut app)?;
    match app.failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
