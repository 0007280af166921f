//! The windowed application shell.
//!
//! Owns the winit event loop and wires the pieces together: button bar and
//! keyboard input trigger the [`Dispatcher`], worker threads deliver engine
//! results back through the event-loop proxy as [`AppEvent`]s, and deliveries
//! are typeset and mounted into the [`DisplaySlot`]. Rendering is two batches
//! in one pass: the camera-framed slot content underneath, the pixel-space
//! button bar on top.

pub mod buttons;
pub mod dispatch;
pub mod surface;

use std::sync::Arc;

use anyhow::Context as _;
use log::{error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes, WindowId},
};

use crate::engine::{ComputationResult, EngineConfig, EngineError};
use crate::modes::Mode;
use crate::render::{DrawBatch, Gpu, MeshRenderer};
use crate::scene::{Affine2, Camera2D};
use crate::typeset;
use buttons::ButtonBar;
use dispatch::Dispatcher;
use surface::DisplaySlot;

/// Top-level configuration for the window and engine.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub title: String,
    pub initial_size: (u32, u32),
    pub engine: EngineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "mathslate".to_string(),
            initial_size: (900, 600),
            engine: EngineConfig::from_env(),
        }
    }
}

/// Events delivered into the winit loop from worker threads.
#[derive(Debug)]
pub enum AppEvent {
    EngineDone {
        mode: Mode,
        result: ComputationResult,
    },
}

/// Run the application until the window closes.
pub fn run(config: AppConfig) -> anyhow::Result<()> {
    let event_loop = EventLoop::<AppEvent>::with_user_event()
        .build()
        .context("winit: failed to create EventLoop")?;
    // Purely event-driven: redraws happen on input, resize, and deliveries.
    event_loop.set_control_flow(ControlFlow::Wait);

    let proxy = event_loop.create_proxy();
    let mut app = App {
        config,
        proxy,
        state: None,
        exiting: false,
    };
    event_loop
        .run_app(&mut app)
        .context("winit: run_app failed")?;

    Ok(())
}

struct App {
    config: AppConfig,
    proxy: EventLoopProxy<AppEvent>,
    state: Option<State>,
    exiting: bool,
}

impl ApplicationHandler<AppEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        let (w, h) = self.config.initial_size;
        let window = Arc::new(
            event_loop
                .create_window(
                    WindowAttributes::default()
                        .with_title(self.config.title.as_str())
                        .with_inner_size(LogicalSize::new(w, h)),
                )
                .expect("winit: failed to create window"),
        );

        let state = pollster::block_on(State::new(
            window,
            self.config.engine.clone(),
            self.proxy.clone(),
        ))
        .expect("failed to initialize application state");

        state.window.request_redraw();
        self.state = Some(state);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                info!("close requested; exiting");
                self.exiting = true;
                self.state = None;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if self.exiting {
                    return;
                }
                state.resize(size);
                state.window.request_redraw();
            }
            WindowEvent::CursorMoved { position, .. } => {
                state.on_cursor_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => {
                state.on_click();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed && !event.repeat {
                    if let PhysicalKey::Code(code) = event.physical_key {
                        state.on_key(code);
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                if self.exiting {
                    return;
                }
                if let Err(err) = state.render() {
                    error!("render error: {err:#}");
                }
            }
            _ => {}
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: AppEvent) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        match event {
            AppEvent::EngineDone { mode, result } => state.on_engine_done(mode, result),
        }
    }
}

struct State {
    window: Arc<Window>,
    gpu: Gpu,
    renderer: MeshRenderer,

    bar: ButtonBar,
    slot: DisplaySlot,
    dispatcher: Dispatcher,
    camera: Camera2D,

    proxy: EventLoopProxy<AppEvent>,
    cursor: Option<(f32, f32)>,
}

impl State {
    async fn new(
        window: Arc<Window>,
        engine: EngineConfig,
        proxy: EventLoopProxy<AppEvent>,
    ) -> anyhow::Result<Self> {
        let gpu = Gpu::new(window.clone()).await?;
        let renderer = MeshRenderer::new(&gpu)?;
        let bar = ButtonBar::new();

        let mut camera = Camera2D::default();
        camera.set_viewport_px(gpu.size.width, gpu.size.height);

        Ok(Self {
            window,
            gpu,
            renderer,
            bar,
            slot: DisplaySlot::default(),
            dispatcher: Dispatcher::new(engine),
            camera,
            proxy,
            cursor: None,
        })
    }

    fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        self.gpu.resize(new_size);
        self.camera.set_viewport_px(new_size.width, new_size.height);
        // Keep mounted content framed for the new aspect ratio.
        self.slot.frame_camera(&mut self.camera);
    }

    fn on_cursor_moved(&mut self, x: f32, y: f32) {
        self.cursor = Some((x, y));
        let width = self.gpu.size.width as f32;
        if self.bar.set_cursor(width, x, y) {
            self.window.request_redraw();
        }
    }

    fn on_click(&mut self) {
        let Some((x, y)) = self.cursor else {
            return;
        };
        let width = self.gpu.size.width as f32;
        if let Some(mode) = buttons::hit_test(width, x, y) {
            self.trigger(mode);
        }
    }

    fn on_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Digit1 => self.trigger(Mode::PartialDerivative),
            KeyCode::Digit2 => self.trigger(Mode::IndefiniteIntegral),
            KeyCode::Digit3 => self.trigger(Mode::DoubleIntegral),
            KeyCode::Escape => {
                if self.dispatcher.cancel() {
                    info!("cancel requested");
                }
            }
            _ => {}
        }
    }

    fn trigger(&mut self, mode: Mode) {
        let proxy = self.proxy.clone();
        let accepted = self.dispatcher.trigger(mode, move |mode, result| {
            // Delivery fails only when the event loop is already gone.
            let _ = proxy.send_event(AppEvent::EngineDone { mode, result });
        });

        if accepted {
            // Busy dimming takes effect immediately.
            self.window.request_redraw();
        }
    }

    fn on_engine_done(&mut self, mode: Mode, result: ComputationResult) {
        self.dispatcher.finish(mode);

        match result {
            Ok(payload) => match typeset::compile_expression(&payload) {
                Ok(artifact) => {
                    info!("{mode} done: {}", artifact.source);
                    self.slot.mount_artifact(artifact);
                    self.slot.frame_camera(&mut self.camera);
                }
                Err(err) => {
                    error!("{mode} output failed to typeset: {err}");
                    self.slot.mount_error_indicator();
                }
            },
            Err(EngineError::Cancelled) => {
                // Previous content stays mounted.
                info!("{mode} cancelled");
            }
            Err(err) => {
                error!("{mode} failed: {err}");
                self.slot.mount_error_indicator();
            }
        }

        self.window.request_redraw();
    }

    fn render(&mut self) -> anyhow::Result<()> {
        let (surface_texture, view) = match self.gpu.acquire_frame() {
            Ok(v) => v,
            Err(wgpu::SurfaceError::Outdated) | Err(wgpu::SurfaceError::Lost) => {
                self.gpu.resize(self.gpu.size);
                self.window.request_redraw();
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                self.window.request_redraw();
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(anyhow::anyhow!("wgpu SurfaceError::OutOfMemory"));
            }
            Err(wgpu::SurfaceError::Other) => {
                warn!("surface error; reconfiguring");
                self.gpu.resize(self.gpu.size);
                self.window.request_redraw();
                return Ok(());
            }
        };

        let content_items: Vec<_> = self.slot.draw_item().into_iter().collect();
        let ui_items = self
            .bar
            .draw_items(self.gpu.size.width as f32, self.dispatcher.is_busy());

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Main Encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Main Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.05,
                            g: 0.06,
                            b: 0.08,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            self.renderer.draw_batches(
                &self.gpu,
                &mut pass,
                &[
                    DrawBatch {
                        clip_from_world: self.camera.clip_from_world(),
                        items: &content_items,
                    },
                    DrawBatch {
                        clip_from_world: Affine2::clip_from_screen_px(
                            self.gpu.size.width,
                            self.gpu.size.height,
                        ),
                        items: &ui_items,
                    },
                ],
            )?;
        }

        self.gpu.queue.submit(Some(encoder.finish()));
        self.window.pre_present_notify();
        surface_texture.present();

        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::engine::test_support::stub_engine;
    use crate::typeset;
    use std::sync::mpsc;
    use std::time::Duration;

    /// Headless run of the full dispatch cycle: trigger → engine process →
    /// delivery → typeset → mount.
    #[test]
    fn dispatch_to_mounted_artifact_end_to_end() {
        let path = stub_engine("e2e", r#"echo "2x""#);
        let mut dispatcher = Dispatcher::new(EngineConfig::new(path));
        let mut slot = DisplaySlot::default();

        let (tx, rx) = mpsc::channel();
        assert!(dispatcher.trigger(Mode::PartialDerivative, move |mode, result| {
            let _ = tx.send((mode, result));
        }));

        let (mode, result) = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        dispatcher.finish(mode);
        assert_eq!(mode, Mode::PartialDerivative);

        let payload = result.unwrap();
        assert_eq!(payload, "2x");

        let artifact = typeset::compile_expression(&payload).expect("typeset 2x");
        slot.mount_artifact(artifact);

        assert_eq!(slot.mounts(), 1);
        match slot.content() {
            Some(surface::SlotContent::Typeset(state)) => {
                assert_eq!(state.source, "2x");
                assert!(!state.mesh.is_empty());
            }
            _ => panic!("expected a typeset artifact"),
        }
    }

    /// An engine failure must not typeset anything; the slot shows the error
    /// indicator instead of a stale or new rendering.
    #[test]
    fn engine_failure_mounts_error_indicator_not_payload() {
        let path = stub_engine("e2e-fail", "echo 'oops' >&2\nexit 1");
        let mut dispatcher = Dispatcher::new(EngineConfig::new(path));
        let mut slot = DisplaySlot::default();

        let (tx, rx) = mpsc::channel();
        assert!(dispatcher.trigger(Mode::IndefiniteIntegral, move |mode, result| {
            let _ = tx.send((mode, result));
        }));

        let (mode, result) = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        dispatcher.finish(mode);
        assert!(result.is_err());

        slot.mount_error_indicator();
        assert!(matches!(
            slot.content(),
            Some(surface::SlotContent::ErrorIndicator(_))
        ));
        assert_eq!(slot.mounts(), 1);
    }
}
