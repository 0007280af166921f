use std::sync::Arc;

use anyhow::Context as _;
use winit::window::Window;

/// Shared GPU context for the window surface.
///
/// Owns the `wgpu` instance/adapter/device/queue plus the window surface and
/// its current configuration. Everything that draws (button bar, display
/// region) goes through this one context.
pub struct Gpu {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,

    /// Tied to the window; the window is kept alive by the app state.
    pub surface: wgpu::Surface<'static>,
    pub surface_format: wgpu::TextureFormat,

    pub size: winit::dpi::PhysicalSize<u32>,
    pub config: wgpu::SurfaceConfiguration,
}

impl Gpu {
    /// Create a GPU context for the given window and configure the surface.
    ///
    /// Picks the first surface format the adapter reports.
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                compatible_surface: None,
                ..Default::default()
            })
            .await
            .context("wgpu: failed to request adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default())
            .await
            .context("wgpu: failed to request device")?;

        let size = window.inner_size();

        // Cloning the Arc<Window> gives a 'static surface; the surface must
        // not outlive the window, which the app state guarantees.
        let surface = instance
            .create_surface(window)
            .context("wgpu: failed to create surface")?;

        let caps = surface.get_capabilities(&adapter);
        let surface_format = caps
            .formats
            .first()
            .copied()
            .context("wgpu: surface reported no supported formats")?;

        let config = Self::make_surface_config(size, surface_format);

        surface.configure(&device, &config);

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            surface,
            surface_format,
            size,
            config,
        })
    }

    /// Reconfigure the surface after `WindowEvent::Resized`.
    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        // winit reports 0x0 during minimize; configuring that is invalid.
        if new_size.width == 0 || new_size.height == 0 {
            self.size = new_size;
            self.config.width = 0;
            self.config.height = 0;
            return;
        }

        self.size = new_size;
        self.config = Self::make_surface_config(new_size, self.surface_format);
        self.surface.configure(&self.device, &self.config);
    }

    /// Acquire the next frame and an sRGB view of it.
    ///
    /// Acquisition fails transiently during resize; the `SurfaceError` is
    /// returned so the caller decides whether to reconfigure, skip, or exit.
    pub fn acquire_frame(
        &self,
    ) -> Result<(wgpu::SurfaceTexture, wgpu::TextureView), wgpu::SurfaceError> {
        let surface_texture = self.surface.get_current_texture()?;

        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor {
                format: Some(self.surface_format.add_srgb_suffix()),
                ..Default::default()
            });

        Ok((surface_texture, view))
    }

    fn make_surface_config(
        size: winit::dpi::PhysicalSize<u32>,
        surface_format: wgpu::TextureFormat,
    ) -> wgpu::SurfaceConfiguration {
        wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            // Render into the sRGB view format for correct gamma.
            view_formats: vec![surface_format.add_srgb_suffix()],
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            width: size.width,
            height: size.height,
            desired_maximum_frame_latency: 2,
            present_mode: wgpu::PresentMode::AutoVsync,
        }
    }
}
