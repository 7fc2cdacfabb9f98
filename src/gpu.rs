//! Core GPU context and device management.
//!
//! [`GpuContext`] holds the wgpu handles the renderer needs: the device for creating
//! resources, the queue for submitting work and the format of the output surface.
//! The surface itself stays with the host application; the composer only renders
//! into whatever view the host binds for the current frame.
//!
//! # Example
//!
//! ```no_run
//! use afterglow::GpuContext;
//!
//! // Share the host's device and queue
//! # let (device, queue): (wgpu::Device, wgpu::Queue) = todo!();
//! let gpu = GpuContext::from_parts(device, queue, wgpu::TextureFormat::Bgra8UnormSrgb);
//!
//! // Or create an offscreen context, e.g. for tools that render to textures
//! let offscreen = GpuContext::headless(wgpu::TextureFormat::Rgba8Unorm);
//! ```

use pollster::FutureExt as _;

/// Core GPU context holding wgpu resources.
///
/// All fields are public to allow direct access to wgpu APIs when needed.
pub struct GpuContext {
    /// The logical GPU device for creating resources and pipelines.
    pub device: wgpu::Device,
    /// The command queue for submitting work to the GPU.
    pub queue: wgpu::Queue,
    /// Format of the output surface that the last pass renders into.
    pub format: wgpu::TextureFormat,
}

impl GpuContext {
    /// Wraps a device and queue owned by the host application.
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue, format: wgpu::TextureFormat) -> Self {
        Self {
            device,
            queue,
            format,
        }
    }

    /// Create a context without a surface.
    ///
    /// # Panics
    ///
    /// Panics if no suitable GPU adapter is found or device creation fails.
    pub fn headless(format: wgpu::TextureFormat) -> Self {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .block_on()
            .expect("Failed to find a suitable GPU adapter");

        let info = adapter.get_info();
        tracing::info!(adapter = %info.name, backend = ?info.backend, "selected GPU adapter");

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Afterglow Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: Default::default(),
                experimental_features: Default::default(),
            })
            .block_on()
            .expect("Failed to create device");

        Self::from_parts(device, queue, format)
    }

    /// Creates a shader module, reporting validation errors instead of aborting.
    pub fn create_shader_module(&self, label: &str, source: &str) -> Result<wgpu::ShaderModule, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        match self.device.pop_error_scope().block_on() {
            None => Ok(module),
            Some(err) => Err(err.to_string()),
        }
    }
}
