//! wgpu backend implementation
//!
//! Emulates the GL-shaped command interface on top of wgpu:
//! - each program keeps a CPU copy of its uniform block; every draw snapshots
//!   it into a per-frame arena that is bound with a dynamic offset
//! - fixed-function render state selects a cached pipeline variant
//! - texture units map to bind group 1, one texture/sampler pair per unit
//! - render passes are recorded and encoded when the frame ends

mod frame;

use crate::backend::reflect::UniformBlockLayout;
use crate::backend::traits::*;
use crate::backend::types::*;
use frame::{PipelineKey, RecordedCommand, RecordedPass, TextureGroupKey};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::ops::Range;
use std::sync::Arc;
use wgpu::util::DeviceExt;

const SURFACE_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

struct ProgramEntry {
    label: String,
    module: wgpu::ShaderModule,
    uniforms: UniformBlockLayout,
    /// CPU copy of the uniform block, written by `set_uniform`
    staging: Vec<u8>,
    uniform_layout: wgpu::BindGroupLayout,
    texture_units: Vec<TextureUnitLayout>,
    texture_layout: Option<wgpu::BindGroupLayout>,
    pipeline_layout: wgpu::PipelineLayout,
}

struct TextureEntry {
    #[allow(dead_code)]
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: TextureFormat,
    width: u32,
    height: u32,
    sampler: SamplerDescriptor,
}

struct RenderbufferEntry {
    #[allow(dead_code)]
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: TextureFormat,
    width: u32,
    height: u32,
}

struct VertexArrayEntry {
    buffer: u64,
    layout: VertexBufferLayout,
}

/// Views bound when a program's texture unit has nothing usable bound
struct FallbackTextures {
    #[allow(dead_code)]
    color_texture: wgpu::Texture,
    color: wgpu::TextureView,
    #[allow(dead_code)]
    depth_texture: wgpu::Texture,
    depth: wgpu::TextureView,
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,
    surface_depth: wgpu::TextureView,
    current_texture: Option<wgpu::SurfaceTexture>,
    errors: Arc<Mutex<Vec<String>>>,

    // Resource storage
    next_id: u64,
    buffers: HashMap<u64, wgpu::Buffer>,
    textures: HashMap<u64, TextureEntry>,
    renderbuffers: HashMap<u64, RenderbufferEntry>,
    framebuffers: HashMap<u64, FramebufferDescriptor>,
    programs: HashMap<u64, ProgramEntry>,
    vertex_arrays: HashMap<u64, VertexArrayEntry>,
    fallback: FallbackTextures,

    // Caches
    samplers: HashMap<SamplerDescriptor, wgpu::Sampler>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    texture_groups: HashMap<TextureGroupKey, wgpu::BindGroup>,

    // Frame recording
    passes: Vec<RecordedPass>,
    pending_pass: Option<RecordedPass>,
    uniform_arena: Vec<u8>,
    uniform_buffer: Option<wgpu::Buffer>,
    uniform_alignment: usize,

    // Bound state
    program: Option<ProgramHandle>,
    vertex_array: Option<VertexArrayHandle>,
    render_state: RenderState,
    texture_units: [Option<TextureHandle>; MAX_TEXTURE_UNITS],
}

impl WgpuBackend {
    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
            TextureFormat::Depth24Plus => wgpu::TextureFormat::Depth24Plus,
        }
    }

    fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
        let mut result = wgpu::BufferUsages::empty();
        if usage.contains(BufferUsage::COPY_DST) {
            result |= wgpu::BufferUsages::COPY_DST;
        }
        if usage.contains(BufferUsage::VERTEX) {
            result |= wgpu::BufferUsages::VERTEX;
        }
        if usage.contains(BufferUsage::UNIFORM) {
            result |= wgpu::BufferUsages::UNIFORM;
        }
        result
    }

    fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
        let mut result = wgpu::TextureUsages::empty();
        if usage.contains(TextureUsage::COPY_SRC) {
            result |= wgpu::TextureUsages::COPY_SRC;
        }
        if usage.contains(TextureUsage::COPY_DST) {
            result |= wgpu::TextureUsages::COPY_DST;
        }
        if usage.contains(TextureUsage::TEXTURE_BINDING) {
            result |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        result
    }

    fn convert_vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
        match format {
            VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
            VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
            VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
            VertexFormat::Unorm8x4 => wgpu::VertexFormat::Unorm8x4,
        }
    }

    fn convert_compare_function(func: CompareFunction) -> wgpu::CompareFunction {
        match func {
            CompareFunction::Never => wgpu::CompareFunction::Never,
            CompareFunction::Less => wgpu::CompareFunction::Less,
            CompareFunction::Equal => wgpu::CompareFunction::Equal,
            CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
            CompareFunction::Greater => wgpu::CompareFunction::Greater,
            CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
            CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
            CompareFunction::Always => wgpu::CompareFunction::Always,
        }
    }

    fn convert_blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
        match factor {
            BlendFactor::Zero => wgpu::BlendFactor::Zero,
            BlendFactor::One => wgpu::BlendFactor::One,
            BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        }
    }

    fn convert_blend_component(component: BlendComponent) -> wgpu::BlendComponent {
        wgpu::BlendComponent {
            src_factor: Self::convert_blend_factor(component.src_factor),
            dst_factor: Self::convert_blend_factor(component.dst_factor),
            operation: match component.operation {
                BlendOperation::Add => wgpu::BlendOperation::Add,
                BlendOperation::Subtract => wgpu::BlendOperation::Subtract,
            },
        }
    }

    fn convert_cull_mode(mode: CullMode) -> Option<wgpu::Face> {
        match mode {
            CullMode::None => None,
            CullMode::Front => Some(wgpu::Face::Front),
            CullMode::Back => Some(wgpu::Face::Back),
        }
    }

    fn convert_filter_mode(mode: FilterMode) -> wgpu::FilterMode {
        match mode {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }

    fn convert_address_mode(mode: AddressMode) -> wgpu::AddressMode {
        match mode {
            AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            AddressMode::Repeat => wgpu::AddressMode::Repeat,
            AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
        }
    }
}

impl WgpuBackend {
    /// Create the backend for a window, blocking until the device is ready
    pub fn new(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(window, vsync))
    }

    pub async fn new_async(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Graphics Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        device.on_uncaptured_error(Box::new(move |error| {
            sink.lock().push(error.to_string());
        }));

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| BackendError::SurfaceCreationFailed("Surface reports no formats".into()))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let (width, height) = Self::clamp_surface_size(&device, size.width, size.height);
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let surface_depth = Self::create_surface_depth(&device, width, height);
        let fallback = Self::create_fallback_textures(&device, &queue);
        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as usize;

        Ok(Self {
            instance,
            surface,
            adapter,
            device,
            queue,
            surface_config,
            surface_depth,
            current_texture: None,
            errors,
            next_id: 1,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            renderbuffers: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            vertex_arrays: HashMap::new(),
            fallback,
            samplers: HashMap::new(),
            pipelines: HashMap::new(),
            texture_groups: HashMap::new(),
            passes: Vec::new(),
            pending_pass: None,
            uniform_arena: Vec::new(),
            uniform_buffer: None,
            uniform_alignment,
            program: None,
            vertex_array: None,
            render_state: RenderState::default(),
            texture_units: [None; MAX_TEXTURE_UNITS],
        })
    }

    /// Clamp to device limits while maintaining aspect ratio
    fn clamp_surface_size(device: &wgpu::Device, width: u32, height: u32) -> (u32, u32) {
        let max_size = device.limits().max_texture_dimension_2d;
        if width > max_size || height > max_size {
            let scale = (max_size as f32 / width as f32).min(max_size as f32 / height as f32);
            (
                ((width as f32 * scale) as u32).max(1),
                ((height as f32 * scale) as u32).max(1),
            )
        } else {
            (width.max(1), height.max(1))
        }
    }

    fn create_surface_depth(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
        device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("Surface Depth"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: SURFACE_DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default())
    }

    fn create_fallback_textures(device: &wgpu::Device, queue: &wgpu::Queue) -> FallbackTextures {
        let extent = wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        };
        let color_texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("Fallback Color"),
                size: extent,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[0xff; 4],
        );
        let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Fallback Depth"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        FallbackTextures {
            color: color_texture.create_view(&wgpu::TextureViewDescriptor::default()),
            color_texture,
            depth: depth_texture.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_texture,
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn color_slot(&self, texture: Option<TextureHandle>) -> AttachmentSlot {
        match texture {
            None => AttachmentSlot::Empty,
            Some(texture) => self.textures.get(&texture.0).map_or(AttachmentSlot::Dangling, |t| {
                AttachmentSlot::Attached {
                    width: t.width,
                    height: t.height,
                    format: t.format,
                }
            }),
        }
    }

    fn depth_slot(&self, depth: Option<DepthAttachment>) -> AttachmentSlot {
        match depth {
            None => AttachmentSlot::Empty,
            Some(DepthAttachment::Texture(texture)) => self.color_slot(Some(texture)),
            Some(DepthAttachment::Renderbuffer(rb)) => {
                self.renderbuffers.get(&rb.0).map_or(AttachmentSlot::Dangling, |r| {
                    AttachmentSlot::Attached {
                        width: r.width,
                        height: r.height,
                        format: r.format,
                    }
                })
            }
        }
    }

    /// Get reference to the wgpu device
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }
}

impl GraphicsBackend for WgpuBackend {
    fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            let (width, height) = Self::clamp_surface_size(&self.device, width, height);
            self.surface_config.width = width;
            self.surface_config.height = height;
            self.surface.configure(&self.device, &self.surface_config);
            self.surface_depth = Self::create_surface_depth(&self.device, width, height);
        }
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        if self.current_texture.is_some() {
            return Err(BackendError::InvalidCommand("frame already begun".into()));
        }
        let output = self.surface.get_current_texture().map_err(|e| match e {
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => BackendError::SurfaceLost,
            wgpu::SurfaceError::OutOfMemory => BackendError::OutOfMemory,
            _ => BackendError::AcquireImageFailed(e.to_string()),
        })?;

        self.current_texture = Some(output);
        self.passes.clear();
        self.uniform_arena.clear();
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        if let Some(pass) = &self.pending_pass {
            return Err(BackendError::InvalidCommand(format!(
                "render pass {} still open",
                pass.label
            )));
        }
        let output = self
            .current_texture
            .take()
            .ok_or_else(|| BackendError::InvalidCommand("end_frame without begin_frame".into()))?;

        self.upload_uniform_arena();
        let surface_view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let commands = self.encode_passes(&surface_view);
        self.queue.submit(std::iter::once(commands));
        output.present();
        Ok(())
    }

    fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8]) -> BackendResult<BufferHandle> {
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: desc.label.as_deref(),
            contents: data,
            usage: Self::convert_buffer_usage(desc.usage),
        });

        let id = self.allocate_id();
        self.buffers.insert(id, buffer);
        Ok(BufferHandle(id))
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?}: empty extent {}x{} ({} mips)",
                desc.label, desc.width, desc.height, desc.mip_levels
            )));
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: desc.mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::convert_texture_format(desc.format),
            usage: Self::convert_texture_usage(desc.usage),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let id = self.allocate_id();
        self.textures.insert(
            id,
            TextureEntry {
                texture,
                view,
                format: desc.format,
                width: desc.width,
                height: desc.height,
                sampler: SamplerDescriptor::default(),
            },
        );
        Ok(TextureHandle(id))
    }

    fn write_texture(
        &mut self,
        texture: TextureHandle,
        mip_level: u32,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> BackendResult<()> {
        let entry = self.textures.get(&texture.0).ok_or(BackendError::InvalidHandle {
            kind: "texture",
            id: texture.0,
        })?;
        let bytes_per_row = width * entry.format.bytes_per_pixel();
        if data.len() != (bytes_per_row * height) as usize {
            return Err(BackendError::InvalidCommand(format!(
                "write_texture: {} bytes for {}x{}",
                data.len(),
                width,
                height
            )));
        }
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &entry.texture,
                mip_level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn set_texture_sampler(&mut self, texture: TextureHandle, sampler: &SamplerDescriptor) -> BackendResult<()> {
        let entry = self.textures.get_mut(&texture.0).ok_or(BackendError::InvalidHandle {
            kind: "texture",
            id: texture.0,
        })?;
        entry.sampler = *sampler;
        Ok(())
    }

    fn create_renderbuffer(&mut self, desc: &RenderbufferDescriptor) -> BackendResult<RenderbufferHandle> {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::convert_texture_format(desc.format),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let id = self.allocate_id();
        self.renderbuffers.insert(
            id,
            RenderbufferEntry {
                texture,
                view,
                format: desc.format,
                width: desc.width,
                height: desc.height,
            },
        );
        Ok(RenderbufferHandle(id))
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDescriptor) -> BackendResult<FramebufferHandle> {
        let id = self.allocate_id();
        self.framebuffers.insert(id, desc.clone());
        Ok(FramebufferHandle(id))
    }

    fn check_framebuffer(&self, framebuffer: FramebufferHandle) -> FramebufferStatus {
        let Some(desc) = self.framebuffers.get(&framebuffer.0) else {
            return FramebufferStatus::Unsupported;
        };
        FramebufferStatus::evaluate(self.color_slot(desc.color), self.depth_slot(desc.depth))
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        let uniforms = UniformBlockLayout::reflect(desc.label, desc.source)?;
        if uniforms.size == 0 {
            return Err(BackendError::ShaderCreationFailed(format!(
                "{}: program declares no uniform block",
                desc.label
            )));
        }

        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.source.into()),
        });

        let uniform_layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(desc.label),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(uniforms.size as u64),
                },
                count: None,
            }],
        });

        let texture_layout = (!desc.texture_units.is_empty()).then(|| {
            let entries: Vec<wgpu::BindGroupLayoutEntry> = desc
                .texture_units
                .iter()
                .flat_map(|unit| {
                    let (sample_type, sampler_type) = match unit.kind {
                        TextureSampleKind::Color => (
                            wgpu::TextureSampleType::Float { filterable: true },
                            wgpu::SamplerBindingType::Filtering,
                        ),
                        TextureSampleKind::Depth => (
                            wgpu::TextureSampleType::Depth,
                            wgpu::SamplerBindingType::Comparison,
                        ),
                    };
                    [
                        wgpu::BindGroupLayoutEntry {
                            binding: unit.unit * 2,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                sample_type,
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: unit.unit * 2 + 1,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Sampler(sampler_type),
                            count: None,
                        },
                    ]
                })
                .collect();
            self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(desc.label),
                entries: &entries,
            })
        });

        let mut layouts = vec![&uniform_layout];
        if let Some(layout) = &texture_layout {
            layouts.push(layout);
        }
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.label),
            bind_group_layouts: &layouts,
            push_constant_ranges: &[],
        });

        log::info!(
            "Compiled program {} ({} uniforms, {} texture units)",
            desc.label,
            uniforms.members.len(),
            desc.texture_units.len()
        );

        let id = self.allocate_id();
        self.programs.insert(
            id,
            ProgramEntry {
                label: desc.label.to_string(),
                module,
                staging: vec![0; uniforms.size as usize],
                uniforms,
                uniform_layout,
                texture_units: desc.texture_units.to_vec(),
                texture_layout,
                pipeline_layout,
            },
        );
        Ok(ProgramHandle(id))
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> UniformLocation {
        self.programs
            .get(&program.0)
            .map(|p| p.uniforms.location(name))
            .unwrap_or(UniformLocation::UNUSED)
    }

    fn create_vertex_array(&mut self, desc: &VertexArrayDescriptor) -> BackendResult<VertexArrayHandle> {
        if !self.programs.contains_key(&desc.program.0) {
            return Err(BackendError::InvalidHandle {
                kind: "program",
                id: desc.program.0,
            });
        }
        if !self.buffers.contains_key(&desc.buffer.0) {
            return Err(BackendError::InvalidHandle {
                kind: "buffer",
                id: desc.buffer.0,
            });
        }
        let id = self.allocate_id();
        self.vertex_arrays.insert(
            id,
            VertexArrayEntry {
                buffer: desc.buffer.0,
                layout: desc.layout.clone(),
            },
        );
        Ok(VertexArrayHandle(id))
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) -> BackendResult<()> {
        if self.current_texture.is_none() {
            return Err(BackendError::InvalidCommand("render pass outside of a frame".into()));
        }
        if let Some(open) = &self.pending_pass {
            return Err(BackendError::InvalidCommand(format!(
                "render pass {} begun while {} is open",
                desc.label, open.label
            )));
        }
        let pass = self.start_pass(desc)?;
        self.pending_pass = Some(pass);
        Ok(())
    }

    fn end_render_pass(&mut self) {
        if let Some(pass) = self.pending_pass.take() {
            self.passes.push(pass);
        }
    }

    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        if let Some(pass) = self.pending_pass.as_mut() {
            // GL viewports are anchored bottom-left
            let top = pass.size.1.saturating_sub(y + height);
            pass.commands.push(RecordedCommand::Viewport {
                x: x as f32,
                y: top as f32,
                width: width as f32,
                height: height as f32,
            });
        }
    }

    fn set_render_state(&mut self, state: &RenderState) {
        self.render_state = *state;
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.program = program;
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let Some(program) = self.program.and_then(|p| self.programs.get_mut(&p.0)) else {
            return;
        };
        let ProgramEntry {
            label,
            uniforms,
            staging,
            ..
        } = program;
        let Some(member) = uniforms.member(location) else {
            return;
        };
        if member.size as usize != value.size() {
            log::warn!(
                "{}: uniform {} is {} bytes, written with {} bytes",
                label,
                member.name,
                member.size,
                value.size()
            );
        }
        let start = member.offset as usize;
        let end = (start + member.size as usize).min(staging.len());
        value.write_to(&mut staging[start..end]);
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayHandle>) {
        self.vertex_array = vertex_array;
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>) {
        match self.texture_units.get_mut(unit as usize) {
            Some(slot) => *slot = texture,
            None => log::warn!("Texture unit {} out of range", unit),
        }
    }

    fn draw(&mut self, vertices: Range<u32>) -> BackendResult<()> {
        self.record_draw(vertices)
    }

    fn take_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut *self.errors.lock())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
        self.texture_groups
            .retain(|key, _| !key.units.iter().any(|(id, _)| *id == texture.0));
    }

    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        self.renderbuffers.remove(&renderbuffer.0);
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(&framebuffer.0);
    }
}
