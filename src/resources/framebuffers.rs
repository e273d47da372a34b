//! Offscreen render targets
//!
//! Two targets are kept: one sized to the window and one fixed-size shadow
//! map whose depth is a sampleable texture. `allocate` only touches a target
//! when its requested size changed.

use crate::backend::traits::*;
use crate::backend::types::*;
use thiserror::Error;

/// Offscreen allocation error
#[derive(Error, Debug)]
pub enum FramebufferError {
    #[error("{target} framebuffer is incomplete: {status}")]
    Incomplete {
        target: &'static str,
        status: FramebufferStatus,
    },
    #[error("{target} target is not allocated")]
    NotAllocated { target: &'static str },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetKind {
    Screen,
    Shadow,
}

impl TargetKind {
    fn name(&self) -> &'static str {
        match self {
            TargetKind::Screen => "Screen",
            TargetKind::Shadow => "Shadow",
        }
    }

    fn color_filter(&self) -> FilterMode {
        match self {
            TargetKind::Screen => FilterMode::Linear,
            TargetKind::Shadow => FilterMode::Nearest,
        }
    }
}

/// A color + depth render target. Every field is `None` until allocated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffscreenTarget {
    pub size: Option<(u32, u32)>,
    pub color: Option<TextureHandle>,
    pub depth: Option<DepthAttachment>,
    pub framebuffer: Option<FramebufferHandle>,
}

impl OffscreenTarget {
    pub fn is_allocated(&self) -> bool {
        self.framebuffer.is_some()
    }

    /// Destroy every handle and return to the unallocated state
    fn destroy(&mut self, backend: &mut dyn GraphicsBackend) {
        if let Some(framebuffer) = self.framebuffer.take() {
            backend.destroy_framebuffer(framebuffer);
        }
        match self.depth.take() {
            Some(DepthAttachment::Renderbuffer(rb)) => backend.destroy_renderbuffer(rb),
            Some(DepthAttachment::Texture(texture)) => backend.destroy_texture(texture),
            None => {}
        }
        if let Some(color) = self.color.take() {
            backend.destroy_texture(color);
        }
        self.size = None;
    }
}

/// Owner of the screen and shadow render targets
#[derive(Debug, Default)]
pub struct Framebuffers {
    screen: OffscreenTarget,
    shadow: OffscreenTarget,
}

impl Framebuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure both targets exist with the requested sizes.
    ///
    /// A target whose size is unchanged is left alone. A replaced target's old
    /// handles are destroyed only once the new ones are complete.
    pub fn allocate(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        screen_size: (u32, u32),
        shadow_size: (u32, u32),
    ) -> Result<(), FramebufferError> {
        if self.screen.size != Some(screen_size) {
            let target = Self::build(backend, TargetKind::Screen, screen_size)?;
            std::mem::replace(&mut self.screen, target).destroy(backend);
        }
        if self.shadow.size != Some(shadow_size) {
            let target = Self::build(backend, TargetKind::Shadow, shadow_size)?;
            std::mem::replace(&mut self.shadow, target).destroy(backend);
        }
        Ok(())
    }

    fn build(
        backend: &mut dyn GraphicsBackend,
        kind: TargetKind,
        size: (u32, u32),
    ) -> Result<OffscreenTarget, FramebufferError> {
        log::debug!("Allocating {} target ({}x{})", kind.name(), size.0, size.1);
        let mut target = OffscreenTarget {
            size: Some(size),
            ..Default::default()
        };
        match Self::populate(backend, kind, &mut target) {
            Ok(()) => Ok(target),
            Err(e) => {
                target.destroy(backend);
                Err(e)
            }
        }
    }

    fn populate(
        backend: &mut dyn GraphicsBackend,
        kind: TargetKind,
        target: &mut OffscreenTarget,
    ) -> Result<(), FramebufferError> {
        let (width, height) = target.size.unwrap_or((1, 1));

        let color = backend.create_texture(&TextureDescriptor {
            label: Some(format!("{} Color", kind.name())),
            width,
            height,
            mip_levels: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT,
        })?;
        target.color = Some(color);
        backend.set_texture_sampler(color, &SamplerDescriptor::clamped(kind.color_filter()))?;

        let depth = match kind {
            TargetKind::Screen => DepthAttachment::Renderbuffer(backend.create_renderbuffer(
                &RenderbufferDescriptor {
                    label: Some("Screen Depth".into()),
                    width,
                    height,
                    format: TextureFormat::Depth24Plus,
                },
            )?),
            TargetKind::Shadow => {
                let texture = backend.create_texture(&TextureDescriptor {
                    label: Some("Shadow Depth".into()),
                    width,
                    height,
                    mip_levels: 1,
                    format: TextureFormat::Depth32Float,
                    usage: TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT,
                })?;
                target.depth = Some(DepthAttachment::Texture(texture));
                backend.set_texture_sampler(texture, &SamplerDescriptor::clamped(FilterMode::Linear))?;
                DepthAttachment::Texture(texture)
            }
        };
        target.depth = Some(depth);

        let framebuffer = backend.create_framebuffer(&FramebufferDescriptor {
            label: Some(format!("{} Framebuffer", kind.name())),
            color: Some(color),
            depth: Some(depth),
        })?;
        target.framebuffer = Some(framebuffer);

        let status = backend.check_framebuffer(framebuffer);
        if !status.is_complete() {
            return Err(FramebufferError::Incomplete {
                target: kind.name(),
                status,
            });
        }
        Ok(())
    }

    /// Destroy both targets
    pub fn release(&mut self, backend: &mut dyn GraphicsBackend) {
        self.screen.destroy(backend);
        self.shadow.destroy(backend);
    }

    pub fn screen(&self) -> &OffscreenTarget {
        &self.screen
    }

    pub fn shadow(&self) -> &OffscreenTarget {
        &self.shadow
    }

    pub fn shadow_framebuffer(&self) -> Option<FramebufferHandle> {
        self.shadow.framebuffer
    }

    pub fn shadow_depth_texture(&self) -> Option<TextureHandle> {
        match self.shadow.depth {
            Some(DepthAttachment::Texture(texture)) => Some(texture),
            _ => None,
        }
    }

    /// Framebuffer and depth texture the shadow pass renders into
    pub fn shadow_pass_targets(&self) -> Result<(FramebufferHandle, TextureHandle), FramebufferError> {
        self.shadow_framebuffer()
            .zip(self.shadow_depth_texture())
            .ok_or(FramebufferError::NotAllocated {
                target: TargetKind::Shadow.name(),
            })
    }

    pub fn screen_size(&self) -> Option<(u32, u32)> {
        self.screen.size
    }

    pub fn shadow_size(&self) -> Option<(u32, u32)> {
        self.shadow.size
    }
}
