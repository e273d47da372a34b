//! Pass recording and command encoding for the wgpu backend

use super::{ProgramEntry, WgpuBackend, SURFACE_DEPTH_FORMAT};
use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::ops::Range;

/// Everything a pipeline variant depends on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) struct PipelineKey {
    pub program: u64,
    pub vertex_array: u64,
    pub state: RenderState,
    pub color_format: Option<wgpu::TextureFormat>,
    pub depth_format: Option<wgpu::TextureFormat>,
}

/// Texture/sampler pairs bound to a program's units; texture id 0 is the fallback
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) struct TextureGroupKey {
    pub program: u64,
    pub units: Vec<(u64, SamplerDescriptor)>,
}

pub(super) enum RecordedCommand {
    Viewport {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    Draw {
        pipeline: PipelineKey,
        uniform_offset: u32,
        textures: Option<TextureGroupKey>,
        buffer: u64,
        vertices: Range<u32>,
    },
}

pub(super) struct RecordedPass {
    pub label: String,
    pub target: RenderTarget,
    pub size: (u32, u32),
    pub color_format: Option<wgpu::TextureFormat>,
    pub depth_format: Option<wgpu::TextureFormat>,
    pub clear_color: Option<[f32; 4]>,
    pub clear_depth: Option<f32>,
    pub commands: Vec<RecordedCommand>,
}

/// Sampler actually used for a unit of the given kind
fn unit_sampler(kind: TextureSampleKind, sampler: SamplerDescriptor) -> SamplerDescriptor {
    match kind {
        TextureSampleKind::Color => SamplerDescriptor {
            compare: None,
            ..sampler
        },
        TextureSampleKind::Depth => SamplerDescriptor {
            compare: Some(sampler.compare.unwrap_or(CompareFunction::Less)),
            mipmap_filter: None,
            ..sampler
        },
    }
}

/// View and sampler entries for every texture unit of a program.
///
/// Each sampler must already be cached; a missing one is an error rather
/// than a bind group with a hole in it.
fn unit_entries<'a>(
    label: &str,
    units: &[TextureUnitLayout],
    bound: &[(u64, SamplerDescriptor)],
    samplers: &'a HashMap<SamplerDescriptor, wgpu::Sampler>,
    view: impl Fn(&TextureUnitLayout, u64) -> &'a wgpu::TextureView,
) -> BackendResult<Vec<wgpu::BindGroupEntry<'a>>> {
    let mut entries = Vec::with_capacity(units.len() * 2);
    for (unit, (texture, sampler)) in units.iter().zip(bound) {
        let Some(sampler) = samplers.get(sampler) else {
            return Err(BackendError::InvalidCommand(format!(
                "{}: no sampler for unit {}",
                label, unit.unit
            )));
        };
        entries.push(wgpu::BindGroupEntry {
            binding: unit.unit * 2,
            resource: wgpu::BindingResource::TextureView(view(unit, *texture)),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: unit.unit * 2 + 1,
            resource: wgpu::BindingResource::Sampler(sampler),
        });
    }
    Ok(entries)
}

impl WgpuBackend {
    pub(super) fn start_pass(&self, desc: &RenderPassDescriptor) -> BackendResult<RecordedPass> {
        let (size, color_format, depth_format) = match desc.target {
            RenderTarget::Surface => (
                (self.surface_config.width, self.surface_config.height),
                Some(self.surface_config.format),
                Some(SURFACE_DEPTH_FORMAT),
            ),
            RenderTarget::Framebuffer(framebuffer) => {
                let status = self.check_framebuffer(framebuffer);
                if !status.is_complete() {
                    return Err(BackendError::InvalidCommand(format!(
                        "render pass {}: framebuffer is {}",
                        desc.label, status
                    )));
                }
                let fb = self.framebuffers.get(&framebuffer.0).ok_or(BackendError::InvalidHandle {
                    kind: "framebuffer",
                    id: framebuffer.0,
                })?;
                let color = fb.color.and_then(|t| self.textures.get(&t.0));
                let depth = match fb.depth {
                    Some(DepthAttachment::Texture(t)) => {
                        self.textures.get(&t.0).map(|t| (t.width, t.height, t.format))
                    }
                    Some(DepthAttachment::Renderbuffer(rb)) => {
                        self.renderbuffers.get(&rb.0).map(|r| (r.width, r.height, r.format))
                    }
                    None => None,
                };
                let size = color
                    .map(|c| (c.width, c.height))
                    .or(depth.map(|(w, h, _)| (w, h)))
                    .unwrap_or((1, 1));
                (
                    size,
                    color.map(|c| Self::convert_texture_format(c.format)),
                    depth.map(|(_, _, f)| Self::convert_texture_format(f)),
                )
            }
        };

        Ok(RecordedPass {
            label: desc.label.clone(),
            target: desc.target,
            size,
            color_format,
            depth_format,
            clear_color: desc.clear_color,
            clear_depth: desc.clear_depth,
            commands: vec![RecordedCommand::Viewport {
                x: 0.0,
                y: 0.0,
                width: size.0 as f32,
                height: size.1 as f32,
            }],
        })
    }

    /// Resolve what a program's unit samples from the currently bound textures
    fn resolve_unit(&self, program: &ProgramEntry, unit: &TextureUnitLayout) -> (u64, SamplerDescriptor) {
        let bound = self.texture_units.get(unit.unit as usize).copied().flatten();
        let texture = bound.and_then(|t| self.textures.get(&t.0).map(|entry| (t, entry)));
        match texture {
            Some((handle, entry)) if entry.format.is_depth() == (unit.kind == TextureSampleKind::Depth) => {
                (handle.0, unit_sampler(unit.kind, entry.sampler))
            }
            Some(_) => {
                log::warn!(
                    "{}: texture on unit {} does not match {:?} sampling",
                    program.label,
                    unit.unit,
                    unit.kind
                );
                (0, unit_sampler(unit.kind, SamplerDescriptor::default()))
            }
            None => (0, unit_sampler(unit.kind, SamplerDescriptor::default())),
        }
    }

    pub(super) fn record_draw(&mut self, vertices: Range<u32>) -> BackendResult<()> {
        let pass = self
            .pending_pass
            .as_ref()
            .ok_or_else(|| BackendError::InvalidCommand("draw outside of a render pass".into()))?;
        let program_handle = self
            .program
            .ok_or_else(|| BackendError::InvalidCommand("draw without a program".into()))?;
        let vertex_array = self
            .vertex_array
            .ok_or_else(|| BackendError::InvalidCommand("draw without a vertex array".into()))?;
        let buffer = self
            .vertex_arrays
            .get(&vertex_array.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "vertex array",
                id: vertex_array.0,
            })?
            .buffer;

        let key = PipelineKey {
            program: program_handle.0,
            vertex_array: vertex_array.0,
            state: self.render_state,
            color_format: pass.color_format,
            depth_format: pass.depth_format,
        };
        self.ensure_pipeline(&key)?;

        let program = self.programs.get(&program_handle.0).ok_or(BackendError::InvalidHandle {
            kind: "program",
            id: program_handle.0,
        })?;
        let textures = (!program.texture_units.is_empty()).then(|| TextureGroupKey {
            program: program_handle.0,
            units: program
                .texture_units
                .iter()
                .map(|unit| self.resolve_unit(program, unit))
                .collect(),
        });
        if let Some(textures) = &textures {
            self.ensure_texture_group(textures)?;
        }

        // Snapshot the uniform block for this draw
        let alignment = self.uniform_alignment.max(1);
        let offset = self.uniform_arena.len().div_ceil(alignment) * alignment;
        self.uniform_arena.resize(offset, 0);
        if let Some(program) = self.programs.get(&program_handle.0) {
            self.uniform_arena.extend_from_slice(&program.staging);
        }

        if let Some(pass) = self.pending_pass.as_mut() {
            pass.commands.push(RecordedCommand::Draw {
                pipeline: key,
                uniform_offset: offset as u32,
                textures,
                buffer,
                vertices,
            });
        }
        Ok(())
    }

    fn ensure_pipeline(&mut self, key: &PipelineKey) -> BackendResult<()> {
        if self.pipelines.contains_key(key) {
            return Ok(());
        }
        let program = self.programs.get(&key.program).ok_or(BackendError::InvalidHandle {
            kind: "program",
            id: key.program,
        })?;
        let vertex_array = self.vertex_arrays.get(&key.vertex_array).ok_or(BackendError::InvalidHandle {
            kind: "vertex array",
            id: key.vertex_array,
        })?;

        let attributes: Vec<wgpu::VertexAttribute> = vertex_array
            .layout
            .attributes
            .iter()
            .map(|attr| wgpu::VertexAttribute {
                format: Self::convert_vertex_format(attr.format),
                offset: attr.offset,
                shader_location: attr.location,
            })
            .collect();
        let buffers = [wgpu::VertexBufferLayout {
            array_stride: vertex_array.layout.array_stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }];

        let targets: Vec<Option<wgpu::ColorTargetState>> = key
            .color_format
            .map(|format| wgpu::ColorTargetState {
                format,
                blend: key.state.blend.map(|blend| wgpu::BlendState {
                    color: Self::convert_blend_component(blend.color),
                    alpha: Self::convert_blend_component(blend.alpha),
                }),
                write_mask: wgpu::ColorWrites::ALL,
            })
            .into_iter()
            .map(Some)
            .collect();

        let depth_stencil = key.depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: key.state.depth_test,
            depth_compare: if key.state.depth_test {
                wgpu::CompareFunction::Less
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&program.label),
            layout: Some(&program.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &program.module,
                entry_point: "vs_main",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &buffers,
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Self::convert_cull_mode(key.state.cull_mode),
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &program.module,
                entry_point: "fs_main",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &targets,
            }),
            multiview: None,
        });
        log::debug!("Created pipeline variant for {} ({:?})", program.label, key.state);

        self.pipelines.insert(key.clone(), pipeline);
        Ok(())
    }

    fn ensure_texture_group(&mut self, key: &TextureGroupKey) -> BackendResult<()> {
        if self.texture_groups.contains_key(key) {
            return Ok(());
        }
        let device = &self.device;
        for (_, sampler) in &key.units {
            self.samplers.entry(*sampler).or_insert_with(|| {
                device.create_sampler(&wgpu::SamplerDescriptor {
                    label: None,
                    address_mode_u: Self::convert_address_mode(sampler.address_mode_u),
                    address_mode_v: Self::convert_address_mode(sampler.address_mode_v),
                    address_mode_w: wgpu::AddressMode::ClampToEdge,
                    mag_filter: Self::convert_filter_mode(sampler.mag_filter),
                    min_filter: Self::convert_filter_mode(sampler.min_filter),
                    mipmap_filter: sampler
                        .mipmap_filter
                        .map_or(wgpu::FilterMode::Nearest, Self::convert_filter_mode),
                    lod_max_clamp: if sampler.mipmap_filter.is_some() { 32.0 } else { 0.0 },
                    compare: sampler.compare.map(Self::convert_compare_function),
                    ..Default::default()
                })
            });
        }

        let program = self.programs.get(&key.program).ok_or(BackendError::InvalidHandle {
            kind: "program",
            id: key.program,
        })?;
        let Some(layout) = &program.texture_layout else {
            return Err(BackendError::InvalidCommand(format!(
                "{}: program has no texture units",
                program.label
            )));
        };

        let entries = unit_entries(
            &program.label,
            &program.texture_units,
            &key.units,
            &self.samplers,
            |unit, texture| match self.textures.get(&texture) {
                Some(entry) => &entry.view,
                None if unit.kind == TextureSampleKind::Depth => &self.fallback.depth,
                None => &self.fallback.color,
            },
        )?;
        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&program.label),
            layout,
            entries: &entries,
        });

        self.texture_groups.insert(key.clone(), group);
        Ok(())
    }

    pub(super) fn upload_uniform_arena(&mut self) {
        if self.uniform_arena.is_empty() {
            return;
        }
        let needed = self.uniform_arena.len() as u64;
        if self.uniform_buffer.as_ref().map_or(true, |b| b.size() < needed) {
            let size = needed.next_power_of_two().max(4096);
            log::debug!("Growing uniform arena to {} bytes", size);
            self.uniform_buffer = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Uniform Arena"),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
        }
        if let Some(buffer) = &self.uniform_buffer {
            self.queue.write_buffer(buffer, 0, &self.uniform_arena);
        }
    }

    /// Encode every recorded pass of the frame into one command buffer
    pub(super) fn encode_passes(&mut self, surface_view: &wgpu::TextureView) -> wgpu::CommandBuffer {
        let passes = std::mem::take(&mut self.passes);
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });

        // One uniform bind group per program, shared by every draw through dynamic offsets
        let mut uniform_groups: HashMap<u64, wgpu::BindGroup> = HashMap::new();
        if let Some(buffer) = &self.uniform_buffer {
            for pass in &passes {
                for command in &pass.commands {
                    let RecordedCommand::Draw { pipeline, .. } = command else {
                        continue;
                    };
                    let Some(program) = self.programs.get(&pipeline.program) else {
                        continue;
                    };
                    uniform_groups.entry(pipeline.program).or_insert_with(|| {
                        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                            label: Some(&program.label),
                            layout: &program.uniform_layout,
                            entries: &[wgpu::BindGroupEntry {
                                binding: 0,
                                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                                    buffer,
                                    offset: 0,
                                    size: NonZeroU64::new(program.staging.len() as u64),
                                }),
                            }],
                        })
                    });
                }
            }
        }

        for pass in &passes {
            let Some((color_view, depth_view)) = self.pass_views(pass, surface_view) else {
                log::warn!("Skipping render pass {}: attachments were destroyed", pass.label);
                continue;
            };

            let color_attachment = color_view.map(|view| wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: match pass.clear_color {
                        Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: a as f64,
                        }),
                        None => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                },
            });
            let depth_stencil_attachment = depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: match pass.clear_depth {
                        Some(depth) => wgpu::LoadOp::Clear(depth),
                        None => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            });

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&pass.label),
                color_attachments: &[color_attachment],
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for command in &pass.commands {
                match command {
                    RecordedCommand::Viewport { x, y, width, height } => {
                        render_pass.set_viewport(*x, *y, *width, *height, 0.0, 1.0);
                    }
                    RecordedCommand::Draw {
                        pipeline,
                        uniform_offset,
                        textures,
                        buffer,
                        vertices,
                    } => {
                        let (Some(render_pipeline), Some(uniforms), Some(vertex_buffer)) = (
                            self.pipelines.get(pipeline),
                            uniform_groups.get(&pipeline.program),
                            self.buffers.get(buffer),
                        ) else {
                            log::warn!("{}: dropping draw with missing resources", pass.label);
                            continue;
                        };
                        render_pass.set_pipeline(render_pipeline);
                        render_pass.set_bind_group(0, uniforms, &[*uniform_offset]);
                        if let Some(group) = textures.as_ref().and_then(|k| self.texture_groups.get(k)) {
                            render_pass.set_bind_group(1, group, &[]);
                        }
                        render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
                        render_pass.draw(vertices.clone(), 0..1);
                    }
                }
            }
        }

        encoder.finish()
    }

    #[allow(clippy::type_complexity)]
    fn pass_views<'a>(
        &'a self,
        pass: &RecordedPass,
        surface_view: &'a wgpu::TextureView,
    ) -> Option<(Option<&'a wgpu::TextureView>, Option<&'a wgpu::TextureView>)> {
        match pass.target {
            RenderTarget::Surface => Some((Some(surface_view), Some(&self.surface_depth))),
            RenderTarget::Framebuffer(framebuffer) => {
                let fb = self.framebuffers.get(&framebuffer.0)?;
                let color = match fb.color {
                    Some(texture) => Some(&self.textures.get(&texture.0)?.view),
                    None => None,
                };
                let depth = match fb.depth {
                    Some(DepthAttachment::Texture(texture)) => Some(&self.textures.get(&texture.0)?.view),
                    Some(DepthAttachment::Renderbuffer(rb)) => Some(&self.renderbuffers.get(&rb.0)?.view),
                    None => None,
                };
                Some((color, depth))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_sampler_keeps_depth_comparison() {
        let sampler = unit_sampler(TextureSampleKind::Depth, SamplerDescriptor::default());
        assert_eq!(sampler.compare, Some(CompareFunction::Less));
        assert_eq!(sampler.mipmap_filter, None);

        let color = SamplerDescriptor::default().with_compare(CompareFunction::Less);
        assert_eq!(unit_sampler(TextureSampleKind::Color, color).compare, None);
    }

    #[test]
    fn test_missing_sampler_is_an_error() {
        let units = [TextureUnitLayout {
            unit: 1,
            kind: TextureSampleKind::Depth,
        }];
        let bound = [(0, unit_sampler(TextureSampleKind::Depth, SamplerDescriptor::default()))];
        let samplers = HashMap::new();

        let result = unit_entries("lit", &units, &bound, &samplers, |_, _| {
            panic!("no view is needed once the sampler lookup fails")
        });
        match result {
            Err(BackendError::InvalidCommand(message)) => assert!(message.contains("unit 1")),
            other => panic!("expected InvalidCommand, got {:?}", other.map(|e| e.len())),
        }
    }
}
