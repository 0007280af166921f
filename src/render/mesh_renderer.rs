//! Solid-color 2D mesh renderer.
//!
//! Draws batches of [`DrawItem2D`]s with a single uniform pipeline. Each
//! batch carries its own `clip_from_world` transform, so pixel-space UI
//! chrome and camera-framed content render in one pass.
//!
//! Upload strategy: all batch geometry is concatenated into one vertex/index
//! upload per frame, with per-draw index ranges and base vertices. Uniforms
//! (`mvp`, `color`) differ per draw, and `Queue::write_buffer` lands before
//! the pass executes, so each draw gets its own small uniform buffer from a
//! grow-only pool instead of rewriting a shared one mid-pass.
//!
//! Limitations:
//! - u32 indices (matches `scene::Mesh2D`).
//! - No depth buffer; draws are ordered by item `z` (stable, so ties keep
//!   batch/item order).

use std::{borrow::Cow, mem};

use crate::render::gpu::Gpu;
use crate::scene::{Affine2, DrawItem2D, Rgba};

fn round_up_to(v: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (v + (align - 1)) & !(align - 1)
}

/// GPU vertex format for 2D meshes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex2D {
    pub position: [f32; 2],
}

impl Vertex2D {
    pub const ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

    #[inline]
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Vertex2D>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

/// Uniform layout for the solid-color pipeline:
/// - `mvp`: clip_from_world * world_from_local, embedded into a 4x4
/// - `color`: RGBA fill
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct SolidUniforms {
    mvp: [[f32; 4]; 4],
    color: [f32; 4],
}

impl SolidUniforms {
    #[inline]
    fn new(mvp: [[f32; 4]; 4], color: Rgba) -> Self {
        Self {
            mvp,
            color: [color.r, color.g, color.b, color.a],
        }
    }
}

fn mat4_mul(a: [[f32; 4]; 4], b: [[f32; 4]; 4]) -> [[f32; 4]; 4] {
    // Column-major 4x4: out = a * b.
    let mut out = [[0.0f32; 4]; 4];
    for col in 0..4 {
        for row in 0..4 {
            out[col][row] = a[0][row] * b[col][0]
                + a[1][row] * b[col][1]
                + a[2][row] * b[col][2]
                + a[3][row] * b[col][3];
        }
    }
    out
}

/// One group of draw items sharing a world→clip transform.
pub struct DrawBatch<'a> {
    pub clip_from_world: Affine2,
    pub items: &'a [DrawItem2D],
}

struct DrawSpan {
    index_start: u32,
    index_count: u32,
    base_vertex: i32,
    z: i32,
    uniforms: SolidUniforms,
}

/// Flatten batches into concatenated geometry plus z-sorted draw spans.
fn collect_spans(batches: &[DrawBatch<'_>]) -> (Vec<Vertex2D>, Vec<u32>, Vec<DrawSpan>) {
    let mut vertices: Vec<Vertex2D> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    let mut spans: Vec<DrawSpan> = Vec::new();

    for batch in batches {
        let clip_from_world = batch.clip_from_world.to_mat4();

        for item in batch.items {
            if item.mesh.is_empty() {
                continue;
            }

            let base_vertex = vertices.len() as i32;
            let index_start = indices.len() as u32;

            vertices.extend(
                item.mesh
                    .positions
                    .iter()
                    .copied()
                    .map(|p| Vertex2D { position: p }),
            );
            indices.extend_from_slice(&item.mesh.indices);

            let mvp = mat4_mul(clip_from_world, item.world_from_local.to_mat4());
            spans.push(DrawSpan {
                index_start,
                index_count: item.mesh.indices.len() as u32,
                base_vertex,
                z: item.z,
                uniforms: SolidUniforms::new(mvp, item.fill),
            });
        }
    }

    // Painter's order; stable so equal z keeps submission order.
    spans.sort_by_key(|span| span.z);

    (vertices, indices, spans)
}

pub struct MeshRenderer {
    pipeline: wgpu::RenderPipeline,
    uniform_bind_group_layout: wgpu::BindGroupLayout,

    /// One (buffer, bind group) per draw, grown on demand, reused per frame.
    uniform_pool: Vec<(wgpu::Buffer, wgpu::BindGroup)>,

    // Reusable geometry buffers; resized on demand.
    vertex_buffer: wgpu::Buffer,
    vertex_capacity_bytes: u64,

    index_buffer: wgpu::Buffer,
    index_capacity_bytes: u64,
}

impl MeshRenderer {
    /// Create the solid-color pipeline targeting the surface's sRGB view.
    pub fn new(gpu: &Gpu) -> anyhow::Result<Self> {
        let shader = gpu
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("MeshRenderer Solid Shader"),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!(
                    "shaders/solid_mesh.wgsl"
                ))),
            });

        let uniform_bind_group_layout =
            gpu.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("MeshRenderer Uniform BGL"),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: Some(
                                wgpu::BufferSize::new(mem::size_of::<SolidUniforms>() as u64)
                                    .unwrap(),
                            ),
                        },
                        count: None,
                    }],
                });

        let pipeline_layout = gpu
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("MeshRenderer Pipeline Layout"),
                bind_group_layouts: &[&uniform_bind_group_layout],
                immediate_size: 0,
            });

        let pipeline = gpu
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("MeshRenderer Solid Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[Vertex2D::layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: gpu.surface_format.add_srgb_suffix(),
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });

        let initial_vb = 4096u64;
        let initial_ib = 4096u64;

        let vertex_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("MeshRenderer Vertex Buffer"),
            size: initial_vb,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let index_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("MeshRenderer Index Buffer"),
            size: initial_ib,
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            pipeline,
            uniform_bind_group_layout,
            uniform_pool: Vec::new(),
            vertex_buffer,
            vertex_capacity_bytes: initial_vb,
            index_buffer,
            index_capacity_bytes: initial_ib,
        })
    }

    fn ensure_geometry_capacity(&mut self, gpu: &Gpu, vb_bytes: u64, ib_bytes: u64) {
        if vb_bytes > self.vertex_capacity_bytes {
            let new_size = vb_bytes.next_power_of_two().max(4096);
            self.vertex_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("MeshRenderer Vertex Buffer (resized)"),
                size: new_size,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.vertex_capacity_bytes = new_size;
        }

        if ib_bytes > self.index_capacity_bytes {
            let new_size = ib_bytes.next_power_of_two().max(4096);
            self.index_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("MeshRenderer Index Buffer (resized)"),
                size: new_size,
                usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.index_capacity_bytes = new_size;
        }
    }

    fn ensure_uniform_pool(&mut self, gpu: &Gpu, count: usize) {
        while self.uniform_pool.len() < count {
            let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("MeshRenderer Uniform Buffer"),
                size: mem::size_of::<SolidUniforms>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });

            let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("MeshRenderer Uniform BG"),
                layout: &self.uniform_bind_group_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });

            self.uniform_pool.push((buffer, bind_group));
        }
    }

    /// Draw all batches into the provided render pass.
    ///
    /// The caller creates the pass and clears the background. Draws are
    /// z-ordered across all batches (stable for equal z).
    ///
    /// Coordinate mapping per item:
    /// `clip_from_local = batch.clip_from_world * item.world_from_local`.
    pub fn draw_batches<'pass>(
        &'pass mut self,
        gpu: &Gpu,
        pass: &mut wgpu::RenderPass<'pass>,
        batches: &[DrawBatch<'_>],
    ) -> anyhow::Result<()> {
        let (vertices, indices, spans) = collect_spans(batches);

        if spans.is_empty() {
            return Ok(());
        }

        // `Queue::write_buffer` requires COPY_BUFFER_ALIGNMENT (4 bytes);
        // pad the upload and slice only the real ranges when binding.
        let vb_bytes = (vertices.len() * mem::size_of::<Vertex2D>()) as u64;
        let ib_bytes = (indices.len() * mem::size_of::<u32>()) as u64;

        let align = wgpu::COPY_BUFFER_ALIGNMENT;
        let vb_upload = round_up_to(vb_bytes, align);
        let ib_upload = round_up_to(ib_bytes, align);

        self.ensure_geometry_capacity(gpu, vb_upload, ib_upload);
        self.ensure_uniform_pool(gpu, spans.len());

        let v_raw = bytemuck::cast_slice(&vertices);
        if vb_upload == vb_bytes {
            gpu.queue.write_buffer(&self.vertex_buffer, 0, v_raw);
        } else {
            let mut padded = Vec::<u8>::with_capacity(vb_upload as usize);
            padded.extend_from_slice(v_raw);
            padded.resize(vb_upload as usize, 0);
            gpu.queue.write_buffer(&self.vertex_buffer, 0, &padded);
        }

        let i_raw = bytemuck::cast_slice(&indices);
        if ib_upload == ib_bytes {
            gpu.queue.write_buffer(&self.index_buffer, 0, i_raw);
        } else {
            let mut padded = Vec::<u8>::with_capacity(ib_upload as usize);
            padded.extend_from_slice(i_raw);
            padded.resize(ib_upload as usize, 0);
            gpu.queue.write_buffer(&self.index_buffer, 0, &padded);
        }

        for (span, (buffer, _)) in spans.iter().zip(&self.uniform_pool) {
            gpu.queue
                .write_buffer(buffer, 0, bytemuck::bytes_of(&span.uniforms));
        }

        pass.set_pipeline(&self.pipeline);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..vb_bytes));
        pass.set_index_buffer(
            self.index_buffer.slice(..ib_bytes),
            wgpu::IndexFormat::Uint32,
        );

        for (span, (_, bind_group)) in spans.iter().zip(&self.uniform_pool) {
            pass.set_bind_group(0, bind_group, &[]);
            pass.draw_indexed(
                span.index_start..(span.index_start + span.index_count),
                span.base_vertex,
                0..1,
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{DrawItem2D, Mesh2D, Rgba};

    fn item(z: i32, x: f32) -> DrawItem2D {
        let mut mesh = Mesh2D::default();
        mesh.append_rect([x, 0.0], [x + 1.0, 1.0]);
        DrawItem2D {
            mesh,
            fill: Rgba::WHITE,
            world_from_local: Affine2::IDENTITY,
            z,
        }
    }

    #[test]
    fn spans_draw_in_z_order_across_batches() {
        // Background content carries low z, UI chrome high z; submission
        // order is the reverse here.
        let ui = vec![item(12, 0.0), item(10, 2.0)];
        let content = vec![item(0, 4.0)];

        let batches = [
            DrawBatch {
                clip_from_world: Affine2::IDENTITY,
                items: &ui,
            },
            DrawBatch {
                clip_from_world: Affine2::IDENTITY,
                items: &content,
            },
        ];

        let (vertices, indices, spans) = collect_spans(&batches);
        assert_eq!(vertices.len(), 12);
        assert_eq!(indices.len(), 18);

        let zs: Vec<i32> = spans.iter().map(|s| s.z).collect();
        assert_eq!(zs, vec![0, 10, 12]);
    }

    #[test]
    fn equal_z_keeps_submission_order() {
        let items = vec![item(5, 0.0), item(5, 2.0)];
        let batches = [DrawBatch {
            clip_from_world: Affine2::IDENTITY,
            items: &items,
        }];

        let (_, _, spans) = collect_spans(&batches);
        assert_eq!(spans[0].base_vertex, 0);
        assert_eq!(spans[1].base_vertex, 4);
    }

    #[test]
    fn empty_items_produce_no_spans() {
        let items = vec![DrawItem2D {
            mesh: Mesh2D::default(),
            fill: Rgba::WHITE,
            world_from_local: Affine2::IDENTITY,
            z: 0,
        }];
        let batches = [DrawBatch {
            clip_from_world: Affine2::IDENTITY,
            items: &items,
        }];

        let (vertices, indices, spans) = collect_spans(&batches);
        assert!(vertices.is_empty() && indices.is_empty() && spans.is_empty());
    }
}
