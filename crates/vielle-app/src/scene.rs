// SPDX-License-Identifier: CEPL-1.0
//! The demo scene: one spinning textured triangle, optionally tinted by a
//! cubemap, drawn with linked shader objects into the swapchain image.

use anyhow::{Context as _, Result};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use serde::Deserialize;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};
use vielle_gpu::{
    bind_shaders, color_range, mip_level_count, vk, write_image_sampler_descriptor,
    write_uniform_buffer_descriptor, BarrierBuilder, Context, DecodedImage, DescriptorPool,
    DescriptorSetLayout, GpuBuffer, GpuImage, ImageConfig, MemoryTier, PipelineLayout, Sampler,
    SamplerConfig, SamplerFilter, ShaderConfig, ShaderObject, Surface, SyncScope,
};

const VERT_SPV: &str = concat!(env!("OUT_DIR"), "/scene.vert.spv");
const FRAG_SPV: &str = concat!(env!("OUT_DIR"), "/scene.frag.spv");

const UNIFORM_BINDING: u32 = 0;
const TEXTURE_BINDING: u32 = 1;
const CUBEMAP_BINDING: u32 = 2;

const CHECKER_SIZE: u32 = 256;
const CHECKER_CELL: u32 = 32;

/// Where a freshly acquired swapchain image starts: the acquire semaphore is
/// waited at colour output, so the transition has to wait there too.
const ACQUIRED: SyncScope = SyncScope::new(
    vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
    vk::AccessFlags2::NONE,
    vk::ImageLayout::UNDEFINED,
);

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub clear_color: [f32; 4],
    /// Radians per second.
    pub spin_speed: f32,
    pub texture_filter: SamplerFilter,
}

impl Default for DemoConfig {
    fn default() -> Self {
        DemoConfig {
            clear_color: [0.02, 0.02, 0.04, 1.0],
            spin_speed: 0.8,
            texture_filter: SamplerFilter::Linear,
        }
    }
}

/// std140 layout of the `Scene` uniform block in both shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SceneUniforms {
    transform: [[f32; 4]; 4],
    /// x: seconds since start, y: 1.0 when a cubemap is bound.
    params: [f32; 4],
}

/// Rotation about Z, squeezed horizontally so the triangle keeps its shape
/// on wide surfaces.
pub fn scene_transform(aspect: f32, angle: f32) -> Mat4 {
    let aspect = if aspect > 0.0 { aspect } else { 1.0 };
    Mat4::from_scale(Vec3::new(1.0 / aspect, 1.0, 1.0)) * Mat4::from_rotation_z(angle)
}

pub fn aspect_of(extent: vk::Extent2D) -> f32 {
    extent.width.max(1) as f32 / extent.height.max(1) as f32
}

fn clear_value(config: &DemoConfig) -> vk::ClearValue {
    vk::ClearValue {
        color: vk::ClearColorValue {
            float32: config.clear_color,
        },
    }
}

/// Opaque RGBA8 checkerboard, `size` texels square.
pub fn checkerboard(size: u32, cell: u32) -> Vec<u8> {
    assert!(cell > 0, "checker cells cannot be empty");
    (0..size * size)
        .flat_map(|i| {
            let (x, y) = (i % size, i / size);
            if (x / cell + y / cell) % 2 == 0 {
                [230, 225, 210, 255]
            } else {
                [40, 70, 120, 255]
            }
        })
        .collect()
}

struct Textured<'ctx> {
    image: GpuImage<'ctx>,
    sampler: Sampler<'ctx>,
}

pub struct Scene<'ctx> {
    ctx: &'ctx Context,
    shaders: Vec<ShaderObject<'ctx>>,
    layout: PipelineLayout<'ctx>,
    sets: Vec<vk::DescriptorSet>,
    uniforms: Vec<GpuBuffer<'ctx>>,
    _pool: DescriptorPool<'ctx>,
    _set_layout: DescriptorSetLayout<'ctx>,
    texture: Textured<'ctx>,
    cubemap: Option<Textured<'ctx>>,
    config: DemoConfig,
    aspect: f32,
    started: Instant,
}

impl<'ctx> Scene<'ctx> {
    pub fn create(
        ctx: &'ctx Context,
        frames_in_flight: usize,
        extent: vk::Extent2D,
        config: DemoConfig,
        texture: Option<&Path>,
        cubemap: Option<&Path>,
    ) -> Result<Self> {
        let texture = load_texture(ctx, texture, config.texture_filter)?;
        let cubemap = cubemap.map(|path| load_cubemap(ctx, path)).transpose()?;

        let stages = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;
        let bindings = [
            vk::DescriptorSetLayoutBinding::default()
                .binding(UNIFORM_BINDING)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(stages),
            vk::DescriptorSetLayoutBinding::default()
                .binding(TEXTURE_BINDING)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::FRAGMENT),
            vk::DescriptorSetLayoutBinding::default()
                .binding(CUBEMAP_BINDING)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::FRAGMENT),
        ];
        let binding_flags = [
            vk::DescriptorBindingFlags::empty(),
            vk::DescriptorBindingFlags::empty(),
            vk::DescriptorBindingFlags::PARTIALLY_BOUND,
        ];
        let set_layout = DescriptorSetLayout::create(ctx, &bindings, &binding_flags)?;

        let slots = frames_in_flight as u32;
        let pool = DescriptorPool::create(
            ctx,
            slots,
            &[
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER,
                    descriptor_count: slots,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    descriptor_count: slots * 2,
                },
            ],
        )?;
        let sets = pool.allocate_sets(&vec![set_layout.raw(); frames_in_flight])?;

        let uniform_size = std::mem::size_of::<SceneUniforms>() as vk::DeviceSize;
        let uniforms = sets
            .iter()
            .map(|&set| {
                let buffer = GpuBuffer::create(
                    ctx,
                    uniform_size,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    MemoryTier::RandomAccess,
                )?;
                write_uniform_buffer_descriptor(
                    ctx,
                    set,
                    UNIFORM_BINDING,
                    0,
                    buffer.raw(),
                    uniform_size,
                    0,
                );
                write_image_sampler_descriptor(
                    ctx,
                    set,
                    TEXTURE_BINDING,
                    0,
                    texture.sampler.raw(),
                    texture.image.view(),
                );
                if let Some(cube) = &cubemap {
                    write_image_sampler_descriptor(
                        ctx,
                        set,
                        CUBEMAP_BINDING,
                        0,
                        cube.sampler.raw(),
                        cube.image.view(),
                    );
                }
                Ok(buffer)
            })
            .collect::<vielle_gpu::Result<Vec<_>>>()?;

        let set_layouts = vec![set_layout.raw()];
        let shaders = ShaderObject::create_linked(
            ctx,
            &[
                ShaderConfig {
                    next_stage: vk::ShaderStageFlags::FRAGMENT,
                    set_layouts: set_layouts.clone(),
                    ..ShaderConfig::new(VERT_SPV, vk::ShaderStageFlags::VERTEX)
                },
                ShaderConfig {
                    set_layouts: set_layouts.clone(),
                    ..ShaderConfig::new(FRAG_SPV, vk::ShaderStageFlags::FRAGMENT)
                },
            ],
        )
        .context("building the scene shaders")?;
        let layout = PipelineLayout::create(ctx, &set_layouts, &[])?;

        info!(
            "scene ready: {} uniform slots, cubemap {}",
            sets.len(),
            if cubemap.is_some() { "on" } else { "off" }
        );
        Ok(Scene {
            ctx,
            shaders,
            layout,
            sets,
            uniforms,
            _pool: pool,
            _set_layout: set_layout,
            texture,
            cubemap,
            config,
            aspect: aspect_of(extent),
            started: Instant::now(),
        })
    }

    /// Follows a swapchain rebuild.
    pub fn set_extent(&mut self, extent: vk::Extent2D) {
        self.aspect = aspect_of(extent);
        debug!("scene aspect {:.3}", self.aspect);
    }

    /// Writes this slot's uniforms. Only call once the slot's fence has been
    /// waited, i.e. after `begin_frame`.
    pub fn update(&self, slot: usize) -> vielle_gpu::Result<()> {
        let seconds = self.started.elapsed().as_secs_f32();
        let uniforms = SceneUniforms {
            transform: scene_transform(self.aspect, seconds * self.config.spin_speed)
                .to_cols_array_2d(),
            params: [
                seconds,
                if self.cubemap.is_some() { 1.0 } else { 0.0 },
                0.0,
                0.0,
            ],
        };
        self.uniforms[slot].write_pod(&uniforms, 0)
    }

    /// Clears the acquired image and draws the triangle, leaving the image
    /// ready to present.
    pub fn record(&self, surface: &Surface<'_>, cmd: vk::CommandBuffer, slot: usize) {
        let device = self.ctx.device();
        let image = surface.current_image();
        let mut barriers = BarrierBuilder::new();
        barriers
            .transition(image, color_range(1, 1), ACQUIRED, SyncScope::COLOR_ATTACHMENT)
            .build_and_run(device, cmd);

        let color = vk::RenderingAttachmentInfo::default()
            .image_view(surface.current_view())
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(clear_value(&self.config));
        let rendering = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: surface.extent(),
            })
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color));

        // SAFETY: cmd is recording and the view belongs to the acquired image.
        unsafe {
            device.cmd_begin_rendering(cmd, &rendering);
            // No depth attachment.
            device.cmd_set_depth_test_enable(cmd, false);
            device.cmd_set_depth_write_enable(cmd, false);
            self.ctx.shader_object().cmd_set_vertex_input(cmd, &[], &[]);
        }
        let shaders: Vec<_> = self.shaders.iter().collect();
        bind_shaders(self.ctx, cmd, &shaders);
        // SAFETY: the set was written at creation and its uniform buffer
        // belongs to this slot.
        unsafe {
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.layout.raw(),
                0,
                &[self.sets[slot]],
                &[],
            );
            device.cmd_draw(cmd, 3, 1, 0, 0);
            device.cmd_end_rendering(cmd);
        }

        barriers
            .transition(
                image,
                color_range(1, 1),
                SyncScope::COLOR_ATTACHMENT,
                SyncScope::PRESENT,
            )
            .build_and_run(device, cmd);
    }
}

fn load_texture<'ctx>(
    ctx: &'ctx Context,
    path: Option<&Path>,
    filter: SamplerFilter,
) -> Result<Textured<'ctx>> {
    let decoded = match path {
        Some(path) => DecodedImage::load(path)?,
        None => DecodedImage::from_rgba8(
            CHECKER_SIZE,
            CHECKER_SIZE,
            checkerboard(CHECKER_SIZE, CHECKER_CELL),
        ),
    };
    let extent = vk::Extent3D {
        width: decoded.width,
        height: decoded.height,
        depth: 1,
    };
    let mip_levels = mip_level_count(extent);
    let image = GpuImage::create(
        ctx,
        &ImageConfig {
            extent,
            usage: vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST,
            mip_levels,
            ..Default::default()
        },
    )?;

    if mip_levels > 1 {
        image.write(
            &decoded.pixels(),
            SyncScope::NONE,
            SyncScope::TRANSFER_SRC,
            color_range(1, 1),
        )?;
        image.generate_mipmaps(SyncScope::TRANSFER_SRC, SyncScope::FRAGMENT_SAMPLED)?;
    } else {
        image.write(
            &decoded.pixels(),
            SyncScope::NONE,
            SyncScope::FRAGMENT_SAMPLED,
            color_range(1, 1),
        )?;
    }

    let sampler = Sampler::create(
        ctx,
        &SamplerConfig {
            filter,
            mip_levels,
            ..Default::default()
        },
    )?;
    debug!("texture {}x{} with {mip_levels} mips", extent.width, extent.height);
    Ok(Textured { image, sampler })
}

fn load_cubemap<'ctx>(ctx: &'ctx Context, path: &Path) -> Result<Textured<'ctx>> {
    let image = GpuImage::create_cubemap(ctx, path)
        .with_context(|| format!("loading cubemap {}", path.display()))?;
    let sampler = Sampler::create(
        ctx,
        &SamplerConfig {
            edge_mode: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            ..Default::default()
        },
    )?;
    Ok(Textured { image, sampler })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn uniforms_match_the_std140_block() {
        assert_eq!(std::mem::size_of::<SceneUniforms>(), 80);
    }

    #[test]
    fn transform_compensates_for_wide_surfaces() {
        let p = scene_transform(2.0, 0.0) * Vec4::new(1.0, 1.0, 0.0, 1.0);
        assert!((p.x - 0.5).abs() < 1e-6);
        assert!((p.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn transform_rotates_counter_clockwise() {
        let p = scene_transform(1.0, std::f32::consts::FRAC_PI_2) * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert!(p.x.abs() < 1e-6);
        assert!((p.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_aspect_is_ignored() {
        assert_eq!(scene_transform(0.0, 0.0), Mat4::IDENTITY);
    }

    #[test]
    fn aspect_survives_zero_height() {
        let extent = vk::Extent2D {
            width: 1280,
            height: 0,
        };
        assert_eq!(aspect_of(extent), 1280.0);
    }

    #[test]
    fn configured_clear_color_reaches_the_attachment() {
        let config = DemoConfig {
            clear_color: [0.25, 0.5, 0.75, 1.0],
            ..DemoConfig::default()
        };
        // SAFETY: the value was built through the color member.
        let color = unsafe { clear_value(&config).color.float32 };
        assert_eq!(color, [0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn checkerboard_alternates_cells() {
        let texels = checkerboard(4, 2);
        assert_eq!(texels.len(), 4 * 4 * 4);
        let texel = |x: usize, y: usize| &texels[(y * 4 + x) * 4..][..4];
        assert_eq!(texel(0, 0), texel(1, 1));
        assert_ne!(texel(0, 0), texel(2, 0));
        assert_eq!(texel(0, 0), texel(2, 2));
        assert!(texels.chunks(4).all(|t| t[3] == 255));
    }

    #[test]
    fn demo_section_parses_with_defaults() {
        let config: DemoConfig =
            vielle_core::parse_config("spin_speed = 2.0\ntexture_filter = \"nearest\"").unwrap();
        assert_eq!(config.spin_speed, 2.0);
        assert_eq!(config.texture_filter, SamplerFilter::Nearest);
        assert_eq!(config.clear_color, DemoConfig::default().clear_color);
    }
}
