// SPDX-License-Identifier: CEPL-1.0
//! Samplers, descriptor pools, set layouts and descriptor writes.

use crate::context::Context;
use crate::error::{GpuError, Result};
use ash::vk;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerFilter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy)]
pub struct SamplerConfig {
    pub filter: SamplerFilter,
    pub edge_mode: vk::SamplerAddressMode,
    pub mip_levels: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            filter: SamplerFilter::Linear,
            edge_mode: vk::SamplerAddressMode::REPEAT,
            mip_levels: 1,
        }
    }
}

impl SamplerConfig {
    fn create_info(&self, max_anisotropy: f32) -> vk::SamplerCreateInfo<'static> {
        assert!(self.mip_levels >= 1, "samplers need at least one mip level");
        let (filter, mipmap_mode) = match self.filter {
            SamplerFilter::Nearest => (vk::Filter::NEAREST, vk::SamplerMipmapMode::NEAREST),
            SamplerFilter::Linear => (vk::Filter::LINEAR, vk::SamplerMipmapMode::LINEAR),
        };
        vk::SamplerCreateInfo {
            s_type: vk::StructureType::SAMPLER_CREATE_INFO,
            mag_filter: filter,
            min_filter: filter,
            mipmap_mode,
            address_mode_u: self.edge_mode,
            address_mode_v: self.edge_mode,
            address_mode_w: self.edge_mode,
            anisotropy_enable: vk::TRUE,
            max_anisotropy,
            max_lod: self.mip_levels as f32,
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
            ..Default::default()
        }
    }
}

pub struct Sampler<'ctx> {
    ctx: &'ctx Context,
    sampler: vk::Sampler,
}

impl<'ctx> Sampler<'ctx> {
    /// Anisotropy is always on, at the device maximum.
    pub fn create(ctx: &'ctx Context, config: &SamplerConfig) -> Result<Self> {
        let info = config.create_info(ctx.properties().limits.max_sampler_anisotropy);
        // SAFETY: info holds no pointers.
        let sampler = unsafe { ctx.device().create_sampler(&info, None) }
            .map_err(GpuError::CreateSampler)?;
        debug!("sampler {sampler:?}: {config:?}");
        Ok(Sampler { ctx, sampler })
    }

    pub fn raw(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler<'_> {
    fn drop(&mut self) {
        // SAFETY: owned handle, not referenced by pending work.
        unsafe { self.ctx.device().destroy_sampler(self.sampler, None) };
    }
}

pub struct DescriptorPool<'ctx> {
    ctx: &'ctx Context,
    pool: vk::DescriptorPool,
}

impl<'ctx> DescriptorPool<'ctx> {
    pub fn create(
        ctx: &'ctx Context,
        max_sets: u32,
        sizes: &[vk::DescriptorPoolSize],
    ) -> Result<Self> {
        assert!(max_sets >= 1, "descriptor pool needs room for a set");
        assert!(!sizes.is_empty(), "descriptor pool needs at least one size");
        let info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(sizes);
        // SAFETY: sizes outlives the call.
        let pool = unsafe { ctx.device().create_descriptor_pool(&info, None) }
            .map_err(GpuError::CreateDescriptorPool)?;
        Ok(DescriptorPool { ctx, pool })
    }

    pub fn raw(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// One set per layout, in order. Sets are freed with the pool.
    pub fn allocate_sets(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>> {
        assert!(!layouts.is_empty(), "no layouts to allocate sets for");
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);
        // SAFETY: pool and layouts belong to this device.
        unsafe { self.ctx.device().allocate_descriptor_sets(&info) }
            .map_err(GpuError::AllocateDescriptorSets)
    }

    pub fn allocate_set(&self, layout: vk::DescriptorSetLayout) -> Result<vk::DescriptorSet> {
        Ok(self.allocate_sets(&[layout])?[0])
    }
}

impl Drop for DescriptorPool<'_> {
    fn drop(&mut self) {
        // SAFETY: owned handle; its sets go with it.
        unsafe { self.ctx.device().destroy_descriptor_pool(self.pool, None) };
    }
}

pub struct DescriptorSetLayout<'ctx> {
    ctx: &'ctx Context,
    layout: vk::DescriptorSetLayout,
}

impl<'ctx> DescriptorSetLayout<'ctx> {
    /// `binding_flags` is either empty or one entry per binding.
    pub fn create(
        ctx: &'ctx Context,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
        binding_flags: &[vk::DescriptorBindingFlags],
    ) -> Result<Self> {
        assert!(!bindings.is_empty(), "descriptor set layout has no bindings");
        assert!(
            binding_flags.is_empty() || binding_flags.len() == bindings.len(),
            "{} binding flags for {} bindings",
            binding_flags.len(),
            bindings.len()
        );
        let mut flag_info =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(binding_flags);
        let mut info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        if !binding_flags.is_empty() {
            info = info.push_next(&mut flag_info);
        }
        // SAFETY: bindings and the flag chain outlive the call.
        let layout = unsafe { ctx.device().create_descriptor_set_layout(&info, None) }
            .map_err(GpuError::CreateDescriptorSetLayout)?;
        Ok(DescriptorSetLayout { ctx, layout })
    }

    pub fn raw(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout<'_> {
    fn drop(&mut self) {
        // SAFETY: owned handle.
        unsafe {
            self.ctx
                .device()
                .destroy_descriptor_set_layout(self.layout, None)
        };
    }
}

pub fn write_uniform_buffer_descriptor(
    ctx: &Context,
    set: vk::DescriptorSet,
    binding: u32,
    array_index: u32,
    buffer: vk::Buffer,
    size: vk::DeviceSize,
    offset: vk::DeviceSize,
) {
    assert!(size != 0, "uniform buffer range is empty");
    let buffer_info = vk::DescriptorBufferInfo {
        buffer,
        offset,
        range: size,
    };
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .dst_array_element(array_index)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .buffer_info(std::slice::from_ref(&buffer_info));
    // SAFETY: set and buffer belong to this device and are not in use.
    unsafe { ctx.device().update_descriptor_sets(&[write], &[]) };
}

/// The image is expected in SHADER_READ_ONLY_OPTIMAL when sampled.
pub fn write_image_sampler_descriptor(
    ctx: &Context,
    set: vk::DescriptorSet,
    binding: u32,
    array_index: u32,
    sampler: vk::Sampler,
    view: vk::ImageView,
) {
    let image_info = vk::DescriptorImageInfo {
        sampler,
        image_view: view,
        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    };
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .dst_array_element(array_index)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .image_info(std::slice::from_ref(&image_info));
    // SAFETY: set, sampler and view belong to this device and are not in use.
    unsafe { ctx.device().update_descriptor_sets(&[write], &[]) };
}
