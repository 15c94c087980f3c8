// SPDX-License-Identifier: CEPL-1.0
//! Device images, their staging variant and mip-chain generation.
//!
//! An image's synchronisation scope is never stored here. Every operation that
//! touches the image takes the scope the caller left it in and the scope it
//! should end up in.

use crate::barrier::{BarrierBuilder, SyncScope};
use crate::buffer::{GpuBuffer, MemoryTier};
use crate::context::Context;
use crate::error::{GpuError, Result};
use ash::vk;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct ImageConfig {
    pub extent: vk::Extent3D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    pub samples: vk::SampleCountFlags,
    pub mip_levels: u32,
    /// Scope the image is transitioned into right after creation.
    /// `SyncScope::NONE` leaves it UNDEFINED.
    pub initial: SyncScope,
}

impl Default for ImageConfig {
    fn default() -> Self {
        ImageConfig {
            extent: vk::Extent3D {
                width: 1,
                height: 1,
                depth: 1,
            },
            format: vk::Format::R8G8B8A8_SRGB,
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            aspect: vk::ImageAspectFlags::COLOR,
            samples: vk::SampleCountFlags::TYPE_1,
            mip_levels: 1,
            initial: SyncScope::NONE,
        }
    }
}

impl ImageConfig {
    fn validate(&self) {
        let vk::Extent3D {
            width,
            height,
            depth,
        } = self.extent;
        assert!(
            width > 0 && height > 0 && depth > 0,
            "image extent {width}x{height}x{depth} has a zero dimension"
        );
        assert!(self.format != vk::Format::UNDEFINED, "image format is UNDEFINED");
        assert!(!self.usage.is_empty(), "image usage is empty");
        assert!(!self.aspect.is_empty(), "image aspect is empty");
        assert!(!self.samples.is_empty(), "image sample count is empty");
        assert!(
            (1..=mip_level_count(self.extent)).contains(&self.mip_levels),
            "{} mip levels requested for a {width}x{height}x{depth} image",
            self.mip_levels
        );
    }
}

/// Tightly packed texels ready for upload.
#[derive(Debug, Clone, Copy)]
pub struct PixelData<'a> {
    pub bytes: &'a [u8],
    pub texel_size: u32,
    pub extent: vk::Extent3D,
}

impl<'a> PixelData<'a> {
    pub fn rgba8(bytes: &'a [u8], width: u32, height: u32) -> Self {
        PixelData {
            bytes,
            texel_size: 4,
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
        }
    }

    pub fn byte_len(&self) -> usize {
        let vk::Extent3D {
            width,
            height,
            depth,
        } = self.extent;
        width as usize * height as usize * depth as usize * self.texel_size as usize
    }
}

/// 3D if depth > 1, else 2D if height > 1, else 1D.
pub fn image_type_for(extent: vk::Extent3D) -> vk::ImageType {
    if extent.depth > 1 {
        vk::ImageType::TYPE_3D
    } else if extent.height > 1 {
        vk::ImageType::TYPE_2D
    } else {
        vk::ImageType::TYPE_1D
    }
}

pub fn view_type_for(extent: vk::Extent3D) -> vk::ImageViewType {
    match image_type_for(extent) {
        vk::ImageType::TYPE_3D => vk::ImageViewType::TYPE_3D,
        vk::ImageType::TYPE_2D => vk::ImageViewType::TYPE_2D,
        _ => vk::ImageViewType::TYPE_1D,
    }
}

/// Length of the full mip chain: `floor(log2(largest dimension)) + 1`.
pub fn mip_level_count(extent: vk::Extent3D) -> u32 {
    let largest = extent.width.max(extent.height).max(extent.depth);
    assert!(largest > 0, "zero-sized extent has no mip chain");
    u32::BITS - largest.leading_zeros()
}

/// Extent of each of the first `levels` mips. Every axis halves on its own
/// and stops at 1.
pub fn mip_extents(extent: vk::Extent3D, levels: u32) -> Vec<vk::Extent3D> {
    std::iter::successors(Some(extent), |e| {
        Some(vk::Extent3D {
            width: (e.width / 2).max(1),
            height: (e.height / 2).max(1),
            depth: (e.depth / 2).max(1),
        })
    })
    .take(levels as usize)
    .collect()
}

pub(crate) fn subresource_range(
    aspect: vk::ImageAspectFlags,
    levels: u32,
    layers: u32,
) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: levels,
        base_array_layer: 0,
        layer_count: layers,
    }
}

fn far_corner(extent: vk::Extent3D) -> vk::Offset3D {
    vk::Offset3D {
        x: extent.width as i32,
        y: extent.height as i32,
        z: extent.depth as i32,
    }
}

/// An image plus its memory; the part staging and sampled images share.
struct AllocatedImage<'ctx> {
    ctx: &'ctx Context,
    image: vk::Image,
    allocation: Option<Allocation>,
}

impl<'ctx> AllocatedImage<'ctx> {
    fn create(ctx: &'ctx Context, info: &vk::ImageCreateInfo<'_>) -> Result<Self> {
        let device = ctx.device();
        // SAFETY: info carries no dangling pointers.
        let image = unsafe { device.create_image(info, None) }.map_err(GpuError::CreateImage)?;
        // SAFETY: image was just created from this device.
        let requirements = unsafe { device.get_image_memory_requirements(image) };

        let linear = info.tiling == vk::ImageTiling::LINEAR;
        let allocation = match ctx.allocate("image", requirements, MemoryLocation::GpuOnly, linear)
        {
            Ok(allocation) => allocation,
            Err(e) => {
                // SAFETY: image has no memory bound and no users.
                unsafe { device.destroy_image(image, None) };
                return Err(GpuError::AllocateMemory(e));
            }
        };
        // SAFETY: allocation came from this device's allocator.
        let bound =
            unsafe { device.bind_image_memory(image, allocation.memory(), allocation.offset()) };
        if let Err(e) = bound {
            ctx.free(allocation);
            // SAFETY: as above.
            unsafe { device.destroy_image(image, None) };
            return Err(GpuError::BindMemory(e));
        }

        Ok(AllocatedImage {
            ctx,
            image,
            allocation: Some(allocation),
        })
    }
}

impl Drop for AllocatedImage<'_> {
    fn drop(&mut self) {
        // SAFETY: the image is owned here and no submission still uses it.
        unsafe { self.ctx.device().destroy_image(self.image, None) };
        if let Some(allocation) = self.allocation.take() {
            self.ctx.free(allocation);
        }
    }
}

fn image_create_info(
    config: &ImageConfig,
    flags: vk::ImageCreateFlags,
    layers: u32,
) -> vk::ImageCreateInfo<'static> {
    vk::ImageCreateInfo {
        s_type: vk::StructureType::IMAGE_CREATE_INFO,
        flags,
        image_type: image_type_for(config.extent),
        format: config.format,
        extent: config.extent,
        mip_levels: config.mip_levels,
        array_layers: layers,
        samples: config.samples,
        tiling: vk::ImageTiling::OPTIMAL,
        usage: config.usage,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        ..Default::default()
    }
}

/// Uploads `pixels` into one mip/layer of `image` through a staging buffer.
/// The barrier into TRANSFER_DST, the copy and the barrier into `target` share
/// one single-time submission.
fn write_pixels(
    ctx: &Context,
    image: vk::Image,
    image_extent: vk::Extent3D,
    pixels: &PixelData<'_>,
    current: SyncScope,
    target: SyncScope,
    range: vk::ImageSubresourceRange,
) -> Result<()> {
    assert!(pixels.texel_size > 0, "texel size is zero");
    assert_eq!(
        pixels.bytes.len(),
        pixels.byte_len(),
        "pixel buffer does not match its extent"
    );
    assert!(
        pixels.extent.width <= image_extent.width
            && pixels.extent.height <= image_extent.height
            && pixels.extent.depth <= image_extent.depth,
        "pixel extent {:?} exceeds image extent {:?}",
        pixels.extent,
        image_extent
    );

    let staging = GpuBuffer::create(
        ctx,
        pixels.byte_len() as vk::DeviceSize,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryTier::Staging,
    )?;
    staging.write(pixels.bytes, 0)?;

    let region = vk::BufferImageCopy2::default()
        .image_subresource(vk::ImageSubresourceLayers {
            aspect_mask: range.aspect_mask,
            mip_level: range.base_mip_level,
            base_array_layer: range.base_array_layer,
            layer_count: 1,
        })
        .image_extent(pixels.extent);
    let src = staging.raw();

    ctx.submit_single_time(|device, cmd| {
        let mut barriers = BarrierBuilder::new();
        barriers
            .transition(image, range, current, SyncScope::TRANSFER_DST)
            .build_and_run(device, cmd);

        let copy = vk::CopyBufferToImageInfo2::default()
            .src_buffer(src)
            .dst_image(image)
            .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .regions(std::slice::from_ref(&region));
        // SAFETY: staging and image outlive the blocking submission.
        unsafe { device.cmd_copy_buffer_to_image2(cmd, &copy) };

        barriers
            .transition(image, range, SyncScope::TRANSFER_DST, target)
            .build_and_run(device, cmd);
    })
}

/// A device image without a view. Only used as a transfer source or target.
pub struct StagingImage<'ctx> {
    inner: AllocatedImage<'ctx>,
    extent: vk::Extent3D,
    format: vk::Format,
}

impl<'ctx> StagingImage<'ctx> {
    pub fn create(ctx: &'ctx Context, config: &ImageConfig) -> Result<Self> {
        config.validate();
        let inner = AllocatedImage::create(ctx, &image_create_info(config, Default::default(), 1))?;
        debug!(
            "staging image {:?}: {}x{} {:?}",
            inner.image, config.extent.width, config.extent.height, config.format
        );
        Ok(StagingImage {
            inner,
            extent: config.extent,
            format: config.format,
        })
    }

    pub fn raw(&self) -> vk::Image {
        self.inner.image
    }

    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn write(
        &self,
        pixels: &PixelData<'_>,
        current: SyncScope,
        target: SyncScope,
        range: vk::ImageSubresourceRange,
    ) -> Result<()> {
        write_pixels(
            self.inner.ctx,
            self.inner.image,
            self.extent,
            pixels,
            current,
            target,
            range,
        )
    }
}

/// A device image with a view matching its dimensionality (or a cube view
/// for cubemaps).
pub struct GpuImage<'ctx> {
    inner: AllocatedImage<'ctx>,
    view: vk::ImageView,
    extent: vk::Extent3D,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    mip_levels: u32,
    layers: u32,
}

impl std::fmt::Debug for GpuImage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuImage")
            .field("image", &self.inner.image)
            .field("view", &self.view)
            .field("extent", &self.extent)
            .field("format", &self.format)
            .field("mip_levels", &self.mip_levels)
            .field("layers", &self.layers)
            .finish()
    }
}

impl<'ctx> GpuImage<'ctx> {
    pub fn create(ctx: &'ctx Context, config: &ImageConfig) -> Result<Self> {
        Self::create_layered(
            ctx,
            config,
            vk::ImageCreateFlags::empty(),
            1,
            view_type_for(config.extent),
        )
    }

    pub(crate) fn create_layered(
        ctx: &'ctx Context,
        config: &ImageConfig,
        flags: vk::ImageCreateFlags,
        layers: u32,
        view_type: vk::ImageViewType,
    ) -> Result<Self> {
        config.validate();
        assert!(layers > 0, "image needs at least one layer");
        let inner = AllocatedImage::create(ctx, &image_create_info(config, flags, layers))?;
        let range = subresource_range(config.aspect, config.mip_levels, layers);

        let view_info = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image: inner.image,
            view_type,
            format: config.format,
            subresource_range: range,
            ..Default::default()
        };
        // SAFETY: the image is live and the view matches its create info.
        let view = unsafe { ctx.device().create_image_view(&view_info, None) }
            .map_err(GpuError::CreateImageView)?;

        let image = GpuImage {
            inner,
            view,
            extent: config.extent,
            format: config.format,
            aspect: config.aspect,
            mip_levels: config.mip_levels,
            layers,
        };

        if config.initial.layout != vk::ImageLayout::UNDEFINED {
            let raw = image.raw();
            let initial = config.initial;
            ctx.submit_single_time(|device, cmd| {
                BarrierBuilder::new()
                    .transition(raw, range, SyncScope::NONE, initial)
                    .build_and_run(device, cmd);
            })?;
        }

        debug!(
            "image {:?}: {}x{}x{} {:?}, {} mips, {} layers, {:?}",
            image.raw(),
            config.extent.width,
            config.extent.height,
            config.extent.depth,
            config.format,
            config.mip_levels,
            layers,
            view_type
        );
        Ok(image)
    }

    pub fn raw(&self) -> vk::Image {
        self.inner.image
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn layers(&self) -> u32 {
        self.layers
    }

    /// Every mip and layer of the image.
    pub fn full_range(&self) -> vk::ImageSubresourceRange {
        subresource_range(self.aspect, self.mip_levels, self.layers)
    }

    /// Uploads `pixels` into the first mip and layer of `range`, moving the
    /// range from `current` to `target`.
    pub fn write(
        &self,
        pixels: &PixelData<'_>,
        current: SyncScope,
        target: SyncScope,
        range: vk::ImageSubresourceRange,
    ) -> Result<()> {
        write_pixels(
            self.inner.ctx,
            self.inner.image,
            self.extent,
            pixels,
            current,
            target,
            range,
        )
    }

    /// Copies one mip level of one layer into `dst` at offset 0, tightly
    /// packed, and makes it visible to host reads. The image moves from
    /// `current` through TRANSFER_SRC to `target` and `current` must describe
    /// the whole image.
    pub fn copy_to_buffer(
        &self,
        dst: &GpuBuffer<'_>,
        level: u32,
        layer: u32,
        current: SyncScope,
        target: SyncScope,
    ) -> Result<()> {
        assert!(
            level < self.mip_levels && layer < self.layers,
            "level {level} layer {layer} outside a {}-level {}-layer image",
            self.mip_levels,
            self.layers
        );
        let extent = mip_extents(self.extent, level + 1)[level as usize];
        let region = vk::BufferImageCopy2::default()
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: self.aspect,
                mip_level: level,
                base_array_layer: layer,
                layer_count: 1,
            })
            .image_extent(extent);
        let (image, buffer, range) = (self.raw(), dst.raw(), self.full_range());

        self.inner.ctx.submit_single_time(|device, cmd| {
            let mut barriers = BarrierBuilder::new();
            barriers
                .transition(image, range, current, SyncScope::TRANSFER_SRC)
                .build_and_run(device, cmd);

            let copy = vk::CopyImageToBufferInfo2::default()
                .src_image(image)
                .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                .dst_buffer(buffer)
                .regions(std::slice::from_ref(&region));
            // SAFETY: image and buffer outlive the blocking submission.
            unsafe { device.cmd_copy_image_to_buffer2(cmd, &copy) };

            barriers
                .add_memory_barrier(SyncScope::TRANSFER_DST, SyncScope::HOST_READ)
                .transition(image, range, SyncScope::TRANSFER_SRC, target)
                .build_and_run(device, cmd);
        })
    }

    /// Fills mips 1.. by repeated linear blits from the level above. Level 0
    /// must hold the source texels and be in `current`; every level ends in
    /// `target`.
    pub fn generate_mipmaps(&self, current: SyncScope, target: SyncScope) -> Result<()> {
        assert!(self.mip_levels > 1, "image has no mips to generate");
        let ctx = self.inner.ctx;
        let features = ctx.format_properties(self.format).optimal_tiling_features;
        if !features.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR) {
            return Err(GpuError::MipmapsUnsupported(self.format));
        }

        let image = self.raw();
        let (aspect, layers) = (self.aspect, self.layers);
        let extents = mip_extents(self.extent, self.mip_levels);
        let level_range = |level: u32| vk::ImageSubresourceRange {
            base_mip_level: level,
            level_count: 1,
            ..subresource_range(aspect, 1, layers)
        };
        let level_layers = |level: u32| vk::ImageSubresourceLayers {
            aspect_mask: aspect,
            mip_level: level,
            base_array_layer: 0,
            layer_count: layers,
        };

        ctx.submit_single_time(|device, cmd| {
            let mut barriers = BarrierBuilder::new();
            barriers
                .transition(image, level_range(0), current, SyncScope::TRANSFER_SRC)
                .build_and_run(device, cmd);

            for (level, pair) in (0u32..).zip(extents.windows(2)) {
                let next = level + 1;
                barriers
                    .transition(image, level_range(next), SyncScope::NONE, SyncScope::TRANSFER_DST)
                    .build_and_run(device, cmd);

                let region = vk::ImageBlit2::default()
                    .src_subresource(level_layers(level))
                    .src_offsets([vk::Offset3D::default(), far_corner(pair[0])])
                    .dst_subresource(level_layers(next))
                    .dst_offsets([vk::Offset3D::default(), far_corner(pair[1])]);
                let blit = vk::BlitImageInfo2::default()
                    .src_image(image)
                    .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                    .dst_image(image)
                    .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .regions(std::slice::from_ref(&region))
                    .filter(vk::Filter::LINEAR);
                // SAFETY: source and destination levels are distinct and in
                // the layouts named above.
                unsafe { device.cmd_blit_image2(cmd, &blit) };

                barriers
                    .transition(
                        image,
                        level_range(next),
                        SyncScope::TRANSFER_DST,
                        SyncScope::TRANSFER_SRC,
                    )
                    .build_and_run(device, cmd);
            }

            barriers
                .transition(
                    image,
                    subresource_range(aspect, extents.len() as u32, layers),
                    SyncScope::TRANSFER_SRC,
                    target,
                )
                .build_and_run(device, cmd);
        })
    }
}

impl Drop for GpuImage<'_> {
    fn drop(&mut self) {
        // SAFETY: the view is owned here; the image itself is released after
        // this by `inner`.
        unsafe {
            self.inner
                .ctx
                .device()
                .destroy_image_view(self.view, None)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32, depth: u32) -> vk::Extent3D {
        vk::Extent3D {
            width,
            height,
            depth,
        }
    }

    #[test]
    fn dimensionality_follows_extent() {
        assert_eq!(image_type_for(extent(4, 4, 4)), vk::ImageType::TYPE_3D);
        assert_eq!(image_type_for(extent(4, 4, 1)), vk::ImageType::TYPE_2D);
        assert_eq!(image_type_for(extent(4, 1, 1)), vk::ImageType::TYPE_1D);
        assert_eq!(view_type_for(extent(1, 1, 2)), vk::ImageViewType::TYPE_3D);
        assert_eq!(view_type_for(extent(1, 2, 1)), vk::ImageViewType::TYPE_2D);
        assert_eq!(view_type_for(extent(1, 1, 1)), vk::ImageViewType::TYPE_1D);
    }

    #[test]
    fn mip_count_is_log2_of_largest_axis_plus_one() {
        assert_eq!(mip_level_count(extent(1, 1, 1)), 1);
        assert_eq!(mip_level_count(extent(17, 5, 1)), 5);
        assert_eq!(mip_level_count(extent(256, 256, 1)), 9);
        assert_eq!(mip_level_count(extent(300, 2, 1)), 9);
    }

    #[test]
    fn mip_axes_halve_independently_and_stop_at_one() {
        let chain = mip_extents(extent(17, 5, 1), 6);
        let widths: Vec<u32> = chain.iter().map(|e| e.width).collect();
        let heights: Vec<u32> = chain.iter().map(|e| e.height).collect();
        assert_eq!(widths, [17, 8, 4, 2, 1, 1]);
        assert_eq!(heights, [5, 2, 1, 1, 1, 1]);
        assert!(chain.iter().all(|e| e.width > 0 && e.height > 0 && e.depth > 0));
    }

    #[test]
    fn mip_extents_honours_requested_length() {
        assert_eq!(mip_extents(extent(8, 8, 1), 1), [extent(8, 8, 1)]);
        assert_eq!(mip_extents(extent(8, 8, 1), 3).last(), Some(&extent(2, 2, 1)));
    }

    #[test]
    fn rgba8_pixel_size() {
        let bytes = [0u8; 4 * 3 * 2];
        let pixels = PixelData::rgba8(&bytes, 3, 2);
        assert_eq!(pixels.byte_len(), bytes.len());
        assert_eq!(pixels.extent.depth, 1);
    }

    #[test]
    fn default_config_is_valid() {
        ImageConfig::default().validate();
    }

    #[test]
    #[should_panic(expected = "mip levels requested")]
    fn too_many_mips_rejected() {
        ImageConfig {
            extent: extent(4, 4, 1),
            mip_levels: 4,
            ..Default::default()
        }
        .validate();
    }

    #[test]
    #[should_panic(expected = "zero dimension")]
    fn zero_extent_rejected() {
        ImageConfig {
            extent: extent(4, 0, 1),
            ..Default::default()
        }
        .validate();
    }
}
