// SPDX-License-Identifier: CEPL-1.0
//! Cubemaps assembled from a single 4x3 cross layout:
//!
//! ```text
//!        +Y
//!   -X   +Z   +X   -Z
//!        -Y
//! ```

use crate::barrier::{color_range, BarrierBuilder, SyncScope};
use crate::context::Context;
use crate::decode::DecodedImage;
use crate::error::{GpuError, Result};
use crate::image::{GpuImage, ImageConfig, PixelData, StagingImage};
use ash::vk;
use std::path::Path;
use tracing::info;

pub const CUBE_FACES: u32 = 6;

/// Cross cell (column, row) for each array layer, in Vulkan face order
/// +X, -X, +Y, -Y, +Z, -Z.
const FACE_CELLS: [(u32, u32); CUBE_FACES as usize] =
    [(2, 1), (0, 1), (1, 0), (1, 2), (1, 1), (3, 1)];

/// Face size and the texel offset of each face in a `width` x `height` cross.
pub fn cross_face_offsets(
    width: u32,
    height: u32,
) -> Result<(vk::Extent2D, [vk::Offset2D; CUBE_FACES as usize])> {
    if width == 0 || width % 4 != 0 || height % 3 != 0 || width / 4 != height / 3 {
        return Err(GpuError::InvalidCrossLayout { width, height });
    }
    let cell = width / 4;
    let offsets = FACE_CELLS.map(|(col, row)| vk::Offset2D {
        x: (col * cell) as i32,
        y: (row * cell) as i32,
    });
    Ok((
        vk::Extent2D {
            width: cell,
            height: cell,
        },
        offsets,
    ))
}

impl<'ctx> GpuImage<'ctx> {
    /// Decodes a cross-layout file and builds a sampled cubemap from it.
    pub fn create_cubemap(ctx: &'ctx Context, path: impl AsRef<Path>) -> Result<Self> {
        let decoded = DecodedImage::load(path)?;
        Self::create_cubemap_from_pixels(ctx, &decoded.pixels())
    }

    /// Builds an R8G8B8A8_SRGB cubemap from RGBA8 cross-layout texels. The
    /// result is left in `SyncScope::FRAGMENT_SAMPLED`.
    pub fn create_cubemap_from_pixels(ctx: &'ctx Context, cross: &PixelData<'_>) -> Result<Self> {
        assert_eq!(cross.texel_size, 4, "cross layout must be RGBA8");
        let (face, offsets) = cross_face_offsets(cross.extent.width, cross.extent.height)?;

        let staging = StagingImage::create(
            ctx,
            &ImageConfig {
                extent: cross.extent,
                format: vk::Format::R8G8B8A8_SRGB,
                usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::TRANSFER_SRC,
                ..Default::default()
            },
        )?;
        staging.write(
            cross,
            SyncScope::NONE,
            SyncScope::TRANSFER_SRC,
            color_range(1, 1),
        )?;

        let face_extent = vk::Extent3D {
            width: face.width,
            height: face.height,
            depth: 1,
        };
        let cube = GpuImage::create_layered(
            ctx,
            &ImageConfig {
                extent: face_extent,
                format: vk::Format::R8G8B8A8_SRGB,
                usage: vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::SAMPLED,
                ..Default::default()
            },
            vk::ImageCreateFlags::CUBE_COMPATIBLE,
            CUBE_FACES,
            vk::ImageViewType::CUBE,
        )?;

        let color_layer = |layer: u32| vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: layer,
            layer_count: 1,
        };
        let regions: Vec<vk::ImageCopy2> = (0u32..)
            .zip(offsets)
            .map(|(layer, offset)| {
                vk::ImageCopy2::default()
                    .src_subresource(color_layer(0))
                    .src_offset(vk::Offset3D {
                        x: offset.x,
                        y: offset.y,
                        z: 0,
                    })
                    .dst_subresource(color_layer(layer))
                    .extent(face_extent)
            })
            .collect();

        let (src, dst) = (staging.raw(), cube.raw());
        let faces = color_range(1, CUBE_FACES);
        ctx.submit_single_time(|device, cmd| {
            let mut barriers = BarrierBuilder::new();
            barriers
                .transition(dst, faces, SyncScope::NONE, SyncScope::TRANSFER_DST)
                .build_and_run(device, cmd);

            let copy = vk::CopyImageInfo2::default()
                .src_image(src)
                .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                .dst_image(dst)
                .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .regions(&regions);
            // SAFETY: both images outlive the blocking submission.
            unsafe { device.cmd_copy_image2(cmd, &copy) };

            barriers
                .transition(dst, faces, SyncScope::TRANSFER_DST, SyncScope::FRAGMENT_SAMPLED)
                .build_and_run(device, cmd);
        })?;

        info!(
            "cubemap {}x{} from {}x{} cross",
            face.width, face.height, cross.extent.width, cross.extent.height
        );
        Ok(cube)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faces_are_cell_sized_and_follow_the_cross() {
        let (face, offsets) = cross_face_offsets(64, 48).unwrap();
        assert_eq!((face.width, face.height), (16, 16));
        let cells: Vec<(i32, i32)> = offsets.iter().map(|o| (o.x, o.y)).collect();
        assert_eq!(
            cells,
            [(32, 16), (0, 16), (16, 0), (16, 32), (16, 16), (48, 16)]
        );
    }

    #[test]
    fn first_layer_is_the_right_hand_cell() {
        let (face, offsets) = cross_face_offsets(4, 3).unwrap();
        assert_eq!(face.width, 1);
        assert_eq!((offsets[0].x, offsets[0].y), (2, 1));
    }

    #[test]
    fn non_cross_layouts_rejected() {
        for (w, h) in [(0, 0), (64, 64), (65, 48), (64, 45), (128, 48)] {
            assert!(
                matches!(
                    cross_face_offsets(w, h),
                    Err(GpuError::InvalidCrossLayout { width, height }) if (width, height) == (w, h)
                ),
                "{w}x{h} should be rejected"
            );
        }
    }
}
