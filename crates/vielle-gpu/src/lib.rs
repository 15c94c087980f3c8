// SPDX-License-Identifier: CEPL-1.0
//! GPU resources and frame synchronisation on Vulkan 1.3.
//!
//! A [`Context`] owns the device. Buffers, images, surfaces and the other
//! wrappers borrow it and release their Vulkan objects when dropped, so none
//! of them can outlive the device they were made from.
#![deny(unsafe_op_in_unsafe_fn)]

pub mod barrier;
pub mod buffer;
pub mod config;
pub mod context;
pub mod cubemap;
pub mod decode;
pub mod descriptor;
pub mod error;
pub mod frame;
pub mod image;
pub mod shader;
pub mod single_time;
pub mod surface;

pub use ash::vk;
pub use barrier::{color_range, BarrierBuilder, SyncScope};
pub use buffer::{GpuBuffer, MemoryTier};
pub use config::{ContextConfig, PresentPolicy, SurfaceConfig, MAX_FRAMES_IN_FLIGHT};
pub use context::Context;
pub use cubemap::cross_face_offsets;
pub use decode::DecodedImage;
pub use descriptor::{
    write_image_sampler_descriptor, write_uniform_buffer_descriptor, DescriptorPool,
    DescriptorSetLayout, Sampler, SamplerConfig, SamplerFilter,
};
pub use error::{GpuError, Result};
pub use frame::{FramePacer, FrameState, FrameStatus};
pub use image::{mip_extents, mip_level_count, GpuImage, ImageConfig, PixelData, StagingImage};
pub use shader::{bind_shaders, read_shader, PipelineLayout, ShaderConfig, ShaderObject};
pub use single_time::SingleTimeCommands;
pub use surface::Surface;
