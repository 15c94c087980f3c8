// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use gpu_allocator::AllocationError;
use std::{io, path::PathBuf};
use thiserror::Error;

pub type Result<T, E = GpuError> = std::result::Result<T, E>;

/// Environment and API failures. Caller bugs are assertions, not variants.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("a device context is already live in this slot")]
    AlreadyInitialized,

    #[error("could not create Vulkan instance: {0}")]
    CreateInstance(vk::Result),
    #[error("required instance extensions are unavailable")]
    InstanceExtensionsUnavailable,
    #[error("could not create debug messenger: {0}")]
    CreateDebugMessenger(vk::Result),
    #[error("could not enumerate physical devices: {0}")]
    EnumerateDevices(vk::Result),
    #[error("no GPU offers the required features and extensions")]
    NoSuitableDevice,
    #[error("no queue family supports both graphics and compute")]
    NoSuitableQueueFamily,
    #[error("could not create logical device: {0}")]
    CreateDevice(vk::Result),
    #[error("could not create memory allocator: {0}")]
    CreateAllocator(AllocationError),
    #[error("could not create command pool: {0}")]
    CreateCommandPool(vk::Result),
    #[error("could not wait for device idle: {0}")]
    WaitIdle(vk::Result),

    #[error("could not obtain a native window handle: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),
    #[error("could not create surface: {0}")]
    CreateSurface(vk::Result),
    #[error("the chosen queue family cannot present to this surface")]
    SurfaceUnsupported,
    #[error("could not query surface: {0}")]
    SurfaceQuery(vk::Result),
    #[error("surface has zero area ({width}x{height})")]
    InvalidSurfaceSize { width: u32, height: u32 },
    #[error("could not create swapchain: {0}")]
    CreateSwapchain(vk::Result),
    #[error("could not get swapchain images: {0}")]
    SwapchainImages(vk::Result),
    #[error("swapchain has {0} images, at most 8 are supported")]
    TooManySwapchainImages(usize),
    #[error("could not create image view: {0}")]
    CreateImageView(vk::Result),
    #[error("could not create fence: {0}")]
    CreateFence(vk::Result),
    #[error("could not create semaphore: {0}")]
    CreateSemaphore(vk::Result),
    #[error("could not allocate command buffers: {0}")]
    AllocateCommandBuffers(vk::Result),

    #[error("could not wait for fence: {0}")]
    WaitForFence(vk::Result),
    #[error("frame fence was not signaled within {0} ms")]
    FrameTimeout(u64),
    #[error("could not reset fence: {0}")]
    ResetFence(vk::Result),
    #[error("could not acquire swapchain image: {0}")]
    AcquireImage(vk::Result),
    #[error("could not begin command buffer: {0}")]
    BeginCommandBuffer(vk::Result),
    #[error("could not end command buffer: {0}")]
    EndCommandBuffer(vk::Result),
    #[error("could not submit to queue: {0}")]
    SubmitQueue(vk::Result),
    #[error("could not wait for queue: {0}")]
    WaitQueue(vk::Result),
    #[error("could not present: {0}")]
    Present(vk::Result),

    #[error("could not create buffer: {0}")]
    CreateBuffer(vk::Result),
    #[error("could not allocate GPU memory: {0}")]
    AllocateMemory(AllocationError),
    #[error("could not bind GPU memory: {0}")]
    BindMemory(vk::Result),
    #[error("buffer memory is not host mapped")]
    BufferNotMapped,

    #[error("could not create image: {0}")]
    CreateImage(vk::Result),
    #[error("format {0:?} does not support linear blits, cannot build mipmaps")]
    MipmapsUnsupported(vk::Format),
    #[error("{width}x{height} is not a 4x3 cross of square cells")]
    InvalidCrossLayout { width: u32, height: u32 },
    #[error("could not decode {}: {source}", path.display())]
    DecodeImage {
        path: PathBuf,
        #[source]
        source: ::image::ImageError,
    },

    #[error("could not create sampler: {0}")]
    CreateSampler(vk::Result),
    #[error("could not create descriptor pool: {0}")]
    CreateDescriptorPool(vk::Result),
    #[error("could not create descriptor set layout: {0}")]
    CreateDescriptorSetLayout(vk::Result),
    #[error("could not allocate descriptor sets: {0}")]
    AllocateDescriptorSets(vk::Result),
    #[error("could not create pipeline layout: {0}")]
    CreatePipelineLayout(vk::Result),

    #[error("shader file {} not found: {source}", path.display())]
    ShaderFileNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("shader file {} is not valid SPIR-V", path.display())]
    ShaderFileInvalid { path: PathBuf },
    #[error("could not create shader objects: {0}")]
    CreateShader(vk::Result),
}
