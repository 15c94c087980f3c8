// SPDX-License-Identifier: CEPL-1.0
//! The presentation surface: swapchain, per-slot synchronisation and the
//! frame loop around them.
//!
//! Per frame slot there is a command buffer, a "frame finished" fence and an
//! "image available" semaphore. "Ready to present" semaphores belong to
//! swapchain images instead, since presentation of an image may still hold
//! one after its slot came round again.

use crate::config::{choose_present_mode, present_mode_name, PresentPolicy, SurfaceConfig};
use crate::context::Context;
use crate::error::{GpuError, Result};
use crate::frame::{FramePacer, FrameStatus};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info, warn};

pub const MAX_SWAPCHAIN_IMAGES: usize = 8;

/// Image count to request: one above the minimum, capped by the maximum
/// (0 means unbounded, in which case at least 3).
pub fn swapchain_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        wanted.max(3)
    } else {
        wanted.min(caps.max_image_count)
    }
}

/// The surface's current extent, or `hint` clamped to the allowed range when
/// the surface leaves it to the swapchain. Zero area is an error.
pub fn resolve_extent(caps: &vk::SurfaceCapabilitiesKHR, hint: vk::Extent2D) -> Result<vk::Extent2D> {
    let extent = if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: hint
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: hint
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    };
    if extent.width == 0 || extent.height == 0 {
        return Err(GpuError::InvalidSurfaceSize {
            width: extent.width,
            height: extent.height,
        });
    }
    Ok(extent)
}

/// Fails when a swapchain came back with more images than a surface tracks.
pub fn check_image_count(count: usize) -> Result<()> {
    if count > MAX_SWAPCHAIN_IMAGES {
        return Err(GpuError::TooManySwapchainImages(count));
    }
    Ok(())
}

/// Everything a swapchain build needs from the surface queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainPlan {
    pub extent: vk::Extent2D,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub image_count: u32,
    pub transform: vk::SurfaceTransformFlagsKHR,
}

/// Picks extent, format, present mode and image count. A zero-area `hint` or
/// surface fails with [`GpuError::InvalidSurfaceSize`].
pub fn plan_swapchain(
    caps: &vk::SurfaceCapabilitiesKHR,
    formats: &[vk::SurfaceFormatKHR],
    modes: &[vk::PresentModeKHR],
    policy: PresentPolicy,
    hint: vk::Extent2D,
) -> Result<SwapchainPlan> {
    if hint.width == 0 || hint.height == 0 {
        return Err(GpuError::InvalidSurfaceSize {
            width: hint.width,
            height: hint.height,
        });
    }
    let extent = resolve_extent(caps, hint)?;
    let format = choose_surface_format(formats).ok_or(GpuError::SurfaceUnsupported)?;
    let present_mode = choose_present_mode(modes, policy);
    if present_mode == vk::PresentModeKHR::FIFO && policy != PresentPolicy::Fifo {
        warn!("{policy:?} present mode unavailable, falling back to FIFO");
    }
    Ok(SwapchainPlan {
        extent,
        format,
        present_mode,
        image_count: swapchain_image_count(caps),
        transform: caps.current_transform,
    })
}

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    [vk::Format::B8G8R8A8_SRGB, vk::Format::R8G8B8A8_SRGB]
        .iter()
        .find_map(|&wanted| {
            formats.iter().copied().find(|f| {
                f.format == wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
        })
        .or_else(|| formats.first().copied())
}

struct FrameSync {
    cmd: vk::CommandBuffer,
    finished: vk::Fence,
    image_available: vk::Semaphore,
}

pub struct Surface<'ctx> {
    ctx: &'ctx Context,
    surface: vk::SurfaceKHR,
    config: SurfaceConfig,

    swapchain: vk::SwapchainKHR,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    ready_to_present: Vec<vk::Semaphore>,

    commands: Vec<vk::CommandBuffer>,
    frames: Vec<FrameSync>,
    pacer: FramePacer,
    image_index: u32,
    stale: bool,
}

impl<'ctx> Surface<'ctx> {
    /// Creates a surface for `window`, builds the first swapchain at `size`
    /// and the per-slot command buffers, fences and semaphores.
    pub fn create(
        ctx: &'ctx Context,
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: vk::Extent2D,
        config: SurfaceConfig,
    ) -> Result<Self> {
        assert!(
            ctx.is_presentable(),
            "surfaces need a context created with a display handle"
        );
        let pacer = FramePacer::new(config.frames_in_flight);

        // SAFETY: both handles stay valid for as long as the window lives,
        // which the caller keeps beyond this surface.
        let surface = unsafe {
            ash_window::create_surface(
                ctx.entry(),
                ctx.instance(),
                display.display_handle()?.as_raw(),
                window.window_handle()?.as_raw(),
                None,
            )
        }
        .map_err(GpuError::CreateSurface)?;

        let mut this = Surface {
            ctx,
            surface,
            config,
            swapchain: vk::SwapchainKHR::null(),
            format: vk::SurfaceFormatKHR::default(),
            extent: vk::Extent2D::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            images: Vec::new(),
            views: Vec::new(),
            ready_to_present: Vec::new(),
            commands: Vec::new(),
            frames: Vec::new(),
            pacer,
            image_index: 0,
            stale: false,
        };

        // SAFETY: queue family and surface both belong to this context.
        let supported = unsafe {
            ctx.surface_loader().get_physical_device_surface_support(
                ctx.physical_device(),
                ctx.queue_family(),
                surface,
            )
        }
        .map_err(GpuError::SurfaceQuery)?;
        if !supported {
            return Err(GpuError::SurfaceUnsupported);
        }

        this.resize(size)?;
        this.create_frame_sync()?;
        Ok(this)
    }

    fn create_frame_sync(&mut self) -> Result<()> {
        let device = self.ctx.device();
        let count = self.pacer.frames_in_flight();
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.ctx.command_pool(),
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count as u32,
            ..Default::default()
        };
        // SAFETY: the reusable pool belongs to this device.
        self.commands = unsafe { device.allocate_command_buffers(&alloc_info) }
            .map_err(GpuError::AllocateCommandBuffers)?;

        // Signaled so the first pass over the slots does not block.
        let fence_info = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        for &cmd in &self.commands {
            // SAFETY: plain object creation.
            let finished = unsafe { device.create_fence(&fence_info, None) }
                .map_err(GpuError::CreateFence)?;
            let image_available = match create_semaphore(device) {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    // SAFETY: the fence was never submitted.
                    unsafe { device.destroy_fence(finished, None) };
                    return Err(e);
                }
            };
            self.frames.push(FrameSync {
                cmd,
                finished,
                image_available,
            });
        }
        debug!("{count} frames in flight");
        Ok(())
    }

    /// Rebuilds the swapchain for the surface's current size.
    ///
    /// A zero-area size or surface fails with [`GpuError::InvalidSurfaceSize`]
    /// and leaves the existing swapchain untouched. Blocks until the queue is
    /// idle before the old swapchain is released. A failure after the new
    /// swapchain was created leaves the old one retired, so the next
    /// `begin_frame` reports `OutOfDate`.
    pub fn resize(&mut self, size: vk::Extent2D) -> Result<()> {
        self.rebuild(size, self.config.present_policy)
    }

    /// Switches presentation policy and rebuilds the swapchain with it. The
    /// policy is kept only if the rebuild succeeds.
    pub fn set_present_policy(&mut self, policy: PresentPolicy) -> Result<()> {
        self.rebuild(self.extent, policy)
    }

    fn rebuild(&mut self, size: vk::Extent2D, policy: PresentPolicy) -> Result<()> {
        assert!(
            !self.pacer.is_recording(),
            "resize called while a frame is recording"
        );
        let ctx = self.ctx;
        let loader = ctx.surface_loader();
        let gpu = ctx.physical_device();
        // SAFETY: surface and gpu belong to this context's instance.
        let (caps, formats, modes) = unsafe {
            (
                loader.get_physical_device_surface_capabilities(gpu, self.surface),
                loader.get_physical_device_surface_formats(gpu, self.surface),
                loader.get_physical_device_surface_present_modes(gpu, self.surface),
            )
        };
        let caps = caps.map_err(GpuError::SurfaceQuery)?;
        let formats = formats.map_err(GpuError::SurfaceQuery)?;
        let modes = modes.map_err(GpuError::SurfaceQuery)?;
        let plan = plan_swapchain(&caps, &formats, &modes, policy, size)?;

        let create_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: self.surface,
            min_image_count: plan.image_count,
            image_format: plan.format.format,
            image_color_space: plan.format.color_space,
            image_extent: plan.extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform: plan.transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: plan.present_mode,
            clipped: vk::TRUE,
            old_swapchain: self.swapchain,
            ..Default::default()
        };
        let device = ctx.device();
        let swapchain_loader = ctx.swapchain_loader();
        // SAFETY: the old swapchain is passed along, not yet destroyed.
        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(GpuError::CreateSwapchain)?;

        // SAFETY: the queue is externally synchronised by &mut self.
        let built = unsafe { device.queue_wait_idle(ctx.queue()) }
            .map_err(GpuError::WaitQueue)
            .and_then(|()| {
                // SAFETY: swapchain was just created.
                let images = unsafe { swapchain_loader.get_swapchain_images(swapchain) };
                images.map_err(GpuError::SwapchainImages)
            })
            .and_then(|images| {
                check_image_count(images.len())?;
                let (views, semaphores) =
                    create_image_objects(device, &images, plan.format.format)?;
                Ok((images, views, semaphores))
            });
        let (images, views, ready_to_present) = match built {
            Ok(built) => built,
            Err(e) => {
                // SAFETY: the new swapchain has never been used.
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e);
            }
        };

        self.destroy_swapchain_objects();
        self.swapchain = swapchain;
        self.format = plan.format;
        self.extent = plan.extent;
        self.present_mode = plan.present_mode;
        self.images = images;
        self.views = views;
        self.ready_to_present = ready_to_present;
        self.config.present_policy = policy;
        self.stale = false;

        info!(
            "swapchain {}x{}, {} images, {:?}, {}",
            plan.extent.width,
            plan.extent.height,
            self.images.len(),
            plan.format.format,
            present_mode_name(plan.present_mode)
        );
        Ok(())
    }

    /// Waits for the current slot, acquires an image and starts recording.
    ///
    /// The returned command buffer already has the default dynamic state
    /// recorded. `OutOfDate` means the swapchain must be rebuilt before the
    /// next frame; the slot stays usable.
    pub fn begin_frame(&mut self) -> Result<FrameStatus<vk::CommandBuffer>> {
        self.pacer.ensure_idle();
        let device = self.ctx.device();
        let frame = &self.frames[self.pacer.slot()];

        // SAFETY: the fence belongs to this device.
        match unsafe {
            device.wait_for_fences(&[frame.finished], true, self.config.frame_timeout_ns())
        } {
            Ok(()) => {}
            Err(vk::Result::TIMEOUT) => {
                return Err(GpuError::FrameTimeout(self.config.frame_timeout_ms))
            }
            Err(e) => return Err(GpuError::WaitForFence(e)),
        }

        // SAFETY: the semaphore is unsignaled; its last wait completed with
        // the fence above.
        let acquired = unsafe {
            self.ctx.swapchain_loader().acquire_next_image(
                self.swapchain,
                u64::MAX,
                frame.image_available,
                vk::Fence::null(),
            )
        };
        let (index, suboptimal) = match acquired {
            Ok(acquired) => acquired,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => return Ok(FrameStatus::OutOfDate),
            Err(e) => return Err(GpuError::AcquireImage(e)),
        };
        self.image_index = index;
        self.stale = suboptimal;

        // SAFETY: the fence is signaled and about to be resubmitted.
        unsafe { device.reset_fences(&[frame.finished]) }.map_err(GpuError::ResetFence)?;

        let begin_info = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        // SAFETY: the fence wait guarantees the buffer is no longer pending.
        if let Err(e) = unsafe { device.begin_command_buffer(frame.cmd, &begin_info) } {
            self.release_slot(frame);
            return Err(GpuError::BeginCommandBuffer(e));
        }
        let cmd = frame.cmd;
        self.pacer.start_recording();
        self.record_default_state(cmd);
        Ok(FrameStatus::Ready(cmd))
    }

    /// Ends recording, submits and presents the current frame. The frame
    /// slot advances whatever the outcome.
    pub fn end_frame(&mut self) -> Result<FrameStatus<()>> {
        self.pacer.finish_recording();
        let result = self.submit_and_present();
        self.pacer.advance();
        result
    }

    /// `begin_frame`, `record`, `end_frame`. `record` is skipped when the
    /// swapchain is out of date.
    pub fn submit_frame<F>(&mut self, record: F) -> Result<FrameStatus<()>>
    where
        F: FnOnce(&Self, vk::CommandBuffer),
    {
        let cmd = match self.begin_frame()? {
            FrameStatus::Ready(cmd) => cmd,
            FrameStatus::OutOfDate => return Ok(FrameStatus::OutOfDate),
        };
        record(self, cmd);
        self.end_frame()
    }

    fn submit_and_present(&mut self) -> Result<FrameStatus<()>> {
        let device = self.ctx.device();
        let frame = &self.frames[self.pacer.slot()];
        let ready = self.ready_to_present[self.image_index as usize];

        // SAFETY: the buffer is recording and owned by this slot.
        if let Err(e) = unsafe { device.end_command_buffer(frame.cmd) } {
            self.release_slot(frame);
            return Err(GpuError::EndCommandBuffer(e));
        }

        let wait = vk::SemaphoreSubmitInfo::default()
            .semaphore(frame.image_available)
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        let signal = vk::SemaphoreSubmitInfo::default()
            .semaphore(ready)
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS);
        let command = vk::CommandBufferSubmitInfo::default().command_buffer(frame.cmd);
        let submit = vk::SubmitInfo2::default()
            .wait_semaphore_infos(std::slice::from_ref(&wait))
            .command_buffer_infos(std::slice::from_ref(&command))
            .signal_semaphore_infos(std::slice::from_ref(&signal));
        // SAFETY: every handle belongs to this device; the fence was reset in
        // begin_frame.
        if let Err(e) = unsafe { device.queue_submit2(self.ctx.queue(), &[submit], frame.finished) }
        {
            self.release_slot(frame);
            return Err(GpuError::SubmitQueue(e));
        }

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(std::slice::from_ref(&ready))
            .swapchains(std::slice::from_ref(&self.swapchain))
            .image_indices(std::slice::from_ref(&self.image_index));
        // SAFETY: the image was acquired this frame and is submitted above.
        let presented = unsafe {
            self.ctx
                .swapchain_loader()
                .queue_present(self.ctx.queue(), &present_info)
        };
        match presented {
            Ok(false) if !self.stale => Ok(FrameStatus::Ready(())),
            Ok(_) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(FrameStatus::OutOfDate),
            Err(e) => Err(GpuError::Present(e)),
        }
    }

    /// Puts a slot whose fence was reset back into a waitable state after its
    /// frame failed before submission. The acquired image is not presented.
    fn release_slot(&self, frame: &FrameSync) {
        let wait = vk::SemaphoreSubmitInfo::default()
            .semaphore(frame.image_available)
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS);
        let submit = release_batch(&wait);
        // SAFETY: the fence is unsignaled and the semaphore has a pending
        // signal from the acquire.
        if let Err(e) = unsafe {
            self.ctx
                .device()
                .queue_submit2(self.ctx.queue(), &[submit], frame.finished)
        } {
            warn!("could not release frame slot: {e}");
        }
    }

    /// Records the state every frame starts from: full-surface viewport,
    /// filled triangle lists, no culling, depth test and write with LESS,
    /// single-sample opaque colour output.
    fn record_default_state(&self, cmd: vk::CommandBuffer) {
        let device = self.ctx.device();
        let ext = self.ctx.shader_object();
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: self.extent,
        };
        // SAFETY: cmd is recording; dynamic state needs no other resources.
        unsafe {
            device.cmd_set_viewport_with_count(cmd, &[viewport]);
            device.cmd_set_scissor_with_count(cmd, &[scissor]);
            device.cmd_set_rasterizer_discard_enable(cmd, false);
            device.cmd_set_primitive_restart_enable(cmd, false);
            device.cmd_set_primitive_topology(cmd, vk::PrimitiveTopology::TRIANGLE_LIST);
            ext.cmd_set_polygon_mode(cmd, vk::PolygonMode::FILL);
            device.cmd_set_front_face(cmd, vk::FrontFace::COUNTER_CLOCKWISE);
            device.cmd_set_cull_mode(cmd, vk::CullModeFlags::NONE);
            device.cmd_set_depth_test_enable(cmd, true);
            device.cmd_set_depth_write_enable(cmd, true);
            device.cmd_set_depth_compare_op(cmd, vk::CompareOp::LESS);
            device.cmd_set_depth_bias_enable(cmd, false);
            device.cmd_set_depth_bounds_test_enable(cmd, false);
            device.cmd_set_stencil_test_enable(cmd, false);
            ext.cmd_set_rasterization_samples(cmd, vk::SampleCountFlags::TYPE_1);
            ext.cmd_set_sample_mask(cmd, vk::SampleCountFlags::TYPE_1, &[0xff]);
            ext.cmd_set_alpha_to_coverage_enable(cmd, false);
            ext.cmd_set_color_write_mask(cmd, 0, &[vk::ColorComponentFlags::RGBA]);
            ext.cmd_set_color_blend_enable(cmd, 0, &[vk::FALSE]);
        }
    }

    pub fn raw(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn frames_in_flight(&self) -> usize {
        self.pacer.frames_in_flight()
    }

    pub fn frame_slot(&self) -> usize {
        self.pacer.slot()
    }

    pub fn is_recording(&self) -> bool {
        self.pacer.is_recording()
    }

    /// Swapchain image acquired by the last `begin_frame`.
    pub fn current_image(&self) -> vk::Image {
        self.images[self.image_index as usize]
    }

    pub fn current_view(&self) -> vk::ImageView {
        self.views[self.image_index as usize]
    }

    fn destroy_swapchain_objects(&mut self) {
        let device = self.ctx.device();
        // SAFETY: callers wait for the queue to go idle first.
        unsafe {
            for semaphore in self.ready_to_present.drain(..) {
                device.destroy_semaphore(semaphore, None);
            }
            for view in self.views.drain(..) {
                device.destroy_image_view(view, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.ctx
                    .swapchain_loader()
                    .destroy_swapchain(self.swapchain, None);
            }
        }
        self.swapchain = vk::SwapchainKHR::null();
        self.images.clear();
    }
}

impl Drop for Surface<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.ctx.wait_idle() {
            warn!("surface teardown: {e}");
        }
        let device = self.ctx.device();
        // SAFETY: the device is idle, so nothing here is in use.
        unsafe {
            for frame in self.frames.drain(..) {
                device.destroy_fence(frame.finished, None);
                device.destroy_semaphore(frame.image_available, None);
            }
            if !self.commands.is_empty() {
                device.free_command_buffers(self.ctx.command_pool(), &self.commands);
            }
        }
        self.destroy_swapchain_objects();
        // SAFETY: the swapchain built on this surface is gone.
        unsafe {
            self.ctx
                .surface_loader()
                .destroy_surface(self.surface, None)
        };
        debug!("surface destroyed");
    }
}

/// An empty batch that consumes the acquire semaphore so the slot fence can
/// signal without recorded work.
fn release_batch<'a>(wait: &'a vk::SemaphoreSubmitInfo<'a>) -> vk::SubmitInfo2<'a> {
    vk::SubmitInfo2::default().wait_semaphore_infos(std::slice::from_ref(wait))
}

/// Views and "ready to present" semaphores for `images`. Nothing is left
/// behind when one of them fails.
fn create_image_objects(
    device: &ash::Device,
    images: &[vk::Image],
    format: vk::Format,
) -> Result<(Vec<vk::ImageView>, Vec<vk::Semaphore>)> {
    let mut views = Vec::with_capacity(images.len());
    let mut semaphores = Vec::with_capacity(images.len());
    let built = images.iter().try_for_each(|&image| {
        views.push(create_view(device, image, format)?);
        semaphores.push(create_semaphore(device)?);
        Ok::<(), GpuError>(())
    });
    if let Err(e) = built {
        // SAFETY: none of these were handed out or used.
        unsafe {
            for semaphore in semaphores {
                device.destroy_semaphore(semaphore, None);
            }
            for view in views {
                device.destroy_image_view(view, None);
            }
        }
        return Err(e);
    }
    Ok((views, semaphores))
}

fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let info = vk::SemaphoreCreateInfo::default();
    // SAFETY: plain object creation.
    unsafe { device.create_semaphore(&info, None) }.map_err(GpuError::CreateSemaphore)
}

fn create_view(device: &ash::Device, image: vk::Image, format: vk::Format) -> Result<vk::ImageView> {
    let info = vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        subresource_range: crate::barrier::color_range(1, 1),
        ..Default::default()
    };
    // SAFETY: image is a live swapchain image.
    unsafe { device.create_image_view(&info, None) }.map_err(GpuError::CreateImageView)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32, current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn image_count_is_one_above_minimum_within_bounds() {
        assert_eq!(swapchain_image_count(&caps(2, 8, (1, 1))), 3);
        assert_eq!(swapchain_image_count(&caps(3, 3, (1, 1))), 3);
        assert_eq!(swapchain_image_count(&caps(1, 0, (1, 1))), 3);
        assert_eq!(swapchain_image_count(&caps(4, 0, (1, 1))), 5);
    }

    #[test]
    fn current_extent_wins_over_hint() {
        let got = resolve_extent(&caps(2, 3, (800, 600)), extent(1, 1)).unwrap();
        assert_eq!(got, extent(800, 600));
    }

    #[test]
    fn undefined_extent_clamps_hint() {
        let got = resolve_extent(&caps(2, 3, (u32::MAX, u32::MAX)), extent(9000, 300)).unwrap();
        assert_eq!(got, extent(4096, 300));
    }

    #[test]
    fn zero_area_is_rejected() {
        for current in [(0, 600), (800, 0), (0, 0)] {
            let err = resolve_extent(&caps(2, 3, current), extent(800, 600)).unwrap_err();
            assert!(matches!(err, GpuError::InvalidSurfaceSize { .. }), "{current:?}");
        }
    }

    fn srgb(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn plan_follows_caps_and_policy() {
        let plan = plan_swapchain(
            &caps(2, 8, (800, 600)),
            &[srgb(vk::Format::B8G8R8A8_SRGB)],
            &[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            PresentPolicy::Mailbox,
            extent(800, 600),
        )
        .unwrap();
        assert_eq!(plan.extent, extent(800, 600));
        assert_eq!(plan.format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(plan.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(plan.image_count, 3);
    }

    #[test]
    fn zero_area_plan_is_rejected_before_any_swapchain_work() {
        let formats = [srgb(vk::Format::B8G8R8A8_SRGB)];
        let modes = [vk::PresentModeKHR::FIFO];
        for (current, hint) in [
            ((800, 600), extent(0, 600)),
            ((800, 600), extent(800, 0)),
            ((0, 0), extent(800, 600)),
        ] {
            let caps = caps(2, 3, current);
            let err =
                plan_swapchain(&caps, &formats, &modes, PresentPolicy::Fifo, hint).unwrap_err();
            assert!(
                matches!(err, GpuError::InvalidSurfaceSize { .. }),
                "{current:?} {hint:?}"
            );
        }
    }

    #[test]
    fn surface_without_formats_is_unsupported() {
        let err = plan_swapchain(
            &caps(2, 3, (800, 600)),
            &[],
            &[vk::PresentModeKHR::FIFO],
            PresentPolicy::Fifo,
            extent(800, 600),
        )
        .unwrap_err();
        assert!(matches!(err, GpuError::SurfaceUnsupported));
    }

    #[test]
    fn image_count_above_the_tracked_maximum_is_an_error() {
        assert!(check_image_count(MAX_SWAPCHAIN_IMAGES).is_ok());
        assert!(matches!(
            check_image_count(MAX_SWAPCHAIN_IMAGES + 1),
            Err(GpuError::TooManySwapchainImages(9))
        ));
    }

    #[test]
    fn release_batch_only_waits_on_the_acquire() {
        let wait = vk::SemaphoreSubmitInfo::default()
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS);
        let submit = release_batch(&wait);
        assert_eq!(submit.wait_semaphore_info_count, 1);
        assert_eq!(submit.command_buffer_info_count, 0);
        assert_eq!(submit.signal_semaphore_info_count, 0);
    }

    #[test]
    fn srgb_bgra_preferred_then_rgba_then_first() {
        let fmt = |format| vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let all = [
            fmt(vk::Format::B8G8R8A8_UNORM),
            fmt(vk::Format::R8G8B8A8_SRGB),
            fmt(vk::Format::B8G8R8A8_SRGB),
        ];
        assert_eq!(
            choose_surface_format(&all).map(|f| f.format),
            Some(vk::Format::B8G8R8A8_SRGB)
        );
        assert_eq!(
            choose_surface_format(&all[..2]).map(|f| f.format),
            Some(vk::Format::R8G8B8A8_SRGB)
        );
        assert_eq!(
            choose_surface_format(&all[..1]).map(|f| f.format),
            Some(vk::Format::B8G8R8A8_UNORM)
        );
        assert_eq!(choose_surface_format(&[]), None);
    }
}
