// SPDX-License-Identifier: CEPL-1.0
//! Blocking one-off submissions for load-time transfers.

use crate::context::Context;
use crate::error::{GpuError, Result};
use ash::vk;
use tracing::error;

/// A command buffer from the transient pool, recording with
/// `ONE_TIME_SUBMIT`. [`end`](Self::end) submits it and blocks until the GPU
/// is done. The buffer goes back to the pool unless the GPU may still own it.
pub struct SingleTimeCommands<'ctx> {
    ctx: &'ctx Context,
    cmd: vk::CommandBuffer,
    // Submitted and not yet known to be complete.
    pending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retire {
    Free,
    Leak,
}

impl Retire {
    /// A submitted buffer whose fence wait failed may still be executing.
    fn after(pending: bool) -> Self {
        if pending {
            Retire::Leak
        } else {
            Retire::Free
        }
    }
}

impl<'ctx> SingleTimeCommands<'ctx> {
    pub fn begin(ctx: &'ctx Context) -> Result<Self> {
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: ctx.transient_pool(),
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        // SAFETY: the transient pool belongs to this device.
        let cmd = unsafe { ctx.device().allocate_command_buffers(&alloc_info) }
            .map_err(GpuError::AllocateCommandBuffers)?[0];
        let this = SingleTimeCommands {
            ctx,
            cmd,
            pending: false,
        };

        let begin_info = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        // SAFETY: freshly allocated buffer in the initial state.
        unsafe { ctx.device().begin_command_buffer(cmd, &begin_info) }
            .map_err(GpuError::BeginCommandBuffer)?;
        Ok(this)
    }

    pub fn cmd(&self) -> vk::CommandBuffer {
        self.cmd
    }

    pub fn device(&self) -> &'ctx ash::Device {
        self.ctx.device()
    }

    /// Ends recording, submits with a fresh fence and waits on it without a
    /// timeout. Everything recorded is complete and visible on return.
    pub fn end(mut self) -> Result<()> {
        let device = self.ctx.device();
        // SAFETY: the buffer is recording and owned by self.
        unsafe { device.end_command_buffer(self.cmd) }.map_err(GpuError::EndCommandBuffer)?;

        let fence_info = vk::FenceCreateInfo::default();
        // SAFETY: plain object creation.
        let fence =
            unsafe { device.create_fence(&fence_info, None) }.map_err(GpuError::CreateFence)?;

        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            command_buffer_count: 1,
            p_command_buffers: &self.cmd,
            ..Default::default()
        };
        // SAFETY: the buffer is executable; fence is unsignaled.
        if let Err(e) =
            unsafe { device.queue_submit(self.ctx.queue(), std::slice::from_ref(&submit), fence) }
        {
            // SAFETY: nothing was submitted with the fence.
            unsafe { device.destroy_fence(fence, None) };
            return Err(GpuError::SubmitQueue(e));
        }
        self.pending = true;

        // SAFETY: the fence belongs to the submission above.
        match unsafe { device.wait_for_fences(&[fence], true, u64::MAX) } {
            Ok(()) => {
                self.pending = false;
                // SAFETY: the wait returned, so the fence is no longer in use.
                unsafe { device.destroy_fence(fence, None) };
                Ok(())
            }
            Err(e) => {
                error!("single-time submission did not complete: {e}; leaking its command buffer");
                Err(GpuError::WaitForFence(e))
            }
        }
    }
}

impl Drop for SingleTimeCommands<'_> {
    fn drop(&mut self) {
        match Retire::after(self.pending) {
            // SAFETY: never submitted, or end() saw it complete.
            Retire::Free => unsafe {
                self.ctx
                    .device()
                    .free_command_buffers(self.ctx.transient_pool(), &[self.cmd])
            },
            Retire::Leak => {}
        }
    }
}

impl Context {
    /// Records `commands` into a single-time command buffer, submits it and
    /// blocks until it completes.
    pub fn submit_single_time<F>(&self, commands: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let single = SingleTimeCommands::begin(self)?;
        commands(self.device(), single.cmd());
        single.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_or_unsubmitted_buffers_are_freed() {
        assert_eq!(Retire::after(false), Retire::Free);
    }

    #[test]
    fn buffers_the_gpu_may_still_own_are_leaked() {
        assert_eq!(Retire::after(true), Retire::Leak);
    }
}
