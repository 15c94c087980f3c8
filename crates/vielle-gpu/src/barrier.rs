// SPDX-License-Identifier: CEPL-1.0
//! Batched `vkCmdPipelineBarrier2`.
//!
//! Barriers are queued into plain vectors and flushed with a single command.
//! An image barrier starts out as "no prior use, no later use" (UNDEFINED
//! layout, no stage, no access) and is filled in with
//! [`set_image_src`](BarrierBuilder::set_image_src) and
//! [`set_image_dst`](BarrierBuilder::set_image_dst), which always apply to the
//! barrier added last.

use ash::vk;

/// A synchronisation scope: the stage, access and layout a resource was or
/// will be used with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncScope {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    pub layout: vk::ImageLayout,
}

impl SyncScope {
    pub const NONE: SyncScope = SyncScope::new(
        vk::PipelineStageFlags2::NONE,
        vk::AccessFlags2::NONE,
        vk::ImageLayout::UNDEFINED,
    );
    pub const TRANSFER_SRC: SyncScope = SyncScope::new(
        vk::PipelineStageFlags2::TRANSFER,
        vk::AccessFlags2::TRANSFER_READ,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    );
    pub const TRANSFER_DST: SyncScope = SyncScope::new(
        vk::PipelineStageFlags2::TRANSFER,
        vk::AccessFlags2::TRANSFER_WRITE,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    );
    pub const FRAGMENT_SAMPLED: SyncScope = SyncScope::new(
        vk::PipelineStageFlags2::FRAGMENT_SHADER,
        vk::AccessFlags2::SHADER_READ,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    );
    pub const COLOR_ATTACHMENT: SyncScope = SyncScope::new(
        vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::COLOR_ATTACHMENT_READ.as_raw()
                | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw(),
        ),
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    );
    /// CPU reads of mapped memory after a wait on the submission's fence.
    pub const HOST_READ: SyncScope = SyncScope::new(
        vk::PipelineStageFlags2::HOST,
        vk::AccessFlags2::HOST_READ,
        vk::ImageLayout::UNDEFINED,
    );
    /// Hand-off to the presentation engine; the semaphore does the waiting.
    pub const PRESENT: SyncScope = SyncScope::new(
        vk::PipelineStageFlags2::NONE,
        vk::AccessFlags2::NONE,
        vk::ImageLayout::PRESENT_SRC_KHR,
    );

    pub const fn new(
        stage: vk::PipelineStageFlags2,
        access: vk::AccessFlags2,
        layout: vk::ImageLayout,
    ) -> Self {
        SyncScope {
            stage,
            access,
            layout,
        }
    }
}

/// Colour range covering the first `levels` mips and `layers` layers.
pub fn color_range(levels: u32, layers: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: levels,
        base_array_layer: 0,
        layer_count: layers,
    }
}

#[derive(Debug, Default)]
pub struct BarrierBuilder {
    memory: Vec<vk::MemoryBarrier2<'static>>,
    buffers: Vec<vk::BufferMemoryBarrier2<'static>>,
    images: Vec<vk::ImageMemoryBarrier2<'static>>,
}

impl BarrierBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_memory_barrier(&mut self, src: SyncScope, dst: SyncScope) -> &mut Self {
        self.memory.push(vk::MemoryBarrier2 {
            src_stage_mask: src.stage,
            src_access_mask: src.access,
            dst_stage_mask: dst.stage,
            dst_access_mask: dst.access,
            ..Default::default()
        });
        self
    }

    pub fn add_buffer_barrier(
        &mut self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        src: SyncScope,
        dst: SyncScope,
    ) -> &mut Self {
        debug_assert!(buffer != vk::Buffer::null());
        self.buffers.push(vk::BufferMemoryBarrier2 {
            src_stage_mask: src.stage,
            src_access_mask: src.access,
            dst_stage_mask: dst.stage,
            dst_access_mask: dst.access,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            buffer,
            offset,
            size,
            ..Default::default()
        });
        self
    }

    pub fn add_image_barrier(
        &mut self,
        image: vk::Image,
        range: vk::ImageSubresourceRange,
    ) -> &mut Self {
        debug_assert!(image != vk::Image::null());
        self.images.push(vk::ImageMemoryBarrier2 {
            src_stage_mask: vk::PipelineStageFlags2::NONE,
            src_access_mask: vk::AccessFlags2::NONE,
            dst_stage_mask: vk::PipelineStageFlags2::NONE,
            dst_access_mask: vk::AccessFlags2::NONE,
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::UNDEFINED,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image,
            subresource_range: range,
            ..Default::default()
        });
        self
    }

    pub fn set_image_src(
        &mut self,
        stage: vk::PipelineStageFlags2,
        access: vk::AccessFlags2,
        layout: vk::ImageLayout,
    ) -> &mut Self {
        let last = self.last_image();
        last.src_stage_mask = stage;
        last.src_access_mask = access;
        last.old_layout = layout;
        self
    }

    pub fn set_image_dst(
        &mut self,
        stage: vk::PipelineStageFlags2,
        access: vk::AccessFlags2,
        layout: vk::ImageLayout,
    ) -> &mut Self {
        assert!(
            layout != vk::ImageLayout::UNDEFINED,
            "images cannot transition into UNDEFINED"
        );
        let last = self.last_image();
        last.dst_stage_mask = stage;
        last.dst_access_mask = access;
        last.new_layout = layout;
        self
    }

    /// Queues `image` moving from scope `from` to scope `to`.
    pub fn transition(
        &mut self,
        image: vk::Image,
        range: vk::ImageSubresourceRange,
        from: SyncScope,
        to: SyncScope,
    ) -> &mut Self {
        self.add_image_barrier(image, range)
            .set_image_src(from.stage, from.access, from.layout)
            .set_image_dst(to.stage, to.access, to.layout)
    }

    fn last_image(&mut self) -> &mut vk::ImageMemoryBarrier2<'static> {
        self.images
            .last_mut()
            .unwrap_or_else(|| panic!("no image barrier to modify; call add_image_barrier first"))
    }

    pub fn image_barriers(&self) -> &[vk::ImageMemoryBarrier2<'static>] {
        &self.images
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty() && self.buffers.is_empty() && self.images.is_empty()
    }

    pub fn clear(&mut self) {
        self.memory.clear();
        self.buffers.clear();
        self.images.clear();
    }

    /// Records one barrier command for everything queued, then clears.
    pub fn build_and_run(&mut self, device: &ash::Device, cmd: vk::CommandBuffer) {
        if self.is_empty() {
            return;
        }
        let dependency = vk::DependencyInfo::default()
            .memory_barriers(&self.memory)
            .buffer_memory_barriers(&self.buffers)
            .image_memory_barriers(&self.images);
        // SAFETY: cmd is recording on this device and every handle queued
        // belongs to it.
        unsafe { device.cmd_pipeline_barrier2(cmd, &dependency) };
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn image(raw: u64) -> vk::Image {
        vk::Image::from_raw(raw)
    }

    #[test]
    fn new_barrier_defaults_to_no_prior_or_later_use() {
        let mut b = BarrierBuilder::new();
        b.add_image_barrier(image(1), color_range(1, 1));
        let barrier = &b.image_barriers()[0];
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.new_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.src_stage_mask, vk::PipelineStageFlags2::NONE);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags2::NONE);
    }

    #[test]
    fn setters_touch_only_the_last_barrier() {
        let mut b = BarrierBuilder::new();
        b.add_image_barrier(image(1), color_range(1, 1))
            .set_image_dst(
                vk::PipelineStageFlags2::TRANSFER,
                vk::AccessFlags2::TRANSFER_WRITE,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )
            .add_image_barrier(image(2), color_range(4, 6))
            .set_image_src(
                vk::PipelineStageFlags2::TRANSFER,
                vk::AccessFlags2::TRANSFER_WRITE,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );

        let [first, second] = b.image_barriers() else {
            panic!("expected two barriers");
        };
        assert_eq!(first.new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(first.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(second.old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(second.new_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(second.subresource_range.layer_count, 6);
    }

    #[test]
    fn transition_fills_both_sides() {
        let mut b = BarrierBuilder::new();
        b.transition(
            image(9),
            color_range(1, 1),
            SyncScope::TRANSFER_DST,
            SyncScope::FRAGMENT_SAMPLED,
        );
        let barrier = &b.image_barriers()[0];
        assert_eq!(barrier.src_access_mask, vk::AccessFlags2::TRANSFER_WRITE);
        assert_eq!(barrier.dst_stage_mask, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(barrier.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn host_read_waits_for_transfer_writes() {
        let mut b = BarrierBuilder::new();
        b.add_memory_barrier(SyncScope::TRANSFER_DST, SyncScope::HOST_READ);
        let barrier = &b.memory[0];
        assert_eq!(barrier.src_access_mask, vk::AccessFlags2::TRANSFER_WRITE);
        assert_eq!(barrier.dst_stage_mask, vk::PipelineStageFlags2::HOST);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags2::HOST_READ);
    }

    #[test]
    fn clear_empties_every_list() {
        let mut b = BarrierBuilder::new();
        b.add_memory_barrier(SyncScope::TRANSFER_DST, SyncScope::FRAGMENT_SAMPLED);
        b.add_image_barrier(image(3), color_range(1, 1));
        assert!(!b.is_empty());
        b.clear();
        assert!(b.is_empty());
    }

    #[test]
    #[should_panic(expected = "UNDEFINED")]
    fn undefined_destination_layout_panics() {
        BarrierBuilder::new()
            .add_image_barrier(image(1), color_range(1, 1))
            .set_image_dst(
                vk::PipelineStageFlags2::NONE,
                vk::AccessFlags2::NONE,
                vk::ImageLayout::UNDEFINED,
            );
    }

    #[test]
    #[should_panic(expected = "add_image_barrier first")]
    fn setter_without_barrier_panics() {
        BarrierBuilder::new().set_image_src(
            vk::PipelineStageFlags2::NONE,
            vk::AccessFlags2::NONE,
            vk::ImageLayout::UNDEFINED,
        );
    }
}
