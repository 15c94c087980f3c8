// SPDX-License-Identifier: CEPL-1.0
//! Linear GPU buffers with a tier-independent write contract.
//!
//! The [`MemoryTier`] chosen at creation fixes both where the memory lives and
//! how [`GpuBuffer::write`] reaches it:
//!
//! - `RandomAccess`: host-visible, cached. Written in place at any offset and
//!   readable from the CPU.
//! - `Staging`: host-visible, write-combined. Filled once, from offset 0.
//! - `DeviceLocal`: GPU-only. Each write goes through a temporary `Staging`
//!   buffer and a blocking GPU copy.

use crate::context::Context;
use crate::error::{GpuError, Result};
use ash::vk;
use bytemuck::Pod;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;
use std::ops::Range;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryTier {
    RandomAccess,
    Staging,
    DeviceLocal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WritePath {
    Mapped,
    Staged,
}

impl MemoryTier {
    pub fn location(self) -> MemoryLocation {
        match self {
            MemoryTier::RandomAccess => MemoryLocation::GpuToCpu,
            MemoryTier::Staging => MemoryLocation::CpuToGpu,
            MemoryTier::DeviceLocal => MemoryLocation::GpuOnly,
        }
    }

    fn write_path(self) -> WritePath {
        match self {
            MemoryTier::RandomAccess | MemoryTier::Staging => WritePath::Mapped,
            MemoryTier::DeviceLocal => WritePath::Staged,
        }
    }

    pub fn is_host_visible(self) -> bool {
        self.write_path() == WritePath::Mapped
    }

    /// Panics unless writing `len` bytes at `offset` into a buffer of
    /// `capacity` bytes is a valid call for this tier.
    pub fn check_write(self, capacity: vk::DeviceSize, len: usize, offset: vk::DeviceSize) {
        assert!(len > 0, "buffer writes need at least one byte");
        let end = offset.checked_add(len as vk::DeviceSize);
        assert!(
            end.is_some_and(|end| end <= capacity),
            "write of {len} bytes at offset {offset} overruns a {capacity} byte buffer"
        );
        if self == MemoryTier::Staging {
            assert!(
                offset == 0,
                "staging buffers are filled in one write starting at offset 0 (got {offset})"
            );
        }
    }
}

/// Byte range of a `len` byte read at `offset`, checked against `capacity`.
fn read_range(capacity: vk::DeviceSize, len: usize, offset: vk::DeviceSize) -> Range<usize> {
    let end = offset.checked_add(len as vk::DeviceSize);
    assert!(
        end.is_some_and(|end| end <= capacity),
        "read of {len} bytes at offset {offset} runs past the end of a {capacity} byte buffer"
    );
    offset as usize..offset as usize + len
}

pub struct GpuBuffer<'ctx> {
    ctx: &'ctx Context,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    tier: MemoryTier,
}

impl std::fmt::Debug for GpuBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("buffer", &self.buffer)
            .field("size", &self.size)
            .field("tier", &self.tier)
            .finish_non_exhaustive()
    }
}

impl<'ctx> GpuBuffer<'ctx> {
    /// `DeviceLocal` buffers get `TRANSFER_DST` added to `usage` so writes can
    /// land in them.
    pub fn create(
        ctx: &'ctx Context,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        tier: MemoryTier,
    ) -> Result<Self> {
        assert!(size > 0, "buffers cannot be empty");
        let usage = match tier {
            MemoryTier::DeviceLocal => usage | vk::BufferUsageFlags::TRANSFER_DST,
            _ => usage,
        };
        let create_info = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let device = ctx.device();
        // SAFETY: create_info holds no borrowed pointers.
        let buffer =
            unsafe { device.create_buffer(&create_info, None) }.map_err(GpuError::CreateBuffer)?;
        // SAFETY: buffer was just created from this device.
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let allocation = match ctx.allocate("buffer", requirements, tier.location(), true) {
            Ok(allocation) => allocation,
            Err(e) => {
                // SAFETY: buffer has no memory bound and no users.
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(GpuError::AllocateMemory(e));
            }
        };
        // SAFETY: allocation came from this device's allocator.
        let bound = unsafe {
            device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            ctx.free(allocation);
            // SAFETY: as above.
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(GpuError::BindMemory(e));
        }

        debug!("buffer {buffer:?}: {size} bytes, {tier:?}, {usage:?}");
        Ok(GpuBuffer {
            ctx,
            buffer,
            allocation: Some(allocation),
            size,
            tier,
        })
    }

    pub fn raw(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn tier(&self) -> MemoryTier {
        self.tier
    }

    /// Copies `data` into the buffer at `offset`.
    ///
    /// For `DeviceLocal` buffers this blocks until the GPU copy finishes; the
    /// temporary staging buffer is released whether or not it succeeds. A
    /// failed write leaves the destination contents undefined.
    pub fn write(&self, data: &[u8], offset: vk::DeviceSize) -> Result<()> {
        self.tier.check_write(self.size, data.len(), offset);
        match self.tier.write_path() {
            WritePath::Mapped => self.write_mapped(data, offset),
            WritePath::Staged => self.write_staged(data, offset),
        }
    }

    pub fn write_pod<T: Pod>(&self, value: &T, offset: vk::DeviceSize) -> Result<()> {
        self.write(bytemuck::bytes_of(value), offset)
    }

    pub fn write_slice<T: Pod>(&self, values: &[T], offset: vk::DeviceSize) -> Result<()> {
        self.write(bytemuck::cast_slice(values), offset)
    }

    /// Reads back host-visible memory. Panics for `DeviceLocal` buffers; copy
    /// into a `RandomAccess` buffer first.
    pub fn read(&self, out: &mut [u8], offset: vk::DeviceSize) -> Result<()> {
        assert!(
            self.tier.is_host_visible(),
            "{:?} buffers are not readable from the CPU",
            self.tier
        );
        let range = read_range(self.size, out.len(), offset);
        let mapped = self
            .allocation
            .as_ref()
            .and_then(Allocation::mapped_slice)
            .ok_or(GpuError::BufferNotMapped)?;
        out.copy_from_slice(&mapped[range]);
        Ok(())
    }

    /// Blocking GPU copy of the first `size` bytes into `dst`.
    pub fn copy_to(&self, dst: &GpuBuffer<'_>, size: vk::DeviceSize) -> Result<()> {
        self.copy_region_to(dst, 0, 0, size)
    }

    fn copy_region_to(
        &self,
        dst: &GpuBuffer<'_>,
        src_offset: vk::DeviceSize,
        dst_offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> Result<()> {
        assert!(src_offset + size <= self.size, "copy source out of bounds");
        assert!(dst_offset + size <= dst.size, "copy destination out of bounds");
        let region = vk::BufferCopy {
            src_offset,
            dst_offset,
            size,
        };
        let (src, dst) = (self.buffer, dst.buffer);
        self.ctx.submit_single_time(|device, cmd| {
            // SAFETY: both buffers are live for the blocking submission.
            unsafe { device.cmd_copy_buffer(cmd, src, dst, std::slice::from_ref(&region)) };
        })
    }

    fn write_mapped(&self, data: &[u8], offset: vk::DeviceSize) -> Result<()> {
        let ptr = self
            .allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .ok_or(GpuError::BufferNotMapped)?;
        // SAFETY: the allocation is persistently mapped host-coherent memory
        // and check_write bounded offset + len by the buffer size.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                ptr.as_ptr().cast::<u8>().add(offset as usize),
                data.len(),
            );
        }
        Ok(())
    }

    fn write_staged(&self, data: &[u8], offset: vk::DeviceSize) -> Result<()> {
        let len = data.len() as vk::DeviceSize;
        let staging = GpuBuffer::create(
            self.ctx,
            len,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryTier::Staging,
        )?;
        staging.write(data, 0)?;
        staging.copy_region_to(self, 0, offset, len)
    }
}

impl Drop for GpuBuffer<'_> {
    fn drop(&mut self) {
        // SAFETY: the buffer is owned here and no submission still uses it.
        unsafe { self.ctx.device().destroy_buffer(self.buffer, None) };
        if let Some(allocation) = self.allocation.take() {
            self.ctx.free(allocation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_map_to_allocator_locations() {
        assert_eq!(MemoryTier::RandomAccess.location(), MemoryLocation::GpuToCpu);
        assert_eq!(MemoryTier::Staging.location(), MemoryLocation::CpuToGpu);
        assert_eq!(MemoryTier::DeviceLocal.location(), MemoryLocation::GpuOnly);
    }

    #[test]
    fn only_device_local_goes_through_staging() {
        assert!(MemoryTier::RandomAccess.is_host_visible());
        assert!(MemoryTier::Staging.is_host_visible());
        assert!(!MemoryTier::DeviceLocal.is_host_visible());
    }

    #[test]
    fn staging_accepts_full_write_at_zero() {
        let data = [0xFF_u8; 64];
        MemoryTier::Staging.check_write(64, data.len(), 0);
    }

    #[test]
    #[should_panic(expected = "offset 0")]
    fn staging_rejects_nonzero_offset() {
        let data = [0xFF_u8; 60];
        MemoryTier::Staging.check_write(64, data.len(), 4);
    }

    #[test]
    fn random_access_and_device_local_accept_offsets() {
        MemoryTier::RandomAccess.check_write(64, 60, 4);
        MemoryTier::DeviceLocal.check_write(64, 1, 63);
    }

    #[test]
    fn read_range_covers_the_requested_bytes() {
        assert_eq!(read_range(64, 16, 48), 48..64);
        assert_eq!(read_range(64, 0, 64), 64..64);
    }

    #[test]
    #[should_panic(expected = "past the end")]
    fn read_past_end_panics() {
        read_range(64, 8, 60);
    }

    #[test]
    #[should_panic(expected = "past the end")]
    fn read_offset_overflow_panics() {
        read_range(64, 8, u64::MAX - 2);
    }

    #[test]
    #[should_panic(expected = "overruns")]
    fn write_past_end_panics() {
        MemoryTier::RandomAccess.check_write(64, 8, 60);
    }

    #[test]
    #[should_panic(expected = "at least one byte")]
    fn empty_write_panics() {
        MemoryTier::DeviceLocal.check_write(64, 0, 0);
    }
}
