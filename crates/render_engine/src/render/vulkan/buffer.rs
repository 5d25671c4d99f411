//! GPU buffer allocation and upload
//!
//! Buffers bind memory picked by [`find_memory_type`]; device-local buffers
//! are filled through a host-visible staging buffer and a one-time-submit
//! copy. Destruction does not happen on drop: live buffers must be retired
//! through the [`DeletionQueue`] so in-flight frames can finish with them.

use ash::vk;
use bytemuck::Pod;
use std::sync::Arc;

use super::commands::CommandBuffer;
use super::context::{DeviceContext, VulkanError, VulkanResult};
use super::deletion_queue::DeletionQueue;

/// Searches the device's memory types for one compatible with the
/// requirement bits and carrying all required property flags.
fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    for index in 0..memory_properties.memory_type_count {
        let type_matches = type_bits & (1 << index) != 0;
        let property_flags = memory_properties.memory_types[index as usize].property_flags;
        if type_matches && property_flags.contains(required) {
            return Ok(index);
        }
    }
    Err(VulkanError::NoSuitableMemoryType)
}

/// A GPU buffer with its backing memory allocation.
///
/// No `Drop` teardown: call [`Buffer::enqueue_destruction`] when the buffer
/// goes out of use so it is freed only once the GPU provably finished with
/// it.
pub struct Buffer {
    ctx: Arc<DeviceContext>,
    handle: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Creates a buffer and binds freshly allocated memory with the
    /// requested properties.
    pub fn new(
        ctx: &Arc<DeviceContext>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let handle = unsafe {
            ctx.device()
                .create_buffer(&buffer_info, None)
                .map_err(VulkanError::Api)?
        };

        let requirements = unsafe { ctx.device().get_buffer_memory_requirements(handle) };
        let memory_type_index = find_memory_type(
            ctx.memory_properties(),
            requirements.memory_type_bits,
            properties,
        )?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe {
            ctx.device()
                .allocate_memory(&alloc_info, None)
                .map_err(VulkanError::Api)?
        };

        unsafe {
            ctx.device()
                .bind_buffer_memory(handle, memory, 0)
                .map_err(VulkanError::Api)?;
        }

        Ok(Self {
            ctx: Arc::clone(ctx),
            handle,
            memory,
            size,
        })
    }

    /// Creates a device-local buffer and fills it with `data` through a
    /// staging buffer and a synchronous copy on `one_time_cmd`.
    pub fn new_device_local<T: Pod>(
        ctx: &Arc<DeviceContext>,
        one_time_cmd: &CommandBuffer,
        data: &[T],
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let size = bytes.len() as vk::DeviceSize;

        let staging = Self::new(
            ctx,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write_bytes(bytes)?;

        let buffer = Self::new(
            ctx,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        one_time_cmd.do_one_time_submit(|cmd| {
            let region = vk::BufferCopy::builder().size(size).build();
            unsafe {
                ctx.device()
                    .cmd_copy_buffer(cmd.handle(), staging.handle, buffer.handle, &[region]);
            }
            Ok(())
        })?;

        // The one-time submit waited for device idle, so the staging buffer
        // is no longer referenced and can die without deferral.
        staging.destroy_now();

        Ok(buffer)
    }

    /// Maps the memory and copies `bytes` in. Valid only for host-visible
    /// buffers.
    pub fn write_bytes(&self, bytes: &[u8]) -> VulkanResult<()> {
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "Write of {} bytes exceeds buffer size {}",
                    bytes.len(),
                    self.size
                ),
            });
        }

        unsafe {
            let mapped = self
                .ctx
                .device()
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), mapped.cast(), bytes.len());
            self.ctx.device().unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Get the buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    /// Size of the buffer in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Hands the buffer and its allocation to the deletion queue; they are
    /// freed once every frame that may reference them has completed.
    pub fn enqueue_destruction(self, deletion_queue: &mut DeletionQueue) {
        deletion_queue.enqueue_deletion(self.handle);
        deletion_queue.enqueue_allocation_free(self.memory);
    }

    fn destroy_now(self) {
        unsafe {
            self.ctx.device().destroy_buffer(self.handle, None);
            self.ctx.device().free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (index, &property_flags) in flags.iter().enumerate() {
            properties.memory_types[index].property_flags = property_flags;
        }
        properties
    }

    #[test]
    fn picks_first_compatible_memory_type() {
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        let index = find_memory_type(
            &properties,
            0b11,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        )
        .unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn respects_the_requirement_mask() {
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);

        // Only type 1 is allowed by the mask.
        let index = find_memory_type(
            &properties,
            0b10,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn missing_memory_type_is_fatal() {
        let properties = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);

        let result = find_memory_type(
            &properties,
            0b1,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        );
        assert!(matches!(result, Err(VulkanError::NoSuitableMemoryType)));
    }
}
