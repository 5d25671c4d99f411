//! Delayed deletion of GPU objects
//!
//! A frame that was submitted this iteration may still be executing on the
//! GPU for up to [`MAX_FRAMES_IN_FLIGHT`] further iterations, so handles are
//! never destroyed immediately. Each timeline (simulation steps and rendered
//! frames) keeps a FIFO of records separated into iterations; starting a new
//! iteration destroys the oldest completed one. The queues are pre-seeded
//! with [`MAX_FRAMES_IN_FLIGHT`] separators, which makes destruction lag
//! enqueueing by exactly the number of frames whose fences have since been
//! waited on.

use ash::vk::{self, Handle};
use std::collections::VecDeque;
use std::sync::Arc;

use super::context::DeviceContext;
use super::double_buffered::MAX_FRAMES_IN_FLIGHT;

/// The two deletion timelines.
///
/// Objects used by simulation steps age with the step counter, objects used
/// by frame rendering age with the frame counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeline {
    /// Simulation-step scoped deletions
    Step,
    /// Rendered-frame scoped deletions
    Render,
}

impl Timeline {
    fn index(self) -> usize {
        match self {
            Self::Step => 0,
            Self::Render => 1,
        }
    }
}

#[derive(Debug)]
enum DeletionRecord {
    /// Iteration boundary, carries no payload
    Separator,
    /// A typed Vulkan object handle
    VulkanHandle {
        object_type: vk::ObjectType,
        raw: u64,
    },
    /// A raw device-memory block, freed rather than destroyed
    Allocation { memory: vk::DeviceMemory },
}

/// FIFO of deletion records for one timeline.
///
/// Holds the iteration bookkeeping separate from the actual destroy calls so
/// the deferral semantics are testable without a device.
#[derive(Debug)]
struct RecordQueue {
    records: VecDeque<DeletionRecord>,
}

impl RecordQueue {
    /// Seeded with one separator per frame that may be in flight, so the
    /// first iterations to be reclaimed are empty ones.
    fn new() -> Self {
        let mut records = VecDeque::new();
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            records.push_back(DeletionRecord::Separator);
        }
        Self { records }
    }

    fn push(&mut self, record: DeletionRecord) {
        self.records.push_back(record);
    }

    /// Pops the oldest iteration: every record up to and including the first
    /// separator. Returns the records to destroy and whether a separator was
    /// consumed; `false` means the queue ran out, which only happens while
    /// draining on shutdown.
    fn pop_iteration(&mut self) -> (Vec<DeletionRecord>, bool) {
        let mut doomed = Vec::new();
        while let Some(record) = self.records.pop_front() {
            match record {
                DeletionRecord::Separator => return (doomed, true),
                other => doomed.push(other),
            }
        }
        (doomed, false)
    }
}

/// Allows delayed deletion of Vulkan objects and device allocations.
///
/// Enqueueing is infallible; destroying an unrecognized handle type is a
/// programmer error reported through the error log, not a failure.
pub struct DeletionQueue {
    ctx: Arc<DeviceContext>,
    current_timeline: Timeline,
    queues: [RecordQueue; 2],
}

impl DeletionQueue {
    /// Creates both timeline queues, pre-seeded to defer deletion.
    pub fn new(ctx: Arc<DeviceContext>) -> Self {
        Self {
            ctx,
            current_timeline: Timeline::Step,
            queues: [RecordQueue::new(), RecordQueue::new()],
        }
    }

    /// Destroys all objects from the iteration before previous and starts a
    /// new iteration of the timeline.
    ///
    /// Subsequent deletions are enqueued to `timeline` until this is called
    /// again.
    pub fn start_next_iteration(&mut self, timeline: Timeline) {
        self.current_timeline = timeline;
        let queue = &mut self.queues[timeline.index()];
        queue.push(DeletionRecord::Separator);
        let (doomed, _) = queue.pop_iteration();
        for record in doomed {
            self.destroy_record(record);
        }
    }

    /// Enqueues deletion of a Vulkan object on the current timeline.
    ///
    /// Null handles are ignored, so default-constructed objects need no
    /// bookkeeping.
    pub fn enqueue_deletion<T: Handle>(&mut self, object: T) {
        let raw = object.as_raw();
        if raw != 0 {
            self.queues[self.current_timeline.index()].push(DeletionRecord::VulkanHandle {
                object_type: T::TYPE,
                raw,
            });
        }
    }

    /// Enqueues freeing of a device-memory allocation on the current timeline.
    pub fn enqueue_allocation_free(&mut self, memory: vk::DeviceMemory) {
        if memory != vk::DeviceMemory::null() {
            self.queues[self.current_timeline.index()]
                .push(DeletionRecord::Allocation { memory });
        }
    }

    fn destroy_record(&self, record: DeletionRecord) {
        match record {
            DeletionRecord::Separator => {}
            DeletionRecord::VulkanHandle { object_type, raw } => {
                self.destroy_vulkan_handle(object_type, raw);
            }
            DeletionRecord::Allocation { memory } => unsafe {
                self.ctx.device().free_memory(memory, None);
            },
        }
    }

    fn destroy_vulkan_handle(&self, object_type: vk::ObjectType, raw: u64) {
        let device = self.ctx.device();
        unsafe {
            match object_type {
                vk::ObjectType::SEMAPHORE => {
                    device.destroy_semaphore(vk::Semaphore::from_raw(raw), None);
                }
                vk::ObjectType::FENCE => {
                    device.destroy_fence(vk::Fence::from_raw(raw), None);
                }
                vk::ObjectType::DEVICE_MEMORY => {
                    device.free_memory(vk::DeviceMemory::from_raw(raw), None);
                }
                vk::ObjectType::BUFFER => {
                    device.destroy_buffer(vk::Buffer::from_raw(raw), None);
                }
                vk::ObjectType::IMAGE => {
                    device.destroy_image(vk::Image::from_raw(raw), None);
                }
                vk::ObjectType::BUFFER_VIEW => {
                    device.destroy_buffer_view(vk::BufferView::from_raw(raw), None);
                }
                vk::ObjectType::IMAGE_VIEW => {
                    device.destroy_image_view(vk::ImageView::from_raw(raw), None);
                }
                vk::ObjectType::SAMPLER => {
                    device.destroy_sampler(vk::Sampler::from_raw(raw), None);
                }
                vk::ObjectType::DESCRIPTOR_SET_LAYOUT => {
                    device.destroy_descriptor_set_layout(
                        vk::DescriptorSetLayout::from_raw(raw),
                        None,
                    );
                }
                vk::ObjectType::PIPELINE_LAYOUT => {
                    device.destroy_pipeline_layout(vk::PipelineLayout::from_raw(raw), None);
                }
                vk::ObjectType::PIPELINE => {
                    device.destroy_pipeline(vk::Pipeline::from_raw(raw), None);
                }
                vk::ObjectType::RENDER_PASS => {
                    device.destroy_render_pass(vk::RenderPass::from_raw(raw), None);
                }
                vk::ObjectType::FRAMEBUFFER => {
                    device.destroy_framebuffer(vk::Framebuffer::from_raw(raw), None);
                }
                other => {
                    log::error!("Unsupported object type {other:?} queued for deletion");
                }
            }
        }
    }
}

impl Drop for DeletionQueue {
    fn drop(&mut self) {
        // Drain every remaining iteration on both timelines so nothing
        // leaks on shutdown, including the still-open iteration.
        for index in 0..self.queues.len() {
            loop {
                let (doomed, separator_found) = self.queues[index].pop_iteration();
                for record in doomed {
                    self.destroy_record(record);
                }
                if !separator_found {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle_record(raw: u64) -> DeletionRecord {
        DeletionRecord::VulkanHandle {
            object_type: vk::ObjectType::BUFFER,
            raw,
        }
    }

    fn raw_of(record: &DeletionRecord) -> u64 {
        match record {
            DeletionRecord::VulkanHandle { raw, .. } => *raw,
            _ => panic!("expected a handle record"),
        }
    }

    /// Mirrors `start_next_iteration` on the bare queue.
    fn start_next(queue: &mut RecordQueue) -> Vec<u64> {
        queue.push(DeletionRecord::Separator);
        let (doomed, separator_found) = queue.pop_iteration();
        assert!(separator_found);
        doomed.iter().map(raw_of).collect()
    }

    #[test]
    fn seeded_iterations_are_empty() {
        let mut queue = RecordQueue::new();
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            assert!(start_next(&mut queue).is_empty());
        }
    }

    #[test]
    fn deletion_lags_by_max_frames_in_flight() {
        let mut queue = RecordQueue::new();

        // Enqueued during iteration 0.
        queue.push(handle_record(1));

        // Two further iteration starts must pass before the object dies.
        assert!(start_next(&mut queue).is_empty());
        assert!(start_next(&mut queue).is_empty());
        assert_eq!(start_next(&mut queue), vec![1]);
    }

    #[test]
    fn records_are_destroyed_in_fifo_order() {
        let mut queue = RecordQueue::new();
        queue.push(handle_record(1));
        queue.push(handle_record(2));
        queue.push(handle_record(3));

        start_next(&mut queue);
        start_next(&mut queue);
        assert_eq!(start_next(&mut queue), vec![1, 2, 3]);
    }

    #[test]
    fn iterations_drain_oldest_first() {
        // Enqueue across iterations 0..4, then observe that drains come back
        // one whole iteration at a time, oldest first.
        let mut queue = RecordQueue::new();
        queue.push(handle_record(10));
        queue.push(handle_record(11));
        start_next(&mut queue);

        queue.push(handle_record(20));
        start_next(&mut queue);

        queue.push(handle_record(30));
        assert_eq!(start_next(&mut queue), vec![10, 11]);

        queue.push(handle_record(40));
        assert_eq!(start_next(&mut queue), vec![20]);
        assert_eq!(start_next(&mut queue), vec![30]);
        assert_eq!(start_next(&mut queue), vec![40]);
        assert!(start_next(&mut queue).is_empty());
    }

    #[test]
    fn shutdown_drain_reaches_the_open_iteration() {
        let mut queue = RecordQueue::new();
        queue.push(handle_record(1));
        start_next(&mut queue);
        // Record enqueued after the last separator, as mid-flight deletions
        // are at shutdown.
        queue.push(handle_record(2));

        let mut drained = Vec::new();
        loop {
            let (doomed, separator_found) = queue.pop_iteration();
            drained.extend(doomed.iter().map(raw_of));
            if !separator_found {
                break;
            }
        }
        assert_eq!(drained, vec![1, 2]);
        assert!(queue.records.is_empty());
    }
}
