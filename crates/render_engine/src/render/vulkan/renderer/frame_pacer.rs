//! Frame pacing bookkeeping
//!
//! Tracks the monotonic frame and step counters, derives the
//! double-buffering slot indices from them, and folds the
//! acquire/present surface reports into a single recreation flag. Kept free
//! of Vulkan calls so the pacing rules are testable on their own.

use crate::render::vulkan::double_buffered::{
    FrameDoubleBufferingState, StepDoubleBufferingState,
};

/// Surface health reported by image acquisition or presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStatus {
    /// The swapchain still matches the surface
    Optimal,
    /// Presentation succeeded but the swapchain no longer matches exactly
    Suboptimal,
    /// The swapchain can no longer be used with the surface
    OutOfDate,
}

/// What to do about the swapchain before acquiring the next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecreationDecision {
    /// Swapchain is healthy
    NotNeeded,
    /// Recreation is pending but the window has zero extent; poll again
    /// next frame instead of building an invalid swapchain
    Deferred,
    /// Rebuild the swapchain now
    Recreate,
}

/// Pure pacing state of the frame driver.
#[derive(Debug)]
pub struct FramePacer {
    frame_index: u64,
    step_index: u64,
    frame_state: FrameDoubleBufferingState,
    step_state: StepDoubleBufferingState,
    recreation_requested: bool,
    window_extent: (u32, u32),
}

impl FramePacer {
    /// Starts at frame and step zero with the given drawable size.
    pub fn new(window_extent: (u32, u32)) -> Self {
        Self {
            frame_index: 0,
            step_index: 0,
            frame_state: FrameDoubleBufferingState::new(),
            step_state: StepDoubleBufferingState::new(),
            recreation_requested: false,
            window_extent,
        }
    }

    /// Buffering state for frame-scoped resources.
    pub fn frame_state(&self) -> &FrameDoubleBufferingState {
        &self.frame_state
    }

    /// Buffering state for step-scoped resources.
    pub fn step_state(&self) -> &StepDoubleBufferingState {
        &self.step_state
    }

    /// Number of frames finished since startup.
    pub fn frame_number(&self) -> u64 {
        self.frame_index
    }

    /// Number of simulation steps finished since startup.
    pub fn step_number(&self) -> u64 {
        self.step_index
    }

    /// Advances the frame counter and re-derives the frame slot indices.
    /// Called exactly once per rendered frame, after presentation.
    pub fn advance_frame(&mut self) {
        self.frame_index += 1;
        self.frame_state.set_total_index(self.frame_index);
    }

    /// Advances the step counter and re-derives the step slot indices.
    pub fn advance_step(&mut self) {
        self.step_index += 1;
        self.step_state.set_total_index(self.step_index);
    }

    /// Records the new drawable size and schedules recreation.
    pub fn notify_resize(&mut self, width: u32, height: u32) {
        self.window_extent = (width, height);
        self.recreation_requested = true;
    }

    /// Schedules swapchain recreation for the next frame.
    pub fn request_recreation(&mut self) {
        self.recreation_requested = true;
    }

    /// Last drawable size reported by the windowing layer.
    pub fn window_extent(&self) -> (u32, u32) {
        self.window_extent
    }

    /// True while the window is minimized (zero drawable extent).
    pub fn is_minimized(&self) -> bool {
        self.window_extent.0 == 0 || self.window_extent.1 == 0
    }

    /// Resolves the pending recreation request against the window state.
    pub fn recreation_decision(&self) -> RecreationDecision {
        if !self.recreation_requested {
            RecreationDecision::NotNeeded
        } else if self.is_minimized() {
            RecreationDecision::Deferred
        } else {
            RecreationDecision::Recreate
        }
    }

    /// Clears the request after a successful recreation.
    pub fn clear_recreation_request(&mut self) {
        self.recreation_requested = false;
    }

    /// Folds the acquisition report into the pacing state. Returns whether
    /// the frame may proceed: an out-of-date surface skips the frame and
    /// retries after recreation, a suboptimal one finishes the frame first.
    pub fn handle_acquire_status(&mut self, status: SurfaceStatus) -> bool {
        match status {
            SurfaceStatus::Optimal => true,
            SurfaceStatus::Suboptimal => {
                self.recreation_requested = true;
                true
            }
            SurfaceStatus::OutOfDate => {
                self.recreation_requested = true;
                false
            }
        }
    }

    /// Folds the presentation report into the pacing state.
    pub fn handle_present_status(&mut self, status: SurfaceStatus) {
        if status != SurfaceStatus::Optimal {
            self.recreation_requested = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::double_buffered::MAX_FRAMES_IN_FLIGHT;

    #[test]
    fn frame_slots_alternate_with_the_counter() {
        let mut pacer = FramePacer::new((800, 600));
        let first_slot = pacer.frame_state().write_index();

        pacer.advance_frame();
        assert_ne!(pacer.frame_state().write_index(), first_slot);

        // The slot comes back around after exactly MAX_FRAMES_IN_FLIGHT
        // frames, when its fence has been waited on again.
        for _ in 1..MAX_FRAMES_IN_FLIGHT {
            pacer.advance_frame();
        }
        assert_eq!(pacer.frame_state().write_index(), first_slot);
    }

    #[test]
    fn step_timeline_is_independent() {
        let mut pacer = FramePacer::new((800, 600));
        pacer.advance_frame();
        pacer.advance_frame();
        pacer.advance_step();

        assert_eq!(pacer.frame_number(), 2);
        assert_eq!(pacer.step_number(), 1);
        assert_eq!(pacer.step_state().write_index(), 1);
    }

    #[test]
    fn minimized_window_defers_recreation_indefinitely() {
        let mut pacer = FramePacer::new((800, 600));
        pacer.notify_resize(0, 0);

        // Polling the decision repeatedly while minimized neither clears the
        // request nor asks for an invalid zero-extent swapchain.
        for _ in 0..4 {
            assert_eq!(pacer.recreation_decision(), RecreationDecision::Deferred);
        }

        pacer.notify_resize(1024, 768);
        assert_eq!(pacer.recreation_decision(), RecreationDecision::Recreate);
        pacer.clear_recreation_request();
        assert_eq!(pacer.recreation_decision(), RecreationDecision::NotNeeded);
    }

    #[test]
    fn suboptimal_acquire_finishes_the_frame_then_recreates_once() {
        let mut pacer = FramePacer::new((800, 600));

        // Acquire reports suboptimal: the frame still completes.
        assert!(pacer.handle_acquire_status(SurfaceStatus::Suboptimal));
        pacer.handle_present_status(SurfaceStatus::Optimal);
        pacer.advance_frame();

        // Exactly one recreation before the next acquire.
        assert_eq!(pacer.recreation_decision(), RecreationDecision::Recreate);
        pacer.clear_recreation_request();

        assert!(pacer.handle_acquire_status(SurfaceStatus::Optimal));
        assert_eq!(pacer.recreation_decision(), RecreationDecision::NotNeeded);
    }

    #[test]
    fn out_of_date_acquire_skips_the_frame() {
        let mut pacer = FramePacer::new((800, 600));

        assert!(!pacer.handle_acquire_status(SurfaceStatus::OutOfDate));
        assert_eq!(pacer.recreation_decision(), RecreationDecision::Recreate);
    }

    #[test]
    fn stale_present_schedules_recreation() {
        let mut pacer = FramePacer::new((800, 600));
        pacer.handle_present_status(SurfaceStatus::Suboptimal);
        assert_eq!(pacer.recreation_decision(), RecreationDecision::Recreate);

        pacer.clear_recreation_request();
        pacer.handle_present_status(SurfaceStatus::OutOfDate);
        assert_eq!(pacer.recreation_decision(), RecreationDecision::Recreate);
    }
}
