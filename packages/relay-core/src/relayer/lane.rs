use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Mutable state of one source→destination lane.
///
/// Ticks may run on different tasks, so every field is atomic and the
/// in-flight flag is claimed with compare-and-set.
#[derive(Debug)]
pub struct LaneState {
    watermark: AtomicU64,
    in_flight: AtomicBool,
    heartbeat_count: AtomicU64,
}

impl LaneState {
    pub fn new(start_watermark: u64) -> Self {
        Self {
            watermark: AtomicU64::new(start_watermark),
            in_flight: AtomicBool::new(false),
            heartbeat_count: AtomicU64::new(0),
        }
    }

    pub fn watermark(&self) -> u64 {
        self.watermark.load(Ordering::Acquire)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn heartbeat_count(&self) -> u64 {
        self.heartbeat_count.load(Ordering::Relaxed)
    }

    /// Claims the lane for one cycle. `None` if another cycle holds it.
    pub fn try_begin(&self) -> Option<CycleGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard { state: self })
    }

    /// Moves the watermark up to `height`; never moves it down.
    pub(crate) fn advance(&self, height: u64) -> u64 {
        let previous = self.watermark.fetch_max(height, Ordering::AcqRel);
        previous.max(height)
    }

    pub(crate) fn beat(&self) -> u64 {
        self.heartbeat_count.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Holds the lane's in-flight flag; releases it on drop.
#[derive(Debug)]
pub struct CycleGuard<'a> {
    state: &'a LaneState,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.state.in_flight.store(false, Ordering::Release);
    }
}
