use std::sync::atomic::{AtomicU64, Ordering};

// starts at 1 so a bus with no request yet (0) never matches
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one impulse-response request. Later requests get larger ids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

// atomic so loader threads and the control thread can both hand out ids
pub fn next_request_id() -> RequestId {
    RequestId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
}
