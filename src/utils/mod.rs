// ============================================================================
// Utilities Module
// Thread placement helpers for the matching thread
// ============================================================================

mod affinity;

pub(crate) use affinity::pin_matching_thread;
