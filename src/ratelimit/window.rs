//! Fixed-window boundary arithmetic.
//!
//! Every client shares the same grid of boundaries for a given duration:
//! windows of `d` seconds end at `d, 2d, 3d, ...` seconds past the epoch.
//! A client may therefore spend a full budget just before a boundary and a
//! second full budget just after it.

/// Epoch second at which the window containing `now` ends.
///
/// `duration_secs` must be non-zero; tier validation guarantees this for
/// configured tiers.
pub fn window_end(now_secs: u64, duration_secs: u64) -> u64 {
    (now_secs / duration_secs) * duration_secs + duration_secs
}

/// Seconds left until the window containing `now` ends. Never zero.
pub fn seconds_until_reset(now_secs: u64, duration_secs: u64) -> u64 {
    window_end(now_secs, duration_secs) - now_secs
}
