//! Router sink consumed by log endpoints.

/// Destination for records an endpoint forwards to other systems.
///
/// Forwarding is fire-and-forget: failures stay inside the router.
pub trait RouteSink {
    /// Route serialised `bytes` from `source_system_id` towards `target_system_id`.
    fn route(&mut self, bytes: &[u8], target_system_id: u8, source_system_id: u8);
}

impl<F> RouteSink for F
where
    F: FnMut(&[u8], u8, u8),
{
    fn route(&mut self, bytes: &[u8], target_system_id: u8, source_system_id: u8) {
        self(bytes, target_system_id, source_system_id)
    }
}
