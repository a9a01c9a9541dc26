//! Messages the renderer sends back to the surface that owns it.

use crate::api::Health;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceMessage {
    /// The GPU health changed since the last report
    RendererHealth(Health),
}
