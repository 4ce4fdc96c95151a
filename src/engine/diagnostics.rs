use crate::foundation::core::NodeId;
use crate::foundation::error::FxError;

/// User-facing reporting collaborator (dialogs, node error badges).
pub trait Diagnostics: Send + Sync {
    /// An image allocation of `bytes` failed while rendering `node`.
    fn allocation_failed(&self, node: NodeId, label: &str, bytes: u64);

    /// A render action of `node` failed; the node should show a persistent error state.
    fn node_error(&self, node: NodeId, label: &str, err: &FxError);
}

/// Default [`Diagnostics`]: everything goes to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn allocation_failed(&self, node: NodeId, label: &str, bytes: u64) {
        tracing::error!(
            node = node.0,
            label,
            bytes,
            "out of memory: unable to allocate image storage"
        );
    }

    fn node_error(&self, node: NodeId, label: &str, err: &FxError) {
        tracing::warn!(node = node.0, label, error = %err, "render action failed");
    }
}
