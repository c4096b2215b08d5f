//! Link table: the physical transport connections the hub can reach the
//! mesh through.
//!
//! Addressing happens in the frame itself (each node matches its own id), so
//! outbound frames are written to every link in the table.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

/// One connected transport peer, e.g. a radio gateway.
#[async_trait]
pub trait MeshLink: Send + Sync {
    /// Physical address the link was discovered under.
    fn address(&self) -> &str;

    /// Write one encoded frame.
    async fn write(&self, frame: &[u8]) -> anyhow::Result<()>;
}

/// The link table: transports insert on discovery, the coordinator
/// broadcasts. Keyed on link address.
pub type LinkTable = Arc<DashMap<String, Arc<dyn MeshLink>>>;

/// Create a new empty link table.
pub fn new_link_table() -> LinkTable {
    Arc::new(DashMap::new())
}

/// Insert a freshly discovered link. Returns false if it replaced an
/// existing link with the same address.
pub fn register_link(table: &LinkTable, link: Arc<dyn MeshLink>) -> bool {
    let address = link.address().to_string();
    let replaced = table.insert(address.clone(), link).is_some();
    if replaced {
        tracing::info!(%address, "link reconnected");
    } else {
        tracing::info!(%address, "link connected");
    }
    !replaced
}
