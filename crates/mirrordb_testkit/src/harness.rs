//! Wiring harness: a synced collection over the in-memory server.

use crate::fixtures::draft;
use mirrordb_sync::{HttpTransport, InMemoryServer, LoopbackClient, SyncedCollection};
use std::ops::Deref;
use std::sync::Arc;

/// Base URL used by the harness; the host deliberately avoids the
/// string `/posts` so the loopback client's path extraction stays
/// unambiguous.
pub const TEST_BASE_URL: &str = "http://blog.test/api";

/// A synced collection wired to an [`InMemoryServer`] through the full
/// HTTP transport (JSON envelopes and all), with the server handle
/// kept for scripting failures and inspecting state.
pub struct TestCollection {
    /// The reference server behind the collection.
    pub server: Arc<InMemoryServer>,
    /// The collection under test.
    pub collection: SyncedCollection<HttpTransport<LoopbackClient>>,
}

impl TestCollection {
    /// Creates a harness over an empty server.
    #[must_use]
    pub fn new() -> Self {
        let server = Arc::new(InMemoryServer::new());
        let client = LoopbackClient::new(Arc::clone(&server));
        let transport = HttpTransport::new(TEST_BASE_URL, client);
        let collection = SyncedCollection::new(transport);
        Self { server, collection }
    }

    /// Creates a harness with `n` posts seeded server-side and pulled
    /// into the mirror.
    #[must_use]
    pub fn seeded(n: usize) -> Self {
        let harness = Self::new();
        let drafts: Vec<_> = (1..=n).map(|i| draft(&i.to_string())).collect();
        harness.server.seed(&drafts);
        harness
            .collection
            .refresh()
            .expect("seeding refresh should succeed");
        harness
    }
}

impl Default for TestCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for TestCollection {
    type Target = SyncedCollection<HttpTransport<LoopbackClient>>;

    fn deref(&self) -> &Self::Target {
        &self.collection
    }
}
