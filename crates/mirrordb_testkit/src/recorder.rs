//! A subscriber that records every snapshot it is delivered.

use mirrordb_protocol::Post;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Records live-query snapshots for later assertions.
///
/// Clone-cheap: the callback and the recorder share the same buffer.
#[derive(Clone, Default)]
pub struct RecordingSubscriber {
    snapshots: Arc<Mutex<Vec<Vec<Post>>>>,
}

impl RecordingSubscriber {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a callback suitable for `subscribe`.
    pub fn callback(&self) -> impl Fn(&[Post]) + Send + Sync + 'static {
        let snapshots = Arc::clone(&self.snapshots);
        move |rows: &[Post]| snapshots.lock().push(rows.to_vec())
    }

    /// Returns every snapshot delivered so far, oldest first.
    #[must_use]
    pub fn snapshots(&self) -> Vec<Vec<Post>> {
        self.snapshots.lock().clone()
    }

    /// Returns the number of deliveries.
    #[must_use]
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.lock().len()
    }

    /// Returns the `i`-th delivered snapshot.
    #[must_use]
    pub fn snapshot(&self, i: usize) -> Option<Vec<Post>> {
        self.snapshots.lock().get(i).cloned()
    }

    /// Returns the most recent snapshot.
    #[must_use]
    pub fn latest(&self) -> Option<Vec<Post>> {
        self.snapshots.lock().last().cloned()
    }

    /// Returns the titles in the most recent snapshot.
    #[must_use]
    pub fn latest_titles(&self) -> Vec<String> {
        self.latest()
            .unwrap_or_default()
            .into_iter()
            .map(|p| p.title)
            .collect()
    }

    /// Polls until `n` snapshots have arrived or the timeout expires.
    ///
    /// Returns true if the count was reached. Useful when a background
    /// sync worker delivers the snapshot being waited for.
    pub fn wait_for_snapshots(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.snapshot_count() >= n {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

impl std::fmt::Debug for RecordingSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSubscriber")
            .field("snapshot_count", &self.snapshot_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_post;

    #[test]
    fn records_in_delivery_order() {
        let recorder = RecordingSubscriber::new();
        let callback = recorder.callback();

        callback(&[]);
        callback(&[sample_post(1)]);

        assert_eq!(recorder.snapshot_count(), 2);
        assert_eq!(recorder.snapshot(0).unwrap().len(), 0);
        assert_eq!(recorder.latest_titles(), vec!["Post 1"]);
    }

    #[test]
    fn wait_for_snapshots_times_out() {
        let recorder = RecordingSubscriber::new();
        assert!(!recorder.wait_for_snapshots(1, Duration::from_millis(10)));
    }
}
