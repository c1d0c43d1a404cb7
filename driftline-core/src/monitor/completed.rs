use std::collections::VecDeque;

use driftline_model::FileObject;
use parking_lot::Mutex;

/// FIFO of completed records waiting for cleanup.
#[derive(Debug, Default)]
pub(crate) struct CompletedQueue {
    inner: Mutex<VecDeque<FileObject>>,
}

impl CompletedQueue {
    pub(crate) fn push(&self, object: FileObject) {
        self.inner.lock().push_back(object);
    }

    /// Takes every queued record at once.
    pub(crate) fn drain_all(&self) -> Vec<FileObject> {
        self.inner.lock().drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }
}
