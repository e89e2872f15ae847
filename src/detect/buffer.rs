//! Ownership wrapper for engine-produced result containers.
//!
//! The engine hands back one container per detection call. The container lives in
//! engine memory and must be freed explicitly. `NativeBuffer` owns it, frees it at
//! most once, and only ever hands out copies of its contents.

use std::sync::{Mutex, MutexGuard};

use crate::detect::result::PoseData;

/// Engine-side storage behind a `NativeBuffer`.
///
/// Implemented by engine backends. `free` is called at most once per container.
pub trait NativeContainer: Send {
    /// Copy the datum collection out of the container. `None` when it cannot be read.
    fn read(&self) -> Option<Vec<PoseData>>;

    /// Free the engine-side storage.
    fn free(&mut self);
}

/// Outcome of reading a buffer.
#[derive(Debug)]
pub enum BufferRead {
    Data(Vec<PoseData>),
    /// The read succeeded but the engine produced no datum.
    Empty,
    /// The container could not be read, or was already released.
    Unavailable,
}

pub struct NativeBuffer {
    container: Box<dyn NativeContainer>,
    released: bool,
}

impl NativeBuffer {
    pub fn new<C: NativeContainer + 'static>(container: C) -> Self {
        Self {
            container: Box::new(container),
            released: false,
        }
    }

    pub fn try_get(&self) -> BufferRead {
        if self.released {
            return BufferRead::Unavailable;
        }
        match self.container.read() {
            None => BufferRead::Unavailable,
            Some(data) if data.is_empty() => BufferRead::Empty,
            Some(data) => BufferRead::Data(data),
        }
    }

    /// Free the container. Further calls are no-ops.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.container.free();
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for NativeBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

/// Holds the buffer behind the most recent result of a detector.
///
/// Shared between the production thread, which replaces it per frame, and the
/// consumer side, which releases it once a result has been read.
#[derive(Default)]
pub(crate) struct BufferSlot {
    current: Mutex<Option<NativeBuffer>>,
}

impl BufferSlot {
    /// Store `buffer`, releasing whatever was held before.
    pub(crate) fn replace(&self, buffer: NativeBuffer) {
        let previous = self.lock().replace(buffer);
        if let Some(mut previous) = previous {
            previous.release();
        }
    }

    pub(crate) fn release(&self) {
        let current = self.lock().take();
        if let Some(mut buffer) = current {
            buffer.release();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<NativeBuffer>> {
        // A poisoned slot still holds a buffer that has to be freed.
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingContainer {
        contents: Option<Vec<PoseData>>,
        frees: Arc<AtomicUsize>,
    }

    impl NativeContainer for CountingContainer {
        fn read(&self) -> Option<Vec<PoseData>> {
            self.contents.clone()
        }

        fn free(&mut self) {
            self.frees.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn buffer(contents: Option<Vec<PoseData>>) -> (NativeBuffer, Arc<AtomicUsize>) {
        let frees = Arc::new(AtomicUsize::new(0));
        let buffer = NativeBuffer::new(CountingContainer {
            contents,
            frees: frees.clone(),
        });
        (buffer, frees)
    }

    #[test]
    fn release_twice_frees_once() {
        let (mut buf, frees) = buffer(Some(vec![PoseData::default()]));
        buf.release();
        buf.release();
        assert!(buf.is_released());
        assert_eq!(frees.load(Ordering::SeqCst), 1);
        drop(buf);
        assert_eq!(frees.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases() {
        let (buf, frees) = buffer(None);
        drop(buf);
        assert_eq!(frees.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_is_distinct_from_unavailable() {
        let (empty, _) = buffer(Some(Vec::new()));
        assert!(matches!(empty.try_get(), BufferRead::Empty));

        let (broken, _) = buffer(None);
        assert!(matches!(broken.try_get(), BufferRead::Unavailable));

        let (full, _) = buffer(Some(vec![PoseData::default()]));
        assert!(matches!(full.try_get(), BufferRead::Data(ref d) if d.len() == 1));
    }

    #[test]
    fn released_buffer_reads_unavailable() {
        let (mut buf, _) = buffer(Some(vec![PoseData::default()]));
        buf.release();
        assert!(matches!(buf.try_get(), BufferRead::Unavailable));
    }

    #[test]
    fn slot_releases_previous_on_replace() {
        let slot = BufferSlot::default();
        let (first, first_frees) = buffer(Some(Vec::new()));
        let (second, second_frees) = buffer(Some(Vec::new()));

        slot.replace(first);
        assert_eq!(first_frees.load(Ordering::SeqCst), 0);
        slot.replace(second);
        assert_eq!(first_frees.load(Ordering::SeqCst), 1);

        slot.release();
        slot.release();
        assert_eq!(second_frees.load(Ordering::SeqCst), 1);
    }
}
