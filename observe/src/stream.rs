use crate::cell::LatestCell;
use crate::error::{Error, ErrorKind};
use futures::{Stream, StreamExt};
use log::*;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Latest value of a swappable stream source.
///
/// The source is driven by a spawned Tokio task, so attaching one outside a
/// runtime fails with a `Configuration` error. Delivery is at-most-latest:
/// only the most recent value is kept, and values of a replaced source are
/// never observed after [`StreamAdapter::set_stream`] returns.
pub struct StreamAdapter<T> {
    cell: LatestCell<Option<T>>,
    receiver: watch::Receiver<Option<T>>,
    task: Option<JoinHandle<()>>,
}

impl<T> StreamAdapter<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// An adapter without a source; `current()` is `None`.
    pub fn new() -> Self {
        let cell = LatestCell::new(None);
        let receiver = cell.subscribe();
        Self {
            cell,
            receiver,
            task: None,
        }
    }

    pub fn with_stream(source: impl Stream<Item = T> + Send + 'static) -> Result<Self, Error> {
        let mut adapter = Self::new();
        adapter.set_stream(source)?;
        Ok(adapter)
    }

    /// Replace the source. The value resets to `None` until `source` yields.
    /// Outside a Tokio runtime nothing changes and an error is returned.
    pub fn set_stream(
        &mut self,
        source: impl Stream<Item = T> + Send + 'static,
    ) -> Result<(), Error> {
        let runtime = Handle::try_current().map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Configuration,
        })?;
        let writer = self.cell.next_epoch(None);
        self.abort();
        // The reset was requested by the caller, not pushed by a source.
        let _ = self.receiver.borrow_and_update();

        self.task = Some(runtime.spawn(async move {
            let mut source = Box::pin(source);
            while let Some(value) = source.next().await {
                if !writer.write(Some(value)) {
                    trace!("Stream source replaced, stopping");
                    return;
                }
            }
            trace!("Stream source ended");
        }));
        Ok(())
    }

    /// Detach the source and reset the value to `None`.
    pub fn clear(&mut self) {
        self.cell.close(None);
        self.abort();
        let _ = self.receiver.borrow_and_update();
    }

    pub fn current(&self) -> Option<T> {
        self.cell.get()
    }

    pub fn has_source(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Wait for the next value and return it.
    pub async fn changed(&mut self) -> Option<T> {
        // The cell owns the sender for as long as `self` lives.
        let _ = self.receiver.changed().await;
        self.receiver.borrow_and_update().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<T>> {
        self.cell.subscribe()
    }
}

impl<T> StreamAdapter<T> {
    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<T> Default for StreamAdapter<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for StreamAdapter<T> {
    fn drop(&mut self) {
        self.cell.close(None);
        self.abort();
    }
}
