//! Streams and events.
//!
//! A stream is an ordered queue of device operations: ops issued on one
//! stream execute FIFO; ops on different streams are unordered unless an
//! event await connects them. Awaiting a stream resumes the caller only
//! after every previously issued op on that stream has completed.
//!
//! Each stream is backed by a dedicated executor thread standing in for the
//! hardware queue, so kernels launched on streams bound to different
//! devices run in parallel even though the host orchestrator is a single
//! cooperative thread.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use std::thread::JoinHandle;

use super::device;

enum Op {
    Exec(Box<dyn FnOnce() + Send>),
    Signal(Arc<EventState>),
}

#[derive(Default)]
struct EventState {
    inner: Mutex<EventInner>,
}

#[derive(Default)]
struct EventInner {
    complete: bool,
    waker: Option<Waker>,
}

impl EventState {
    fn complete(&self) {
        let waker = {
            let mut inner = self.inner.lock().unwrap();
            inner.complete = true;
            inner.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// Completion marker for all ops issued on a stream before it was recorded.
pub struct Event {
    state: Arc<EventState>,
}

impl Future for Event {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut inner = self.state.inner.lock().unwrap();
        if inner.complete {
            Poll::Ready(())
        } else {
            inner.waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

static NEXT_DEVICE: AtomicUsize = AtomicUsize::new(0);

pub struct Stream {
    device_id: usize,
    sender: Option<Sender<Op>>,
    worker: Option<JoinHandle<()>>,
}

impl Stream {
    /// Creates a stream on the next device in round-robin order.
    pub fn new() -> Self {
        let device_id = NEXT_DEVICE.fetch_add(1, Ordering::Relaxed) % device::num_devices();
        Self::on_device(device_id)
    }

    pub fn on_device(device_id: usize) -> Self {
        assert!(device_id < device::num_devices(), "no such device");
        let (sender, receiver) = mpsc::channel::<Op>();
        let worker = std::thread::Builder::new()
            .name(format!("device-{device_id}-stream"))
            .spawn(move || {
                while let Ok(op) = receiver.recv() {
                    match op {
                        Op::Exec(f) => f(),
                        Op::Signal(state) => state.complete(),
                    }
                }
            })
            .expect("failed to spawn stream executor");
        Self {
            device_id,
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    pub fn device_id(&self) -> usize {
        self.device_id
    }

    /// Enqueues an op. Returns immediately; the op runs after everything
    /// already issued on this stream.
    pub fn exec(&self, f: impl FnOnce() + Send + 'static) {
        self.sender
            .as_ref()
            .expect("stream is live until dropped")
            .send(Op::Exec(Box::new(f)))
            .expect("stream executor exited prematurely");
    }

    /// Records an event that completes once every op issued so far has run.
    pub fn record_event(&self) -> Event {
        let state = Arc::new(EventState::default());
        self.sender
            .as_ref()
            .expect("stream is live until dropped")
            .send(Op::Signal(Arc::clone(&state)))
            .expect("stream executor exited prematurely");
        Event { state }
    }
}

impl Default for Stream {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                // A panicking kernel is a fatal device error.
                std::process::abort();
            }
        }
    }
}

/// Suspends until every op issued on `stream` so far has completed.
pub async fn await_stream(stream: &Stream) {
    stream.record_event().await;
}
