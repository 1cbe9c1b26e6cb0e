//! Single-threaded cooperative scheduler.
//!
//! The host side of the pipeline is one thread driving suspendable tasks.
//! Tasks are ordinary futures; the only suspension points in the engine are
//! stream-event awaits and awaits on other tasks. There is no host-side
//! work stealing: device workers signal completion through the task's waker
//! and the scheduler thread parks in between.

use std::future::Future;
use std::pin::{pin, Pin};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::thread::{self, Thread};

struct ThreadWaker {
    thread: Thread,
}

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.thread.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.thread.unpark();
    }
}

/// Drives `future` to completion on the calling thread.
///
/// Futures handed to the scheduler must be driven to completion; dropping a
/// pipeline future mid-flight is unsupported (cancellation is outside the
/// runtime contract, and a fatal condition inside a task aborts the
/// process).
pub fn run<F: Future>(future: F) -> F::Output {
    let waker: Waker = Arc::new(ThreadWaker {
        thread: thread::current(),
    })
    .into();
    let mut cx = Context::from_waker(&waker);
    let mut future = pin!(future);
    loop {
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(value) => return value,
            Poll::Pending => thread::park(),
        }
    }
}

/// Future that polls a set of subtasks until every one of them is ready.
struct JoinAll<F: Future<Output = ()>> {
    pending: Vec<Option<Pin<Box<F>>>>,
}

impl<F: Future<Output = ()>> Future for JoinAll<F> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut all_ready = true;
        for slot in &mut self.pending {
            if let Some(task) = slot {
                match task.as_mut().poll(cx) {
                    Poll::Ready(()) => *slot = None,
                    Poll::Pending => all_ready = false,
                }
            }
        }
        if all_ready {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

/// Awaits all of `futures`, polling them concurrently.
pub async fn join_all<F, I>(futures: I)
where
    F: Future<Output = ()>,
    I: IntoIterator<Item = F>,
{
    JoinAll {
        pending: futures.into_iter().map(|f| Some(Box::pin(f))).collect(),
    }
    .await
}

/// Spawns one subtask per item and awaits them all. Subtasks progress
/// concurrently: while one chunk waits on its stream, another fills pinned
/// buffers or launches kernels.
pub async fn concurrent_for_each<T, F, Fut, I>(items: I, f: F)
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = ()>,
{
    join_all(items.into_iter().map(f)).await
}
