//! The default scheduler: a thread-local FIFO queue of deferred tasks.
//!
//! Nothing drains the queue on its own. Tasks run when the owner of the thread calls
//! [`run_until_idle()`] or [`run_next()`], or when a pledge is awaited.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::mem;
use std::rc::{Rc, Weak};
use std::task::Waker;

use tracing::trace;

use crate::Task;

#[derive(Default)]
struct SettleQueue {
    tasks: VecDeque<Task>,

    /// Wakers of futures that are waiting for new tasks to show up in the queue. The futures
    /// own the wakers, so a dropped future is never woken.
    drivers: Vec<Weak<Waker>>,
}

thread_local! {
    static SETTLE_QUEUE: RefCell<SettleQueue> = RefCell::new(SettleQueue::default());
}

pub(crate) fn enqueue(task: Task) {
    let drivers = SETTLE_QUEUE.with_borrow_mut(|queue| {
        queue.tasks.push_back(task);
        mem::take(&mut queue.drivers)
    });

    for driver in drivers.iter().filter_map(Weak::upgrade) {
        driver.wake_by_ref();
    }
}

/// Registers a waker to be woken the next time a task is added to the queue, for as long as
/// the caller keeps it alive.
pub(crate) fn wake_on_enqueue(driver: &Rc<Waker>) {
    let driver = Rc::downgrade(driver);

    SETTLE_QUEUE.with_borrow_mut(|queue| {
        queue.drivers.retain(|registered| registered.strong_count() > 0);

        if !queue
            .drivers
            .iter()
            .any(|registered| Weak::ptr_eq(registered, &driver))
        {
            queue.drivers.push(driver);
        }
    });
}

/// Runs the oldest task in the current thread's settle queue, if there is one.
///
/// Returns `false` if the queue was empty.
///
/// # Example
///
/// ```rust
/// use pledge::{Pledge, Resolution};
///
/// let doubled =
///     Pledge::<u32, String>::fulfilled(21).then(|value| Ok(Resolution::Value(value * 2)));
///
/// assert!(pledge::run_next());
/// assert_eq!(doubled.outcome(), Some(Ok(42)));
/// assert!(!pledge::run_next());
/// ```
pub fn run_next() -> bool {
    // The task is popped before it runs, so it may schedule more tasks.
    let task = SETTLE_QUEUE.with_borrow_mut(|queue| queue.tasks.pop_front());

    match task {
        Some(task) => {
            task();
            true
        }
        None => false,
    }
}

/// Runs tasks from the current thread's settle queue until it is empty, including tasks that
/// are queued while running. Returns the number of tasks that were run.
///
/// # Example
///
/// ```rust
/// use pledge::{Pledge, Resolution};
///
/// let chained = Pledge::<u32, String>::fulfilled(1)
///     .then(|value| Ok(Resolution::Value(value + 1)))
///     .then(|value| Ok(Resolution::Value(value + 1)));
///
/// assert_eq!(pledge::run_until_idle(), 2);
/// assert_eq!(chained.outcome(), Some(Ok(3)));
/// ```
pub fn run_until_idle() -> usize {
    let mut ran: usize = 0;

    while run_next() {
        ran = ran.saturating_add(1);
    }

    if ran > 0 {
        trace!(ran, "settle queue is idle");
    }

    ran
}

/// Returns the number of tasks waiting in the current thread's settle queue.
#[must_use]
pub fn queued_tasks() -> usize {
    SETTLE_QUEUE.with_borrow(|queue| queue.tasks.len())
}
