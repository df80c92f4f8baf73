//! `async`/`await` support for pledges.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::dispatch::{self, Reaction};
use crate::{Pledge, Reason, queue};

/// A `Future` that completes with the outcome of a pledge.
///
/// Created by awaiting a [`Pledge`] (via [`IntoFuture`]). Creating it counts as attaching a
/// rejection continuation, so a rejection that is awaited is never reported as unhandled.
///
/// Polling runs the tasks in the current thread's settle queue, so awaiting a pledge on an
/// executor such as `futures::executor::block_on` makes progress without anyone calling
/// [`run_until_idle()`][crate::run_until_idle]. With a custom scheduler, the scheduler is
/// responsible for running the tasks.
///
/// # Example
///
/// ```rust
/// use std::future::IntoFuture;
///
/// use futures::executor::block_on;
/// use pledge::{Pledge, Resolution};
///
/// let answer =
///     Pledge::<u32, String>::fulfilled(6).then(|value| Ok(Resolution::Value(value * 7)));
///
/// assert_eq!(block_on(answer.into_future()), Ok(42));
/// ```
pub struct Settled<T, E> {
    pledge: Pledge<T, E>,
    waker: Rc<RefCell<Option<Waker>>>,

    /// Registered with the settle queue while pending. Dropping it unregisters it.
    driver: Option<Rc<Waker>>,
}

impl<T, E> Future for Settled<T, E>
where
    T: Clone + 'static,
    E: Reason,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        queue::run_until_idle();

        if let Some(outcome) = this.pledge.outcome() {
            this.driver = None;
            return Poll::Ready(outcome);
        }

        *this.waker.borrow_mut() = Some(cx.waker().clone());

        let driver = match this.driver.take() {
            Some(driver) if driver.will_wake(cx.waker()) => driver,
            _ => Rc::new(cx.waker().clone()),
        };
        queue::wake_on_enqueue(&driver);
        this.driver = Some(driver);

        Poll::Pending
    }
}

impl<T, E> IntoFuture for Pledge<T, E>
where
    T: Clone + 'static,
    E: Reason,
{
    type Output = Result<T, E>;
    type IntoFuture = Settled<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        let waker = Rc::new(RefCell::new(None));

        dispatch::dispatch(
            &self,
            Box::new(WakeOnSettle {
                waker: Rc::clone(&waker),
            }),
        );

        Settled {
            pledge: self,
            waker,
            driver: None,
        }
    }
}

impl<T, E> Debug for Settled<T, E> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settled")
            .field("pledge", &self.pledge)
            .finish_non_exhaustive()
    }
}

struct WakeOnSettle {
    waker: Rc<RefCell<Option<Waker>>>,
}

impl<T, E> Reaction<T, E> for WakeOnSettle {
    fn react(self: Box<Self>, _outcome: Result<T, E>) {
        let waker = self.waker.borrow_mut().take();

        if let Some(waker) = waker {
            waker.wake();
        }
    }
}
