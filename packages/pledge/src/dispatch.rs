//! Delivers the outcome of a settled pledge to its continuations.
//!
//! A continuation registered on a pending pledge waits in that pledge's waiter list. Once the
//! pledge is settled, every continuation is handed to the scheduler, which runs it and feeds
//! its result into the resolution procedure of the downstream pledge created by `then()`.

use std::panic::{self, AssertUnwindSafe};

use tracing::debug;

use crate::pledge::{Link, State};
use crate::{Error, Pledge, Reason, Resolution, hooks, resolver};

/// A continuation supplied to `then()` and friends.
pub(crate) type Continuation<I, U, E> = Box<dyn FnOnce(I) -> Result<Resolution<U, E>, E>>;

/// Something that wants to observe the outcome of a pledge once it is settled.
pub(crate) trait Reaction<T, E> {
    /// Called from a scheduled task with the outcome of the pledge.
    fn react(self: Box<Self>, outcome: Result<T, E>);

    /// Gives up the reaction without running it, handing back the pledge it would have
    /// settled so that a dropped chain can be unlinked iteratively.
    fn detach(self: Box<Self>) -> Option<Box<dyn Link>> {
        None
    }
}

/// What to do with the value of a fulfilled pledge.
pub(crate) enum OnFulfilled<T, U, E> {
    /// No continuation was supplied; the value is passed on to the downstream pledge.
    Forward(fn(T) -> U),

    Call(Continuation<T, U, E>),
}

/// A pair of continuations and the pledge that receives their result.
pub(crate) struct Deferred<T, U, E> {
    on_fulfilled: OnFulfilled<T, U, E>,
    on_rejected: Option<Continuation<E, U, E>>,
    downstream: Pledge<U, E>,
}

impl<T, U, E> Deferred<T, U, E> {
    pub(crate) fn new(
        on_fulfilled: OnFulfilled<T, U, E>,
        on_rejected: Option<Continuation<E, U, E>>,
        downstream: Pledge<U, E>,
    ) -> Self {
        Self {
            on_fulfilled,
            on_rejected,
            downstream,
        }
    }
}

impl<T, U, E> Reaction<T, E> for Deferred<T, U, E>
where
    U: Clone + 'static,
    E: Reason,
{
    fn react(self: Box<Self>, outcome: Result<T, E>) {
        let Self {
            on_fulfilled,
            on_rejected,
            downstream,
        } = *self;

        match (outcome, on_fulfilled, on_rejected) {
            (Ok(value), OnFulfilled::Forward(forward), _) => {
                resolver::resolve(&downstream, Resolution::Value(forward(value)));
            }
            (Ok(value), OnFulfilled::Call(continuation), _) => {
                invoke(&downstream, continuation, value);
            }
            (Err(reason), _, None) => resolver::reject(&downstream, reason),
            (Err(reason), _, Some(continuation)) => invoke(&downstream, continuation, reason),
        }
    }

    fn detach(self: Box<Self>) -> Option<Box<dyn Link>> {
        let Self { downstream, .. } = *self;
        Some(Box::new(downstream))
    }
}

/// Runs a continuation and settles `downstream` with whatever it returns, raises or panics.
fn invoke<I, U, E>(downstream: &Pledge<U, E>, continuation: Continuation<I, U, E>, input: I)
where
    U: Clone + 'static,
    E: Reason,
{
    match panic::catch_unwind(AssertUnwindSafe(move || continuation(input))) {
        Ok(Ok(resolution)) => resolver::resolve(downstream, resolution),
        Ok(Err(reason)) => resolver::reject(downstream, reason),
        Err(payload) => {
            let error = Error::from_panic(payload.as_ref());
            debug!(%error, "contained a panic in a pledge continuation");
            resolver::reject(downstream, E::from(error));
        }
    }
}

/// Registers `reaction` with `pledge`, or schedules it right away if `pledge` is settled.
///
/// Pledges that adopted another pledge are looked through, so the reaction always ends up with
/// the pledge at the end of the adoption chain.
pub(crate) fn dispatch<T, E>(pledge: &Pledge<T, E>, reaction: Box<dyn Reaction<T, E>>)
where
    T: Clone + 'static,
    E: Reason,
{
    let target = follow_adoption(pledge);

    let outcome = {
        let core = &mut *target.core.borrow_mut();

        let outcome = match &core.state {
            State::Pending => {
                core.waiters.push(reaction);
                return;
            }
            State::Fulfilled(value) => Ok(value.clone()),
            State::Rejected(reason) => Err(reason.clone()),
            State::Adopting(_) => unreachable!("adoption chains are followed to their end"),
        };

        core.handled = true;
        outcome
    };

    if !target.ptr_eq(pledge) {
        // The adopted pledge is settled, so the adopting pledge can stop delegating.
        pledge.core.borrow_mut().state = match &outcome {
            Ok(value) => State::Fulfilled(value.clone()),
            Err(reason) => State::Rejected(reason.clone()),
        };
    }

    hooks::schedule(Box::new(move || reaction.react(outcome)));
}

/// Returns the pledge at the end of the adoption chain starting at `pledge`.
pub(crate) fn follow_adoption<T, E>(pledge: &Pledge<T, E>) -> Pledge<T, E> {
    let mut current = pledge.clone();

    loop {
        let next = match &current.core.borrow().state {
            State::Adopting(next) => Some(next.clone()),
            _ => None,
        };

        match next {
            Some(next) => current = next,
            None => return current,
        }
    }
}
