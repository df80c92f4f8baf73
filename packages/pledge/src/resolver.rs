//! The resolution procedure: decides how a candidate outcome settles a pending pledge.
//!
//! * A pledge offered to itself (directly or through its adoption chain) is rejected with
//!   [`Error::SelfResolution`].
//! * Another pledge is adopted: this pledge's outcome becomes whatever the other pledge's
//!   outcome eventually is.
//! * A foreign thenable is invoked with a fresh pair of first-call-wins capabilities.
//! * Anything else fulfills the pledge.
//!
//! Rejection reasons are never unwrapped.

use std::mem;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, trace};

use crate::dispatch;
use crate::pledge::State;
use crate::{Error, Pledge, Reason, Reject, Resolution, Resolve, capabilities, hooks};

/// Runs a starter routine (or the `then` of a foreign thenable) against `pledge`.
///
/// An error or panic from `starter` rejects the pledge unless one of the capabilities was
/// already called.
pub(crate) fn run_starter<T, E, F>(pledge: &Pledge<T, E>, starter: F)
where
    T: Clone + 'static,
    E: Reason,
    F: FnOnce(Resolve<T, E>, Reject<T, E>) -> Result<(), E>,
{
    let (resolve, reject) = capabilities::bind(pledge);
    let fallback = reject.clone();

    let reason = match panic::catch_unwind(AssertUnwindSafe(move || starter(resolve, reject))) {
        Ok(Ok(())) => return,
        Ok(Err(reason)) => reason,
        Err(payload) => {
            let error = Error::from_panic(payload.as_ref());
            debug!(%error, "contained a panic while starting a pledge");
            E::from(error)
        }
    };

    fallback.reject(reason);
}

/// Settles `pledge` according to `resolution`.
pub(crate) fn resolve<T, E>(pledge: &Pledge<T, E>, resolution: Resolution<T, E>)
where
    T: Clone + 'static,
    E: Reason,
{
    match resolution {
        Resolution::Pledge(candidate) => {
            // Every pledge in an adoption chain except the last one is adopting, while `pledge`
            // is still pending. A chain that leads back to `pledge` therefore ends at it.
            let end = dispatch::follow_adoption(&candidate);

            if end.ptr_eq(pledge) {
                reject(pledge, E::from(Error::SelfResolution));
                return;
            }

            // Adopting the end of the chain keeps chains that are built head-first flat, so
            // each adoption walks only the links added after the candidate's own adoption.
            trace!("pledge adopts the outcome of another pledge");
            transition(pledge, State::Adopting(end));
        }
        Resolution::Thenable(thenable) => {
            run_starter(pledge, move |resolve, reject| thenable.then(resolve, reject));
        }
        Resolution::Value(value) => transition(pledge, State::Fulfilled(value)),
    }
}

/// Rejects `pledge` with `reason`.
pub(crate) fn reject<T, E>(pledge: &Pledge<T, E>, reason: E)
where
    T: Clone + 'static,
    E: Reason,
{
    transition(pledge, State::Rejected(reason));
}

fn transition<T, E>(pledge: &Pledge<T, E>, next: State<T, E>)
where
    T: Clone + 'static,
    E: Reason,
{
    {
        let mut core = pledge.core.borrow_mut();
        debug_assert!(
            matches!(core.state, State::Pending),
            "a pledge can only leave the pending state once"
        );
        core.state = next;
    }

    finalize(pledge);
}

/// Hands every waiter of a pledge that just left the pending state to the dispatcher.
///
/// A rejection nobody is waiting for gets one scheduler tick of grace: if no rejection
/// continuation has been dispatched by then, the unhandled-rejection hook is told about it.
fn finalize<T, E>(pledge: &Pledge<T, E>)
where
    T: Clone + 'static,
    E: Reason,
{
    let (waiters, unobserved_rejection) = {
        let mut core = pledge.core.borrow_mut();
        let waiters = mem::take(&mut core.waiters);
        let unobserved_rejection =
            waiters.is_empty() && matches!(core.state, State::Rejected(_));

        (waiters, unobserved_rejection)
    };

    if unobserved_rejection {
        let checked = pledge.clone();
        hooks::schedule(Box::new(move || report_if_unhandled(&checked)));
    }

    for waiter in waiters {
        dispatch::dispatch(pledge, waiter);
    }
}

fn report_if_unhandled<T, E>(pledge: &Pledge<T, E>)
where
    E: Reason,
{
    let reason = {
        let core = pledge.core.borrow();

        match &core.state {
            State::Rejected(reason) if !core.handled => reason.clone(),
            _ => return,
        }
    };

    hooks::report_unhandled(&reason);
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;
    use crate::{PledgeState, run_until_idle, set_unhandled_rejection_hook};

    fn deferred() -> (Pledge<u32, String>, Resolve<u32, String>, Reject<u32, String>) {
        let stash: Rc<RefCell<Option<(Resolve<u32, String>, Reject<u32, String>)>>> =
            Rc::default();

        let pledge = Pledge::new({
            let stash = Rc::clone(&stash);
            move |resolve, reject| {
                *stash.borrow_mut() = Some((resolve, reject));
                Ok(())
            }
        });

        let (resolve, reject) = stash.borrow_mut().take().unwrap();
        (pledge, resolve, reject)
    }

    fn record_unhandled() -> Rc<RefCell<Vec<String>>> {
        let reported = Rc::new(RefCell::new(Vec::new()));

        set_unhandled_rejection_hook({
            let reported = Rc::clone(&reported);
            move |reason| reported.borrow_mut().push(format!("{reason:?}"))
        });

        reported
    }

    #[test]
    fn self_resolution_rejects() {
        let _reported = record_unhandled();
        let (pledge, resolve, _) = deferred();

        resolve.resolve(pledge.clone());

        assert_eq!(
            pledge.outcome(),
            Some(Err(Error::SelfResolution.to_string()))
        );
    }

    #[test]
    fn adoption_cycle_is_self_resolution() {
        let _reported = record_unhandled();
        let (first, resolve_first, _) = deferred();
        let (second, resolve_second, _) = deferred();

        resolve_first.resolve(second.clone());
        resolve_second.resolve(first.clone());

        assert_eq!(
            second.outcome(),
            Some(Err(Error::SelfResolution.to_string()))
        );
        assert_eq!(
            first.outcome(),
            Some(Err(Error::SelfResolution.to_string()))
        );
    }

    #[test]
    fn adopts_pending_pledge_outcome() {
        let (inner, resolve_inner, _) = deferred();
        let (outer, resolve_outer, _) = deferred();

        resolve_outer.resolve(inner);
        assert_eq!(outer.state(), PledgeState::Pending);

        resolve_inner.fulfill(42);
        run_until_idle();

        assert_eq!(outer.outcome(), Some(Ok(42)));
    }

    #[test]
    fn adopts_through_deep_chain() {
        let links: Vec<_> = (0..100_000).map(|_| deferred()).collect();

        // Each pledge adopts the next one while that one is still pending, so the chain is as
        // deep as there are pledges.
        for pair in links.windows(2) {
            let [(_, resolve, _), (next, _, _)] = pair else {
                unreachable!("windows(2) yields pairs");
            };
            resolve.resolve(next.clone());
        }

        let (head, _, _) = links.first().unwrap();
        let (tail, resolve_tail, _) = links.last().unwrap();

        assert!(dispatch::follow_adoption(head).ptr_eq(tail));

        let observed = head.then(|value| Ok(Resolution::Value(value + 1)));

        resolve_tail.fulfill(1);
        run_until_idle();

        assert_eq!(head.outcome(), Some(Ok(1)));
        assert_eq!(observed.outcome(), Some(Ok(2)));
    }

    #[test]
    fn adopting_an_adopting_pledge_skips_to_end_of_chain() {
        let (root, resolve_root, _) = deferred();

        let mut head = root.clone();
        for _ in 0..100_000 {
            let (next, resolve_next, _) = deferred();
            resolve_next.resolve(head);
            head = next;
        }

        assert!(matches!(&head.core.borrow().state, State::Adopting(end) if end.ptr_eq(&root)));

        resolve_root.fulfill(1);
        run_until_idle();

        assert_eq!(head.outcome(), Some(Ok(1)));
    }

    #[test]
    fn dropping_deep_adoption_chain_does_not_recurse() {
        let (head, resolve_head, _) = deferred();

        // The current end of the chain adopts a fresh pending pledge each time, so every link
        // is owned only by the link before it.
        let mut resolve_end = resolve_head;
        for _ in 0..100_000 {
            let (next, resolve_next, _) = deferred();
            resolve_end.resolve(next);
            resolve_end = resolve_next;
        }

        drop(resolve_end);
        drop(head);
    }

    #[test]
    fn thenable_fulfills() {
        let pledge = Pledge::<u32, String>::resolve(Resolution::thenable(|resolve, _| {
            resolve.fulfill(3);
            Ok(())
        }));

        assert_eq!(pledge.outcome(), Some(Ok(3)));
    }

    #[test]
    fn thenable_first_call_wins() {
        let pledge = Pledge::<u32, String>::resolve(Resolution::thenable(|resolve, reject| {
            reject.reject("first".to_string());
            resolve.fulfill(3);
            reject.reject("second".to_string());
            Err("third".to_string())
        }));
        let _handled = pledge.catch(|_| Ok(Resolution::Value(0)));

        assert_eq!(pledge.outcome(), Some(Err("first".to_string())));
    }

    #[test]
    fn thenable_error_before_settling_rejects() {
        let _reported = record_unhandled();
        let pledge = Pledge::<u32, String>::resolve(Resolution::thenable(|_, _| {
            Err("thenable failed".to_string())
        }));

        assert_eq!(pledge.outcome(), Some(Err("thenable failed".to_string())));
    }

    #[test]
    fn thenable_panic_rejects() {
        let _reported = record_unhandled();
        let pledge = Pledge::<u32, String>::resolve(Resolution::thenable(|_, _| {
            panic!("thenable exploded")
        }));

        let Some(Err(reason)) = pledge.outcome() else {
            panic!("expected a rejection");
        };
        assert!(reason.contains("thenable exploded"));
    }

    #[test]
    fn thenable_resolving_with_thenable_unwraps_again() {
        let pledge = Pledge::<u32, String>::resolve(Resolution::thenable(|resolve, _| {
            resolve.resolve(Resolution::thenable(|resolve, _| {
                resolve.fulfill(99);
                Ok(())
            }));
            Ok(())
        }));

        assert_eq!(pledge.outcome(), Some(Ok(99)));
    }

    #[test]
    fn thenable_settling_later_settles_pledge() {
        let stash: Rc<RefCell<Option<Resolve<u32, String>>>> = Rc::default();

        let pledge = Pledge::<u32, String>::resolve(Resolution::thenable({
            let stash = Rc::clone(&stash);
            move |resolve, _| {
                *stash.borrow_mut() = Some(resolve);
                Ok(())
            }
        }));

        assert_eq!(pledge.state(), PledgeState::Pending);

        stash.borrow().as_ref().unwrap().fulfill(5);
        assert_eq!(pledge.outcome(), Some(Ok(5)));
    }

    #[test]
    fn unhandled_rejection_reported_once_after_one_tick() {
        let reported = record_unhandled();

        let _pledge = Pledge::<u32, String>::reject("lonely".to_string());
        assert!(reported.borrow().is_empty());

        run_until_idle();
        run_until_idle();

        assert_eq!(*reported.borrow(), vec!["\"lonely\"".to_string()]);
    }

    #[test]
    fn rejection_handled_within_grace_tick_is_not_reported() {
        let reported = record_unhandled();

        let pledge = Pledge::<u32, String>::reject("caught".to_string());
        let _recovered = pledge.catch(|_| Ok(Resolution::Value(0)));

        run_until_idle();

        assert!(reported.borrow().is_empty());
    }

    #[test]
    fn rejection_with_waiters_is_not_checked() {
        let reported = record_unhandled();
        let (pledge, _, reject) = deferred();
        let seen = Rc::new(Cell::new(false));

        let _recovered = pledge.catch({
            let seen = Rc::clone(&seen);
            move |_| {
                seen.set(true);
                Ok(Resolution::Value(0))
            }
        });

        reject.reject("expected".to_string());
        run_until_idle();

        assert!(seen.get());
        assert!(reported.borrow().is_empty());
    }

    #[test]
    fn fulfillment_handler_alone_does_not_handle_rejection_at_end_of_chain() {
        let reported = record_unhandled();

        let _chained = Pledge::<u32, String>::reject("unobserved".to_string())
            .then(|value| Ok(Resolution::Value(value)));

        run_until_idle();

        // The root is marked handled by the dispatch; the pass-through at the end is not.
        assert_eq!(*reported.borrow(), vec!["\"unobserved\"".to_string()]);
    }
}
