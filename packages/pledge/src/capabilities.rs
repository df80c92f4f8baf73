//! The settlement capabilities handed to starter routines and foreign thenables.
//!
//! A `Resolve` and a `Reject` created together share one "done" flag: whichever is called first
//! wins and every later call to either of them (or their clones) is a no-op. This is what keeps
//! a pledge's state transition one-directional even when the calling code misbehaves.

use std::cell::Cell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use crate::{Pledge, Reason, Resolution, resolver};

/// The capability to resolve a pending pledge.
///
/// Clones share the first-call-wins guard with each other and with the matching [`Reject`].
pub struct Resolve<T, E> {
    pledge: Pledge<T, E>,
    done: Rc<Cell<bool>>,
}

/// The capability to reject a pending pledge.
///
/// Clones share the first-call-wins guard with each other and with the matching [`Resolve`].
pub struct Reject<T, E> {
    pledge: Pledge<T, E>,
    done: Rc<Cell<bool>>,
}

/// Creates a fresh pair of capabilities bound to `pledge`.
pub(crate) fn bind<T, E>(pledge: &Pledge<T, E>) -> (Resolve<T, E>, Reject<T, E>) {
    let done = Rc::new(Cell::new(false));

    (
        Resolve {
            pledge: pledge.clone(),
            done: Rc::clone(&done),
        },
        Reject {
            pledge: pledge.clone(),
            done,
        },
    )
}

impl<T, E> Resolve<T, E>
where
    T: Clone + 'static,
    E: Reason,
{
    /// Resolves the pledge with a value, another pledge or a foreign thenable.
    ///
    /// Does nothing if this capability or its matching [`Reject`] was already called.
    pub fn resolve(&self, resolution: impl Into<Resolution<T, E>>) {
        if self.done.replace(true) {
            return;
        }

        resolver::resolve(&self.pledge, resolution.into());
    }

    /// Fulfills the pledge with a plain value.
    ///
    /// Does nothing if this capability or its matching [`Reject`] was already called.
    pub fn fulfill(&self, value: T) {
        self.resolve(Resolution::Value(value));
    }

    /// Whether this capability or its matching [`Reject`] has already been called.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.get()
    }
}

impl<T, E> Reject<T, E>
where
    T: Clone + 'static,
    E: Reason,
{
    /// Rejects the pledge with a reason. The reason is never unwrapped.
    ///
    /// Does nothing if this capability or its matching [`Resolve`] was already called.
    pub fn reject(&self, reason: E) {
        if self.done.replace(true) {
            return;
        }

        resolver::reject(&self.pledge, reason);
    }

    /// Whether this capability or its matching [`Resolve`] has already been called.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.get()
    }
}

impl<T, E> Clone for Resolve<T, E> {
    fn clone(&self) -> Self {
        Self {
            pledge: self.pledge.clone(),
            done: Rc::clone(&self.done),
        }
    }
}

impl<T, E> Clone for Reject<T, E> {
    fn clone(&self) -> Self {
        Self {
            pledge: self.pledge.clone(),
            done: Rc::clone(&self.done),
        }
    }
}

impl<T, E> Debug for Resolve<T, E> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolve")
            .field("pledge", &self.pledge)
            .field("done", &self.done.get())
            .finish()
    }
}

impl<T, E> Debug for Reject<T, E> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reject")
            .field("pledge", &self.pledge)
            .field("done", &self.done.get())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::PledgeState;

    assert_not_impl_any!(Resolve<u32, String>: Send, Sync);
    assert_not_impl_any!(Reject<u32, String>: Send, Sync);

    #[test]
    fn first_fulfill_wins() {
        let pledge = Pledge::<u32, String>::pending();
        let (resolve, reject) = bind(&pledge);

        resolve.fulfill(1);
        resolve.fulfill(2);
        reject.reject("late".to_string());

        assert_eq!(pledge.outcome(), Some(Ok(1)));
    }

    #[test]
    fn first_reject_wins() {
        let pledge = Pledge::<u32, String>::pending();
        let (resolve, reject) = bind(&pledge);

        reject.reject("first".to_string());
        resolve.fulfill(2);
        reject.reject("second".to_string());

        assert_eq!(pledge.outcome(), Some(Err("first".to_string())));
    }

    #[test]
    fn clones_share_guard() {
        let pledge = Pledge::<u32, String>::pending();
        let (resolve, reject) = bind(&pledge);
        let resolve_clone = resolve.clone();
        let reject_clone = reject.clone();

        assert!(!resolve_clone.is_done());

        reject_clone.reject("clone".to_string());

        assert!(resolve.is_done());
        assert!(reject.is_done());

        resolve.fulfill(9);
        assert_eq!(pledge.state(), PledgeState::Rejected);
    }

    #[test]
    fn separate_bindings_have_separate_guards() {
        let first = Pledge::<u32, String>::pending();
        let second = Pledge::<u32, String>::pending();

        let (resolve_first, _) = bind(&first);
        let (resolve_second, _) = bind(&second);

        resolve_first.fulfill(1);
        assert!(!resolve_second.is_done());

        resolve_second.fulfill(2);
        assert_eq!(second.outcome(), Some(Ok(2)));
    }
}
