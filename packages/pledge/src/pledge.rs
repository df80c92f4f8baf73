use std::cell::RefCell;
use std::convert;
use std::fmt::{self, Debug};
use std::mem;
use std::rc::Rc;

use crate::dispatch::{self, Continuation, Deferred, OnFulfilled, Reaction};
use crate::{Error, Reject, Resolution, Resolve, resolver};

/// Types that can be used as the rejection reason of a pledge.
///
/// The engine converts its own failures (see [`Error`]) into the reason type, so the reason
/// type must be constructible from [`Error`]. `String` qualifies out of the box.
///
/// This trait is implemented automatically for every qualifying type.
pub trait Reason: Clone + Debug + From<Error> + 'static {}

impl<E> Reason for E where E: Clone + Debug + From<Error> + 'static {}

/// The externally observable state of a pledge.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "a pledge is pending until it is fulfilled or rejected, nothing else"
)]
pub enum PledgeState {
    /// The pledge has not been settled yet.
    Pending,

    /// The pledge has been settled with a value.
    Fulfilled,

    /// The pledge has been settled with a rejection reason.
    Rejected,
}

/// The state machine behind a pledge.
///
/// Legal transitions are `Pending` to any other state and `Adopting` to `Fulfilled` or
/// `Rejected`. `Fulfilled` and `Rejected` are final.
pub(crate) enum State<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),

    /// The outcome of this pledge is delegated to another pledge.
    Adopting(Pledge<T, E>),
}

impl<T, E> State<T, E> {
    fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fulfilled(_) => "fulfilled",
            Self::Rejected(_) => "rejected",
            Self::Adopting(_) => "adopting",
        }
    }
}

pub(crate) struct Core<T, E> {
    pub(crate) state: State<T, E>,

    /// Set once a rejection continuation has been dispatched for this pledge, which is what
    /// silences the unhandled-rejection check.
    pub(crate) handled: bool,

    /// Continuations registered while the pledge was pending. Emptied exactly once, when the
    /// pledge leaves the pending state; nothing is added afterwards.
    pub(crate) waiters: Vec<Box<dyn Reaction<T, E>>>,
}

impl<T, E> Core<T, E> {
    /// Moves the links from this pledge to other pledges onto `links`, returning the adopted
    /// pledge separately. Only for cores that are being dropped.
    fn take_links(&mut self, links: &mut Vec<Box<dyn Link>>) -> Option<Pledge<T, E>> {
        links.extend(self.waiters.drain(..).filter_map(|waiter| waiter.detach()));

        match mem::replace(&mut self.state, State::Pending) {
            State::Adopting(adopted) => Some(adopted),
            _ => None,
        }
    }
}

impl<T, E> Drop for Core<T, E> {
    fn drop(&mut self) {
        // Pledges form long chains, both through adoption and through the downstream pledges
        // of pending continuations. They are unlinked one pledge at a time, so dropping the
        // head of a chain does not recurse once per link.
        let mut links = Vec::new();
        let mut adopted = self.take_links(&mut links);

        while let Some(next) = adopted.take() {
            if let Ok(cell) = Rc::try_unwrap(next.core) {
                adopted = cell.into_inner().take_links(&mut links);
            }
        }

        while let Some(link) = links.pop() {
            link.release(&mut links);
        }
    }
}

/// A type-erased handle to a pledge, released by [`Core`]'s drop loop.
pub(crate) trait Link {
    /// Drops this handle. If it was the last one, the links of the pledge are moved onto
    /// `links` instead of being dropped in place.
    fn release(self: Box<Self>, links: &mut Vec<Box<dyn Link>>);
}

impl<T, E> Link for Pledge<T, E>
where
    T: 'static,
    E: 'static,
{
    fn release(self: Box<Self>, links: &mut Vec<Box<dyn Link>>) {
        let Self { core } = *self;

        let Ok(cell) = Rc::try_unwrap(core) else {
            return;
        };

        if let Some(adopted) = cell.into_inner().take_links(links) {
            links.push(Box::new(adopted));
        }
    }
}

/// A value that is not available yet.
///
/// A pledge starts out pending and transitions exactly once, to fulfilled (with a value of
/// type `T`) or rejected (with a reason of type `E`). Continuations can be attached before or
/// after that transition with [`then()`][Self::then], [`then_or_else()`][Self::then_or_else]
/// and [`catch()`][Self::catch]. Continuations always run later, through the scheduler
/// configured in [`Hooks`][crate::Hooks], never synchronously from the call that registered
/// them or from the call that settled the pledge.
///
/// Cloning a pledge is cheap and yields another handle to the same pledge.
///
/// Pledges are single-threaded: they are neither `Send` nor `Sync`.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// use pledge::{Pledge, Resolution, Resolve};
///
/// let later: Rc<RefCell<Option<Resolve<u32, String>>>> = Rc::default();
///
/// let pledge = Pledge::new({
///     let later = Rc::clone(&later);
///     move |resolve, _reject| {
///         *later.borrow_mut() = Some(resolve);
///         Ok(())
///     }
/// });
///
/// let doubled = pledge.then(|value| Ok(Resolution::Value(value * 2)));
///
/// later.borrow().as_ref().unwrap().fulfill(21);
/// pledge::run_until_idle();
///
/// assert_eq!(doubled.outcome(), Some(Ok(42)));
/// ```
pub struct Pledge<T, E> {
    pub(crate) core: Rc<RefCell<Core<T, E>>>,
}

impl<T, E> Pledge<T, E>
where
    T: Clone + 'static,
    E: Reason,
{
    /// Creates a pledge and immediately runs `starter` with the capabilities to settle it.
    ///
    /// Only the first call to either capability has any effect. If `starter` returns an error
    /// or panics before calling either capability, the pledge is rejected with that error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use pledge::{Pledge, PledgeState};
    ///
    /// let pledge = Pledge::<u32, String>::new(|resolve, reject| {
    ///     resolve.fulfill(1);
    ///
    ///     // Ignored, the pledge is already fulfilled.
    ///     reject.reject("too late".to_string());
    ///     Ok(())
    /// });
    ///
    /// assert_eq!(pledge.state(), PledgeState::Fulfilled);
    /// ```
    pub fn new<F>(starter: F) -> Self
    where
        F: FnOnce(Resolve<T, E>, Reject<T, E>) -> Result<(), E>,
    {
        let pledge = Self::pending();
        resolver::run_starter(&pledge, starter);
        pledge
    }

    pub(crate) fn pending() -> Self {
        Self {
            core: Rc::new(RefCell::new(Core {
                state: State::Pending,
                handled: false,
                waiters: Vec::new(),
            })),
        }
    }

    /// Returns a pledge resolved with `value`.
    ///
    /// If `value` already is a pledge, that same pledge is returned. Foreign thenables are
    /// unwrapped by the normal resolution procedure.
    ///
    /// # Example
    ///
    /// ```rust
    /// use pledge::Pledge;
    ///
    /// let original = Pledge::<u32, String>::fulfilled(5);
    /// let same = Pledge::<u32, String>::resolve(original.clone());
    ///
    /// assert!(same.ptr_eq(&original));
    /// ```
    pub fn resolve(value: impl Into<Resolution<T, E>>) -> Self {
        match value.into() {
            Resolution::Pledge(pledge) => pledge,
            resolution => {
                let pledge = Self::pending();
                resolver::resolve(&pledge, resolution);
                pledge
            }
        }
    }

    /// Returns a pledge fulfilled with `value`.
    pub fn fulfilled(value: T) -> Self {
        Self::resolve(Resolution::Value(value))
    }

    /// Returns a pledge rejected with `reason`.
    ///
    /// Unless a rejection continuation is attached within one scheduler tick, the rejection is
    /// reported to the unhandled-rejection hook.
    pub fn reject(reason: E) -> Self {
        let pledge = Self::pending();
        resolver::reject(&pledge, reason);
        pledge
    }

    /// Attaches a continuation for the fulfilled case, returning a pledge for its result.
    ///
    /// If this pledge is rejected, the returned pledge is rejected with the same reason.
    ///
    /// # Example
    ///
    /// ```rust
    /// use pledge::{Pledge, Resolution};
    ///
    /// let length = Pledge::<&str, String>::fulfilled("four")
    ///     .then(|text| Ok(Resolution::Value(text.len())));
    ///
    /// pledge::run_until_idle();
    /// assert_eq!(length.outcome(), Some(Ok(4)));
    /// ```
    #[must_use = "then() returns a new pledge for the result of the continuation"]
    pub fn then<U, F>(&self, on_fulfilled: F) -> Pledge<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + 'static,
    {
        self.chain(OnFulfilled::Call(Box::new(on_fulfilled)), None)
    }

    /// Attaches one continuation for the fulfilled case and one for the rejected case,
    /// returning a pledge for the result of whichever one runs.
    ///
    /// # Example
    ///
    /// ```rust
    /// use pledge::{Pledge, Resolution};
    ///
    /// let recovered = Pledge::<u32, String>::reject("offline".to_string()).then_or_else(
    ///     |value| Ok(Resolution::Value(value.to_string())),
    ///     |reason| Ok(Resolution::Value(format!("fallback after {reason}"))),
    /// );
    ///
    /// pledge::run_until_idle();
    /// assert_eq!(
    ///     recovered.outcome(),
    ///     Some(Ok("fallback after offline".to_string()))
    /// );
    /// ```
    #[must_use = "then_or_else() returns a new pledge for the result of the continuations"]
    pub fn then_or_else<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Pledge<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + 'static,
        R: FnOnce(E) -> Result<Resolution<U, E>, E> + 'static,
    {
        self.chain(
            OnFulfilled::Call(Box::new(on_fulfilled)),
            Some(Box::new(on_rejected)),
        )
    }

    /// Attaches a continuation for the rejected case, returning a pledge for its result.
    ///
    /// If this pledge is fulfilled, the returned pledge is fulfilled with the same value.
    ///
    /// # Example
    ///
    /// ```rust
    /// use pledge::{Pledge, Resolution};
    ///
    /// let recovered = Pledge::<u32, String>::reject("offline".to_string())
    ///     .catch(|_reason| Ok(Resolution::Value(0)));
    ///
    /// pledge::run_until_idle();
    /// assert_eq!(recovered.outcome(), Some(Ok(0)));
    /// ```
    #[must_use = "catch() returns a new pledge for the recovered outcome"]
    pub fn catch<R>(&self, on_rejected: R) -> Self
    where
        R: FnOnce(E) -> Result<Resolution<T, E>, E> + 'static,
    {
        self.chain(
            OnFulfilled::Forward(convert::identity),
            Some(Box::new(on_rejected)),
        )
    }

    fn chain<U>(
        &self,
        on_fulfilled: OnFulfilled<T, U, E>,
        on_rejected: Option<Continuation<E, U, E>>,
    ) -> Pledge<U, E>
    where
        U: Clone + 'static,
    {
        let downstream = Pledge::pending();

        dispatch::dispatch(
            self,
            Box::new(Deferred::new(on_fulfilled, on_rejected, downstream.clone())),
        );

        downstream
    }

    /// The current state of the pledge.
    ///
    /// A pledge that has adopted another pledge reports the state of the adopted pledge.
    #[must_use]
    pub fn state(&self) -> PledgeState {
        let target = dispatch::follow_adoption(self);
        let core = target.core.borrow();

        match core.state {
            State::Pending | State::Adopting(_) => PledgeState::Pending,
            State::Fulfilled(_) => PledgeState::Fulfilled,
            State::Rejected(_) => PledgeState::Rejected,
        }
    }

    /// Whether the pledge has been fulfilled or rejected.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.state() != PledgeState::Pending
    }

    /// The value or rejection reason of the pledge, or `None` if it is still pending.
    ///
    /// Inspecting the outcome does not count as handling a rejection.
    #[must_use]
    pub fn outcome(&self) -> Option<Result<T, E>> {
        let target = dispatch::follow_adoption(self);
        let core = target.core.borrow();

        match &core.state {
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(reason) => Some(Err(reason.clone())),
            State::Pending | State::Adopting(_) => None,
        }
    }
}

impl<T, E> Pledge<T, E> {
    /// Whether both handles refer to the same pledge.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }
}

impl<T, E> Clone for Pledge<T, E> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<T, E> Debug for Pledge<T, E> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self
            .core
            .try_borrow()
            .map_or("<busy>", |core| core.state.name());

        f.debug_struct("Pledge")
            .field("state", &state)
            .finish_non_exhaustive()
    }
}
