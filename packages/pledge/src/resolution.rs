use std::fmt::{self, Debug};

use crate::{Pledge, Reject, Resolve};

/// A candidate outcome offered to a pending pledge, either by the `resolve` capability of a
/// starter routine or by the return value of a continuation.
///
/// The resolution procedure handles each kind differently:
///
/// * [`Value`][Self::Value] fulfills the pledge directly;
/// * [`Pledge`][Self::Pledge] makes the pledge adopt the eventual outcome of another pledge;
/// * [`Thenable`][Self::Thenable] hands a fresh pair of settlement capabilities to a foreign
///   deferred value, which settles the pledge through them.
#[expect(
    clippy::exhaustive_enums,
    reason = "the resolution procedure is defined over exactly these three kinds"
)]
pub enum Resolution<T, E> {
    /// A plain value that fulfills the pledge as-is.
    Value(T),

    /// Another pledge whose outcome the pledge adopts once it settles.
    Pledge(Pledge<T, E>),

    /// A foreign deferred value that is asked to settle the pledge.
    Thenable(Box<dyn Thenable<T, E>>),
}

impl<T, E> Resolution<T, E> {
    /// Wraps a closure as a foreign thenable.
    ///
    /// # Example
    ///
    /// ```rust
    /// use pledge::{Pledge, Resolution};
    ///
    /// let pledge = Pledge::<u32, String>::resolve(Resolution::thenable(|resolve, _reject| {
    ///     resolve.fulfill(7);
    ///     Ok(())
    /// }));
    ///
    /// assert_eq!(pledge.outcome(), Some(Ok(7)));
    /// ```
    #[must_use]
    pub fn thenable<F>(then: F) -> Self
    where
        F: FnOnce(Resolve<T, E>, Reject<T, E>) -> Result<(), E> + 'static,
    {
        Self::Thenable(Box::new(then))
    }
}

impl<T, E> From<T> for Resolution<T, E> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

impl<T, E> From<Pledge<T, E>> for Resolution<T, E> {
    fn from(pledge: Pledge<T, E>) -> Self {
        Self::Pledge(pledge)
    }
}

impl<T, E> Debug for Resolution<T, E>
where
    T: Debug,
{
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Pledge(pledge) => f.debug_tuple("Pledge").field(pledge).finish(),
            Self::Thenable(_) => f.debug_tuple("Thenable").finish_non_exhaustive(),
        }
    }
}

/// A deferred value from outside this crate that can settle a pledge.
///
/// When a pledge is resolved with a thenable, the thenable is invoked immediately with a pair
/// of capabilities bound to that pledge. Only the first call to either capability has any
/// effect. If the thenable returns an error or panics before calling either capability, the
/// pledge is rejected with that error.
///
/// Closures with the matching signature implement this trait.
pub trait Thenable<T, E> {
    /// Arranges for the pledge behind `resolve` and `reject` to be settled.
    ///
    /// # Errors
    ///
    /// An error return rejects the pledge, unless a capability was already called.
    fn then(self: Box<Self>, resolve: Resolve<T, E>, reject: Reject<T, E>) -> Result<(), E>;
}

impl<T, E, F> Thenable<T, E> for F
where
    F: FnOnce(Resolve<T, E>, Reject<T, E>) -> Result<(), E>,
{
    fn then(self: Box<Self>, resolve: Resolve<T, E>, reject: Reject<T, E>) -> Result<(), E> {
        (*self)(resolve, reject)
    }
}
