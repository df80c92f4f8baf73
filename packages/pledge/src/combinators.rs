//! Combinators that compose many pledges into one.
//!
//! Both are built purely on the public chaining operations.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::{Pledge, Reason, Resolution, Resolve};

/// Returns a pledge that is fulfilled with the values of all `inputs`, in input order, once
/// every input is fulfilled. It is rejected with the first rejection reason among the inputs,
/// without waiting for the remaining inputs.
///
/// Inputs may be plain values, which count immediately, or pledges and foreign thenables,
/// which are unwrapped first. An empty input fulfills the returned pledge immediately with an
/// empty vector.
///
/// A pledge converts into a resolution of either its own value type or of the pledge type
/// itself, so call sites usually name `T` and `E` explicitly.
///
/// # Example
///
/// ```rust
/// use pledge::{Pledge, Resolution};
///
/// let combined = pledge::all::<u32, String, _>([
///     Resolution::Value(1),
///     Resolution::Pledge(Pledge::fulfilled(2)),
///     Resolution::Pledge(Pledge::fulfilled(1).then(|value| Ok(Resolution::Value(value + 2)))),
/// ]);
///
/// pledge::run_until_idle();
/// assert_eq!(combined.outcome(), Some(Ok(vec![1, 2, 3])));
/// ```
pub fn all<T, E, I>(inputs: I) -> Pledge<Vec<T>, E>
where
    T: Clone + 'static,
    E: Reason,
    I: IntoIterator,
    I::Item: Into<Resolution<T, E>>,
{
    let inputs: Vec<Resolution<T, E>> = inputs.into_iter().map(Into::into).collect();

    Pledge::new(move |resolve, reject| {
        if inputs.is_empty() {
            resolve.fulfill(Vec::new());
            return Ok(());
        }

        let collector = Rc::new(Collector {
            values: RefCell::new(inputs.iter().map(|_| None).collect()),
            remaining: Cell::new(inputs.len()),
            resolve,
        });

        for (index, input) in inputs.into_iter().enumerate() {
            let pledge = match input {
                Resolution::Value(value) => {
                    collector.record(index, value);
                    continue;
                }
                Resolution::Pledge(pledge) => pledge,
                thenable @ Resolution::Thenable(_) => Pledge::resolve(thenable),
            };

            let collector = Rc::clone(&collector);
            let reject = reject.clone();

            let _recorded = pledge.then_or_else(
                move |value| {
                    collector.record(index, value);
                    Ok(Resolution::Value(()))
                },
                move |reason| {
                    reject.reject(reason);
                    Ok(Resolution::Value(()))
                },
            );
        }

        Ok(())
    })
}

struct Collector<T, E> {
    values: RefCell<Vec<Option<T>>>,
    remaining: Cell<usize>,
    resolve: Resolve<Vec<T>, E>,
}

impl<T, E> Collector<T, E>
where
    T: Clone + 'static,
    E: Reason,
{
    fn record(&self, index: usize, value: T) {
        if let Some(slot) = self.values.borrow_mut().get_mut(index) {
            *slot = Some(value);
        }

        let remaining = self.remaining.get().saturating_sub(1);
        self.remaining.set(remaining);

        if remaining == 0 {
            let values = self.values.take().into_iter().flatten().collect();
            self.resolve.fulfill(values);
        }
    }
}

/// Returns a pledge that is settled like whichever of `inputs` settles first.
///
/// Later settlements of the remaining inputs are ignored. With no inputs, the returned pledge
/// stays pending forever.
///
/// # Example
///
/// ```rust
/// use pledge::Pledge;
///
/// let never = Pledge::<u32, String>::new(|_, _| Ok(()));
/// let winner = pledge::race([never, Pledge::fulfilled(7)]);
///
/// pledge::run_until_idle();
/// assert_eq!(winner.outcome(), Some(Ok(7)));
/// ```
pub fn race<T, E, I>(inputs: I) -> Pledge<T, E>
where
    T: Clone + 'static,
    E: Reason,
    I: IntoIterator<Item = Pledge<T, E>>,
{
    let inputs: Vec<Pledge<T, E>> = inputs.into_iter().collect();

    Pledge::new(move |resolve, reject| {
        for input in inputs {
            let resolve = resolve.clone();
            let reject = reject.clone();

            let _forwarded = input.then_or_else(
                move |value| {
                    resolve.fulfill(value);
                    Ok(Resolution::Value(()))
                },
                move |reason| {
                    reject.reject(reason);
                    Ok(Resolution::Value(()))
                },
            );
        }

        Ok(())
    })
}
