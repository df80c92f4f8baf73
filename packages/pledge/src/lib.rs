#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Single-threaded deferred values with chained continuations.
//!
//! A [`Pledge<T, E>`] stands for a value of type `T` that may not exist yet. It starts out
//! pending and is settled exactly once, either fulfilled with a value or rejected with a reason
//! of type `E`. Continuations attached with [`then()`][Pledge::then],
//! [`then_or_else()`][Pledge::then_or_else] and [`catch()`][Pledge::catch] each produce a new
//! pledge that is settled with whatever the continuation returns.
//!
//! Continuations never run synchronously. Once a pledge is settled, its continuations are handed
//! to a scheduler as deferred tasks. By default, tasks go into a per-thread settle queue that is
//! drained by [`run_until_idle()`] or by awaiting a pledge. A different scheduler can be
//! installed via [`Hooks`].
//!
//! Resolving a pledge with another pledge (or with a foreign [`Thenable`]) makes it adopt the
//! outcome of the other one. A pledge can never adopt itself, directly or through a chain of
//! adoptions; such attempts reject it with [`Error::SelfResolution`].
//!
//! A rejection that nobody attaches a rejection continuation to within one scheduler tick is
//! reported to the unhandled-rejection hook, which logs a warning by default.
//!
//! # Example
//!
//! ```rust
//! use pledge::{Pledge, Resolution};
//!
//! let (sender, receiver) = std::sync::mpsc::channel();
//!
//! let answer = Pledge::<u32, String>::new(|resolve, _reject| {
//!     resolve.fulfill(20);
//!     Ok(())
//! });
//!
//! let _done = answer
//!     .then(|value| Ok(Resolution::Value(value + 1)))
//!     .then(|value| Ok(Resolution::Value(value * 2)))
//!     .then(move |value| {
//!         sender.send(value).unwrap();
//!         Ok(Resolution::Value(()))
//!     });
//!
//! // Nothing has run yet: continuations are deferred.
//! assert!(receiver.try_recv().is_err());
//!
//! pledge::run_until_idle();
//! assert_eq!(receiver.try_recv(), Ok(42));
//! ```
//!
//! # Async example
//!
//! ```rust
//! use std::future::IntoFuture;
//!
//! use futures::executor::block_on;
//! use pledge::{Pledge, Resolution};
//!
//! let recovered = Pledge::<u32, String>::reject("no value".to_string())
//!     .catch(|reason| Ok(Resolution::Value(u32::try_from(reason.len()).unwrap_or(0))));
//!
//! assert_eq!(block_on(recovered.into_future()), Ok(8));
//! ```

mod capabilities;
mod combinators;
mod dispatch;
mod error;
mod hooks;
mod pledge;
mod queue;
mod resolution;
mod resolver;
mod settled;

pub use capabilities::{Reject, Resolve};
pub use combinators::{all, race};
pub use error::Error;
pub use hooks::{Hooks, Task, set_scheduler, set_unhandled_rejection_hook};
pub use pledge::{Pledge, PledgeState, Reason};
pub use queue::{queued_tasks, run_next, run_until_idle};
pub use resolution::{Resolution, Thenable};
pub use settled::Settled;
