//! Per-thread configuration of the two pluggable collaborators of the pledge engine:
//!
//! * the scheduler, which runs deferred tasks later, in submission order, off the current
//!   call stack;
//! * the unhandled-rejection hook, which is told about rejections that nobody observed.
//!
//! Pledges are single-threaded, so the thread that owns a pledge is the whole world that pledge
//! can observe. The hooks are therefore stored per thread and every thread starts out with the
//! defaults described on [`Hooks`].

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::mem;
use std::rc::Rc;

use tracing::warn;

use crate::queue;

/// A deferred unit of work submitted to the scheduler.
pub type Task = Box<dyn FnOnce()>;

type Scheduler = Rc<dyn Fn(Task)>;
type UnhandledRejectionHook = Rc<dyn Fn(&dyn Debug)>;

thread_local! {
    static HOOKS: RefCell<Hooks> = RefCell::new(Hooks::default());
}

/// The hooks used by the pledge engine on the current thread.
///
/// The defaults are:
///
/// * scheduler - appends the task to the thread-local settle queue, which is drained by
///   [`run_until_idle()`][crate::run_until_idle] or by awaiting a pledge;
/// * unhandled-rejection hook - emits a `tracing` warning with the `Debug` rendering of the
///   rejection reason.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// use pledge::{Hooks, Pledge};
///
/// let reported = Rc::new(RefCell::new(Vec::new()));
///
/// let previous = Hooks::default()
///     .unhandled_rejection({
///         let reported = Rc::clone(&reported);
///         move |reason| reported.borrow_mut().push(format!("{reason:?}"))
///     })
///     .install();
///
/// let _rejected = Pledge::<u32, String>::reject("nobody listens".to_string());
/// pledge::run_until_idle();
///
/// assert_eq!(*reported.borrow(), vec!["\"nobody listens\"".to_string()]);
///
/// previous.install();
/// ```
#[derive(Clone)]
pub struct Hooks {
    scheduler: Scheduler,
    unhandled_rejection: UnhandledRejectionHook,
}

impl Hooks {
    /// Returns a copy of the hooks currently installed on this thread.
    #[must_use]
    pub fn current() -> Self {
        HOOKS.with_borrow(Self::clone)
    }

    /// Replaces the scheduler that runs deferred tasks.
    ///
    /// The scheduler must run every task it receives exactly once, later, in submission order,
    /// and never synchronously from within the call that submitted it.
    #[must_use]
    pub fn scheduler(self, scheduler: impl Fn(Task) + 'static) -> Self {
        Self {
            scheduler: Rc::new(scheduler),
            ..self
        }
    }

    /// Replaces the hook that is told about rejections nobody observed.
    ///
    /// The hook receives the rejection reason once, one scheduler tick after the rejection.
    #[must_use]
    pub fn unhandled_rejection(self, hook: impl Fn(&dyn Debug) + 'static) -> Self {
        Self {
            unhandled_rejection: Rc::new(hook),
            ..self
        }
    }

    /// Installs these hooks on the current thread, returning the hooks that were installed
    /// before. Installing the returned value restores the previous configuration.
    #[expect(
        clippy::return_self_not_must_use,
        reason = "restoring the previous hooks is optional"
    )]
    pub fn install(self) -> Self {
        HOOKS.with_borrow_mut(|hooks| mem::replace(hooks, self))
    }
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            scheduler: Rc::new(queue::enqueue),
            unhandled_rejection: Rc::new(warn_unhandled_rejection),
        }
    }
}

impl Debug for Hooks {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks").finish_non_exhaustive()
    }
}

/// Replaces the scheduler on the current thread, keeping the other hooks.
///
/// See [`Hooks::scheduler()`] for the contract the scheduler must uphold.
pub fn set_scheduler(scheduler: impl Fn(Task) + 'static) {
    let _previous = Hooks::current().scheduler(scheduler).install();
}

/// Replaces the unhandled-rejection hook on the current thread, keeping the other hooks.
pub fn set_unhandled_rejection_hook(hook: impl Fn(&dyn Debug) + 'static) {
    let _previous = Hooks::current().unhandled_rejection(hook).install();
}

/// Submits a task to the scheduler installed on the current thread.
pub(crate) fn schedule(task: Task) {
    // The scheduler is cloned out first so it may itself touch the hooks.
    let scheduler = HOOKS.with_borrow(|hooks| Rc::clone(&hooks.scheduler));
    scheduler(task);
}

/// Tells the unhandled-rejection hook installed on the current thread about a reason.
pub(crate) fn report_unhandled(reason: &dyn Debug) {
    let hook = HOOKS.with_borrow(|hooks| Rc::clone(&hooks.unhandled_rejection));
    hook(reason);
}

fn warn_unhandled_rejection(reason: &dyn Debug) {
    warn!(?reason, "possible unhandled pledge rejection");
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;
    use std::thread;

    use super::*;

    #[test]
    fn default_scheduler_defers_until_queue_runs() {
        let ran = Rc::new(Cell::new(false));

        schedule(Box::new({
            let ran = Rc::clone(&ran);
            move || ran.set(true)
        }));

        assert!(!ran.get());
        assert_eq!(queue::run_until_idle(), 1);
        assert!(ran.get());
    }

    #[test]
    fn custom_scheduler_receives_tasks() {
        let captured: Rc<RefCell<Vec<Task>>> = Rc::new(RefCell::new(Vec::new()));

        set_scheduler({
            let captured = Rc::clone(&captured);
            move |task| captured.borrow_mut().push(task)
        });

        let ran = Rc::new(Cell::new(0_u32));
        for _ in 0..3 {
            schedule(Box::new({
                let ran = Rc::clone(&ran);
                move || ran.set(ran.get() + 1)
            }));
        }

        assert_eq!(queue::queued_tasks(), 0);
        assert_eq!(ran.get(), 0);

        for task in captured.take() {
            task();
        }

        assert_eq!(ran.get(), 3);
    }

    #[test]
    fn install_returns_previous_hooks() {
        let calls = Rc::new(Cell::new(0_u32));

        let original = Hooks::default()
            .unhandled_rejection({
                let calls = Rc::clone(&calls);
                move |_| calls.set(calls.get() + 1)
            })
            .install();

        report_unhandled(&"first");
        assert_eq!(calls.get(), 1);

        let ours = original.install();
        report_unhandled(&"second");
        assert_eq!(calls.get(), 1);

        ours.install();
        report_unhandled(&"third");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn hooks_are_per_thread() {
        set_unhandled_rejection_hook(|_| panic!("must not be called from another thread"));

        thread::spawn(|| {
            // The other thread starts out with the default hook, which only logs.
            report_unhandled(&"elsewhere");
        })
        .join()
        .unwrap();
    }
}
