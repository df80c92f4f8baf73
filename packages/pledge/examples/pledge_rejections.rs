//! Example of how rejections travel along a chain of pledges.
//!
//! A rejection skips fulfillment continuations until it reaches a rejection continuation. That
//! continuation may recover with a value or fail again with a new reason. Rejections that nobody
//! handles are reported to the unhandled-rejection hook.

use std::future::IntoFuture;

use futures::executor::block_on;
use pledge::{Pledge, Resolution};

fn main() {
    println!("=== Pledge Rejections Example ===");

    pledge::set_unhandled_rejection_hook(|reason| {
        println!("Unhandled rejection: {reason:?}");
    });

    // A pledge resolved with a rejected pledge adopts the rejection.
    let failed = Pledge::<u32, String>::reject("upstream failure".to_string());
    let adopted = Pledge::<u32, String>::new(|resolve, _reject| {
        resolve.resolve(failed.clone());
        Ok(())
    });

    let recovered = adopted
        .then(|value| Ok(Resolution::Value(value * 2)))
        .catch(|reason| {
            println!("Recovering from: {reason}");
            Ok(Resolution::Value(0))
        });

    println!("Recovered value: {:?}", block_on(recovered.into_future()));

    // A rejection continuation that fails again replaces the reason.
    let replaced = Pledge::<u32, String>::reject("first reason".to_string()).then_or_else(
        |value| Ok(Resolution::Value(value)),
        |reason| {
            println!("Handling: {reason}");
            Err("second reason".to_string())
        },
    );

    println!("Replaced outcome: {:?}", block_on(replaced.into_future()));

    // Nobody handles this one, so the hook hears about it after one tick.
    let _orphan = Pledge::<u32, String>::reject("nobody listens".to_string());
    pledge::run_until_idle();

    println!("Example completed successfully!");
}
