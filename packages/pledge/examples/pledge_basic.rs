//! Basic example of chaining continuations on pledges.
//!
//! This example demonstrates the simplest usage pattern of the pledge package: creating a pledge,
//! attaching continuations to it and driving the settle queue until everything has run.

use pledge::{Pledge, Resolution};

fn main() {
    println!("=== Pledge Basic Example ===");

    // Create a pledge that is fulfilled right away by its starter routine.
    let greeting = Pledge::<String, String>::new(|resolve, _reject| {
        resolve.fulfill("Hello".to_string());
        Ok(())
    });

    // Continuations run later, each one producing a new pledge.
    let shouted = greeting
        .then(|text| Ok(Resolution::Value(format!("{text} from pledge!"))))
        .then(|text| Ok(Resolution::Value(text.to_uppercase())));

    let _printed = shouted.then(|text| {
        println!("Received: {text}");
        Ok(Resolution::Value(()))
    });

    println!("Running deferred continuations...");
    let tasks = pledge::run_until_idle();

    println!("Ran {tasks} deferred tasks");
    println!("Example completed successfully!");
}
