//! Basic cotick example
//!
//! Two coroutines answer a message after a non-blocking delay. The first
//! replies after 3 ticks, the second after 5 and carries a deferred cleanup,
//! a 10 tick timeout and an exception handler.
//!
//! # Environment Variables
//!
//! - `COT_TICK_INTERVAL_MS=100` - Tick more often (default 1000); delays stay in seconds
//! - `COT_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `COT_DEBUG=1` - Scheduler-internal tracing
// COT_TICK_INTERVAL_MS=100 COT_LOG_LEVEL=debug cargo run -p cotick-basic

use std::time::Duration;

use cotick::{kdebug, kinfo, kwarn};
use cotick::{sleep, spawn_async, CoResult, Runtime};

fn on_message(message: &'static str) -> CoResult<()> {
    spawn_async(move |_| {
        sleep(Duration::from_secs(3))?;
        println!("sleep 3, you say: {}", message);
        Ok(())
    })?;

    spawn_async(move |_| {
        sleep(Duration::from_secs(5))?;
        println!("sleep 5, you say: {}", message);
        Ok(())
    })?
    .defer(|co| {
        kdebug!("cleanup for {}", co.id());
        Ok(())
    })
    .timeout(
        |err, co| {
            kwarn!("{} timed out: {}", co.id(), err);
            Ok(())
        },
        Duration::from_secs(10),
    )
    .except(|err, co| {
        kwarn!("{} failed: {}", co.id(), err);
        Ok(())
    });

    Ok(())
}

fn main() {
    println!("=== cotick Basic Example ===\n");

    let runtime = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    kinfo!("tick interval {:?}", runtime.config().tick_interval);

    // The "host event loop": one message arrives before the first tick
    if let Err(e) = on_message("hello") {
        eprintln!("spawn failed: {}", e);
        std::process::exit(1);
    }

    // Enough ticks to outlast the longest timeout
    let interval = runtime.config().tick_interval.as_millis().max(1);
    let max_ticks = (12_000 / interval) as usize + 1;
    let idle = runtime.run_until_idle(max_ticks);
    println!("\nidle: {}", idle);
}
