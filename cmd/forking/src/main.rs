//! Fork reset example
//!
//! The parent spawns a sleeping coroutine, then forks. The child's first
//! tick notices the new pid and drops everything it inherited, so only the
//! parent's copy of the coroutine ever wakes.
// COT_TICK_INTERVAL_MS=100 cargo run -p cotick-forking

use std::time::Duration;

use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, getpid, ForkResult};

use cotick::{kerror, kinfo};
use cotick::{sleep, spawn_async, Runtime};

fn main() {
    println!("=== cotick Fork Example ===\n");

    let runtime = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let spawned = spawn_async(|_| {
        sleep(Duration::from_secs(1))?;
        println!("[pid {}] sleeper woke up", getpid());
        Ok(())
    });
    if let Err(e) = spawned {
        kerror!("spawn failed: {}", e);
        std::process::exit(1);
    }

    // Start the sleeper so the fork happens while it is suspended
    runtime.tick();

    let interval = runtime.config().tick_interval.as_millis().max(1);
    let max_ticks = (3_000 / interval) as usize + 1;

    // SAFETY: single-threaded at this point
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            runtime.tick();
            println!("[pid {}] child idle after first tick: {}", getpid(), runtime.is_idle());
            runtime.run_until_idle(max_ticks);
        }
        Ok(ForkResult::Parent { child }) => {
            let idle = runtime.run_until_idle(max_ticks);
            println!("[pid {}] parent idle: {}", getpid(), idle);
            match waitpid(child, None) {
                Ok(WaitStatus::Exited(pid, code)) => kinfo!("child {} exited with {}", pid, code),
                Ok(status) => kinfo!("child status {:?}", status),
                Err(e) => kerror!("waitpid failed: {}", e),
            }
        }
        Err(e) => {
            kerror!("fork failed: {}", e);
            std::process::exit(1);
        }
    }
}
