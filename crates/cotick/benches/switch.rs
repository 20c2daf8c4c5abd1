//! Context switch and spawn cost

use std::rc::Rc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use cotick::{CoError, Event, ManualClock, MemorySink, Payload, Runtime, RuntimeConfig, Source};

fn runtime() -> Runtime {
    let config = RuntimeConfig::new()
        .stack_size(64 * 1024)
        .tick_interval(Duration::from_millis(1));
    Runtime::with_parts(config, Rc::new(ManualClock::new()), Rc::new(MemorySink::new()))
        .unwrap()
}

fn bench_resume_suspend(c: &mut Criterion) {
    let rt = runtime();
    let co = rt.scheduler().coroutine();
    co.setup(|co| loop {
        let payload = co.suspend()?;
        black_box(payload);
    })
    .unwrap();
    co.execute().unwrap();

    c.bench_function("resume_suspend_round_trip", |b| {
        b.iter(|| {
            let ev = Event::resume(Payload::Empty, Source::Host);
            black_box(co.resume(Some(ev)).unwrap());
        })
    });

    co.throw(CoError::msg("bench done"));
}

fn bench_spawn_to_completion(c: &mut Criterion) {
    let rt = runtime();
    c.bench_function("spawn_to_completion", |b| {
        b.iter(|| {
            rt.spawn_async(|_| Ok(())).unwrap();
            rt.tick();
        })
    });
}

criterion_group!(benches, bench_resume_suspend, bench_spawn_to_completion);
criterion_main!(benches);
