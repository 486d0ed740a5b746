use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use taskpool::{ExecutionAttrs, PlatformId, TaskHandle, ThreadPool, Threadable};

struct SleepTask {
    attrs: ExecutionAttrs,
    sleep: Duration,
    completions: Arc<AtomicUsize>,
}

impl Threadable for SleepTask {
    fn run(&self) {
        thread::sleep(self.sleep);
        self.completions.fetch_add(1, Ordering::SeqCst);
    }

    fn execution_attrs(&self) -> &ExecutionAttrs {
        &self.attrs
    }
}

#[test]
fn test_four_tasks_on_four_workers() {
    let mut pool = ThreadPool::create(PlatformId::current(), 4).expect("create pool");
    let completions = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<TaskHandle> = (0..4)
        .map(|_| {
            Arc::new(SleepTask {
                attrs: ExecutionAttrs::default(),
                sleep: Duration::from_millis(100),
                completions: completions.clone(),
            }) as TaskHandle
        })
        .collect();

    for task in &tasks {
        assert!(pool.submit_object(task));
    }

    // All four fit onto the four workers, so everything finishes in one
    // wave, well inside half a second.
    let deadline = Instant::now() + Duration::from_millis(500);
    while completions.load(Ordering::SeqCst) < 4 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(completions.load(Ordering::SeqCst), 4);

    // Workers drain back to idle within a dispatcher cycle or two.
    while pool.any_working() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(!pool.any_working());
    assert!(pool.is_empty());

    pool.shutdown();
}
