//! Crate-level scenario tests for the pool as a whole.

use crate::attrs::ExecutionAttrs;
use crate::platform::PlatformId;
use crate::pool::{ThreadPool, WaitResult};
use crate::task::{TaskHandle, Threadable, ValueTask};
use crate::worker::WorkerStatus;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn pool_with(workers: usize) -> ThreadPool {
    ThreadPool::create(PlatformId::current(), workers).expect("create pool")
}

fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

struct SleepTask {
    attrs: ExecutionAttrs,
    sleep: Duration,
    completions: Arc<AtomicUsize>,
}

impl SleepTask {
    fn handle(sleep: Duration, completions: &Arc<AtomicUsize>) -> TaskHandle {
        Arc::new(SleepTask {
            attrs: ExecutionAttrs::default(),
            sleep,
            completions: completions.clone(),
        })
    }
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

struct GatedTask {
    attrs: ExecutionAttrs,
    release: Arc<AtomicBool>,
    completions: Arc<AtomicUsize>,
}

impl Threadable for GatedTask {
    fn run(&self) {
        while !self.release.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(2));
        }
        self.completions.fetch_add(1, Ordering::SeqCst);
    }

    fn execution_attrs(&self) -> &ExecutionAttrs {
        &self.attrs
    }
}

#[test]
fn test_single_worker_preserves_submission_order() {
    let mut pool = pool_with(1);
    let order = Arc::new(Mutex::new(Vec::new()));

    for tag in 1..=3usize {
        let order = order.clone();
        assert!(pool.submit_value(ValueTask::new(move |_, _| {
            order.lock().unwrap().push(tag);
        })));
    }

    assert!(wait_until(Duration::from_secs(3), || {
        order.lock().unwrap().len() == 3
    }));
    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    pool.shutdown();
}

#[test]
fn test_suspend_all_resume_all_roundtrip() {
    let mut pool = pool_with(2);
    let completions = Arc::new(AtomicUsize::new(0));
    let release = Arc::new(AtomicBool::new(false));

    let tasks: Vec<TaskHandle> = (0..2)
        .map(|_| {
            Arc::new(GatedTask {
                attrs: ExecutionAttrs::default(),
                release: release.clone(),
                completions: completions.clone(),
            }) as TaskHandle
        })
        .collect();

    for task in &tasks {
        assert!(pool.submit_object(task));
    }

    assert!(wait_until(Duration::from_secs(2), || {
        pool.specific_status_count(WorkerStatus::Executing) == 2
    }));

    pool.suspend_all();
    // Assignments are untouched: both workers still own their tasks.
    assert_eq!(pool.specific_status_count(WorkerStatus::Pausing), 2);
    for task in &tasks {
        assert_ne!(pool.status(task), WorkerStatus::None);
    }
    // suspend_all also locks submissions, and resume_all does not unlock.
    assert!(!pool.submit_value(ValueTask::new(|_, _| {})));

    pool.resume_all();
    assert_eq!(pool.specific_status_count(WorkerStatus::Executing), 2);
    assert!(!pool.submit_value(ValueTask::new(|_, _| {})));

    pool.set_submission_lock(false);
    release.store(true, Ordering::Release);
    assert!(wait_until(Duration::from_secs(2), || {
        completions.load(Ordering::SeqCst) == 2
    }));
    pool.shutdown();
}

#[test]
fn test_counts_stay_within_bounds() {
    let mut pool = pool_with(3);
    assert!(pool.available_count() <= pool.max_thread_count());
    assert_eq!(pool.specific_status_count(WorkerStatus::None), 0);

    let completions = Arc::new(AtomicUsize::new(0));
    for _ in 0..6 {
        let task = SleepTask::handle(Duration::from_millis(30), &completions);
        assert!(pool.submit_object(&task));
    }

    assert!(pool.available_count() <= pool.max_thread_count());
    assert!(wait_until(Duration::from_secs(3), || {
        completions.load(Ordering::SeqCst) == 6
    }));

    // Quiescent and staying that way.
    assert!(wait_until(Duration::from_secs(1), || !pool.any_working()));
    assert!(pool.is_empty());
    assert_eq!(pool.specific_status_count(WorkerStatus::None), 0);
    pool.shutdown();
}

#[test]
fn test_take_available_worker_excises() {
    let mut pool = pool_with(2);

    let worker = pool.take_available_worker().expect("an idle worker");
    assert_eq!(worker.status(), WorkerStatus::NotExecuting);
    assert_eq!(pool.worker_count(), 1);

    // The handed-out worker is the caller's problem now.
    worker.terminate();

    pool.shutdown();
    assert!(pool.take_available_worker().is_none());
}

#[test]
fn test_terminate_all_locks_and_removes_busy_workers() {
    let mut pool = pool_with(2);
    let completions = Arc::new(AtomicUsize::new(0));

    let task = SleepTask::handle(Duration::from_millis(200), &completions);
    assert!(pool.submit_object(&task));

    assert!(wait_until(Duration::from_secs(2), || {
        pool.specific_status_count(WorkerStatus::Executing) == 1
    }));

    pool.terminate_all();
    // The busy worker ran its task to completion before exiting.
    assert_eq!(completions.load(Ordering::SeqCst), 1);
    assert_eq!(pool.worker_count(), 1);
    assert!(!pool.submit_value(ValueTask::new(|_, _| {})));

    pool.shutdown();
}

#[test]
fn test_wait_on_unknown_handle_reports_done() {
    let mut pool = pool_with(1);
    let completions = Arc::new(AtomicUsize::new(0));
    let never_submitted = SleepTask::handle(Duration::from_millis(1), &completions);

    assert_eq!(pool.wait(&never_submitted, 0), WaitResult::Completed);
    assert_eq!(pool.status(&never_submitted), WorkerStatus::None);
    pool.shutdown();
}

#[cfg(feature = "chrome-trace")]
#[test]
fn test_pool_exports_task_trace() {
    let mut pool = pool_with(2);
    let completions = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let task = SleepTask::handle(Duration::from_millis(10), &completions);
        assert!(pool.submit_object(&task));
    }
    assert!(wait_until(Duration::from_secs(3), || {
        completions.load(Ordering::SeqCst) == 3
    }));
    assert!(wait_until(Duration::from_secs(2), || {
        pool.trace_sink().len() == 3
    }));

    let path = std::env::temp_dir().join(format!("taskpool-pool-trace-{}.json", std::process::id()));
    let path_str = path.to_str().expect("utf-8 temp path");
    pool.export_trace(path_str).expect("export trace");

    let raw = std::fs::read_to_string(&path).expect("read trace file");
    let _ = std::fs::remove_file(&path);
    assert!(raw.contains("\"traceEvents\""));
    assert!(raw.contains("object_task"));

    pool.shutdown();
}

#[test]
fn test_value_task_dispose_contract() {
    let mut pool = pool_with(1);
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_clone = seen.clone();

    let task = ValueTask::with_arg(
        move |arg, dispose| {
            assert!(dispose);
            if let Some(arg) = arg {
                if let Ok(value) = arg.downcast::<usize>() {
                    seen_clone.store(*value, Ordering::SeqCst);
                }
            }
        },
        Box::new(7usize),
        true,
    );

    assert!(pool.submit_value(task));
    assert!(wait_until(Duration::from_secs(2), || {
        seen.load(Ordering::SeqCst) == 7
    }));
    pool.shutdown();
}
