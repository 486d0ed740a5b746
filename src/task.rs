//! Task definitions: the two shapes of work the pool accepts.
//!
//! A *value task* is a callable plus an opaque argument and a dispose flag;
//! the callable owns the interpretation of both. An *object task* is a
//! client-owned handle implementing [`Threadable`]; the handle's identity is
//! how clients later address the running task (pause, resume, terminate,
//! wait).

use std::any::Any;
use std::sync::Arc;

use crate::attrs::ExecutionAttrs;

/// Opaque argument passed through to a value task's callable.
pub type TaskArg = Box<dyn Any + Send>;

type ValueFn = Box<dyn FnOnce(Option<TaskArg>, bool) + Send + 'static>;

/// A callable work unit with an opaque argument and a dispose flag.
///
/// The callable must be safe to run on any worker thread. When the dispose
/// flag is set the callable is expected to consume the argument; otherwise
/// the argument's lifetime stays the caller's business. No return value is
/// propagated.
pub struct ValueTask {
    callable: ValueFn,
    arg: Option<TaskArg>,
    dispose: bool,
    attrs: Option<ExecutionAttrs>,
}

impl ValueTask {
    /// Creates a value task from a bare callable with no argument.
    pub fn new<F>(callable: F) -> Self
    where
        F: FnOnce(Option<TaskArg>, bool) + Send + 'static,
    {
        ValueTask {
            callable: Box::new(callable),
            arg: None,
            dispose: false,
            attrs: None,
        }
    }

    /// Creates a value task carrying an argument and a dispose flag the
    /// callable must honor.
    pub fn with_arg<F>(callable: F, arg: TaskArg, dispose: bool) -> Self
    where
        F: FnOnce(Option<TaskArg>, bool) + Send + 'static,
    {
        ValueTask {
            callable: Box::new(callable),
            arg: Some(arg),
            dispose,
            attrs: None,
        }
    }

    /// Binds execution attributes applied to the worker when this task is
    /// dispatched. Value tasks without bound attributes run with whatever
    /// the worker thread already has.
    pub fn with_attrs(mut self, attrs: ExecutionAttrs) -> Self {
        self.attrs = Some(attrs);
        self
    }

    pub fn attrs(&self) -> Option<&ExecutionAttrs> {
        self.attrs.as_ref()
    }

    /// Consumes the task, invoking the callable with the argument and the
    /// dispose flag.
    pub(crate) fn run(self) {
        (self.callable)(self.arg, self.dispose);
    }
}

impl std::fmt::Debug for ValueTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueTask")
            .field("has_arg", &self.arg.is_some())
            .field("dispose", &self.dispose)
            .field("attrs", &self.attrs)
            .finish()
    }
}

/// An object task: `run` executes once per dispatch, and the attributes must
/// stay valid for the duration of the run.
///
/// The pool only ever borrows the handle; the client keeps ownership until
/// the pool reports the task complete. Re-submitting the same handle is
/// allowed once the previous run has observably finished.
pub trait Threadable: Send + Sync {
    /// The work itself. Called at most once per dispatch, on a worker
    /// thread.
    fn run(&self);

    /// Execution attributes applied to the worker before `run`.
    fn execution_attrs(&self) -> &ExecutionAttrs;

    /// Opaque identifier for external registries. The pool does not
    /// interpret it.
    fn object_id(&self) -> u32 {
        0
    }
}

/// Shared handle to an object task. Identity of the handle (not of its
/// contents) is what the pool's control surface matches on.
pub type TaskHandle = Arc<dyn Threadable>;

/// Whether two handles refer to the same task object.
///
/// Compares the data pointers of the two `Arc`s, so the comparison is
/// stable even when the trait-object metadata differs across codegen units.
pub fn same_handle(a: &TaskHandle, b: &TaskHandle) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}
