//! Releaser node: hands resources borrowed during planning back exactly once,
//! however the row sequence ends.

use crate::{Node, RowIter};
use common::{DbResult, ExecutionContext, Row};
use std::{
    fmt,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Runs a release action at most once.
///
/// The guard is shared by every clone of the node that owns it. It fires on
/// the first of: an explicit [`ReleaseGuard::release`], or the drop of the
/// last reference.
pub struct ReleaseGuard {
    released: AtomicBool,
    action: Mutex<Option<ReleaseFn>>,
}

impl ReleaseGuard {
    pub fn new(action: impl FnOnce() + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            released: AtomicBool::new(false),
            action: Mutex::new(Some(Box::new(action))),
        })
    }

    /// Run the action if nobody has yet. Returns whether this call ran it.
    pub fn release(&self) -> bool {
        if self
            .released
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let action = self
            .action
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(action) = action {
            action();
        }
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ReleaseGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseGuard")
            .field("released", &self.is_released())
            .finish()
    }
}

/// Wraps a plan so its release action runs when execution ends.
///
/// Every structural operation delegates to the child; equality and rendering
/// ignore the wrapper entirely.
#[derive(Clone, Debug)]
pub struct Releaser {
    pub(crate) child: Box<Node>,
    pub(crate) guard: Arc<ReleaseGuard>,
}

impl Releaser {
    pub fn new(child: Node, guard: Arc<ReleaseGuard>) -> Self {
        Self {
            child: Box::new(child),
            guard,
        }
    }

    pub fn child(&self) -> &Node {
        &self.child
    }

    pub fn guard(&self) -> &Arc<ReleaseGuard> {
        &self.guard
    }

    pub(crate) fn row_iter(&self, ctx: &ExecutionContext) -> DbResult<Box<dyn RowIter>> {
        match self.child.row_iter(ctx) {
            Ok(child) => Ok(Box::new(ReleaseIter {
                child,
                guard: Arc::clone(&self.guard),
            })),
            Err(err) => {
                self.guard.release();
                Err(err)
            }
        }
    }
}

impl PartialEq for Releaser {
    fn eq(&self, other: &Self) -> bool {
        self.child == other.child
    }
}

/// Row sequence that fires the guard on exhaustion, on the first error, on
/// close, or when dropped.
struct ReleaseIter {
    child: Box<dyn RowIter>,
    guard: Arc<ReleaseGuard>,
}

impl RowIter for ReleaseIter {
    fn next(&mut self) -> DbResult<Option<Row>> {
        match self.child.next() {
            Ok(Some(row)) => Ok(Some(row)),
            Ok(None) => {
                self.guard.release();
                Ok(None)
            }
            Err(err) => {
                self.guard.release();
                Err(err)
            }
        }
    }

    fn close(&mut self) -> DbResult<()> {
        let result = self.child.close();
        self.guard.release();
        result
    }
}

impl Drop for ReleaseIter {
    fn drop(&mut self) {
        self.guard.release();
    }
}
