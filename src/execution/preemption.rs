use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Cooperative cancellation signal handed to every running state.
///
/// Tokens form a tree: preempting a token preempts every token derived from
/// it with [`PreemptionToken::child`], but never its parent or siblings.
#[derive(Clone)]
pub struct PreemptionToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    preempted: AtomicBool,
    lock: Mutex<()>,
    signal: Condvar,
    children: Mutex<Vec<Weak<TokenInner>>>,
}

impl TokenInner {
    fn new() -> Self {
        Self {
            preempted: AtomicBool::new(false),
            lock: Mutex::new(()),
            signal: Condvar::new(),
            children: Mutex::new(Vec::new()),
        }
    }

    fn preempt(&self) {
        if self.preempted.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let _guard = self.lock.lock();
            self.signal.notify_all();
        }
        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.preempt();
        }
    }
}

impl Default for PreemptionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl PreemptionToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner::new()),
        }
    }

    /// Derives a token that is preempted together with `self`.
    pub fn child(&self) -> Self {
        let child = Self::new();
        {
            let mut children = self.inner.children.lock();
            children.retain(|c| c.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        // The parent may have been preempted between creation and registration.
        if self.is_preempted() {
            child.preempt();
        }
        child
    }

    pub fn preempt(&self) {
        self.inner.preempt();
    }

    pub fn is_preempted(&self) -> bool {
        self.inner.preempted.load(Ordering::SeqCst)
    }

    /// Blocks for at most `timeout`. Returns `true` if the token was preempted.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock.lock();
        while !self.is_preempted() {
            if self.inner.signal.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        self.is_preempted()
    }
}

impl fmt::Debug for PreemptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreemptionToken")
            .field("preempted", &self.is_preempted())
            .finish()
    }
}
