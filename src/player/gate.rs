//! Read gate
//!
//! A condition-protected blocked flag coordinating the read loop with an
//! external writer's backpressure. The writer's readiness observer sets the
//! flag; the loop consults it once per iteration. The blocked check and the
//! wait happen under one mutex, so an unblock landing between them cannot be
//! lost.

use std::sync::{Condvar, Mutex};

#[derive(Debug, Default)]
pub struct ReadGate {
    blocked: Mutex<bool>,
    unblocked: Condvar,
}

impl ReadGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the blocked flag. Transitioning to unblocked wakes all waiters.
    pub fn set_blocked(&self, blocked: bool) {
        let mut flag = self.blocked.lock().unwrap();
        *flag = blocked;
        if !blocked {
            self.unblocked.notify_all();
        }
    }

    pub fn is_blocked(&self) -> bool {
        *self.blocked.lock().unwrap()
    }

    /// Suspend the calling loop while the gate is blocked.
    pub fn await_unblocked(&self) {
        self.await_unblocked_while(|| true);
    }

    /// Suspend while the gate is blocked and `keep_waiting()` holds. The
    /// predicate is re-evaluated after every wakeup, so pairing this with
    /// [`ReadGate::wake_all`] gives a cancellation-safe wait.
    pub fn await_unblocked_while<F>(&self, mut keep_waiting: F)
    where
        F: FnMut() -> bool,
    {
        let mut flag = self.blocked.lock().unwrap();
        while *flag && keep_waiting() {
            flag = self.unblocked.wait(flag).unwrap();
        }
    }

    /// Wake every waiter without changing the blocked flag. Taking the lock
    /// first serializes with a waiter that has checked the flag but not yet
    /// begun waiting.
    pub fn wake_all(&self) {
        let _flag = self.blocked.lock().unwrap();
        self.unblocked.notify_all();
    }
}
