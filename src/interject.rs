//! Routing of keyboard interrupts.
//!
//! An interrupt that arrives while generation is running asks for a turn to
//! type: it becomes a single pending interjection that the loop takes once
//! per iteration. An interrupt that arrives while the input provider waits
//! for a line aborts the run instead. Taking an interjection starts the wait
//! under the same lock, so a second interrupt right after the first always
//! aborts.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// Generation will pause for user input at the next check.
    Interject,
    /// The blocked input wait returns a terminate signal.
    Abort,
    /// An interjection was already pending.
    Dropped,
}

#[derive(Debug, Default)]
struct Routing {
    awaiting_input: bool,
    interject: bool,
    /// Only ever set while `awaiting_input`.
    abort: bool,
}

type Shared = Arc<Mutex<Routing>>;

fn lock(shared: &Mutex<Routing>) -> MutexGuard<'_, Routing> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn channel() -> (InterruptHandle, InterjectReceiver, AbortListener) {
    let shared: Shared = Arc::default();
    (
        InterruptHandle {
            shared: shared.clone(),
        },
        InterjectReceiver {
            shared: shared.clone(),
        },
        AbortListener { shared },
    )
}

/// Delivery side, owned by the signal handler.
#[derive(Clone)]
pub struct InterruptHandle {
    shared: Shared,
}

impl InterruptHandle {
    pub fn interrupt(&self) -> Interrupt {
        let mut routing = lock(&self.shared);
        if routing.awaiting_input {
            routing.abort = true;
            Interrupt::Abort
        } else if routing.interject {
            Interrupt::Dropped
        } else {
            routing.interject = true;
            Interrupt::Interject
        }
    }
}

pub struct InterjectReceiver {
    shared: Shared,
}

impl InterjectReceiver {
    /// Non-blocking. Consumes the pending interjection, if any, and marks the
    /// input wait that answers it as started.
    pub fn try_take(&self) -> Option<WaitGuard<'_>> {
        let mut routing = lock(&self.shared);
        if !routing.interject {
            return None;
        }
        routing.interject = false;
        routing.awaiting_input = true;
        Some(WaitGuard {
            shared: &self.shared,
        })
    }
}

pub struct AbortListener {
    shared: Shared,
}

impl AbortListener {
    /// Marks the start of a blocking input wait.
    pub fn begin_wait(&self) -> WaitGuard<'_> {
        lock(&self.shared).awaiting_input = true;
        WaitGuard {
            shared: &self.shared,
        }
    }

    pub fn aborted(&self) -> bool {
        std::mem::take(&mut lock(&self.shared).abort)
    }
}

/// Ends the wait on drop; an abort nobody consumed goes with it.
pub struct WaitGuard<'a> {
    shared: &'a Mutex<Routing>,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        let mut routing = lock(self.shared);
        routing.awaiting_input = false;
        routing.abort = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_interrupt_interjects_and_second_is_dropped() {
        let (handle, interject, _abort) = channel();

        assert_eq!(handle.interrupt(), Interrupt::Interject);
        assert_eq!(handle.interrupt(), Interrupt::Dropped);

        assert!(interject.try_take().is_some());
        assert!(interject.try_take().is_none());

        assert_eq!(handle.interrupt(), Interrupt::Interject);
    }

    #[test]
    fn interrupt_while_waiting_aborts() {
        let (handle, interject, abort) = channel();

        {
            let _guard = abort.begin_wait();
            assert_eq!(handle.interrupt(), Interrupt::Abort);
            assert!(abort.aborted());
            assert!(interject.try_take().is_none());
        }

        assert_eq!(handle.interrupt(), Interrupt::Interject);
        assert!(!abort.aborted());
    }

    #[test]
    fn interrupt_right_after_taking_an_interjection_aborts() {
        let (handle, interject, abort) = channel();
        assert_eq!(handle.interrupt(), Interrupt::Interject);

        let _taken = interject.try_take().expect("pending interjection");
        // The input provider has not started its own wait yet.
        assert_eq!(handle.interrupt(), Interrupt::Abort);

        let _waiting = abort.begin_wait();
        assert!(abort.aborted());
    }

    #[test]
    fn unconsumed_abort_ends_with_its_wait() {
        let (handle, _interject, abort) = channel();

        {
            let _guard = abort.begin_wait();
            handle.interrupt();
        }

        let _guard = abort.begin_wait();
        assert!(!abort.aborted());
    }

    #[test]
    fn receiver_without_handle_never_fires() {
        let (handle, interject, _abort) = channel();
        drop(handle);
        assert!(interject.try_take().is_none());
    }
}
