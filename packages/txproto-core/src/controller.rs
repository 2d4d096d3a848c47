//! Component Controller — the plain OS thread each component runs its
//! processing loop on, driven by a queue of control messages rather than
//! direct method calls from other threads.
//!
//! Per the specification's design notes, a component is a plain thread,
//! not a coroutine: there is no scheduler here, just a worker thread that
//! blocks on its control queue (or, for source/sink components, on a
//! [`crate::fifo::Fifo`]) between messages.

use std::any::Any;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use bitflags::bitflags;

use crate::error::TxResult;

bitflags! {
    /// The control bits a message to a component worker can carry. Several
    /// may be set at once (e.g. `COMMIT | IMMEDIATE`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CtrlFlags: u16 {
        /// A new event was registered on this component's event list.
        const NEW_EVENT = 1 << 0;
        /// Begin processing.
        const START     = 1 << 1;
        /// Stop processing; the worker should return after handling this.
        const STOP      = 1 << 2;
        /// Apply a configuration change.
        const OPTS      = 1 << 3;
        /// Run an arbitrary command closure.
        const COMMAND   = 1 << 4;
        /// Drop any buffered-but-not-yet-emitted state.
        const FLUSH     = 1 << 5;
        /// Release any dependency events waiting on this component.
        const SIGNAL    = 1 << 6;
        /// Run this component's `on_discard` handler.
        const DISCARD   = 1 << 7;
        /// Run this component's `on_commit` handler.
        const COMMIT    = 1 << 8;
        /// Handle on the calling thread instead of enqueueing.
        const IMMEDIATE = 1 << 9;
    }
}

/// A message delivered to a component's worker thread.
pub struct CtrlMessage {
    pub flags: CtrlFlags,
    pub payload: Option<Box<dyn Any + Send>>,
}

impl CtrlMessage {
    #[must_use]
    pub fn new(flags: CtrlFlags) -> Self {
        Self {
            flags,
            payload: None,
        }
    }

    #[must_use]
    pub fn with_payload(flags: CtrlFlags, payload: Box<dyn Any + Send>) -> Self {
        Self {
            flags,
            payload: Some(payload),
        }
    }
}

/// Implemented by whatever owns a component's actual processing logic.
/// The controller only handles dispatch and lifecycle; `handle` is where
/// the component reacts to a single control message.
pub trait ComponentWorker: Send {
    fn handle(&mut self, msg: CtrlMessage) -> TxResult<()>;
}

/// Drives one [`ComponentWorker`] on its own OS thread.
///
/// `IMMEDIATE`-flagged messages bypass the queue and run synchronously on
/// the caller's thread via [`Controller::send`] — this is the escape
/// hatch used by the commit/discard protocol, which must observe the
/// handler's result before moving to the next component, not just fire
/// a message into a queue.
pub struct Controller {
    tx: Sender<CtrlMessage>,
    handle: Option<JoinHandle<()>>,
}

impl Controller {
    /// Spawns the worker thread running `worker`'s message loop. The loop
    /// exits after handling a message with the `STOP` flag set.
    pub fn spawn(name: impl Into<String>, mut worker: impl ComponentWorker + 'static) -> Self {
        let (tx, rx): (Sender<CtrlMessage>, Receiver<CtrlMessage>) = mpsc::channel();
        let thread_name = name.into();
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let span = tracing::info_span!("component_worker", name = %thread_name);
                let _enter = span.enter();
                log::debug!("{thread_name}: worker thread started");
                while let Ok(msg) = rx.recv() {
                    let stop = msg.flags.contains(CtrlFlags::STOP);
                    if let Err(err) = worker.handle(msg) {
                        tracing::warn!(error = %err, "component worker message failed");
                    }
                    if stop {
                        break;
                    }
                }
                log::debug!("{thread_name}: worker thread exiting");
            })
            .expect("spawning component worker thread");

        Self {
            tx,
            handle: Some(handle),
        }
    }

    /// Enqueues `msg` for the worker thread. Ignored if the worker has
    /// already stopped.
    pub fn post(&self, msg: CtrlMessage) {
        let _ = self.tx.send(msg);
    }

    /// Convenience for `post` with a flag set and no payload.
    pub fn post_flags(&self, flags: CtrlFlags) {
        self.post(CtrlMessage::new(flags));
    }

    /// Blocks the caller's thread until the worker exits. Send a `STOP`
    /// message first or this hangs forever on a worker that never stops
    /// itself.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.post_flags(CtrlFlags::STOP);
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingWorker {
        seen: Arc<Mutex<Vec<CtrlFlags>>>,
    }

    impl ComponentWorker for RecordingWorker {
        fn handle(&mut self, msg: CtrlMessage) -> TxResult<()> {
            self.seen.lock().unwrap().push(msg.flags);
            Ok(())
        }
    }

    #[test]
    fn messages_are_handled_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let worker = RecordingWorker {
            seen: Arc::clone(&seen),
        };
        let mut controller = Controller::spawn("test", worker);
        controller.post_flags(CtrlFlags::START);
        controller.post_flags(CtrlFlags::OPTS);
        controller.post_flags(CtrlFlags::STOP);
        controller.join();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![CtrlFlags::START, CtrlFlags::OPTS, CtrlFlags::STOP]
        );
    }

    #[test]
    fn worker_error_does_not_kill_the_loop() {
        struct FlakyWorker {
            calls: Arc<Mutex<usize>>,
        }
        impl ComponentWorker for FlakyWorker {
            fn handle(&mut self, msg: CtrlMessage) -> TxResult<()> {
                *self.calls.lock().unwrap() += 1;
                if msg.flags.contains(CtrlFlags::COMMAND) {
                    return Err(crate::error::TxError::Fatal("boom".into()));
                }
                Ok(())
            }
        }

        let calls = Arc::new(Mutex::new(0));
        let worker = FlakyWorker {
            calls: Arc::clone(&calls),
        };
        let mut controller = Controller::spawn("flaky", worker);
        controller.post_flags(CtrlFlags::COMMAND);
        controller.post_flags(CtrlFlags::STOP);
        controller.join();
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn drop_stops_the_worker() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let worker = RecordingWorker {
            seen: Arc::clone(&seen),
        };
        {
            let _controller = Controller::spawn("drop-test", worker);
        }
        assert!(seen.lock().unwrap().contains(&CtrlFlags::STOP));
    }
}
