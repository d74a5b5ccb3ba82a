//! In-order delivery of directives to the engine.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use studio_ipc::StudioEvent;

use crate::engine::{Directive, RenderEngine};
use crate::error::{StudioError, StudioResult};

/// Non-blocking sender of host events.
#[derive(Clone)]
pub(crate) struct EventSink {
    tx: Sender<StudioEvent>,
}

impl EventSink {
    pub fn new(tx: Sender<StudioEvent>) -> Self {
        Self { tx }
    }

    pub fn send(&self, event: StudioEvent) {
        if let Err(e) = self.tx.try_send(event) {
            warn!("Failed to send event: {}", e);
        }
    }
}

enum Job {
    Run(Directive),
    Flush(Sender<()>),
    Stop,
}

/// Single FIFO worker that calls the engine.
///
/// Submitting never blocks; the worker thread is the only caller of
/// [`RenderEngine::execute`].
pub(crate) struct Dispatcher {
    tx: Sender<Job>,
    rx: Receiver<Job>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx,
            worker: Mutex::new(None),
        }
    }

    /// Start the worker thread.
    pub fn start(&self, engine: Arc<dyn RenderEngine>, events: EventSink) -> StudioResult<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        // Drop anything queued while stopped.
        while self.rx.try_recv().is_ok() {}

        let rx = self.rx.clone();
        let handle = thread::Builder::new()
            .name("studio-dispatch".to_string())
            .spawn(move || dispatch_loop(engine, rx, events))
            .map_err(|e| StudioError::EngineFailure(format!("failed to spawn dispatcher: {e}")))?;
        *worker = Some(handle);
        Ok(())
    }

    /// Queue a directive behind everything submitted before it.
    pub fn submit(&self, directive: Directive) {
        trace!(directive = directive.name(), "Directive queued");
        // The receiver lives as long as `self`.
        let _ = self.tx.send(Job::Run(directive));
    }

    pub fn submit_all(&self, directives: impl IntoIterator<Item = Directive>) {
        for directive in directives {
            self.submit(directive);
        }
    }

    /// Block until every directive submitted so far has been executed.
    pub fn flush(&self) {
        if self.worker.lock().is_none() {
            return;
        }
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if self.tx.send(Job::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Run queued directives, then stop the worker.
    pub fn stop(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = self.tx.send(Job::Stop);
            if handle.join().is_err() {
                warn!("Dispatcher thread panicked");
            }
        }
    }
}

fn dispatch_loop(engine: Arc<dyn RenderEngine>, rx: Receiver<Job>, events: EventSink) {
    info!(engine = engine.name(), "Dispatcher started");
    let mut executed: u64 = 0;
    let mut failed: u64 = 0;

    while let Ok(job) = rx.recv() {
        match job {
            Job::Run(directive) => {
                let name = directive.name();
                match engine.execute(directive) {
                    Ok(()) => {
                        executed += 1;
                        trace!(directive = name, "Directive executed");
                    }
                    Err(e) => {
                        failed += 1;
                        warn!(directive = name, error = %e, "Directive failed");
                        events.send(StudioEvent::DirectiveFailed {
                            directive: name.to_string(),
                            message: e.to_string(),
                        });
                    }
                }
            }
            Job::Flush(ack) => {
                let _ = ack.send(());
            }
            Job::Stop => break,
        }
    }

    debug!(executed, failed, "Dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, EngineNotice, EngineResult};
    use studio_ipc::{AudioSettings, VideoSettings};

    #[derive(Default)]
    struct Recorder {
        names: parking_lot::Mutex<Vec<String>>,
    }

    impl RenderEngine for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn init_video(&self, _: &VideoSettings, _: Sender<EngineNotice>) -> EngineResult<()> {
            Ok(())
        }

        fn init_audio(&self, _: &AudioSettings) -> EngineResult<()> {
            Ok(())
        }

        fn execute(&self, directive: Directive) -> EngineResult<()> {
            match directive {
                Directive::UnbindDisplay { name } if name == "bad" => {
                    Err(EngineError::Failed("no such surface".into()))
                }
                Directive::UnbindDisplay { name } => {
                    self.names.lock().push(name);
                    Ok(())
                }
                _ => Ok(()),
            }
        }

        fn release_audio(&self) {}

        fn release_video(&self) {}
    }

    fn unbind(name: &str) -> Directive {
        Directive::UnbindDisplay {
            name: name.to_string(),
        }
    }

    #[test]
    fn test_directives_run_in_order() {
        let engine = Arc::new(Recorder::default());
        let (event_tx, event_rx) = crossbeam_channel::bounded(8);
        let dispatcher = Dispatcher::new();
        dispatcher.start(engine.clone(), EventSink::new(event_tx)).unwrap();

        dispatcher.submit_all(["a", "bad", "b", "c"].map(unbind));
        dispatcher.flush();
        assert_eq!(*engine.names.lock(), vec!["a", "b", "c"]);

        match event_rx.try_recv().unwrap() {
            StudioEvent::DirectiveFailed { directive, message } => {
                assert_eq!(directive, "unbindDisplay");
                assert_eq!(message, "no such surface");
            }
            other => panic!("unexpected event {other:?}"),
        }
        dispatcher.stop();
    }

    #[test]
    fn test_stop_drains_queue() {
        let engine = Arc::new(Recorder::default());
        let (event_tx, _event_rx) = crossbeam_channel::bounded(8);
        let dispatcher = Dispatcher::new();
        dispatcher.start(engine.clone(), EventSink::new(event_tx)).unwrap();
        dispatcher.submit(unbind("last"));
        dispatcher.stop();
        assert_eq!(*engine.names.lock(), vec!["last"]);

        // Stopping twice and flushing a stopped dispatcher are no-ops.
        dispatcher.stop();
        dispatcher.flush();
    }
}
