use crossbeam::channel::{self, Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Request {
    Run(Job, Sender<thread::Result<()>>),
    Shutdown,
}

/// A dedicated thread that runs stop-the-world operations one at a time.
/// The requesting thread blocks until its operation completes. A panic in the
/// operation is propagated to the requesting thread.
pub struct StopTheWorldDaemon {
    sender: Sender<Request>,
    handle: Option<JoinHandle<()>>,
}

impl StopTheWorldDaemon {
    pub fn new(name: &str) -> Self {
        let (sender, receiver) = channel::unbounded();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || Self::run(receiver))
            .unwrap_or_else(|e| panic!("Failed to spawn the {} thread: {}", name, e));
        StopTheWorldDaemon {
            sender,
            handle: Some(handle),
        }
    }

    fn run(receiver: Receiver<Request>) {
        for request in receiver {
            match request {
                Request::Run(job, reply) => {
                    let result = panic::catch_unwind(AssertUnwindSafe(job));
                    // The requester is blocked on the reply. It only goes away if it
                    // panicked itself, and then nobody needs the result.
                    let _ = reply.send(result);
                }
                Request::Shutdown => break,
            }
        }
        trace!("Stop-the-world daemon exits");
    }

    /// Run `job` on the daemon thread, wait for it to finish, and return its result.
    pub fn execute<'a, R, F>(&self, job: F) -> R
    where
        R: Send + 'a,
        F: FnOnce() -> R + Send + 'a,
    {
        let mut output = None;
        self.execute_boxed(Box::new(|| output = Some(job())));
        match output {
            Some(output) => output,
            None => unreachable!("the daemon replied without running the job"),
        }
    }

    fn execute_boxed<'a>(&self, job: Box<dyn FnOnce() + Send + 'a>) {
        // SAFETY: The job may borrow from the caller's stack. We do not return until
        // the daemon has consumed the job and replied, so every borrow outlives it.
        let job: Job = unsafe { std::mem::transmute::<Box<dyn FnOnce() + Send + 'a>, Job>(job) };
        let (reply_sender, reply_receiver) = channel::bounded(1);
        if self.sender.send(Request::Run(job, reply_sender)).is_err() {
            panic!("The stop-the-world daemon is gone");
        }
        match reply_receiver.recv() {
            Ok(Ok(())) => {}
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(_) => panic!("The stop-the-world daemon exited before replying"),
        }
    }
}

impl Drop for StopTheWorldDaemon {
    fn drop(&mut self) {
        let _ = self.sender.send(Request::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("The stop-the-world daemon panicked while shutting down");
            }
        }
    }
}
