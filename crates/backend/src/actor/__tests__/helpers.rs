//! Test helpers for worker pool tests.
//!
//! Provides a `Job` payload and a recording handler that appends every job it
//! sees to a shared log, so tests can assert on processing order.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;

use crate::actor::{Dispatcher, Payload, Route};

/// A keyed unit of work; `seq` is the submission order within a test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
  pub key: String,
  pub seq: usize,
}

impl Job {
  pub fn new(key: &str, seq: usize) -> Self {
    Self {
      key: key.to_string(),
      seq,
    }
  }

  pub fn route(&self) -> Route {
    Route::sticky(self.key.as_str())
  }
}

impl Payload for Job {}

pub type JobLog = Arc<Mutex<Vec<Job>>>;

/// Dispatcher whose handler records each job and returns its `seq`
///
/// `delay` is slept inside the handler before recording.
pub fn recording_dispatcher(workers: usize, delay: Duration) -> (Dispatcher<Job, usize>, JobLog) {
  let log: JobLog = Arc::new(Mutex::new(Vec::new()));
  let dispatcher = Dispatcher::new(256);

  let handler_log = log.clone();
  dispatcher.set_handler(move |job: Job| {
    let log = handler_log.clone();
    async move {
      if !delay.is_zero() {
        tokio::time::sleep(delay).await;
      }
      let seq = job.seq;
      log.lock().push(job);
      Ok::<_, std::io::Error>(seq)
    }
  });
  dispatcher.create_workers(workers).expect("create workers");

  (dispatcher, log)
}

/// Sequence numbers the log recorded for `key`, in processing order
pub fn seqs_for(log: &JobLog, key: &str) -> Vec<usize> {
  log.lock().iter().filter(|job| job.key == key).map(|job| job.seq).collect()
}
