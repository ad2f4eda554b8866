//! Blocking broker abstraction. The worker only needs two primitives from
//! its backing queue: pop-with-timeout for jobs, and a small TTL'd
//! key/value store for results. Concrete brokers (Redis, SQS, ...) are
//! expected to implement [`BrokerClient`]; the in-memory implementation
//! here backs the worker's own tests.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::job::Job;

/// Blocking job queue plus a TTL key/value result store. Passed to
/// [`crate::worker::Worker`] by value rather than resolved from a global,
/// so tests can swap in an in-memory double.
pub trait BrokerClient: Send {
    /// Blocks for up to `timeout` waiting for a job; returns `None` on
    /// timeout so the worker can re-check its shutdown flag.
    fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<Job>, BrokerError>;

    /// Writes `value` under `key`, expiring after `ttl`.
    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BrokerError>;

    fn get(&self, key: &str) -> Result<Option<String>, BrokerError>;
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("broker unavailable: {0}")]
pub struct BrokerError(pub String);

struct Entry {
    value: String,
    expires_at: Instant,
}

/// A single-process, in-memory `BrokerClient`. Used by the worker's own
/// integration tests and as a reference implementation for anyone wiring
/// up a new broker backend.
pub struct InMemoryBroker {
    queue: Mutex<VecDeque<Job>>,
    condvar: Condvar,
    kv: Mutex<std::collections::HashMap<String, Entry>>,
}

impl InMemoryBroker {
    pub fn new() -> InMemoryBroker {
        InMemoryBroker {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            kv: Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn push(&self, job: Job) {
        let mut queue = self.queue.lock().unwrap();
        queue.push_back(job);
        self.condvar.notify_one();
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        InMemoryBroker::new()
    }
}

impl BrokerClient for InMemoryBroker {
    fn pop(&self, _queue: &str, timeout: Duration) -> Result<Option<Job>, BrokerError> {
        let mut queue = self.queue.lock().unwrap();
        let deadline = Instant::now() + timeout;
        while queue.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, result) = self
                .condvar
                .wait_timeout(queue, deadline - now)
                .unwrap();
            queue = guard;
            if result.timed_out() && queue.is_empty() {
                return Ok(None);
            }
        }
        Ok(queue.pop_front())
    }

    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BrokerError> {
        let mut kv = self.kv.lock().unwrap();
        kv.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, BrokerError> {
        let mut kv = self.kv.lock().unwrap();
        match kv.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                kv.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobType;

    fn sample_job() -> Job {
        Job {
            id: "j1".to_string(),
            job_type: JobType::Validate {
                file_path: "a.las".to_string(),
                require_crs: false,
                check_point_density: false,
            },
            callback_url: None,
            priority: 0,
            enqueued_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn pop_times_out_on_empty_queue() {
        let broker = InMemoryBroker::new();
        let result = broker.pop("q", Duration::from_millis(50)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn pop_returns_pushed_job() {
        let broker = InMemoryBroker::new();
        broker.push(sample_job());
        let job = broker.pop("q", Duration::from_millis(50)).unwrap();
        assert_eq!(job.unwrap().id, "j1");
    }

    #[test]
    fn kv_expires_after_ttl() {
        let broker = InMemoryBroker::new();
        broker
            .set_with_ttl("k", "v", Duration::from_millis(10))
            .unwrap();
        assert_eq!(broker.get("k").unwrap(), Some("v".to_string()));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(broker.get("k").unwrap(), None);
    }
}
