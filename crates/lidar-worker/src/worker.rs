//! The worker's main loop: block-pop a job, dispatch it, persist the
//! result, optionally deliver a signed webhook callback, repeat until a
//! shutdown signal arrives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::broker::BrokerClient;
use crate::dispatcher::dispatch;
use crate::job::{Job, JobError, JobResult, JobStatus};
use crate::settings::Settings;
use crate::webhook;

/// How long a single `pop` call blocks before re-checking the shutdown
/// flag. Keeps shutdown latency bounded without busy-waiting.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct Worker<B: BrokerClient> {
    broker: Arc<B>,
    settings: Settings,
    shutdown: Arc<AtomicBool>,
}

impl<B: BrokerClient + 'static> Worker<B> {
    pub fn new(broker: Arc<B>, settings: Settings) -> Worker<B> {
        Worker {
            broker,
            settings,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a handle that, when invoked, requests the run loop stop
    /// after its current job.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Runs the poll/dispatch/publish loop until `shutdown` is set.
    /// Returns the number of jobs processed.
    pub fn run(&self) -> u64 {
        let mut processed = 0u64;
        log::info!(
            "worker starting, queue={}, job_timeout={}s",
            self.settings.queue_name,
            self.settings.job_timeout_secs
        );
        while !self.shutdown.load(Ordering::SeqCst) {
            match self.broker.pop(&self.settings.queue_name, POLL_INTERVAL) {
                Ok(Some(job)) => {
                    self.process_job(job);
                    processed += 1;
                }
                Ok(None) => continue,
                Err(e) => {
                    log::error!("broker unavailable while polling for jobs: {}", e);
                    std::thread::sleep(Duration::from_secs(1));
                }
            }
        }
        log::info!("worker shutting down after {} job(s)", processed);
        processed
    }

    fn process_job(&self, job: Job) {
        let job_type_name = job.job_type.name().to_string();
        log::info!("starting job {} ({})", job.id, job_type_name);
        let started_at = Utc::now().to_rfc3339();

        let (tx, rx) = mpsc::channel();
        let settings = self.settings.clone();
        let job_type = job.job_type.clone();
        let started = Instant::now();
        std::thread::spawn(move || {
            let result = dispatch(&job_type, &settings);
            let _ = tx.send(result);
        });

        let timeout = Duration::from_secs(self.settings.job_timeout_secs);
        let outcome = rx.recv_timeout(timeout);

        let finished_at = Utc::now().to_rfc3339();
        let result = match outcome {
            Ok(Ok(payload)) => JobResult {
                job_id: job.id.clone(),
                status: JobStatus::Completed,
                job_type: job_type_name.clone(),
                payload: Some(payload),
                error: None,
                started_at: Some(started_at),
                finished_at: Some(finished_at),
            },
            Ok(Err(core_error)) => JobResult {
                job_id: job.id.clone(),
                status: JobStatus::Failed,
                job_type: job_type_name.clone(),
                payload: None,
                error: Some(JobError {
                    code: core_error.code().to_string(),
                    message: core_error.to_string(),
                }),
                started_at: Some(started_at),
                finished_at: Some(finished_at),
            },
            Err(mpsc::RecvTimeoutError::Timeout) => JobResult {
                job_id: job.id.clone(),
                status: JobStatus::Failed,
                job_type: job_type_name.clone(),
                payload: None,
                error: Some(JobError {
                    code: "JOB_TIMEOUT".to_string(),
                    message: format!(
                        "job exceeded the configured timeout of {}s",
                        self.settings.job_timeout_secs
                    ),
                }),
                started_at: Some(started_at),
                finished_at: Some(finished_at),
            },
            Err(mpsc::RecvTimeoutError::Disconnected) => JobResult {
                job_id: job.id.clone(),
                status: JobStatus::Failed,
                job_type: job_type_name.clone(),
                payload: None,
                error: Some(JobError {
                    code: "WORKER_PANIC".to_string(),
                    message: "job-processing thread terminated unexpectedly".to_string(),
                }),
                started_at: Some(started_at),
                finished_at: Some(finished_at),
            },
        };
        log::info!(
            "finished job {} in {:.2}s, status={:?}",
            job.id,
            started.elapsed().as_secs_f64(),
            result.status
        );

        self.publish_result(&result);
        if let Some(url) = &job.callback_url {
            self.deliver_callback(url, &result);
        }
    }

    fn publish_result(&self, result: &JobResult) {
        let key = format!("{}{}", self.settings.result_key_prefix, result.job_id);
        let body = serde_json::to_string(result).expect("JobResult always serializes");
        let ttl = Duration::from_secs(self.settings.result_ttl_secs);

        let mut backoff = Duration::from_secs(1);
        loop {
            match self.broker.set_with_ttl(&key, &body, ttl) {
                Ok(()) => return,
                Err(e) => {
                    if self.shutdown.load(Ordering::SeqCst) {
                        log::error!("giving up publishing result {} during shutdown: {}", key, e);
                        return;
                    }
                    log::warn!("broker unavailable publishing result {}: {}, retrying", key, e);
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(Duration::from_secs(30));
                }
            }
        }
    }

    fn deliver_callback(&self, url: &str, result: &JobResult) {
        let timeout = Duration::from_secs(self.settings.callback_timeout_secs);
        if let Err(e) = webhook::deliver(
            url,
            result,
            &self.settings.webhook_secret,
            timeout,
            self.settings.callback_retries,
        ) {
            log::error!("webhook callback to {} for job {} failed: {}", url, result.job_id, e);
        }
    }
}

/// Installs a Ctrl-C handler that sets `flag` on the first signal. Safe to
/// call once per process; a second registration attempt is logged and
/// ignored rather than panicking the caller.
pub fn install_shutdown_handler(flag: Arc<AtomicBool>) {
    let result = ctrlc::set_handler(move || {
        log::info!("shutdown signal received, finishing current job then exiting");
        flag.store(true, Ordering::SeqCst);
    });
    if let Err(e) = result {
        log::warn!("failed to install Ctrl-C handler: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::job::JobType;
    use lidar_codec::{write_point_cloud, LasHeader};
    use lidar_common::Bounds3D;

    fn settings_with_short_timeout() -> Settings {
        Settings {
            job_timeout_secs: 5,
            result_ttl_secs: 60,
            ..Settings::default()
        }
    }

    fn write_sample_las(path: &std::path::Path) {
        let n = 20usize;
        let header = LasHeader {
            version_major: 1,
            version_minor: 2,
            point_format: 1,
            point_record_length: 28,
            scale: (0.001, 0.001, 0.001),
            offset: (0.0, 0.0, 0.0),
            bounds: Bounds3D::new((0.0, 0.0, 0.0), (20.0, 20.0, 10.0)),
            point_count: (n * n) as u64,
            crs: Some("EPSG:32610".to_string()),
        };
        let mut x = Vec::new();
        let mut y = Vec::new();
        let mut z = Vec::new();
        for i in 0..n {
            for j in 0..n {
                x.push(i as f64);
                y.push(j as f64);
                z.push(5.0);
            }
        }
        let cloud = lidar_codec::PointCloud {
            header: Some(header),
            x,
            y,
            z,
            intensity: None,
            classification: Some(vec![2; n * n]),
            return_number: Some(vec![1; n * n]),
            number_of_returns: Some(vec![1; n * n]),
        };
        write_point_cloud(&cloud, path, 1, false).unwrap();
    }

    #[test]
    fn processes_a_validate_job_and_publishes_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.las");
        write_sample_las(&path);

        let broker = Arc::new(InMemoryBroker::new());
        broker.push(Job {
            id: "job-1".to_string(),
            job_type: JobType::Validate {
                file_path: path.to_string_lossy().to_string(),
                require_crs: false,
                check_point_density: false,
            },
            callback_url: None,
            priority: 0,
            enqueued_at: Utc::now().to_rfc3339(),
        });

        let worker = Worker::new(broker.clone(), settings_with_short_timeout());
        let shutdown = worker.shutdown_handle();

        let handle = std::thread::spawn(move || worker.run());
        std::thread::sleep(Duration::from_millis(200));
        shutdown.store(true, Ordering::SeqCst);
        let processed = handle.join().unwrap();
        assert_eq!(processed, 1);

        let stored = broker.get("lidar:result:job-1").unwrap();
        assert!(stored.is_some());
        let result: JobResult = serde_json::from_str(&stored.unwrap()).unwrap();
        assert_eq!(result.job_id, "job-1");
        assert_eq!(result.status, JobStatus::Completed);
    }

    #[test]
    fn missing_file_produces_failed_result_not_a_panic() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.push(Job {
            id: "job-2".to_string(),
            job_type: JobType::Validate {
                file_path: "/no/such/file.las".to_string(),
                require_crs: false,
                check_point_density: false,
            },
            callback_url: None,
            priority: 0,
            enqueued_at: Utc::now().to_rfc3339(),
        });
        let worker = Worker::new(broker.clone(), settings_with_short_timeout());
        let shutdown = worker.shutdown_handle();
        let handle = std::thread::spawn(move || worker.run());
        std::thread::sleep(Duration::from_millis(200));
        shutdown.store(true, Ordering::SeqCst);
        handle.join().unwrap();

        // `validate` never errors (§7: missing files are reported as an
        // Invalid status, not a dispatch failure), so this still completes.
        let stored = broker.get("lidar:result:job-2").unwrap().unwrap();
        let result: JobResult = serde_json::from_str(&stored).unwrap();
        assert_eq!(result.status, JobStatus::Completed);
        assert_eq!(result.payload.unwrap()["is_valid"], serde_json::json!(false));
    }
}
