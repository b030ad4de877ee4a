//! Background execution of ingestion runs.
//!
//! Uploads are submitted fire-and-forget; the job row's `status` column is
//! the only externally observable progress signal. Independent uploads may
//! run concurrently on different workers — the store's per-entity
//! transactions are the only cross-run contention point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info};

use crate::error::WorkerError;
use crate::job::UploadJob;
use crate::pipeline::{IngestPipeline, PipelineConfig, RunOutcome};
use crate::store::Database;

pub struct WorkerPool {
    job_sender: Sender<UploadJob>,
    result_receiver: Receiver<RunOutcome>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Starts `worker_count` threads, each with its own pipeline instance
    /// over a shared database handle.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new(config: Arc<PipelineConfig>, db: Database, worker_count: usize) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        let (job_sender, job_receiver) = bounded::<UploadJob>(worker_count * 2);
        let (result_sender, result_receiver) = bounded::<RunOutcome>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_config = Arc::clone(&config);
            let worker_db = db.clone();

            let handle = thread::spawn(move || {
                run_worker(worker_id, job_rx, result_tx, shutdown_flag, worker_config, worker_db);
            });

            workers.push(handle);
        }

        info!("Started {} ingestion workers", worker_count);

        Self {
            job_sender,
            result_receiver,
            workers,
            shutdown,
        }
    }

    /// Queues a job for background execution. The job row must already be
    /// persisted as `pending`.
    pub fn submit(&self, job: UploadJob) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.job_sender
            .send(job)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn try_recv_result(&self) -> Option<RunOutcome> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result(&self) -> Option<RunOutcome> {
        self.result_receiver.recv().ok()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Waits for all workers to finish their current job and exit.
    pub fn wait(self) {
        // Drop sender to signal workers to exit
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<UploadJob>,
    result_sender: Sender<RunOutcome>,
    shutdown: Arc<AtomicBool>,
    config: Arc<PipelineConfig>,
    db: Database,
) {
    debug!("Worker {} started", worker_id);

    let pipeline = IngestPipeline::from_config(config, db);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(std::time::Duration::from_millis(100)) {
            Ok(job) => {
                debug!("Worker {} processing job {}", worker_id, job.id);

                let outcome = pipeline.run(&job);

                if let Err(e) = result_sender.send(outcome) {
                    error!("Worker {} failed to send result: {}", worker_id, e);
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;
    use crate::policy::UploadPolicy;
    use crate::store::job_repo;
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn test_config() -> Arc<PipelineConfig> {
        Arc::new(PipelineConfig {
            policy: UploadPolicy {
                min_archive_bytes: 0,
                ..Default::default()
            },
            worker_count: 2,
        })
    }

    fn build_zip(dir: &Path, entries: &[(&str, &[u8])]) -> std::path::PathBuf {
        let path = dir.join("catalog.zip");
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    #[test]
    fn test_pool_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let pool = WorkerPool::new(test_config(), db, 2);

        assert!(!pool.is_shutdown());
        pool.shutdown();
        assert!(pool.is_shutdown());
        pool.wait();
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let db = Database::open_in_memory().unwrap();
        let pool = WorkerPool::new(test_config(), db, 1);
        pool.shutdown();

        let job = UploadJob::new("/tmp/whatever.zip".into());
        assert!(matches!(pool.submit(job), Err(WorkerError::ChannelClosed)));
        pool.wait();
    }

    #[test]
    fn test_submitted_job_runs_in_background() {
        let tmp = TempDir::new().unwrap();
        // A failing run is fine here; the pool contract is that the job
        // reaches a terminal status and a result comes back.
        let archive = build_zip(tmp.path(), &[("loose.txt", b"no dirs".as_slice())]);

        let db = Database::open_in_memory().unwrap();
        let pool = WorkerPool::new(test_config(), db.clone(), 2);

        let job = UploadJob::new(archive);
        job_repo::insert(&db, &job).unwrap();
        pool.submit(job.clone()).unwrap();

        let outcome = pool.recv_result().unwrap();
        assert_eq!(outcome.job_id, job.id);
        assert_eq!(outcome.status, JobStatus::Failed);

        let persisted = job_repo::find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(persisted.status, JobStatus::Failed);

        pool.shutdown();
        pool.wait();
    }
}
