//! Batch bookkeeping between the optimizer and the fitness workers.
//!
//! `JobManager` is the synchronous state machine: it partitions a population
//! into jobs, tracks worker load and availability and owns the completion
//! barrier. `SharedJobManager` wraps it in a single mutex so conversations and
//! the optimizer can call it from different tasks; the barrier is awaited
//! outside the lock.

use crate::domain::errors::JobManagerError;
use crate::domain::optimization::job::split_into_chunks;
use crate::domain::optimization::{Genotype, Job, WorkerDescriptor, WorkerId};
use crate::infrastructure::observability::Metrics;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

struct Batch {
    id: u64,
    jobs: Vec<Job>,
    done: Vec<bool>,
    barrier: Arc<Semaphore>,
    started: Instant,
}

impl Batch {
    fn job_index(&self, job: &Job) -> Result<usize, JobManagerError> {
        if job.batch_id != self.id || job.job_id >= self.jobs.len() {
            return Err(JobManagerError::UnknownJob {
                batch_id: job.batch_id,
                job_id: job.job_id,
            });
        }
        Ok(job.job_id)
    }
}

pub struct JobManager {
    workers: Vec<(WorkerId, WorkerDescriptor)>,
    batch: Option<Batch>,
    next_batch_id: u64,
    last_abort: Option<(u64, String)>,
    metrics: Option<Metrics>,
}

impl JobManager {
    /// Workers keep their registration order, which breaks load ties.
    pub fn new(workers: impl IntoIterator<Item = WorkerId>) -> Self {
        let mut registered: Vec<(WorkerId, WorkerDescriptor)> = Vec::new();
        for worker in workers {
            if !registered.iter().any(|(id, _)| *id == worker) {
                registered.push((worker, WorkerDescriptor::default()));
            }
        }

        Self {
            workers: registered,
            batch: None,
            next_batch_id: 0,
            last_abort: None,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        metrics.workers_available.set(self.workers.len() as f64);
        self.metrics = Some(metrics);
        self
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn is_batch_open(&self) -> bool {
        self.batch.is_some()
    }

    /// Jobs of the open batch not yet reported done.
    pub fn outstanding_jobs(&self) -> usize {
        self.batch
            .as_ref()
            .map(|b| b.done.iter().filter(|done| !**done).count())
            .unwrap_or(0)
    }

    pub fn worker_snapshot(&self) -> Vec<(WorkerId, WorkerDescriptor)> {
        self.workers.clone()
    }

    /// Splits `population` into jobs and assigns each to the least loaded worker.
    pub fn create_jobs(
        &mut self,
        population: &[Genotype],
        max_jobs: Option<usize>,
    ) -> Result<Vec<Job>, JobManagerError> {
        if let Some(batch) = &self.batch {
            return Err(JobManagerError::BatchInProgress { batch_id: batch.id });
        }
        if self.workers.is_empty() {
            return Err(JobManagerError::NoWorkers);
        }
        if population.is_empty() {
            return Err(JobManagerError::EmptyPopulation);
        }

        let available = self.available_count();
        let job_count = max_jobs.unwrap_or(available).max(1).min(available);

        let batch_id = self.next_batch_id;
        self.next_batch_id += 1;

        let mut jobs = Vec::with_capacity(job_count);
        for chunk in split_into_chunks(population, job_count) {
            if chunk.is_empty() {
                continue;
            }
            let worker = self.assign_worker(None);
            jobs.push(Job::new(batch_id, jobs.len(), worker, chunk));
        }

        info!(
            "JobManager: Batch {} created ({} genotypes in {} jobs over {} available workers)",
            batch_id,
            population.len(),
            jobs.len(),
            available
        );
        if let Some(metrics) = &self.metrics {
            metrics.jobs_created_total.inc_by(jobs.len() as f64);
        }

        self.batch = Some(Batch {
            id: batch_id,
            done: vec![false; jobs.len()],
            jobs: jobs.clone(),
            barrier: Arc::new(Semaphore::new(0)),
            started: Instant::now(),
        });
        self.last_abort = None;

        Ok(jobs)
    }

    /// Least loaded available worker; ties go to the earliest registered.
    ///
    /// When nobody is available every worker is made available again first.
    pub fn select_worker(&mut self) -> Result<WorkerId, JobManagerError> {
        if self.workers.is_empty() {
            return Err(JobManagerError::NoWorkers);
        }
        let index = self.select_index(None);
        Ok(self.workers[index].0.clone())
    }

    /// Stores the job's result and releases one barrier permit.
    pub fn job_done(&mut self, job: &Job) -> Result<(), JobManagerError> {
        let batch = self.batch.as_mut().ok_or(JobManagerError::UnknownJob {
            batch_id: job.batch_id,
            job_id: job.job_id,
        })?;
        let index = batch.job_index(job)?;
        if batch.done[index] {
            return Err(JobManagerError::AlreadyCompleted { job_id: index });
        }

        let canonical = &mut batch.jobs[index];
        if job.result.len() != canonical.data.len() {
            return Err(JobManagerError::ResultLengthMismatch {
                job_id: index,
                expected: canonical.data.len(),
                actual: job.result.len(),
            });
        }
        canonical.result = job.result.clone();
        batch.done[index] = true;
        let worker_id = canonical.worker_id.clone();

        if let Some(descriptor) = descriptor_mut(&mut self.workers, &worker_id) {
            descriptor.assigned_jobs = descriptor.assigned_jobs.saturating_sub(1);
            descriptor.available = true;
        }

        // result is stored before the permit becomes visible to jobs_finished
        batch.barrier.add_permits(1);

        debug!(
            "JobManager: Job {} of batch {} done by {}",
            index, batch.id, worker_id
        );
        if let Some(metrics) = &self.metrics {
            metrics.jobs_completed_total.inc();
        }
        self.publish_availability();
        Ok(())
    }

    /// Takes the job away from its failing worker and hands back the reassigned copy.
    pub fn job_failed(&mut self, job: &Job) -> Result<Job, JobManagerError> {
        if descriptor_mut(&mut self.workers, &job.worker_id).is_none() {
            return Err(JobManagerError::UnknownWorker {
                worker_id: job.worker_id.clone(),
            });
        }

        let batch = self.batch.as_ref().ok_or(JobManagerError::UnknownJob {
            batch_id: job.batch_id,
            job_id: job.job_id,
        })?;
        let index = batch.job_index(job)?;
        if batch.done[index] {
            return Err(JobManagerError::AlreadyCompleted { job_id: index });
        }

        let failed = batch.jobs[index].worker_id.clone();
        if failed != job.worker_id {
            warn!(
                "JobManager: Job {} reported failed on {} but is assigned to {}",
                index, job.worker_id, failed
            );
        }

        if let Some(descriptor) = descriptor_mut(&mut self.workers, &failed) {
            descriptor.assigned_jobs = descriptor.assigned_jobs.saturating_sub(1);
            descriptor.available = false;
        }

        let replacement = self.assign_worker(Some(&failed));
        warn!(
            "JobManager: Job {} reassigned from {} to {}",
            index, failed, replacement
        );
        if let Some(metrics) = &self.metrics {
            metrics.inc_reassignments(failed.as_str());
        }

        let batch = self
            .batch
            .as_mut()
            .ok_or(JobManagerError::NoBatch)?;
        batch.jobs[index].worker_id = replacement;
        let updated = batch.jobs[index].clone();
        self.publish_availability();
        Ok(updated)
    }

    /// Barrier handle and permit count for the open batch.
    pub fn completion_barrier(&self) -> Result<(u64, Arc<Semaphore>, u32), JobManagerError> {
        let batch = self.batch.as_ref().ok_or(JobManagerError::NoBatch)?;
        let permits = u32::try_from(batch.jobs.len()).unwrap_or(u32::MAX);
        Ok((batch.id, Arc::clone(&batch.barrier), permits))
    }

    /// Concatenates results in job order and resets the batch.
    ///
    /// Only valid once every permit of the barrier has been consumed.
    pub fn finish_batch(&mut self, batch_id: u64) -> Result<Vec<f64>, JobManagerError> {
        match &self.batch {
            Some(batch) if batch.id == batch_id => {}
            _ => return Err(self.aborted_or_missing(batch_id)),
        }

        let batch = self.batch.take().ok_or(JobManagerError::NoBatch)?;
        if let Some(metrics) = &self.metrics {
            metrics
                .batch_duration_seconds
                .observe(batch.started.elapsed().as_secs_f64());
        }

        let results: Vec<f64> = batch.jobs.into_iter().flat_map(|job| job.result).collect();
        self.reset_workers();
        info!(
            "JobManager: Batch {} finished with {} fitness values",
            batch.id,
            results.len()
        );
        Ok(results)
    }

    /// Drops batch `batch_id` and wakes anyone waiting on its barrier with an error.
    ///
    /// Returns false when `batch_id` is not the open batch; a newer batch is left alone.
    pub fn abort_batch(&mut self, batch_id: u64, reason: &str) -> bool {
        match &self.batch {
            Some(batch) if batch.id == batch_id => {}
            _ => {
                debug!(
                    "JobManager: Ignoring abort of batch {} ({}): not the open batch",
                    batch_id, reason
                );
                return false;
            }
        }

        let Some(batch) = self.batch.take() else {
            return false;
        };
        warn!("JobManager: Batch {} aborted: {}", batch.id, reason);
        batch.barrier.close();
        self.last_abort = Some((batch.id, reason.to_string()));
        self.reset_workers();
        true
    }

    fn aborted_or_missing(&self, batch_id: u64) -> JobManagerError {
        match &self.last_abort {
            Some((id, reason)) if *id == batch_id => JobManagerError::BatchAborted {
                batch_id,
                reason: reason.clone(),
            },
            _ => JobManagerError::NoBatch,
        }
    }

    fn available_count(&mut self) -> usize {
        let count = self.workers.iter().filter(|(_, d)| d.available).count();
        if count == 0 {
            self.reset_availability();
            return self.workers.len();
        }
        count
    }

    fn assign_worker(&mut self, excluded: Option<&WorkerId>) -> WorkerId {
        let index = self.select_index(excluded);
        let (worker, descriptor) = &mut self.workers[index];
        descriptor.assigned_jobs += 1;
        worker.clone()
    }

    /// Callers guarantee at least one registered worker.
    fn select_index(&mut self, excluded: Option<&WorkerId>) -> usize {
        if let Some(index) = self.least_loaded(|id, d| d.available && Some(id) != excluded) {
            return index;
        }

        debug!("JobManager: No worker available, resetting availability");
        self.reset_availability();
        self.least_loaded(|id, _| Some(id) != excluded)
            .or_else(|| self.least_loaded(|_, _| true))
            .unwrap_or(0)
    }

    fn least_loaded(&self, eligible: impl Fn(&WorkerId, &WorkerDescriptor) -> bool) -> Option<usize> {
        self.workers
            .iter()
            .enumerate()
            .filter(|(_, (id, d))| eligible(id, d))
            .min_by_key(|(index, (_, d))| (d.assigned_jobs, *index))
            .map(|(index, _)| index)
    }

    fn reset_availability(&mut self) {
        for (_, descriptor) in &mut self.workers {
            descriptor.available = true;
        }
        self.publish_availability();
    }

    fn reset_workers(&mut self) {
        for (_, descriptor) in &mut self.workers {
            *descriptor = WorkerDescriptor::default();
        }
        self.publish_availability();
    }

    fn publish_availability(&self) {
        if let Some(metrics) = &self.metrics {
            let available = self.workers.iter().filter(|(_, d)| d.available).count();
            metrics.workers_available.set(available as f64);
        }
    }
}

fn descriptor_mut<'a>(
    workers: &'a mut [(WorkerId, WorkerDescriptor)],
    worker_id: &WorkerId,
) -> Option<&'a mut WorkerDescriptor> {
    workers
        .iter_mut()
        .find(|(id, _)| id == worker_id)
        .map(|(_, descriptor)| descriptor)
}

/// Cloneable handle serializing every mutation through one mutex.
#[derive(Clone)]
pub struct SharedJobManager {
    inner: Arc<Mutex<JobManager>>,
}

impl SharedJobManager {
    pub fn new(manager: JobManager) -> Self {
        Self {
            inner: Arc::new(Mutex::new(manager)),
        }
    }

    pub async fn create_jobs(
        &self,
        population: &[Genotype],
        max_jobs: Option<usize>,
    ) -> Result<Vec<Job>, JobManagerError> {
        self.inner.lock().await.create_jobs(population, max_jobs)
    }

    pub async fn select_worker(&self) -> Result<WorkerId, JobManagerError> {
        self.inner.lock().await.select_worker()
    }

    pub async fn job_done(&self, job: &Job) -> Result<(), JobManagerError> {
        self.inner.lock().await.job_done(job)
    }

    pub async fn job_failed(&self, job: &Job) -> Result<Job, JobManagerError> {
        self.inner.lock().await.job_failed(job)
    }

    /// Waits for one permit per job, then returns the concatenated results.
    pub async fn jobs_finished(&self) -> Result<Vec<f64>, JobManagerError> {
        let (batch_id, barrier, permits) = self.inner.lock().await.completion_barrier()?;

        match barrier.acquire_many(permits).await {
            Ok(permit) => permit.forget(),
            Err(_) => {
                let manager = self.inner.lock().await;
                return Err(manager.aborted_or_missing(batch_id));
            }
        }

        self.inner.lock().await.finish_batch(batch_id)
    }

    pub async fn abort_batch(&self, batch_id: u64, reason: &str) -> bool {
        self.inner.lock().await.abort_batch(batch_id, reason)
    }

    pub async fn worker_snapshot(&self) -> Vec<(WorkerId, WorkerDescriptor)> {
        self.inner.lock().await.worker_snapshot()
    }

    pub async fn outstanding_jobs(&self) -> usize {
        self.inner.lock().await.outstanding_jobs()
    }

    pub async fn is_batch_open(&self) -> bool {
        self.inner.lock().await.is_batch_open()
    }

    pub async fn worker_count(&self) -> usize {
        self.inner.lock().await.worker_count()
    }
}
