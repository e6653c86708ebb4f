use std::time::Duration as StdDuration;

use time::{Duration, OffsetDateTime};
use tokio::time as tokio_time;

use crate::Result;
use cvdb_service::{CvdbService, Error as ServiceError, ProcessOutcome};
use cvdb_storage::{
	jobs,
	models::{IndexingOutboxEntry, IngestJob},
	outbox,
};

const BASE_BACKOFF_MS: i64 = 500;
const MAX_BACKOFF_MS: i64 = 30_000;
const PURGE_INTERVAL_SECONDS: i64 = 3_600;
const MAX_QUEUE_ERROR_CHARS: usize = 1_024;

#[derive(Debug, PartialEq, Eq)]
enum JobStep {
	Retry { available_in: Duration },
	Dead,
}

pub struct WorkerState {
	pub service: CvdbService,
}

/// Drains the ingest queue and the indexing outbox until the process exits. Sleeps only when
/// both are empty.
pub async fn run_worker(state: WorkerState) -> color_eyre::Result<()> {
	let poll_interval = StdDuration::from_millis(state.service.cfg.worker.poll_interval_ms);
	let mut last_purge: Option<OffsetDateTime> = None;

	tracing::info!(
		max_attempts = state.service.cfg.worker.max_attempts,
		lease_seconds = state.service.cfg.worker.claim_lease_seconds,
		"Worker started."
	);

	loop {
		let mut busy = false;

		match process_ingest_once(&state).await {
			Ok(worked) => busy |= worked,
			Err(err) => tracing::error!(error = %err, "Ingest job processing failed."),
		}
		match process_outbox_once(&state).await {
			Ok(worked) => busy |= worked,
			Err(err) => tracing::error!(error = %err, "Indexing outbox processing failed."),
		}

		let now = OffsetDateTime::now_utc();

		if last_purge.is_none_or(|at| now - at >= Duration::seconds(PURGE_INTERVAL_SECONDS)) {
			match purge_finished(&state, now).await {
				Ok(()) => last_purge = Some(now),
				Err(err) => tracing::error!(error = %err, "Queue cleanup failed."),
			}
		}

		if !busy {
			tokio_time::sleep(poll_interval).await;
		}
	}
}

async fn process_ingest_once(state: &WorkerState) -> Result<bool> {
	let service = &state.service;
	let worker_cfg = &service.cfg.worker;
	let now = OffsetDateTime::now_utc();
	let Some(job) = jobs::claim_next_ingest_job(
		&service.db,
		now,
		worker_cfg.claim_lease_seconds,
		worker_cfg.max_attempts,
	)
	.await?
	else {
		return Ok(false);
	};

	match process_with_lease(service, &job).await {
		Ok(outcome) => {
			if jobs::mark_ingest_job_done(&service.db, &job, OffsetDateTime::now_utc()).await? {
				tracing::info!(
					job_id = %job.job_id,
					person_id = outcome.person_id,
					resume_file_id = outcome.resume_file_id,
					indexed = outcome.indexed,
					"Ingest job done."
				);
			} else {
				tracing::warn!(
					job_id = %job.job_id,
					"Ingest job was taken over before it finished."
				);
			}
		},
		Err(err) => fail_ingest_job(service, &job, &err).await?,
	}

	Ok(true)
}

/// Runs the job while renewing its lease, so a slow provider call does not let another worker
/// claim it.
async fn process_with_lease(
	service: &CvdbService,
	job: &IngestJob,
) -> cvdb_service::Result<ProcessOutcome> {
	let lease_seconds = service.cfg.worker.claim_lease_seconds;
	let lease = Duration::seconds(lease_seconds);
	let mut heartbeat = tokio_time::interval(renew_interval(lease_seconds));
	let work = service.process_ingest_job(job);

	tokio::pin!(work);
	// The first tick completes immediately and the claim is still fresh.
	heartbeat.tick().await;

	loop {
		tokio::select! {
			result = &mut work => return result,
			_ = heartbeat.tick() => {
				let now = OffsetDateTime::now_utc();

				match jobs::renew_ingest_job_lease(&service.db, job, now + lease, now).await {
					Ok(true) => tracing::debug!(job_id = %job.job_id, "Ingest job lease renewed."),
					Ok(false) => tracing::warn!(job_id = %job.job_id, "Ingest job lease was lost."),
					Err(err) => {
						tracing::warn!(job_id = %job.job_id, error = %err, "Lease renewal failed.")
					},
				}
			},
		}
	}
}

async fn fail_ingest_job(
	service: &CvdbService,
	job: &IngestJob,
	err: &ServiceError,
) -> Result<()> {
	let attempts = job.attempts;
	let error_text = sanitize_queue_error(&err.to_string());
	let now = OffsetDateTime::now_utc();

	match next_step(err, attempts, service.cfg.worker.max_attempts) {
		JobStep::Retry { available_in } => {
			if jobs::mark_ingest_job_failed(&service.db, job, &error_text, now + available_in, now)
				.await?
			{
				tracing::warn!(
					job_id = %job.job_id,
					attempts,
					error = %err,
					"Ingest job will retry."
				);
			}
		},
		JobStep::Dead => {
			if jobs::mark_ingest_job_dead(&service.db, job, &error_text, now).await? {
				tracing::error!(job_id = %job.job_id, attempts, error = %err, "Ingest job is dead.");
			}
		},
	}

	Ok(())
}

async fn process_outbox_once(state: &WorkerState) -> Result<bool> {
	let service = &state.service;
	let now = OffsetDateTime::now_utc();
	let Some(entry) =
		outbox::claim_next_outbox_job(&service.db, now, service.cfg.worker.claim_lease_seconds)
			.await?
	else {
		return Ok(false);
	};

	match handle_outbox_entry(service, &entry).await {
		Ok(()) => {
			outbox::mark_outbox_done(&service.db, entry.outbox_id, OffsetDateTime::now_utc())
				.await?;
		},
		// Retrying cannot fix these, e.g. a resume that failed or vanished meanwhile.
		Err(err) if !err.is_transient() => {
			tracing::warn!(
				outbox_id = %entry.outbox_id,
				op = %entry.op,
				error = %err,
				"Dropping outbox entry."
			);
			outbox::mark_outbox_done(&service.db, entry.outbox_id, OffsetDateTime::now_utc())
				.await?;
		},
		Err(err) => {
			let attempts = entry.attempts.saturating_add(1);
			let now = OffsetDateTime::now_utc();

			outbox::mark_outbox_failed(
				&service.db,
				entry.outbox_id,
				attempts,
				&sanitize_queue_error(&err.to_string()),
				now + backoff_for_attempt(attempts),
				now,
			)
			.await?;
			tracing::error!(outbox_id = %entry.outbox_id, error = %err, "Outbox entry failed.");
		},
	}

	Ok(true)
}

async fn handle_outbox_entry(
	service: &CvdbService,
	entry: &IndexingOutboxEntry,
) -> cvdb_service::Result<()> {
	match (entry.op.as_str(), entry.resume_file_id, entry.person_id) {
		(outbox::OP_UPSERT, Some(resume_file_id), _) => {
			if !service.project_resume(resume_file_id).await? {
				tracing::info!(resume_file_id, "Resume is gone or failed. Nothing to project.");
			}

			Ok(())
		},
		(outbox::OP_DELETE, _, Some(person_id)) => service.unproject_person(person_id).await,
		(op, ..) => Err(ServiceError::InvalidRequest {
			message: format!("Malformed outbox entry with op {op:?}."),
		}),
	}
}

async fn purge_finished(state: &WorkerState, now: OffsetDateTime) -> Result<()> {
	let before = now - Duration::days(state.service.cfg.worker.job_retention_days);
	let jobs_removed = jobs::purge_finished_ingest_jobs(&state.service.db, before).await?;
	let outbox_removed = outbox::purge_done_outbox(&state.service.db, before).await?;

	if jobs_removed > 0 || outbox_removed > 0 {
		tracing::info!(jobs_removed, outbox_removed, "Finished queue rows purged.");
	}

	Ok(())
}

fn next_step(err: &ServiceError, attempts: i32, max_attempts: i32) -> JobStep {
	if err.is_transient() && attempts < max_attempts {
		JobStep::Retry { available_in: backoff_for_attempt(attempts) }
	} else {
		JobStep::Dead
	}
}

/// A third of the lease, so two renewals can fail before the lease runs out.
fn renew_interval(lease_seconds: i64) -> StdDuration {
	StdDuration::from_millis((lease_seconds.max(1) as u64).saturating_mul(1_000) / 3)
}

fn backoff_for_attempt(attempt: i32) -> Duration {
	let attempts = attempt.max(1) as u32;
	let exp = attempts.saturating_sub(1).min(6);
	let base = BASE_BACKOFF_MS.saturating_mul(1 << exp);

	Duration::milliseconds(base.min(MAX_BACKOFF_MS))
}

/// Queue rows are readable through the API, so credentials in provider errors are masked.
fn sanitize_queue_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["api_key", "apikey", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = raw.split(sep).next().unwrap_or(raw);

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_QUEUE_ERROR_CHARS {
		out = out.chars().take(MAX_QUEUE_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}
