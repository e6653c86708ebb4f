use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	db::Db,
	models::{IngestJob, NewIngestJob},
};

pub const STATUS_PENDING: &str = "PENDING";
pub const STATUS_CLAIMED: &str = "CLAIMED";
pub const STATUS_DONE: &str = "DONE";
pub const STATUS_FAILED: &str = "FAILED";
pub const STATUS_DEAD: &str = "DEAD";

const LEASE_EXPIRED_ERROR: &str = "Lease expired during the final attempt.";

const JOB_COLUMNS: &str = "\
job_id,
	person_id,
	resume_file_id,
	filename,
	sha256::text AS sha256,
	storage_url,
	blob_path,
	document_kind,
	status,
	attempts,
	claim_token,
	last_error,
	available_at,
	created_at,
	updated_at";

pub async fn enqueue_ingest_job<'e, E>(executor: E, job: &NewIngestJob) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO ingest_jobs (
	job_id,
	person_id,
	resume_file_id,
	filename,
	sha256,
	storage_url,
	blob_path,
	document_kind,
	status
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'PENDING')",
	)
	.bind(job.job_id)
	.bind(job.person_id)
	.bind(job.resume_file_id)
	.bind(job.filename.as_deref())
	.bind(job.sha256.as_str())
	.bind(job.storage_url.as_str())
	.bind(job.blob_path.as_str())
	.bind(job.document_kind.as_str())
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn get_ingest_job<'e, E>(executor: E, job_id: Uuid) -> Result<Option<IngestJob>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT {JOB_COLUMNS} FROM ingest_jobs WHERE job_id = $1");
	let job = sqlx::query_as::<_, IngestJob>(&sql).bind(job_id).fetch_optional(executor).await?;

	Ok(job)
}

/// A job that may still produce a resume for this content.
pub async fn find_live_job_by_sha256<'e, E>(executor: E, sha256: &str) -> Result<Option<IngestJob>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"SELECT {JOB_COLUMNS} FROM ingest_jobs \
		 WHERE sha256 = $1 AND status IN ('PENDING','CLAIMED','FAILED') \
		 ORDER BY created_at ASC LIMIT 1"
	);
	let job = sqlx::query_as::<_, IngestJob>(&sql).bind(sha256).fetch_optional(executor).await?;

	Ok(job)
}

/// Claims the oldest runnable job, counts the attempt and leases it under a fresh claim token.
///
/// An expired `CLAIMED` lease means its worker died or stalled mid-attempt. The job is claimable
/// again unless that attempt was its last one, in which case it becomes `DEAD` and its resume
/// `ERROR`.
pub async fn claim_next_ingest_job(
	db: &Db,
	now: OffsetDateTime,
	lease_seconds: i64,
	max_attempts: i32,
) -> Result<Option<IngestJob>> {
	let mut tx = db.pool.begin().await?;
	let expired: Vec<Option<i64>> = sqlx::query_scalar(
		"\
UPDATE ingest_jobs
SET status = 'DEAD',
	claim_token = NULL,
	last_error = $3,
	updated_at = $1
WHERE status = 'CLAIMED' AND available_at <= $1 AND attempts >= $2
RETURNING resume_file_id",
	)
	.bind(now)
	.bind(max_attempts)
	.bind(LEASE_EXPIRED_ERROR)
	.fetch_all(&mut *tx)
	.await?;

	for resume_file_id in expired.iter().flatten() {
		crate::queries::finish_resume_file(&mut *tx, *resume_file_id, "ERROR").await?;
	}

	if !expired.is_empty() {
		tracing::warn!(jobs = expired.len(), "Ingest jobs lost their last lease and are dead.");
	}

	let sql = format!(
		"\
SELECT {JOB_COLUMNS}
FROM ingest_jobs
WHERE status IN ('PENDING','FAILED','CLAIMED') AND available_at <= $1
ORDER BY available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED"
	);
	let row = sqlx::query_as::<_, IngestJob>(&sql).bind(now).fetch_optional(&mut *tx).await?;
	let job = if let Some(mut job) = row {
		let lease_until = now + time::Duration::seconds(lease_seconds);
		let claim_token = Uuid::new_v4();

		sqlx::query(
			"\
UPDATE ingest_jobs
SET status = 'CLAIMED',
	attempts = attempts + 1,
	claim_token = $1,
	available_at = $2,
	updated_at = $3
WHERE job_id = $4",
		)
		.bind(claim_token)
		.bind(lease_until)
		.bind(now)
		.bind(job.job_id)
		.execute(&mut *tx)
		.await?;

		job.status = STATUS_CLAIMED.to_string();
		job.attempts = job.attempts.saturating_add(1);
		job.claim_token = Some(claim_token);
		job.available_at = lease_until;
		job.updated_at = now;

		Some(job)
	} else {
		None
	};

	tx.commit().await?;

	Ok(job)
}

/// Extends the lease of a job that is still being worked on. Returns false when the claim has
/// been taken over.
pub async fn renew_ingest_job_lease(
	db: &Db,
	job: &IngestJob,
	lease_until: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<bool> {
	let result = sqlx::query(
		"\
UPDATE ingest_jobs
SET available_at = $1,
	updated_at = $2
WHERE job_id = $3 AND status = 'CLAIMED' AND claim_token = $4",
	)
	.bind(lease_until)
	.bind(now)
	.bind(job.job_id)
	.bind(job.claim_token)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected() > 0)
}

/// Locks the job row for the rest of the transaction if `job` still holds the current claim.
pub async fn lock_claimed_ingest_job<'e, E>(
	executor: E,
	job: &IngestJob,
) -> Result<Option<IngestJob>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"SELECT {JOB_COLUMNS} FROM ingest_jobs \
		 WHERE job_id = $1 AND status = 'CLAIMED' AND claim_token = $2 FOR UPDATE"
	);
	let row = sqlx::query_as::<_, IngestJob>(&sql)
		.bind(job.job_id)
		.bind(job.claim_token)
		.fetch_optional(executor)
		.await?;

	Ok(row)
}

pub async fn link_ingest_job<'e, E>(
	executor: E,
	job_id: Uuid,
	person_id: i64,
	resume_file_id: i64,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE ingest_jobs
SET person_id = $1,
	resume_file_id = $2,
	updated_at = $3
WHERE job_id = $4",
	)
	.bind(person_id)
	.bind(resume_file_id)
	.bind(now)
	.bind(job_id)
	.execute(executor)
	.await?;

	Ok(())
}

/// Returns false when another worker has taken the job over. The failed and dead transitions carry
/// the same claim guard.
pub async fn mark_ingest_job_done(db: &Db, job: &IngestJob, now: OffsetDateTime) -> Result<bool> {
	let result = sqlx::query(
		"\
UPDATE ingest_jobs
SET status = 'DONE',
	claim_token = NULL,
	last_error = NULL,
	updated_at = $1
WHERE job_id = $2 AND claim_token = $3",
	)
	.bind(now)
	.bind(job.job_id)
	.bind(job.claim_token)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn mark_ingest_job_failed(
	db: &Db,
	job: &IngestJob,
	error_text: &str,
	available_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<bool> {
	let result = sqlx::query(
		"\
UPDATE ingest_jobs
SET status = 'FAILED',
	claim_token = NULL,
	last_error = $1,
	available_at = $2,
	updated_at = $3
WHERE job_id = $4 AND claim_token = $5",
	)
	.bind(error_text)
	.bind(available_at)
	.bind(now)
	.bind(job.job_id)
	.bind(job.claim_token)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected() > 0)
}

/// Terminal failure. The linked resume, if any, moves to `ERROR` in the same transaction.
pub async fn mark_ingest_job_dead(
	db: &Db,
	job: &IngestJob,
	error_text: &str,
	now: OffsetDateTime,
) -> Result<bool> {
	let mut tx = db.pool.begin().await?;
	let resume_file_id: Option<Option<i64>> = sqlx::query_scalar(
		"\
UPDATE ingest_jobs
SET status = 'DEAD',
	claim_token = NULL,
	last_error = $1,
	updated_at = $2
WHERE job_id = $3 AND claim_token = $4
RETURNING resume_file_id",
	)
	.bind(error_text)
	.bind(now)
	.bind(job.job_id)
	.bind(job.claim_token)
	.fetch_optional(&mut *tx)
	.await?;
	let Some(resume_file_id) = resume_file_id else {
		return Ok(false);
	};

	if let Some(resume_file_id) = resume_file_id {
		crate::queries::finish_resume_file(&mut *tx, resume_file_id, "ERROR").await?;
	}

	tx.commit().await?;

	Ok(true)
}

/// Drops finished jobs older than `before`. Returns the number of rows removed.
pub async fn purge_finished_ingest_jobs(db: &Db, before: OffsetDateTime) -> Result<u64> {
	let result = sqlx::query(
		"DELETE FROM ingest_jobs WHERE status IN ('DONE','DEAD') AND updated_at < $1",
	)
	.bind(before)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected())
}
