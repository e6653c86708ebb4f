use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, db::Db, models::IndexingOutboxEntry};

pub const OP_UPSERT: &str = "UPSERT";
pub const OP_DELETE: &str = "DELETE";

/// Re-projects one resume from its persisted vector.
pub async fn enqueue_upsert<'e, E>(executor: E, resume_file_id: i64) -> Result<()>
where
	E: PgExecutor<'e>,
{
	enqueue(executor, OP_UPSERT, Some(resume_file_id), None).await
}

/// Removes every point owned by the person.
pub async fn enqueue_delete<'e, E>(executor: E, person_id: i64) -> Result<()>
where
	E: PgExecutor<'e>,
{
	enqueue(executor, OP_DELETE, None, Some(person_id)).await
}

pub async fn claim_next_outbox_job(
	db: &Db,
	now: OffsetDateTime,
	lease_seconds: i64,
) -> Result<Option<IndexingOutboxEntry>> {
	let mut tx = db.pool.begin().await?;
	let row = sqlx::query_as::<_, IndexingOutboxEntry>(
		"\
SELECT
	outbox_id,
	op,
	resume_file_id,
	person_id,
	status,
	attempts,
	last_error,
	available_at,
	created_at,
	updated_at
FROM indexing_outbox
WHERE status IN ('PENDING','FAILED','CLAIMED') AND available_at <= $1
ORDER BY available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED",
	)
	.bind(now)
	.fetch_optional(&mut *tx)
	.await?;
	let job = if let Some(mut job) = row {
		let lease_until = now + time::Duration::seconds(lease_seconds);

		sqlx::query(
			"UPDATE indexing_outbox SET status = 'CLAIMED', available_at = $1, updated_at = $2 WHERE outbox_id = $3",
		)
		.bind(lease_until)
		.bind(now)
		.bind(job.outbox_id)
		.execute(&mut *tx)
		.await?;

		job.status = "CLAIMED".to_string();
		job.available_at = lease_until;
		job.updated_at = now;

		Some(job)
	} else {
		None
	};

	tx.commit().await?;

	Ok(job)
}

pub async fn mark_outbox_done(db: &Db, outbox_id: Uuid, now: OffsetDateTime) -> Result<()> {
	sqlx::query("UPDATE indexing_outbox SET status = 'DONE', updated_at = $1 WHERE outbox_id = $2")
		.bind(now)
		.bind(outbox_id)
		.execute(&db.pool)
		.await?;

	Ok(())
}

pub async fn mark_outbox_failed(
	db: &Db,
	outbox_id: Uuid,
	attempts: i32,
	error_text: &str,
	available_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE indexing_outbox
SET status = 'FAILED',
	attempts = $1,
	last_error = $2,
	available_at = $3,
	updated_at = $4
WHERE outbox_id = $5",
	)
	.bind(attempts)
	.bind(error_text)
	.bind(available_at)
	.bind(now)
	.bind(outbox_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn purge_done_outbox(db: &Db, before: OffsetDateTime) -> Result<u64> {
	let result =
		sqlx::query("DELETE FROM indexing_outbox WHERE status = 'DONE' AND updated_at < $1")
			.bind(before)
			.execute(&db.pool)
			.await?;

	Ok(result.rows_affected())
}

async fn enqueue<'e, E>(
	executor: E,
	op: &str,
	resume_file_id: Option<i64>,
	person_id: Option<i64>,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO indexing_outbox (outbox_id, op, resume_file_id, person_id, status)
VALUES ($1, $2, $3, $4, 'PENDING')",
	)
	.bind(Uuid::new_v4())
	.bind(op)
	.bind(resume_file_id)
	.bind(person_id)
	.execute(executor)
	.await?;

	Ok(())
}
