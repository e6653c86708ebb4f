use serde_json::Value;
use sqlx::{PgConnection, PgExecutor, QueryBuilder, types::Json};

use crate::{
	Result,
	models::{
		CandidateRow, Education, NewEducation, Person, ProjectionRow, ResumeEmbedding, ResumeFile,
		ResumeProfile,
	},
};

const PERSON_COLUMNS: &str = "id, full_name, email::text AS email, phone, summary";
const RESUME_FILE_COLUMNS: &str =
	"id, person_id, filename, sha256::text AS sha256, storage_url, status";
const EDUCATION_COLUMNS: &str = "id, person_id, institution, degree, field, start_date, end_date";

#[derive(Debug, Default)]
pub struct PersonPatch<'a> {
	pub full_name: Option<&'a str>,
	pub email: Option<&'a str>,
	pub phone: Option<&'a str>,
	pub summary: Option<&'a str>,
}
impl PersonPatch<'_> {
	pub fn is_empty(&self) -> bool {
		self.full_name.is_none()
			&& self.email.is_none()
			&& self.phone.is_none()
			&& self.summary.is_none()
	}
}

pub async fn get_person<'e, E>(executor: E, person_id: i64) -> Result<Option<Person>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT {PERSON_COLUMNS} FROM person WHERE id = $1");
	let person =
		sqlx::query_as::<_, Person>(&sql).bind(person_id).fetch_optional(executor).await?;

	Ok(person)
}

pub async fn get_person_by_email<'e, E>(executor: E, email: &str) -> Result<Option<Person>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT {PERSON_COLUMNS} FROM person WHERE email = $1::citext");
	let person = sqlx::query_as::<_, Person>(&sql).bind(email).fetch_optional(executor).await?;

	Ok(person)
}

pub async fn insert_person<'e, E>(
	executor: E,
	full_name: &str,
	email: &str,
	phone: Option<&str>,
	summary: Option<&str>,
) -> Result<Person>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
INSERT INTO person (full_name, email, phone, summary)
VALUES ($1, $2::citext, $3, $4)
RETURNING {PERSON_COLUMNS}"
	);
	let person = sqlx::query_as::<_, Person>(&sql)
		.bind(full_name)
		.bind(email)
		.bind(phone)
		.bind(summary)
		.fetch_one(executor)
		.await?;

	Ok(person)
}

/// Inserts or merges by email. Present fields overwrite, absent fields keep the stored value.
/// `fallback_name` is only used when a new row is created without a name.
pub async fn upsert_person_by_email<'e, E>(
	executor: E,
	email: &str,
	patch: &PersonPatch<'_>,
	fallback_name: &str,
) -> Result<Person>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
INSERT INTO person (full_name, email, phone, summary)
VALUES (COALESCE($1::text, $2::text), $3::citext, $4, $5)
ON CONFLICT (email) DO UPDATE
SET
	full_name = COALESCE($1::text, person.full_name),
	phone = COALESCE(EXCLUDED.phone, person.phone),
	summary = COALESCE(EXCLUDED.summary, person.summary)
RETURNING {PERSON_COLUMNS}"
	);
	let person = sqlx::query_as::<_, Person>(&sql)
		.bind(patch.full_name)
		.bind(fallback_name)
		.bind(email)
		.bind(patch.phone)
		.bind(patch.summary)
		.fetch_one(executor)
		.await?;

	Ok(person)
}

/// Partial update; `None` keeps the stored value. Returns `None` when the person does not exist.
pub async fn update_person<'e, E>(
	executor: E,
	person_id: i64,
	patch: &PersonPatch<'_>,
) -> Result<Option<Person>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
UPDATE person
SET
	full_name = COALESCE($2, full_name),
	email = COALESCE($3::citext, email),
	phone = COALESCE($4, phone),
	summary = COALESCE($5, summary)
WHERE id = $1
RETURNING {PERSON_COLUMNS}"
	);
	let person = sqlx::query_as::<_, Person>(&sql)
		.bind(person_id)
		.bind(patch.full_name)
		.bind(patch.email)
		.bind(patch.phone)
		.bind(patch.summary)
		.fetch_optional(executor)
		.await?;

	Ok(person)
}

pub async fn delete_person<'e, E>(executor: E, person_id: i64) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result =
		sqlx::query("DELETE FROM person WHERE id = $1").bind(person_id).execute(executor).await?;

	Ok(result.rows_affected() > 0)
}

pub async fn list_educations<'e, E>(executor: E, person_id: i64) -> Result<Vec<Education>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"SELECT {EDUCATION_COLUMNS} FROM education WHERE person_id = $1 \
		 ORDER BY start_date ASC NULLS LAST, id ASC"
	);
	let rows = sqlx::query_as::<_, Education>(&sql).bind(person_id).fetch_all(executor).await?;

	Ok(rows)
}

pub async fn list_educations_for_persons<'e, E>(
	executor: E,
	person_ids: &[i64],
) -> Result<Vec<Education>>
where
	E: PgExecutor<'e>,
{
	if person_ids.is_empty() {
		return Ok(Vec::new());
	}

	let sql = format!(
		"SELECT {EDUCATION_COLUMNS} FROM education WHERE person_id = ANY($1) \
		 ORDER BY person_id ASC, start_date ASC NULLS LAST, id ASC"
	);
	let rows = sqlx::query_as::<_, Education>(&sql).bind(person_ids).fetch_all(executor).await?;

	Ok(rows)
}

/// Replaces the whole education set of a person. Call inside a transaction.
pub async fn replace_educations(
	conn: &mut PgConnection,
	person_id: i64,
	educations: &[NewEducation],
) -> Result<Vec<Education>> {
	sqlx::query("DELETE FROM education WHERE person_id = $1")
		.bind(person_id)
		.execute(&mut *conn)
		.await?;

	if educations.is_empty() {
		return Ok(Vec::new());
	}

	let mut builder = QueryBuilder::new(
		"INSERT INTO education (person_id, institution, degree, field, start_date, end_date) ",
	);

	builder.push_values(educations, |mut row, education| {
		row.push_bind(person_id)
			.push_bind(education.institution.as_str())
			.push_bind(education.degree.as_deref())
			.push_bind(education.field.as_deref())
			.push_bind(education.start_date)
			.push_bind(education.end_date);
	});
	builder.push(" RETURNING ");
	builder.push(EDUCATION_COLUMNS);

	let rows = builder.build_query_as::<Education>().fetch_all(&mut *conn).await?;

	Ok(rows)
}

pub async fn insert_resume_file<'e, E>(
	executor: E,
	person_id: i64,
	filename: Option<&str>,
	sha256: &str,
	storage_url: &str,
) -> Result<ResumeFile>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
INSERT INTO resume_file (person_id, filename, sha256, storage_url, status)
VALUES ($1, $2, $3, $4, 'QUEUED')
RETURNING {RESUME_FILE_COLUMNS}"
	);
	let row = sqlx::query_as::<_, ResumeFile>(&sql)
		.bind(person_id)
		.bind(filename)
		.bind(sha256)
		.bind(storage_url)
		.fetch_one(executor)
		.await?;

	Ok(row)
}

pub async fn get_resume_file<'e, E>(executor: E, resume_file_id: i64) -> Result<Option<ResumeFile>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT {RESUME_FILE_COLUMNS} FROM resume_file WHERE id = $1");
	let row =
		sqlx::query_as::<_, ResumeFile>(&sql).bind(resume_file_id).fetch_optional(executor).await?;

	Ok(row)
}

pub async fn list_resume_files<'e, E>(executor: E, person_id: i64) -> Result<Vec<ResumeFile>>
where
	E: PgExecutor<'e>,
{
	let sql =
		format!("SELECT {RESUME_FILE_COLUMNS} FROM resume_file WHERE person_id = $1 ORDER BY id ASC");
	let rows = sqlx::query_as::<_, ResumeFile>(&sql).bind(person_id).fetch_all(executor).await?;

	Ok(rows)
}

/// Any resume with this content that has not failed. `ERROR` rows may be ingested again.
pub async fn find_live_resume_by_sha256<'e, E>(
	executor: E,
	sha256: &str,
) -> Result<Option<ResumeFile>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"SELECT {RESUME_FILE_COLUMNS} FROM resume_file \
		 WHERE sha256 = $1 AND status <> 'ERROR' ORDER BY id ASC LIMIT 1"
	);
	let row = sqlx::query_as::<_, ResumeFile>(&sql).bind(sha256).fetch_optional(executor).await?;

	Ok(row)
}

/// Moves a `QUEUED` resume to a terminal status. Returns false when the row is missing or
/// already terminal, so a terminal status is never overwritten.
pub async fn finish_resume_file<'e, E>(executor: E, resume_file_id: i64, status: &str) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result =
		sqlx::query("UPDATE resume_file SET status = $2 WHERE id = $1 AND status = 'QUEUED'")
			.bind(resume_file_id)
			.bind(status)
			.execute(executor)
			.await?;

	Ok(result.rows_affected() > 0)
}

/// Serializes concurrent ingestion of identical content until the transaction ends.
pub async fn lock_sha256(conn: &mut PgConnection, sha256: &str) -> Result<()> {
	sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
		.bind(sha256)
		.execute(conn)
		.await?;

	Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn upsert_resume_profile<'e, E>(
	executor: E,
	resume_file_id: i64,
	skills: &[String],
	years_of_experience: i32,
	skills_description: &str,
	work_description: &str,
	extracted: &Value,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO resume_profile (
	resume_file_id,
	skills,
	years_of_experience,
	skills_description,
	work_description,
	extracted
)
VALUES ($1, $2, $3, $4, $5, $6)
ON CONFLICT (resume_file_id) DO UPDATE
SET
	skills = EXCLUDED.skills,
	years_of_experience = EXCLUDED.years_of_experience,
	skills_description = EXCLUDED.skills_description,
	work_description = EXCLUDED.work_description,
	extracted = EXCLUDED.extracted,
	created_at = now()",
	)
	.bind(resume_file_id)
	.bind(Json(skills))
	.bind(years_of_experience)
	.bind(skills_description)
	.bind(work_description)
	.bind(extracted)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn get_resume_profile<'e, E>(
	executor: E,
	resume_file_id: i64,
) -> Result<Option<ResumeProfile>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, ResumeProfile>(
		"\
SELECT
	resume_file_id,
	skills,
	years_of_experience,
	skills_description,
	work_description,
	extracted,
	created_at
FROM resume_profile
WHERE resume_file_id = $1",
	)
	.bind(resume_file_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

pub async fn upsert_resume_embedding<'e, E>(
	executor: E,
	resume_file_id: i64,
	embedding_version: &str,
	vec: &[f32],
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO resume_embedding (resume_file_id, embedding_version, embedding_dim, vec)
VALUES ($1, $2, $3, $4)
ON CONFLICT (resume_file_id) DO UPDATE
SET
	embedding_version = EXCLUDED.embedding_version,
	embedding_dim = EXCLUDED.embedding_dim,
	vec = EXCLUDED.vec,
	created_at = now()",
	)
	.bind(resume_file_id)
	.bind(embedding_version)
	.bind(vec.len() as i32)
	.bind(vec)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn get_resume_embedding<'e, E>(
	executor: E,
	resume_file_id: i64,
) -> Result<Option<ResumeEmbedding>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, ResumeEmbedding>(
		"\
SELECT resume_file_id, embedding_version, embedding_dim, vec, created_at
FROM resume_embedding
WHERE resume_file_id = $1",
	)
	.bind(resume_file_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

/// Hydrates search hits. Rows that are missing or not `SUCCESS` are simply absent.
pub async fn fetch_candidates<'e, E>(executor: E, resume_file_ids: &[i64]) -> Result<Vec<CandidateRow>>
where
	E: PgExecutor<'e>,
{
	if resume_file_ids.is_empty() {
		return Ok(Vec::new());
	}

	let rows = sqlx::query_as::<_, CandidateRow>(
		"\
SELECT
	rf.id AS resume_file_id,
	rf.filename,
	p.id AS person_id,
	p.full_name,
	p.email::text AS email,
	p.phone,
	p.summary,
	rp.skills,
	rp.years_of_experience
FROM resume_file rf
JOIN person p ON p.id = rf.person_id
LEFT JOIN resume_profile rp ON rp.resume_file_id = rf.id
WHERE rf.id = ANY($1) AND rf.status = 'SUCCESS'",
	)
	.bind(resume_file_ids)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn fetch_projection<'e, E>(
	executor: E,
	resume_file_id: i64,
) -> Result<Option<ProjectionRow>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, ProjectionRow>(
		"\
SELECT
	rf.id AS resume_file_id,
	rf.person_id,
	rp.skills,
	rp.years_of_experience,
	re.vec
FROM resume_file rf
LEFT JOIN resume_profile rp ON rp.resume_file_id = rf.id
LEFT JOIN resume_embedding re ON re.resume_file_id = rf.id
WHERE rf.id = $1",
	)
	.bind(resume_file_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

/// Every `SUCCESS` resume in id order, for rebuilding the vector index.
/// The subset of `resume_file_ids` that still back a live resume. Failed resumes do not count.
pub async fn live_resume_file_ids<'e, E>(executor: E, resume_file_ids: &[i64]) -> Result<Vec<i64>>
where
	E: PgExecutor<'e>,
{
	let ids = sqlx::query_scalar::<_, i64>(
		"SELECT id FROM resume_file WHERE id = ANY($1) AND status <> 'ERROR'",
	)
	.bind(resume_file_ids)
	.fetch_all(executor)
	.await?;

	Ok(ids)
}

pub async fn list_success_projections<'e, E>(executor: E) -> Result<Vec<ProjectionRow>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, ProjectionRow>(
		"\
SELECT
	rf.id AS resume_file_id,
	rf.person_id,
	rp.skills,
	rp.years_of_experience,
	re.vec
FROM resume_file rf
LEFT JOIN resume_profile rp ON rp.resume_file_id = rf.id
LEFT JOIN resume_embedding re ON re.resume_file_id = rf.id
WHERE rf.status = 'SUCCESS'
ORDER BY rf.id ASC",
	)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}
