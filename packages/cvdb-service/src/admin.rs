use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{CvdbService, Error, Result};
use cvdb_domain::status::ResumeStatus;
use cvdb_storage::{models::ProjectionRow, qdrant::ResumePoint, queries};

const REBUILD_BATCH_SIZE: usize = 64;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RebuildReport {
	pub rebuilt_count: u64,
	pub missing_vector_count: u64,
	pub error_count: u64,
	/// Points deleted because no live resume backs them.
	pub orphan_removed_count: u64,
}

impl CvdbService {
	/// Re-projects every `SUCCESS` resume from vectors persisted in PostgreSQL, then deletes
	/// points whose resume is gone or failed. The embedding provider is never called.
	pub async fn rebuild_qdrant(&self) -> Result<RebuildReport> {
		self.qdrant.ensure_collection().await?;

		let rows = queries::list_success_projections(&self.db.pool).await?;
		let dim = self.cfg.storage.qdrant.vector_dim as usize;
		let mut rebuilt_count = 0_u64;
		let mut missing_vector_count = 0_u64;
		let mut error_count = 0_u64;
		let mut batch = Vec::with_capacity(REBUILD_BATCH_SIZE);

		for row in rows {
			let Some(point) = projection_point(row) else {
				missing_vector_count += 1;

				continue;
			};

			if point.vec.len() != dim {
				error_count += 1;

				continue;
			}

			batch.push(point);

			if batch.len() == REBUILD_BATCH_SIZE {
				self.flush_rebuild_batch(&mut batch, &mut rebuilt_count, &mut error_count).await;
			}
		}

		self.flush_rebuild_batch(&mut batch, &mut rebuilt_count, &mut error_count).await;

		let orphan_removed_count = self.remove_orphan_points().await?;

		tracing::info!(
			rebuilt_count,
			missing_vector_count,
			error_count,
			orphan_removed_count,
			"Qdrant rebuild finished."
		);

		Ok(RebuildReport { rebuilt_count, missing_vector_count, error_count, orphan_removed_count })
	}

	/// Writes one resume's point from its persisted vector and completes a `QUEUED` resume.
	/// Returns false when the resume no longer exists or has failed.
	pub async fn project_resume(&self, resume_file_id: i64) -> Result<bool> {
		let Some(resume) = queries::get_resume_file(&self.db.pool, resume_file_id).await? else {
			return Ok(false);
		};

		if resume.status == ResumeStatus::Error.as_str() {
			return Ok(false);
		}

		let row = queries::fetch_projection(&self.db.pool, resume_file_id).await?;
		let Some(point) = row.and_then(projection_point) else {
			return Err(Error::NotFound {
				message: format!("Resume {resume_file_id} has no persisted vector."),
			});
		};

		self.qdrant.upsert_resumes(&[point]).await?;
		queries::finish_resume_file(&self.db.pool, resume_file_id, ResumeStatus::Success.as_str())
			.await?;

		Ok(true)
	}

	/// Removes every point owned by a person.
	pub async fn unproject_person(&self, person_id: i64) -> Result<()> {
		self.qdrant.delete_person_points(person_id).await?;

		Ok(())
	}

	async fn remove_orphan_points(&self) -> Result<u64> {
		let point_ids = self.qdrant.list_point_ids().await?;
		let mut removed = 0_u64;

		for chunk in point_ids.chunks(REBUILD_BATCH_SIZE) {
			let live: HashSet<i64> =
				queries::live_resume_file_ids(&self.db.pool, chunk).await?.into_iter().collect();
			let orphans = orphan_ids(chunk, &live);

			if orphans.is_empty() {
				continue;
			}

			self.qdrant.delete_resume_points(&orphans).await?;

			removed += orphans.len() as u64;
		}

		Ok(removed)
	}

	async fn flush_rebuild_batch(
		&self,
		batch: &mut Vec<ResumePoint>,
		rebuilt_count: &mut u64,
		error_count: &mut u64,
	) {
		if batch.is_empty() {
			return;
		}

		match self.qdrant.upsert_resumes(batch).await {
			Ok(()) => *rebuilt_count += batch.len() as u64,
			Err(err) => {
				tracing::warn!(error = %err, points = batch.len(), "Qdrant rebuild batch failed.");

				*error_count += batch.len() as u64;
			},
		}

		batch.clear();
	}
}

fn orphan_ids(point_ids: &[i64], live: &HashSet<i64>) -> Vec<i64> {
	point_ids.iter().copied().filter(|id| !live.contains(id)).collect()
}

fn projection_point(row: ProjectionRow) -> Option<ResumePoint> {
	let vec = row.vec?;

	Some(ResumePoint {
		resume_file_id: row.resume_file_id,
		person_id: row.person_id,
		skills: row.skills.map(|skills| skills.0).unwrap_or_default(),
		years_of_experience: row.years_of_experience.unwrap_or(0),
		vec,
	})
}
