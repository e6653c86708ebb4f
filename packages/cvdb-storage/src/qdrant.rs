use qdrant_client::{
	Qdrant,
	client::Payload,
	qdrant::{
		Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
		DeletePointsBuilder, Distance, FieldType, Filter, PointId, PointStruct, PointsIdsList,
		Query, QueryPointsBuilder, Range, ScrollPointsBuilder, UpsertPointsBuilder,
		VectorParamsBuilder, point_id::PointIdOptions,
	},
};
use serde_json::Value;

use crate::{Error, Result};

pub const PAYLOAD_PERSON_ID: &str = "person_id";
pub const PAYLOAD_RESUME_FILE_ID: &str = "resume_file_id";
pub const PAYLOAD_SKILLS: &str = "skills";
pub const PAYLOAD_YEARS_OF_EXPERIENCE: &str = "years_of_experience";

const SCROLL_PAGE_SIZE: u32 = 256;

#[derive(Debug, Clone)]
pub struct ResumePoint {
	pub resume_file_id: i64,
	pub person_id: i64,
	pub skills: Vec<String>,
	pub years_of_experience: i32,
	pub vec: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredResume {
	pub resume_file_id: i64,
	pub score: f32,
}

pub struct QdrantStore {
	pub client: Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &cvdb_config::Qdrant) -> Result<Self> {
		let client = Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Creates the cosine collection and its payload indexes when missing.
	pub async fn ensure_collection(&self) -> Result<()> {
		if self.client.collection_exists(self.collection.clone()).await? {
			return Ok(());
		}

		self.client
			.create_collection(
				CreateCollectionBuilder::new(self.collection.clone()).vectors_config(
					VectorParamsBuilder::new(u64::from(self.vector_dim), Distance::Cosine),
				),
			)
			.await?;

		for (field, field_type) in [
			(PAYLOAD_PERSON_ID, FieldType::Integer),
			(PAYLOAD_SKILLS, FieldType::Keyword),
			(PAYLOAD_YEARS_OF_EXPERIENCE, FieldType::Integer),
		] {
			self.client
				.create_field_index(
					CreateFieldIndexCollectionBuilder::new(
						self.collection.clone(),
						field,
						field_type,
					)
					.wait(true),
				)
				.await?;
		}

		Ok(())
	}

	pub async fn upsert_resumes(&self, points: &[ResumePoint]) -> Result<()> {
		if points.is_empty() {
			return Ok(());
		}

		let mut structs = Vec::with_capacity(points.len());

		for point in points {
			if point.vec.len() != self.vector_dim as usize {
				return Err(Error::InvalidArgument(format!(
					"Vector dimension {} does not match configured vector_dim {}.",
					point.vec.len(),
					self.vector_dim
				)));
			}

			structs.push(resume_point_struct(point)?);
		}

		self.client
			.upsert_points(UpsertPointsBuilder::new(self.collection.clone(), structs).wait(true))
			.await?;

		Ok(())
	}

	pub async fn delete_person_points(&self, person_id: i64) -> Result<()> {
		let filter = Filter::must([Condition::matches(PAYLOAD_PERSON_ID, person_id)]);

		self.client
			.delete_points(DeletePointsBuilder::new(self.collection.clone()).points(filter).wait(true))
			.await?;

		Ok(())
	}

	/// Every numeric point id in the collection. Points with other id kinds are skipped.
	pub async fn list_point_ids(&self) -> Result<Vec<i64>> {
		let mut ids = Vec::new();
		let mut offset: Option<PointId> = None;

		loop {
			let mut scroll = ScrollPointsBuilder::new(self.collection.clone())
				.limit(SCROLL_PAGE_SIZE)
				.with_payload(false)
				.with_vectors(false);

			if let Some(offset) = offset.take() {
				scroll = scroll.offset(offset);
			}

			let response = self.client.scroll(scroll).await?;

			for point in response.result {
				let id = point.id.as_ref().and_then(|id| id.point_id_options.as_ref());

				match id.and_then(numeric_id) {
					Some(id) => ids.push(id),
					None => tracing::warn!(point_id = ?id, "Skipping a point without a resume id."),
				}
			}

			match response.next_page_offset {
				Some(next) => offset = Some(next),
				None => break,
			}
		}

		Ok(ids)
	}

	pub async fn delete_resume_points(&self, resume_file_ids: &[i64]) -> Result<()> {
		if resume_file_ids.is_empty() {
			return Ok(());
		}

		let ids = resume_file_ids
			.iter()
			.map(|id| {
				u64::try_from(*id)
					.map(PointId::from)
					.map_err(|_| Error::InvalidArgument(format!("Invalid resume_file_id {id}.")))
			})
			.collect::<Result<Vec<_>>>()?;

		self.client
			.delete_points(
				DeletePointsBuilder::new(self.collection.clone())
					.points(PointsIdsList { ids })
					.wait(true),
			)
			.await?;

		Ok(())
	}

	pub async fn search(
		&self,
		vector: Vec<f32>,
		filter: Option<Filter>,
		limit: u64,
	) -> Result<Vec<ScoredResume>> {
		let mut query = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector))
			.with_payload(false)
			.limit(limit);

		if let Some(filter) = filter {
			query = query.filter(filter);
		}

		let response = self.client.query(query).await?;
		let mut hits = Vec::with_capacity(response.result.len());

		for point in response.result {
			let id = point.id.as_ref().and_then(|id| id.point_id_options.as_ref());
			let Some(resume_file_id) = id.and_then(numeric_id) else {
				tracing::warn!(point_id = ?id, "Qdrant returned a point without a resume id.");

				continue;
			};

			hits.push(ScoredResume { resume_file_id, score: point.score });
		}

		Ok(hits)
	}
}

/// `must: years_of_experience >= min_years` when positive, `should: skills match` per skill.
/// `None` when neither applies.
pub fn candidate_filter(skills: &[String], min_years: i64) -> Option<Filter> {
	let must = if min_years > 0 {
		vec![Condition::range(
			PAYLOAD_YEARS_OF_EXPERIENCE,
			Range { gte: Some(min_years as f64), ..Default::default() },
		)]
	} else {
		Vec::new()
	};
	let should: Vec<Condition> =
		skills.iter().map(|skill| Condition::matches(PAYLOAD_SKILLS, skill.clone())).collect();

	if must.is_empty() && should.is_empty() {
		return None;
	}

	Some(Filter { must, should, ..Default::default() })
}

fn numeric_id(id: &PointIdOptions) -> Option<i64> {
	match id {
		PointIdOptions::Num(num) => i64::try_from(*num).ok(),
		PointIdOptions::Uuid(_) => None,
	}
}

pub fn resume_point_struct(point: &ResumePoint) -> Result<PointStruct> {
	let id = u64::try_from(point.resume_file_id).map_err(|_| {
		Error::InvalidArgument(format!("Invalid resume_file_id {}.", point.resume_file_id))
	})?;
	let mut payload = Payload::new();

	payload.insert(PAYLOAD_PERSON_ID, Value::from(point.person_id));
	payload.insert(PAYLOAD_RESUME_FILE_ID, Value::from(point.resume_file_id));
	payload.insert(PAYLOAD_SKILLS, Value::from(point.skills.clone()));
	payload.insert(PAYLOAD_YEARS_OF_EXPERIENCE, Value::from(point.years_of_experience));

	Ok(PointStruct::new(id, point.vec.clone(), payload))
}
