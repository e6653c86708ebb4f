use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{CvdbService, EducationView, Error, Result};
use cvdb_domain::profile;
use cvdb_storage::{
	models::{CandidateRow, Education},
	qdrant::{self, ScoredResume},
	queries,
};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchRequest {
	pub query: String,
	#[serde(default)]
	pub limit: Option<u32>,
	#[serde(default)]
	pub skills: Option<Vec<String>>,
	#[serde(default)]
	pub years_of_experience: Option<i64>,
	/// Case-insensitive substring match against any of the candidate's institutions.
	#[serde(default)]
	pub institution: Option<String>,
	/// Case-insensitive substring match against any of the candidate's degrees.
	#[serde(default)]
	pub degree: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResponse {
	pub items: Vec<SearchItem>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchItem {
	pub score: f32,
	pub person_id: i64,
	pub full_name: String,
	pub email: String,
	pub phone: Option<String>,
	pub summary: Option<String>,
	pub educations: Vec<EducationView>,
	pub skills: Vec<String>,
	pub years_of_experience: Option<i32>,
	pub resume_file_id: i64,
	pub filename: Option<String>,
}

struct EducationFilter {
	institution: Option<String>,
	degree: Option<String>,
}
impl EducationFilter {
	fn new(institution: Option<&str>, degree: Option<&str>) -> Option<Self> {
		let clean = |value: Option<&str>| {
			value.map(|value| value.trim().to_lowercase()).filter(|value| !value.is_empty())
		};
		let filter = Self { institution: clean(institution), degree: clean(degree) };

		(filter.institution.is_some() || filter.degree.is_some()).then_some(filter)
	}

	/// Both constraints must hold, possibly on different education rows.
	fn matches(&self, educations: &[Education]) -> bool {
		let institution_ok = self.institution.as_ref().is_none_or(|needle| {
			educations.iter().any(|education| education.institution.to_lowercase().contains(needle))
		});
		let degree_ok = self.degree.as_ref().is_none_or(|needle| {
			educations.iter().any(|education| {
				education.degree.as_ref().is_some_and(|degree| degree.to_lowercase().contains(needle))
			})
		});

		institution_ok && degree_ok
	}
}

impl CvdbService {
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		let query = req.query.trim();

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "query must not be empty.".to_string() });
		}

		let limit = clamp_limit(
			req.limit,
			self.cfg.search.default_limit,
			self.cfg.search.max_limit,
		);
		let skills = requested_skills(req.skills.as_deref());
		let min_years = req.years_of_experience.unwrap_or(0);
		let education_filter =
			EducationFilter::new(req.institution.as_deref(), req.degree.as_deref());
		let texts = vec![query.to_string()];
		let mut vectors =
			self.providers.embedding.embed(&self.cfg.providers.embedding, &texts).await?;
		let Some(vector) = vectors.pop() else {
			return Err(Error::Provider {
				message: "Embedding provider returned no vector.".to_string(),
			});
		};

		if vector.len() != self.cfg.storage.qdrant.vector_dim as usize {
			return Err(Error::Provider {
				message: "Query embedding dimension does not match vector_dim.".to_string(),
			});
		}

		let candidate_limit =
			u64::from(limit).saturating_mul(u64::from(self.cfg.search.candidate_multiplier));
		let hits = self
			.qdrant
			.search(vector, qdrant::candidate_filter(&skills, min_years), candidate_limit)
			.await?;
		let resume_ids: Vec<i64> = hits.iter().map(|hit| hit.resume_file_id).collect();
		let candidates = queries::fetch_candidates(&self.db.pool, &resume_ids).await?;
		let person_ids: Vec<i64> = {
			let mut ids: Vec<i64> = candidates.iter().map(|row| row.person_id).collect();

			ids.sort_unstable();
			ids.dedup();

			ids
		};
		let educations = queries::list_educations_for_persons(&self.db.pool, &person_ids).await?;
		let items = assemble(hits, candidates, educations, education_filter.as_ref(), limit);

		tracing::info!(
			candidates = resume_ids.len(),
			returned = items.len(),
			limit,
			"Search completed."
		);

		Ok(SearchResponse { items })
	}
}

fn clamp_limit(requested: Option<u32>, default_limit: u32, max_limit: u32) -> u32 {
	requested.unwrap_or(default_limit).clamp(1, max_limit.max(1))
}

fn requested_skills(skills: Option<&[String]>) -> Vec<String> {
	let Some(skills) = skills else {
		return Vec::new();
	};

	profile::normalize_skills(&serde_json::Value::from(skills.to_vec()))
}

/// Orders hits by score, drops stale or filtered ones, and keeps the best resume per person.
fn assemble(
	mut hits: Vec<ScoredResume>,
	candidates: Vec<CandidateRow>,
	educations: Vec<Education>,
	education_filter: Option<&EducationFilter>,
	limit: u32,
) -> Vec<SearchItem> {
	let mut by_resume: HashMap<i64, CandidateRow> =
		candidates.into_iter().map(|row| (row.resume_file_id, row)).collect();
	let mut by_person: HashMap<i64, Vec<Education>> = HashMap::new();

	for education in educations {
		by_person.entry(education.person_id).or_default().push(education);
	}

	hits.sort_by(|a, b| b.score.total_cmp(&a.score));

	let mut seen = HashSet::new();
	let mut items = Vec::new();

	for hit in hits {
		if items.len() >= limit as usize {
			break;
		}

		let Some(row) = by_resume.remove(&hit.resume_file_id) else {
			continue;
		};

		if seen.contains(&row.person_id) {
			continue;
		}

		let person_educations = by_person.get(&row.person_id).map(Vec::as_slice).unwrap_or(&[]);

		if let Some(filter) = education_filter
			&& !filter.matches(person_educations)
		{
			continue;
		}

		seen.insert(row.person_id);
		items.push(SearchItem {
			score: hit.score,
			person_id: row.person_id,
			full_name: row.full_name,
			email: row.email,
			phone: row.phone,
			summary: row.summary,
			educations: person_educations.iter().cloned().map(EducationView::from).collect(),
			skills: row.skills.map(|skills| skills.0).unwrap_or_default(),
			years_of_experience: row.years_of_experience,
			resume_file_id: row.resume_file_id,
			filename: row.filename,
		});
	}

	items
}
