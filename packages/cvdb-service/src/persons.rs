use serde::{Deserialize, Serialize};
use time::Date;

use crate::{CvdbService, Error, Result};
use cvdb_domain::profile;
use cvdb_storage::{
	models::{Education, NewEducation, Person, ResumeFile},
	outbox,
	queries::{self, PersonPatch},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersonView {
	pub id: i64,
	pub full_name: String,
	pub email: String,
	pub phone: Option<String>,
	pub summary: Option<String>,
}
impl From<Person> for PersonView {
	fn from(person: Person) -> Self {
		Self {
			id: person.id,
			full_name: person.full_name,
			email: person.email,
			phone: person.phone,
			summary: person.summary,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EducationView {
	pub id: i64,
	pub institution: String,
	pub degree: Option<String>,
	pub field: Option<String>,
	#[serde(with = "crate::time_serde::date")]
	pub start_date: Option<Date>,
	#[serde(with = "crate::time_serde::date")]
	pub end_date: Option<Date>,
}
impl From<Education> for EducationView {
	fn from(education: Education) -> Self {
		Self {
			id: education.id,
			institution: education.institution,
			degree: education.degree,
			field: education.field,
			start_date: education.start_date,
			end_date: education.end_date,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResumeFileView {
	pub id: i64,
	pub person_id: i64,
	pub filename: Option<String>,
	pub sha256: Option<String>,
	pub storage_url: Option<String>,
	pub status: String,
}
impl From<ResumeFile> for ResumeFileView {
	fn from(resume: ResumeFile) -> Self {
		Self {
			id: resume.id,
			person_id: resume.person_id,
			filename: resume.filename,
			sha256: resume.sha256,
			storage_url: resume.storage_url,
			status: resume.status,
		}
	}
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PersonPatchRequest {
	#[serde(default)]
	pub full_name: Option<String>,
	#[serde(default)]
	pub email: Option<String>,
	#[serde(default)]
	pub phone: Option<String>,
	#[serde(default)]
	pub summary: Option<String>,
}

/// Dates accept the same loose formats as extracted resumes (`YYYY-MM-DD`, `YYYY-MM`, `YYYY`,
/// `Month YYYY`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EducationInput {
	pub institution: String,
	#[serde(default)]
	pub degree: Option<String>,
	#[serde(default)]
	pub field: Option<String>,
	#[serde(default)]
	pub start_date: Option<String>,
	#[serde(default)]
	pub end_date: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeletePersonResponse {
	pub person_id: i64,
	pub deleted: bool,
}

struct ValidPatch {
	full_name: Option<String>,
	email: Option<String>,
	phone: Option<String>,
	summary: Option<String>,
}

impl CvdbService {
	pub async fn get_person(&self, person_id: i64) -> Result<PersonView> {
		let person = queries::get_person(&self.db.pool, person_id).await?.ok_or_else(not_found)?;

		Ok(person.into())
	}

	pub async fn get_person_by_email(&self, email: &str) -> Result<PersonView> {
		let email = email.trim();

		if email.is_empty() {
			return Err(Error::InvalidRequest { message: "email is required.".to_string() });
		}

		let person =
			queries::get_person_by_email(&self.db.pool, email).await?.ok_or_else(not_found)?;

		Ok(person.into())
	}

	pub async fn list_educations(&self, person_id: i64) -> Result<Vec<EducationView>> {
		self.require_person(person_id).await?;

		let rows = queries::list_educations(&self.db.pool, person_id).await?;

		Ok(rows.into_iter().map(EducationView::from).collect())
	}

	pub async fn list_resume_files(&self, person_id: i64) -> Result<Vec<ResumeFileView>> {
		self.require_person(person_id).await?;

		let rows = queries::list_resume_files(&self.db.pool, person_id).await?;

		Ok(rows.into_iter().map(ResumeFileView::from).collect())
	}

	pub async fn update_person(
		&self,
		person_id: i64,
		req: PersonPatchRequest,
	) -> Result<PersonView> {
		let valid = validate_patch(req)?;
		let patch = PersonPatch {
			full_name: valid.full_name.as_deref(),
			email: valid.email.as_deref(),
			phone: valid.phone.as_deref(),
			summary: valid.summary.as_deref(),
		};
		let person = queries::update_person(&self.db.pool, person_id, &patch)
			.await?
			.ok_or_else(not_found)?;

		tracing::info!(person_id, "Person updated.");

		Ok(person.into())
	}

	/// Replaces the whole education set. An empty list clears it.
	pub async fn replace_educations(
		&self,
		person_id: i64,
		educations: Vec<EducationInput>,
	) -> Result<Vec<EducationView>> {
		let educations = educations
			.into_iter()
			.enumerate()
			.map(|(idx, input)| validate_education(idx, input))
			.collect::<Result<Vec<_>>>()?;
		let mut tx = self.db.pool.begin().await?;

		if queries::get_person(&mut *tx, person_id).await?.is_none() {
			return Err(not_found());
		}

		let rows = queries::replace_educations(&mut *tx, person_id, &educations).await?;

		tx.commit().await?;

		Ok(rows.into_iter().map(EducationView::from).collect())
	}

	/// Deletes the person and everything it owns. Vector index cleanup is queued in the same
	/// transaction so it survives a crash.
	pub async fn delete_person(&self, person_id: i64) -> Result<DeletePersonResponse> {
		let mut tx = self.db.pool.begin().await?;

		if !queries::delete_person(&mut *tx, person_id).await? {
			return Err(not_found());
		}

		outbox::enqueue_delete(&mut *tx, person_id).await?;

		tx.commit().await?;

		tracing::info!(person_id, "Person deleted.");

		Ok(DeletePersonResponse { person_id, deleted: true })
	}

	async fn require_person(&self, person_id: i64) -> Result<()> {
		match queries::get_person(&self.db.pool, person_id).await? {
			Some(_) => Ok(()),
			None => Err(not_found()),
		}
	}
}

fn not_found() -> Error {
	Error::NotFound { message: "Person not found.".to_string() }
}

fn validate_patch(req: PersonPatchRequest) -> Result<ValidPatch> {
	let full_name = match req.full_name {
		Some(raw) => {
			let name = raw.trim();

			if name.is_empty() {
				return Err(invalid("full_name must not be empty."));
			}
			if name.chars().count() > profile::FULL_NAME_MAX_CHARS {
				return Err(invalid("full_name is longer than 255 characters."));
			}

			Some(name.to_string())
		},
		None => None,
	};
	let email = match req.email {
		Some(raw) => Some(
			profile::normalize_email(&raw)
				.ok_or_else(|| invalid("email is not a valid address."))?,
		),
		None => None,
	};
	let phone = match req.phone {
		Some(raw) => Some(
			profile::normalize_phone(&raw).ok_or_else(|| invalid("phone has no digits."))?,
		),
		None => None,
	};
	let summary = req.summary.map(|summary| summary.trim().to_string());

	if full_name.is_none() && email.is_none() && phone.is_none() && summary.is_none() {
		return Err(invalid("No updates provided."));
	}

	Ok(ValidPatch { full_name, email, phone, summary })
}

fn validate_education(idx: usize, input: EducationInput) -> Result<NewEducation> {
	let institution = input.institution.trim();

	if institution.is_empty() {
		return Err(invalid(&format!("educations[{idx}].institution must not be empty.")));
	}

	let start_date = parse_optional_date(idx, "start_date", input.start_date.as_deref())?;
	let end_date = parse_optional_date(idx, "end_date", input.end_date.as_deref())?;

	if let (Some(start), Some(end)) = (start_date, end_date)
		&& end < start
	{
		return Err(invalid(&format!("educations[{idx}].end_date is before start_date.")));
	}

	Ok(NewEducation {
		institution: institution.to_string(),
		degree: clean_optional(input.degree, profile::DEGREE_MAX_CHARS),
		field: clean_optional(input.field, profile::FIELD_MAX_CHARS),
		start_date,
		end_date,
	})
}

fn parse_optional_date(idx: usize, name: &str, raw: Option<&str>) -> Result<Option<Date>> {
	let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
		return Ok(None);
	};

	profile::parse_date(raw)
		.map(Some)
		.ok_or_else(|| invalid(&format!("educations[{idx}].{name} is not a recognised date.")))
}

fn clean_optional(raw: Option<String>, max_chars: usize) -> Option<String> {
	raw.map(|value| value.trim().to_string())
		.filter(|value| !value.is_empty())
		.map(|value| profile::truncate_chars(&value, max_chars))
}

fn invalid(message: &str) -> Error {
	Error::InvalidRequest { message: message.to_string() }
}

#[cfg(test)]
mod tests {
	use time::macros::date;

	use super::*;

	fn education(institution: &str, start: Option<&str>, end: Option<&str>) -> EducationInput {
		EducationInput {
			institution: institution.to_string(),
			degree: Some(" BSc ".to_string()),
			field: None,
			start_date: start.map(str::to_string),
			end_date: end.map(str::to_string),
		}
	}

	#[test]
	fn empty_patch_is_rejected() {
		assert!(matches!(
			validate_patch(PersonPatchRequest::default()),
			Err(Error::InvalidRequest { .. })
		));
	}

	#[test]
	fn patch_normalizes_email_and_phone() {
		let valid = validate_patch(PersonPatchRequest {
			email: Some(" Jane@Example.COM ".to_string()),
			phone: Some("+1 (555) 010-2030".to_string()),
			..Default::default()
		})
		.expect("Expected a valid patch.");

		assert_eq!(valid.email.as_deref(), Some("jane@example.com"));
		assert_eq!(valid.phone.as_deref(), Some("+15550102030"));
		assert!(valid.full_name.is_none());
	}

	#[test]
	fn patch_rejects_bad_values() {
		for req in [
			PersonPatchRequest { full_name: Some("   ".to_string()), ..Default::default() },
			PersonPatchRequest { full_name: Some("x".repeat(256)), ..Default::default() },
			PersonPatchRequest { email: Some("not-an-email".to_string()), ..Default::default() },
			PersonPatchRequest { phone: Some("n/a".to_string()), ..Default::default() },
		] {
			assert!(validate_patch(req).is_err());
		}
	}

	#[test]
	fn education_dates_are_parsed_and_ordered() {
		let parsed = validate_education(0, education("MIT", Some("2018-09"), Some("2022")))
			.expect("Expected a valid education.");

		assert_eq!(parsed.start_date, Some(date!(2018 - 09 - 01)));
		assert_eq!(parsed.end_date, Some(date!(2022 - 01 - 01)));
		assert_eq!(parsed.degree.as_deref(), Some("BSc"));
		assert!(validate_education(1, education("MIT", Some("2022"), Some("2018"))).is_err());
	}

	#[test]
	fn education_requires_institution_and_known_dates() {
		assert!(validate_education(0, education(" ", None, None)).is_err());

		let err = validate_education(2, education("MIT", Some("someday"), None))
			.expect_err("Expected an invalid date.");

		assert!(err.to_string().contains("educations[2].start_date"));
	}
}
