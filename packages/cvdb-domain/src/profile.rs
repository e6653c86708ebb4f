//! Candidate profile produced by the extractor, normalized to fit the relational columns.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use time::{Date, Month};

pub const FULL_NAME_MAX_CHARS: usize = 255;
pub const PHONE_MAX_CHARS: usize = 20;
pub const DEGREE_MAX_CHARS: usize = 100;
pub const FIELD_MAX_CHARS: usize = 255;
pub const MAX_YEARS_OF_EXPERIENCE: i32 = 80;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Email pattern must compile.")
});
const OPEN_ENDED_DATES: [&str; 6] = ["present", "current", "now", "ongoing", "today", "-"];
const EMPTY_MARKERS: [&str; 5] = ["none", "null", "n/a", "na", "unknown"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
	NotAnObject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EducationEntry {
	pub institution: String,
	pub degree: Option<String>,
	pub field: Option<String>,
	pub start_date: Option<Date>,
	pub end_date: Option<Date>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateProfile {
	pub full_name: Option<String>,
	/// Lowercased; `None` when absent or not a plausible address.
	pub email: Option<String>,
	pub phone: Option<String>,
	pub summary: Option<String>,
	pub education: Vec<EducationEntry>,
	pub skills: Vec<String>,
	pub skills_description: String,
	pub years_of_experience: i32,
	pub work_description: String,
}
impl CandidateProfile {
	/// Reads the transformed extractor output. Unknown keys are ignored and malformed fields
	/// degrade to empty values instead of failing the whole profile.
	pub fn from_json(value: &Value) -> Result<Self, ProfileError> {
		let object = value.as_object().ok_or(ProfileError::NotAnObject)?;
		let field = |keys: &[&str]| keys.iter().find_map(|key| object.get(*key));
		let full_name = field(&["name", "full_name"])
			.and_then(text_value)
			.map(|name| truncate_chars(&collapse_whitespace(&name), FULL_NAME_MAX_CHARS));
		let email = field(&["email"]).and_then(text_value).and_then(|raw| normalize_email(&raw));
		let phone = field(&["phone"]).and_then(text_value).and_then(|raw| normalize_phone(&raw));
		let summary = field(&["summary"]).and_then(text_value);
		let education = field(&["education"]).map(education_entries).unwrap_or_default();
		let skills = field(&["skills"]).map(normalize_skills).unwrap_or_default();
		let skills_description =
			field(&["skills_description"]).and_then(text_value).unwrap_or_default();
		let years_of_experience = field(&["years_of_experience", "total_work_experience"])
			.map(years_value)
			.unwrap_or(0);
		let work_description = field(&["work_description"]).and_then(text_value).unwrap_or_default();

		Ok(Self {
			full_name,
			email,
			phone,
			summary,
			education,
			skills,
			skills_description,
			years_of_experience,
			work_description,
		})
	}

	pub fn embedding_text(&self) -> String {
		let combined = format!("{} {}", self.skills_description, self.work_description);
		let combined = combined.trim();

		if !combined.is_empty() {
			return combined.to_string();
		}

		self.summary.clone().unwrap_or_default()
	}
}

pub fn normalize_email(raw: &str) -> Option<String> {
	let email = raw.trim().trim_start_matches("mailto:").to_lowercase();
	EMAIL.is_match(&email).then_some(email)
}

/// Keeps digits and `+`, capped at the column width.
pub fn normalize_phone(raw: &str) -> Option<String> {
	let phone: String = raw.chars().filter(|ch| ch.is_ascii_digit() || *ch == '+').collect();

	if !phone.chars().any(|ch| ch.is_ascii_digit()) {
		return None;
	}

	Some(truncate_chars(&phone, PHONE_MAX_CHARS))
}

/// Lowercase, trimmed, deduplicated in first-seen order.
pub fn normalize_skills(value: &Value) -> Vec<String> {
	let raw: Vec<String> = match value {
		Value::Array(items) => items.iter().filter_map(text_value).collect(),
		Value::String(text) => text.split([',', ';', '\n']).map(str::to_string).collect(),
		_ => Vec::new(),
	};
	let mut skills: Vec<String> = Vec::with_capacity(raw.len());

	for skill in raw {
		let skill = collapse_whitespace(&skill).to_lowercase();

		if skill.is_empty() || skills.contains(&skill) {
			continue;
		}

		skills.push(skill);
	}

	skills
}

/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYY-MM`, `MM/YYYY`, `YYYY` and `Month YYYY`.
/// Partial dates resolve to the first day of the period.
pub fn parse_date(raw: &str) -> Option<Date> {
	let value = raw.trim().trim_end_matches('.');
	let lowered = value.to_lowercase();

	if lowered.is_empty() || OPEN_ENDED_DATES.contains(&lowered.as_str()) {
		return None;
	}

	let numeric: Vec<&str> =
		value.split(['-', '/', '.']).map(str::trim).filter(|part| !part.is_empty()).collect();

	if numeric.iter().all(|part| part.bytes().all(|byte| byte.is_ascii_digit())) {
		return match numeric.as_slice() {
			[year] if year.len() == 4 => ymd(year.parse().ok()?, 1, 1),
			[year, month] if year.len() == 4 => ymd(year.parse().ok()?, month.parse().ok()?, 1),
			[month, year] if year.len() == 4 => ymd(year.parse().ok()?, month.parse().ok()?, 1),
			[year, month, day] if year.len() == 4 =>
				ymd(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?),
			_ => None,
		};
	}

	let words: Vec<&str> = lowered
		.split(|ch: char| ch.is_whitespace() || ch == ',' || ch == '.')
		.filter(|part| !part.is_empty())
		.collect();

	match words.as_slice() {
		[month, year] => ymd(year.parse().ok()?, month_number(month)?, 1),
		[day, month, year] if day.bytes().all(|byte| byte.is_ascii_digit()) =>
			ymd(year.parse().ok()?, month_number(month)?, day.parse().ok()?),
		[month, day, year] => ymd(year.parse().ok()?, month_number(month)?, day.parse().ok()?),
		_ => None,
	}
}

pub fn truncate_chars(value: &str, max: usize) -> String {
	value.chars().take(max).collect::<String>().trim_end().to_string()
}

fn education_entries(value: &Value) -> Vec<EducationEntry> {
	let Value::Array(items) = value else {
		return Vec::new();
	};

	items
		.iter()
		.filter_map(|item| {
			let object = item.as_object()?;
			let text = |key: &str| object.get(key).and_then(text_value);
			let institution = text("institution").or_else(|| text("school"))?;
			let date = |key: &str| text(key).as_deref().and_then(parse_date);

			Some(EducationEntry {
				institution: collapse_whitespace(&institution),
				degree: text("degree").map(|degree| truncate_chars(&degree, DEGREE_MAX_CHARS)),
				field: text("field").map(|field| truncate_chars(&field, FIELD_MAX_CHARS)),
				start_date: date("start_date"),
				end_date: date("end_date"),
			})
		})
		.collect()
}

fn years_value(value: &Value) -> i32 {
	let years = match value {
		Value::Number(number) => number
			.as_i64()
			.or_else(|| number.as_f64().filter(|years| years.is_finite()).map(|years| years as i64)),
		Value::String(text) => text
			.split(|ch: char| !ch.is_ascii_digit())
			.find(|part| !part.is_empty())
			.and_then(|digits| digits.parse::<i64>().ok()),
		_ => None,
	};

	years.unwrap_or(0).clamp(0, i64::from(MAX_YEARS_OF_EXPERIENCE)) as i32
}

fn text_value(value: &Value) -> Option<String> {
	let text = match value {
		Value::String(text) => text.trim().to_string(),
		Value::Number(number) => number.to_string(),
		_ => return None,
	};

	if text.is_empty() || EMPTY_MARKERS.contains(&text.to_lowercase().as_str()) {
		return None;
	}

	Some(text)
}

fn collapse_whitespace(value: &str) -> String {
	value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn ymd(year: i32, month: u8, day: u8) -> Option<Date> {
	Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()
}

fn month_number(name: &str) -> Option<u8> {
	const MONTHS: [&str; 12] =
		["jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec"];

	if name.len() < 3 {
		return None;
	}

	let prefix = name.get(..3)?;

	MONTHS.iter().position(|month| *month == prefix).map(|index| index as u8 + 1)
}
