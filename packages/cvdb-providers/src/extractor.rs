use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

const MAX_ATTEMPTS: usize = 3;

const EXTRACT_SYSTEM_PROMPT: &str = "\
You are an expert HR assistant. Extract structured data from the provided resume text.
Return one JSON object with these fields:
- name, email, phone (remove every non-numeric character except +)
- summary (short summary of the candidate)
- education (list of: institution, degree, field, start_date, end_date)
- skills (list)
- work_experience (list of: years_of_experience (integer), company, position, description)
- total_work_experience (integer): total years of work experience
- certifications (list of: title, date, description)
- achievements (list of: title, date)
Constraints:
- Only rely on the provided resume text. Do not invent facts.
- Keep statistics and dates when summarizing projects and papers.
- Always return every field, using null or an empty list when the resume has no value.
- Return valid JSON only, without explanations.";

const TRANSFORM_SYSTEM_PROMPT: &str = "\
You are an expert HR assistant. Transform the extracted resume JSON you are given into one JSON
object with exactly these keys:
- name: full name of the candidate
- email: email address of the candidate
- phone: phone number (digits and + only)
- summary: short summary of the candidate
- education: list of { institution, degree, field, start_date, end_date } with dates as YYYY-MM-DD,
  YYYY-MM or YYYY, and null for unknown or ongoing
- skills: list of lowercase, abstract, non-duplicated skills drawn from skills, projects,
  achievements and certifications
- skills_description: prose describing those skills
- years_of_experience: total years of experience as an integer
- work_description: prose describing all work experience combined, including role, description
  and time
Constraints:
- Only rely on the provided JSON. Do not invent facts.
- Fold achievements, certifications and publications into skills.
- Do not include any other key.
- Return valid JSON only, without explanations.";

/// First pass: raw structured extraction from resume text.
pub fn extraction_messages(resume_text: &str) -> Vec<Value> {
	vec![
		serde_json::json!({ "role": "system", "content": EXTRACT_SYSTEM_PROMPT }),
		serde_json::json!({ "role": "user", "content": format!("Resume text:\n{resume_text}") }),
	]
}

/// Second pass: reshape the raw extraction into the candidate profile keys.
pub fn transform_messages(extracted: &Value) -> Vec<Value> {
	vec![
		serde_json::json!({ "role": "system", "content": TRANSFORM_SYSTEM_PROMPT }),
		serde_json::json!({ "role": "user", "content": format!("Extracted JSON:\n{extracted}") }),
	]
}

pub async fn extract(cfg: &cvdb_config::LlmProviderConfig, messages: &[Value]) -> Result<Value> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);

	for attempt in 1..=MAX_ATTEMPTS {
		let body = serde_json::json!({
			"model": cfg.model,
			"temperature": cfg.temperature,
			"response_format": { "type": "json_object" },
			"messages": messages,
		});
		let res = client
			.post(&url)
			.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
			.json(&body)
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;

		match parse_extractor_json(json) {
			Ok(parsed) => return Ok(parsed),
			Err(err) => {
				tracing::warn!(attempt, error = %err, "Extractor returned unusable JSON.");
			},
		}
	}

	Err(Error::InvalidResponse { message: "Extractor response is not valid JSON.".to_string() })
}

fn parse_extractor_json(json: Value) -> Result<Value> {
	if let Some(content) = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
	{
		let parsed: Value =
			serde_json::from_str(strip_code_fence(content)).map_err(|_| Error::InvalidResponse {
				message: "Extractor content is not valid JSON.".to_string(),
			})?;

		if !parsed.is_object() {
			return Err(Error::InvalidResponse {
				message: "Extractor content must be a JSON object.".to_string(),
			});
		}

		return Ok(parsed);
	}

	if json.is_object() && json.get("choices").is_none() {
		return Ok(json);
	}

	Err(Error::InvalidResponse { message: "Extractor response is missing JSON content.".to_string() })
}

/// Some models wrap JSON in a Markdown fence even when asked not to.
fn strip_code_fence(content: &str) -> &str {
	let trimmed = content.trim();
	let Some(rest) = trimmed.strip_prefix("```") else {
		return trimmed;
	};
	let rest = rest.strip_prefix("json").unwrap_or(rest);

	rest.strip_suffix("```").unwrap_or(rest).trim()
}
