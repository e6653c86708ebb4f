use axum::{
	Json, Router,
	body::Body,
	extract::{DefaultBodyLimit, Multipart, Path, Query, State},
	http::{HeaderMap, Request, StatusCode, header},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;
use cvdb_service::{
	DeletePersonResponse, EducationInput, EducationView, Error, IngestBatchResponse,
	IngestGdriveRequest, IngestJobResponse, IngestOp, IngestResponse, IngestUploadRequest,
	MAX_BATCH_FILES, PersonPatchRequest, PersonView, RebuildReport, ResumeFileView, SearchRequest,
	SearchResponse,
};

const UPLOAD_FIELD: &str = "file";
/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1_024;

#[derive(Debug, Deserialize)]
pub struct GdriveBody {
	pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
	#[serde(default)]
	pub email: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Clone)]
struct AuthToken(Option<String>);

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}

	pub fn status(&self) -> StatusCode {
		self.status
	}
}
impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		let (status, code) = match &err {
			Error::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
			Error::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
			Error::Conflict { .. } => (StatusCode::CONFLICT, "CONFLICT"),
			Error::Extraction { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "EXTRACTION_FAILED"),
			Error::Provider { .. } => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR"),
			Error::Storage { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
			Error::Qdrant { .. } => (StatusCode::SERVICE_UNAVAILABLE, "QDRANT_UNAVAILABLE"),
		};

		if status.is_server_error() {
			tracing::error!(error = %err, "Request failed.");
		}

		json_error(status, code, err.to_string(), None)
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}

pub fn router(state: AppState) -> Router {
	let upload_limit = body_limit(&state, 1);
	let batch_limit = body_limit(&state, MAX_BATCH_FILES);
	let auth = AuthToken(state.service.cfg.security.api_auth_token.clone());
	let batch = Router::new()
		.route("/v1/resumes/batch", post(ingest_upload_batch))
		.route("/v1/persons/{person_id}/resumes/batch", post(ingest_upload_batch_for_person))
		.layer(DefaultBodyLimit::max(batch_limit));
	let api = Router::new()
		.route("/v1/resumes", post(ingest_upload))
		.route("/v1/resumes/gdrive", post(ingest_gdrive))
		.route("/v1/resumes/gdrive/folder", post(ingest_gdrive_folder))
		.route("/v1/persons/{person_id}/resumes", post(ingest_upload_for_person))
		.route("/v1/persons/{person_id}/resumes/gdrive", post(ingest_gdrive_for_person))
		.route("/v1/ingest/jobs/{job_id}", get(ingest_job))
		.route("/v1/persons", get(find_person))
		.route(
			"/v1/persons/{person_id}",
			get(get_person).patch(update_person).delete(delete_person),
		)
		.route(
			"/v1/persons/{person_id}/educations",
			get(list_educations).put(replace_educations),
		)
		.route("/v1/persons/{person_id}/resume_files", get(list_resume_files))
		.route("/v1/search", post(search))
		.layer(DefaultBodyLimit::max(upload_limit))
		.merge(batch)
		.layer(middleware::from_fn_with_state(auth, auth_middleware));

	Router::new().route("/health", get(health)).merge(api).with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	let auth = AuthToken(state.service.cfg.security.admin_auth_token.clone());

	Router::new()
		.route("/v1/admin/rebuild_qdrant", post(rebuild_qdrant))
		.layer(middleware::from_fn_with_state(auth, auth_middleware))
		.with_state(state)
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn ingest_upload(
	State(state): State<AppState>,
	multipart: Multipart,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
	let req = read_upload(multipart, None).await?;

	accepted(state.service.ingest_upload(req).await?)
}

async fn ingest_upload_for_person(
	State(state): State<AppState>,
	Path(person_id): Path<i64>,
	multipart: Multipart,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
	let req = read_upload(multipart, Some(person_id)).await?;

	accepted(state.service.ingest_upload(req).await?)
}

async fn ingest_upload_batch(
	State(state): State<AppState>,
	multipart: Multipart,
) -> Result<(StatusCode, Json<IngestBatchResponse>), ApiError> {
	let uploads = read_uploads(multipart, None).await?;

	batch_accepted(state.service.ingest_upload_batch(uploads).await?)
}

async fn ingest_upload_batch_for_person(
	State(state): State<AppState>,
	Path(person_id): Path<i64>,
	multipart: Multipart,
) -> Result<(StatusCode, Json<IngestBatchResponse>), ApiError> {
	let uploads = read_uploads(multipart, Some(person_id)).await?;

	batch_accepted(state.service.ingest_upload_batch(uploads).await?)
}

async fn ingest_gdrive_folder(
	State(state): State<AppState>,
	Json(body): Json<GdriveBody>,
) -> Result<(StatusCode, Json<IngestBatchResponse>), ApiError> {
	let req = IngestGdriveRequest { person_id: None, url: body.url };

	batch_accepted(state.service.ingest_gdrive_folder(req).await?)
}

async fn ingest_gdrive(
	State(state): State<AppState>,
	Json(body): Json<GdriveBody>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
	let req = IngestGdriveRequest { person_id: None, url: body.url };

	accepted(state.service.ingest_gdrive(req).await?)
}

async fn ingest_gdrive_for_person(
	State(state): State<AppState>,
	Path(person_id): Path<i64>,
	Json(body): Json<GdriveBody>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
	let req = IngestGdriveRequest { person_id: Some(person_id), url: body.url };

	accepted(state.service.ingest_gdrive(req).await?)
}

async fn ingest_job(
	State(state): State<AppState>,
	Path(job_id): Path<Uuid>,
) -> Result<Json<IngestJobResponse>, ApiError> {
	Ok(Json(state.service.ingest_job(job_id).await?))
}

async fn find_person(
	State(state): State<AppState>,
	Query(query): Query<EmailQuery>,
) -> Result<Json<PersonView>, ApiError> {
	let Some(email) = query.email.filter(|email| !email.trim().is_empty()) else {
		return Err(json_error(
			StatusCode::BAD_REQUEST,
			"INVALID_REQUEST",
			"email query parameter is required.",
			Some(vec!["email".to_string()]),
		));
	};

	Ok(Json(state.service.get_person_by_email(&email).await?))
}

async fn get_person(
	State(state): State<AppState>,
	Path(person_id): Path<i64>,
) -> Result<Json<PersonView>, ApiError> {
	Ok(Json(state.service.get_person(person_id).await?))
}

async fn update_person(
	State(state): State<AppState>,
	Path(person_id): Path<i64>,
	Json(patch): Json<PersonPatchRequest>,
) -> Result<Json<PersonView>, ApiError> {
	Ok(Json(state.service.update_person(person_id, patch).await?))
}

async fn delete_person(
	State(state): State<AppState>,
	Path(person_id): Path<i64>,
) -> Result<Json<DeletePersonResponse>, ApiError> {
	Ok(Json(state.service.delete_person(person_id).await?))
}

async fn list_educations(
	State(state): State<AppState>,
	Path(person_id): Path<i64>,
) -> Result<Json<Vec<EducationView>>, ApiError> {
	Ok(Json(state.service.list_educations(person_id).await?))
}

async fn replace_educations(
	State(state): State<AppState>,
	Path(person_id): Path<i64>,
	Json(educations): Json<Vec<EducationInput>>,
) -> Result<Json<Vec<EducationView>>, ApiError> {
	Ok(Json(state.service.replace_educations(person_id, educations).await?))
}

async fn list_resume_files(
	State(state): State<AppState>,
	Path(person_id): Path<i64>,
) -> Result<Json<Vec<ResumeFileView>>, ApiError> {
	Ok(Json(state.service.list_resume_files(person_id).await?))
}

async fn search(
	State(state): State<AppState>,
	Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
	Ok(Json(state.service.search(req).await?))
}

async fn rebuild_qdrant(State(state): State<AppState>) -> Result<Json<RebuildReport>, ApiError> {
	Ok(Json(state.service.rebuild_qdrant().await?))
}

async fn auth_middleware(
	State(AuthToken(expected)): State<AuthToken>,
	req: Request<Body>,
	next: Next,
) -> Response {
	if let Some(expected) = expected.as_deref()
		&& read_bearer_token(req.headers()) != Some(expected)
	{
		return json_error(
			StatusCode::UNAUTHORIZED,
			"UNAUTHORIZED",
			"A valid Bearer token is required.",
			None,
		)
		.into_response();
	}

	next.run(req).await
}

fn read_bearer_token(headers: &HeaderMap) -> Option<&str> {
	let raw = headers.get(header::AUTHORIZATION)?;
	let value = raw.to_str().ok()?.trim();
	let token = value.strip_prefix("Bearer ")?.trim();

	if token.is_empty() { None } else { Some(token) }
}

fn body_limit(state: &AppState, files: usize) -> usize {
	let max_file_bytes =
		usize::try_from(state.service.cfg.ingest.max_file_bytes).unwrap_or(usize::MAX);

	max_file_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES).saturating_mul(files)
}

/// New work is `202 Accepted`. A duplicate points at existing work and is `200 OK`.
fn accepted(response: IngestResponse) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
	let status = match response.op {
		IngestOp::Queued => StatusCode::ACCEPTED,
		IngestOp::Duplicate => StatusCode::OK,
	};

	Ok((status, Json(response)))
}

/// A batch that queued anything is `202 Accepted`, otherwise `200 OK` with the per-file report.
fn batch_accepted(
	report: IngestBatchResponse,
) -> Result<(StatusCode, Json<IngestBatchResponse>), ApiError> {
	let status = if report.queued_count > 0 { StatusCode::ACCEPTED } else { StatusCode::OK };

	Ok((status, Json(report)))
}

/// Every `file` field becomes one upload. An empty batch is rejected by the service.
async fn read_uploads(
	mut multipart: Multipart,
	person_id: Option<i64>,
) -> Result<Vec<IngestUploadRequest>, ApiError> {
	let mut uploads = Vec::new();

	while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
		if field.name() != Some(UPLOAD_FIELD) {
			continue;
		}
		if uploads.len() == MAX_BATCH_FILES {
			return Err(json_error(
				StatusCode::BAD_REQUEST,
				"INVALID_REQUEST",
				format!("A batch holds at most {MAX_BATCH_FILES} files."),
				Some(vec![UPLOAD_FIELD.to_string()]),
			));
		}

		let filename = field.file_name().map(str::to_string);
		let bytes = field.bytes().await.map_err(multipart_error)?;

		uploads.push(IngestUploadRequest { person_id, filename, bytes: bytes.to_vec() });
	}

	Ok(uploads)
}

async fn read_upload(
	mut multipart: Multipart,
	person_id: Option<i64>,
) -> Result<IngestUploadRequest, ApiError> {
	while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
		if field.name() != Some(UPLOAD_FIELD) {
			continue;
		}

		let filename = field.file_name().map(str::to_string);
		let bytes = field.bytes().await.map_err(multipart_error)?;

		return Ok(IngestUploadRequest { person_id, filename, bytes: bytes.to_vec() });
	}

	Err(json_error(
		StatusCode::BAD_REQUEST,
		"INVALID_REQUEST",
		"Multipart field \"file\" is required.",
		Some(vec![UPLOAD_FIELD.to_string()]),
	))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
	json_error(
		err.status(),
		"INVALID_REQUEST",
		err.body_text(),
		Some(vec![UPLOAD_FIELD.to_string()]),
	)
}
