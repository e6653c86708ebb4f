use std::time::Duration;

use reqwest::{
	Client, Response,
	header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap},
};

use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct Downloaded {
	pub bytes: Vec<u8>,
	pub filename: Option<String>,
	pub content_type: Option<String>,
}

/// Streams the body so an oversized file is rejected before it is fully buffered.
pub async fn download(url: &str, timeout_ms: u64, max_bytes: u64) -> Result<Downloaded> {
	let client = Client::builder().timeout(Duration::from_millis(timeout_ms)).build()?;
	let res = client.get(url).send().await?.error_for_status()?;
	let filename = filename_from_headers(res.headers());
	let content_type = res
		.headers()
		.get(CONTENT_TYPE)
		.and_then(|value| value.to_str().ok())
		.map(|value| value.to_string());

	// Drive answers large files with an HTML confirmation page instead of the file.
	if content_type.as_deref().is_some_and(|value| value.starts_with("text/html")) {
		return Err(Error::InvalidResponse {
			message: "Download returned an HTML page instead of a file.".to_string(),
		});
	}

	let bytes = read_capped(res, max_bytes).await?;

	Ok(Downloaded { bytes, filename, content_type })
}

/// Fetches an HTML page, such as a public Drive folder listing, as text.
pub async fn fetch_page(url: &str, timeout_ms: u64, max_bytes: u64) -> Result<String> {
	let client = Client::builder().timeout(Duration::from_millis(timeout_ms)).build()?;
	let res = client.get(url).send().await?.error_for_status()?;
	let bytes = read_capped(res, max_bytes).await?;

	Ok(String::from_utf8_lossy(&bytes).into_owned())
}

async fn read_capped(mut res: Response, max_bytes: u64) -> Result<Vec<u8>> {
	if res.content_length().is_some_and(|len| len > max_bytes) {
		return Err(Error::TooLarge { limit: max_bytes });
	}

	let mut bytes = Vec::new();

	while let Some(chunk) = res.chunk().await? {
		if bytes.len() as u64 + chunk.len() as u64 > max_bytes {
			return Err(Error::TooLarge { limit: max_bytes });
		}

		bytes.extend_from_slice(&chunk);
	}

	Ok(bytes)
}

fn filename_from_headers(headers: &HeaderMap) -> Option<String> {
	let raw = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;

	parse_content_disposition(raw)
}

fn parse_content_disposition(raw: &str) -> Option<String> {
	let mut plain = None;

	for part in raw.split(';').map(str::trim) {
		if let Some(encoded) = part.strip_prefix("filename*=") {
			// RFC 5987 form: UTF-8''name. Only unescaped names are kept.
			let name = encoded.rsplit("''").next().unwrap_or(encoded).trim_matches('"');

			if !name.is_empty() && !name.contains('%') {
				return Some(name.to_string());
			}
		} else if let Some(name) = part.strip_prefix("filename=") {
			let name = name.trim_matches('"');

			if !name.is_empty() {
				plain = Some(name.to_string());
			}
		}
	}

	plain
}
