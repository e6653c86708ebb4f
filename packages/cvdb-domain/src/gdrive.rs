use std::sync::LazyLock;

use regex::Regex;

pub const DOWNLOAD_BASE: &str = "https://drive.google.com/uc?export=download&id=";
pub const FOLDER_LISTING_BASE: &str = "https://drive.google.com/embeddedfolderview?id=";

static PATH_ID: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"/d/([A-Za-z0-9_-]+)").expect("Path id pattern must compile."));
static QUERY_ID: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"[?&]id=([A-Za-z0-9_-]+)").expect("Query id pattern must compile.")
});
static FOLDER_ID: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"/folders/([A-Za-z0-9_-]+)").expect("Folder id pattern must compile.")
});
static LISTED_FILE_ID: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"/file/d/([A-Za-z0-9_-]+)").expect("Listed file pattern must compile.")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GdriveLinkError {
	NotGoogleDrive,
	MissingFileId,
	MissingFolderId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GdriveLink {
	pub file_id: String,
}
impl GdriveLink {
	pub fn download_url(&self) -> String {
		format!("{DOWNLOAD_BASE}{}", self.file_id)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GdriveFolder {
	pub folder_id: String,
}
impl GdriveFolder {
	/// Public HTML listing of a folder shared as "anyone with the link".
	pub fn listing_url(&self) -> String {
		format!("{FOLDER_LISTING_BASE}{}", self.folder_id)
	}
}

/// Accepts `.../file/d/<id>/view`, `.../open?id=<id>` and `uc?id=<id>` style links.
pub fn parse_link(url: &str) -> Result<GdriveLink, GdriveLinkError> {
	let url = drive_url(url)?;

	[&PATH_ID, &QUERY_ID]
		.into_iter()
		.find_map(|re| re.captures(url).and_then(|caps| caps.get(1)))
		.map(|file_id| GdriveLink { file_id: file_id.as_str().to_string() })
		.ok_or(GdriveLinkError::MissingFileId)
}

/// Accepts `.../drive/folders/<id>` and `.../drive/u/<n>/folders/<id>` links.
pub fn parse_folder_link(url: &str) -> Result<GdriveFolder, GdriveLinkError> {
	let url = drive_url(url)?;

	FOLDER_ID
		.captures(url)
		.and_then(|caps| caps.get(1))
		.map(|folder_id| GdriveFolder { folder_id: folder_id.as_str().to_string() })
		.ok_or(GdriveLinkError::MissingFolderId)
}

/// File ids linked from a folder listing page, deduplicated in page order.
pub fn listed_file_ids(html: &str) -> Vec<String> {
	let mut ids: Vec<String> = Vec::new();

	for caps in LISTED_FILE_ID.captures_iter(html) {
		let Some(id) = caps.get(1).map(|id| id.as_str()) else {
			continue;
		};

		if !ids.iter().any(|seen| seen == id) {
			ids.push(id.to_string());
		}
	}

	ids
}

fn drive_url(url: &str) -> Result<&str, GdriveLinkError> {
	let url = url.trim();
	let host = url
		.strip_prefix("https://")
		.or_else(|| url.strip_prefix("http://"))
		.and_then(|rest| rest.split(['/', '?', '#']).next())
		.map(str::to_ascii_lowercase)
		.ok_or(GdriveLinkError::NotGoogleDrive)?;

	if host != "drive.google.com" && host != "docs.google.com" {
		return Err(GdriveLinkError::NotGoogleDrive);
	}

	Ok(url)
}
