const PDF_MAGIC: &[u8] = b"%PDF-";
const MAX_FILENAME_CHARS: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
	Pdf,
	Text,
}
impl DocumentKind {
	pub fn extension(self) -> &'static str {
		match self {
			Self::Pdf => "pdf",
			Self::Text => "txt",
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Pdf => "pdf",
			Self::Text => "text",
		}
	}
}

/// Content wins over the name: a PDF header is a PDF whatever the file is called.
pub fn detect(bytes: &[u8], filename: Option<&str>) -> Option<DocumentKind> {
	if bytes.starts_with(PDF_MAGIC) {
		return Some(DocumentKind::Pdf);
	}

	let extension = filename
		.and_then(|name| name.rsplit_once('.'))
		.map(|(_, ext)| ext.to_ascii_lowercase())?;

	match extension.as_str() {
		"pdf" => Some(DocumentKind::Pdf),
		"txt" | "md" => Some(DocumentKind::Text),
		_ => None,
	}
}

/// Keeps the last path component, drops control characters and caps the length.
pub fn sanitize_filename(raw: &str) -> Option<String> {
	let name = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
	let cleaned: String =
		name.chars().filter(|ch| !ch.is_control()).take(MAX_FILENAME_CHARS).collect();
	let cleaned = cleaned.trim();

	if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
		return None;
	}

	Some(cleaned.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn detects_pdf_by_magic_regardless_of_name() {
		assert_eq!(detect(b"%PDF-1.7\n...", Some("resume.bin")), Some(DocumentKind::Pdf));
		assert_eq!(detect(b"%PDF-1.4", None), Some(DocumentKind::Pdf));
	}

	#[test]
	fn detects_text_by_extension() {
		assert_eq!(detect(b"Jane Doe", Some("cv.TXT")), Some(DocumentKind::Text));
		assert_eq!(detect(b"# Jane", Some("cv.md")), Some(DocumentKind::Text));
	}

	#[test]
	fn rejects_unknown_kinds() {
		assert_eq!(detect(b"PK\x03\x04", Some("cv.docx")), None);
		assert_eq!(detect(b"plain", None), None);
	}

	#[test]
	fn sanitizes_paths_out_of_filenames() {
		assert_eq!(sanitize_filename("../../etc/passwd").as_deref(), Some("passwd"));
		assert_eq!(sanitize_filename("C:\\Users\\jane\\cv.pdf").as_deref(), Some("cv.pdf"));
		assert_eq!(sanitize_filename("  \n "), None);
		assert_eq!(sanitize_filename("dir/.."), None);
	}
}
