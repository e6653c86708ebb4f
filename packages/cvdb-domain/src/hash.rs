use sha2::{Digest, Sha256};

pub const SHA256_HEX_LEN: usize = 64;

/// Lowercase hex digest, the dedup key stored in `resume_file.sha256`.
pub fn sha256_hex(bytes: &[u8]) -> String {
	hex::encode(Sha256::digest(bytes))
}

pub fn is_sha256_hex(value: &str) -> bool {
	value.len() == SHA256_HEX_LEN
		&& value.bytes().all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte))
}
