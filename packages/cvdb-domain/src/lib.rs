pub mod document;
pub mod gdrive;
pub mod hash;
pub mod profile;
pub mod status;
