pub fn render_schema() -> String {
	let init = include_str!("../../../sql/init.sql");

	expand_includes(init)
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"00_extensions.sql" => out.push_str(include_str!("../../../sql/00_extensions.sql")),
				"tables/001_person.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_person.sql")),
				"tables/002_education.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_education.sql")),
				"tables/003_resume_file.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_resume_file.sql")),
				"tables/004_resume_profile.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_resume_profile.sql")),
				"tables/005_resume_embedding.sql" =>
					out.push_str(include_str!("../../../sql/tables/005_resume_embedding.sql")),
				"tables/006_ingest_jobs.sql" =>
					out.push_str(include_str!("../../../sql/tables/006_ingest_jobs.sql")),
				"tables/007_indexing_outbox.sql" =>
					out.push_str(include_str!("../../../sql/tables/007_indexing_outbox.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}
