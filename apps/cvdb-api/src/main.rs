use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = cvdb_api::Args::parse();

	cvdb_api::run(args).await
}
