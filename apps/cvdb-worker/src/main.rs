use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = cvdb_worker::Args::parse();

	cvdb_worker::run(args).await
}
