pub mod routes;
pub mod state;

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;
use color_eyre::eyre;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(
	version = cvdb_cli::VERSION,
	rename_all = "kebab",
	styles = cvdb_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = cvdb_config::load(&args.config)?;

	init_tracing(&config);

	let (http_addr, admin_addr) = bind_addrs(&config)?;
	let state = AppState::new(config).await?;
	let app = routes::router(state.clone());
	let admin_app = routes::admin_router(state);
	let http_listener = TcpListener::bind(http_addr).await?;

	tracing::info!(%http_addr, "HTTP server listening.");

	let http_server = axum::serve(http_listener, app);
	let admin_listener = TcpListener::bind(admin_addr).await?;

	tracing::info!(%admin_addr, "Admin server listening.");

	let admin_server = axum::serve(admin_listener, admin_app);

	tokio::try_join!(http_server, admin_server)?;

	Ok(())
}

/// The admin listener is always loopback. The public listener is loopback unless
/// `security.bind_localhost_only` is off.
pub fn bind_addrs(config: &cvdb_config::Config) -> color_eyre::Result<(SocketAddr, SocketAddr)> {
	let http_addr: SocketAddr = config.service.http_bind.parse()?;
	let admin_addr: SocketAddr = config.service.admin_bind.parse()?;

	if config.security.bind_localhost_only && !http_addr.ip().is_loopback() {
		return Err(eyre::eyre!(
			"http_bind must be a loopback address when bind_localhost_only is true."
		));
	}
	if !admin_addr.ip().is_loopback() {
		return Err(eyre::eyre!("admin_bind must be a loopback address."));
	}

	Ok((http_addr, admin_addr))
}

fn init_tracing(config: &cvdb_config::Config) {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config(http_bind: &str, admin_bind: &str, localhost_only: bool) -> cvdb_config::Config {
		let mut cfg = cvdb_testkit::test_config(
			"postgres://localhost/cvdb",
			"http://127.0.0.1:6334",
			"cv",
			4,
		);

		cfg.service.http_bind = http_bind.to_string();
		cfg.service.admin_bind = admin_bind.to_string();
		cfg.security.bind_localhost_only = localhost_only;

		cfg
	}

	#[test]
	fn public_bind_requires_opt_out() {
		assert!(bind_addrs(&config("0.0.0.0:8080", "127.0.0.1:8081", true)).is_err());
		assert!(bind_addrs(&config("0.0.0.0:8080", "127.0.0.1:8081", false)).is_ok());
	}

	#[test]
	fn admin_bind_is_always_loopback() {
		let err = bind_addrs(&config("127.0.0.1:8080", "0.0.0.0:8081", false))
			.expect_err("Expected loopback error.");

		assert!(err.to_string().contains("admin_bind"));
	}

	#[test]
	fn malformed_bind_is_rejected() {
		assert!(bind_addrs(&config("localhost", "127.0.0.1:8081", true)).is_err());
	}
}
