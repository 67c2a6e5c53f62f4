//! Morty - sanitizing web proxy.
//!
//! SPDX-License-Identifier: AGPL-3.0-only
//!
//! Initializes the runtime, loads configuration from flags and environment,
//! sets up logging, and launches the proxy service.

use clap::Parser;
use morty::config::{Cli, ProxyConfig};
use morty::core::proxy::client::build_client;
use morty::MortyProxy;
use pingora::proxy::http_proxy_service;
use pingora::server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = match ProxyConfig::from_cli(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let (non_blocking, _guard) = tracing_appender::non_blocking(std::io::stdout());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if config.debug { "debug" } else { "info" })
    });
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking);
    if log_format.eq_ignore_ascii_case("json") {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let client = match build_client(&config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    info!(listen = %config.listen_address, "listening");

    let proxy = MortyProxy::new(config.clone(), client);

    let mut server = Server::new(None).expect("failed to create pingora server");
    server.bootstrap();

    let mut proxy_service = http_proxy_service(&server.configuration, proxy);
    proxy_service.add_tcp(&config.listen_address);
    server.add_service(proxy_service);

    server.run_forever();
}
