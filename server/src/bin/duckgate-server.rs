use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use duckgate_common::ServerConfig;
use duckgate_server::route;

/// Map the level environment variable, including its single-letter aliases,
/// onto a filter directive.
fn log_directive() -> &'static str {
    match std::env::var("DUCKGATE_LOG").as_deref() {
        Ok("debug") | Ok("d") => "debug",
        Ok("warn") | Ok("warning") | Ok("w") => "warn",
        Ok("error") | Ok("e") => "error",
        _ => "info",
    }
}

fn init_tracing() {
    // Errors go to stderr, everything else to stdout.
    let writer = std::io::stderr
        .with_max_level(Level::ERROR)
        .or_else(std::io::stdout);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_directive()))
        .with_writer(writer)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(ServerConfig::from_env());
    init_tracing();

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let make_svc = make_service_fn(move |_conn| {
        let config = config.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let config = config.clone();
                async move { Ok::<_, Infallible>(route(req, config).await) }
            }))
        }
    });

    let server = Server::bind(&addr).serve(make_svc);
    info!("duckgate listening on {addr}");
    server.await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directive_aliases() {
        std::env::set_var("DUCKGATE_LOG", "d");
        assert_eq!(log_directive(), "debug");
        std::env::set_var("DUCKGATE_LOG", "w");
        assert_eq!(log_directive(), "warn");
        std::env::set_var("DUCKGATE_LOG", "nonsense");
        assert_eq!(log_directive(), "info");
        std::env::remove_var("DUCKGATE_LOG");
        assert_eq!(log_directive(), "info");
    }
}
