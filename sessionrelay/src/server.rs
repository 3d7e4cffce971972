use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use pingora::prelude::*;
use pingora::server::Server;

use sessionrelay_core::config::RelayConfig;
use sessionrelay_core::relay::{RelayGateway, ReqwestClient};

/// Run the pingora server with the given configuration.
pub fn run(config: RelayConfig) -> Result<()> {
    let mut server = Server::new(None)?;
    server.bootstrap();

    let client = ReqwestClient::new(Duration::from_millis(config.upstream.timeout_ms))
        .context("failed to build upstream HTTP client")?;

    tracing::info!(
        hostname = %config.server.hostname,
        origin = %config.upstream.origin,
        listen = %config.server.listen,
        "sessionrelay is initialized"
    );

    let gateway = RelayGateway::new(&config, Arc::new(client));

    let mut svc = http_proxy_service(&server.configuration, gateway);
    svc.add_tcp(&config.server.listen);

    server.add_service(svc);
    server.run_forever();
}
