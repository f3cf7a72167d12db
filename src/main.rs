//! Callgate server
//!
//! Bridges the FreeSWITCH event socket to per-subscriber websockets. The
//! process needs its control link: it refuses to start without one and
//! shuts down if the link is lost.

use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use callgate_api::{configure_routes, HelpPage};
use callgate_core::GatewayConfig;
use callgate_esl::{CommandSender, ControlLink};
use callgate_services::{CommandTranslator, GatewayHub};
use std::env;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "callgate={0},callgate_core={0},callgate_esl={0},callgate_services={0},callgate_api={0},actix_web=info",
            log_level
        ))
    });

    let json = env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting Callgate v{}", env!("CARGO_PKG_VERSION"));

    let config = GatewayConfig::load().context("Failed to load configuration")?;

    let link = ControlLink::connect(&config.esl)
        .await
        .with_context(|| format!("Failed to connect to FreeSWITCH at {}", config.esl_addr()))?;

    let (commands, command_rx) = CommandSender::channel();
    let (hub, hub_task) = GatewayHub::spawn(CommandTranslator::from_config(&config), commands);

    let publisher = hub.clone();
    let link = link.start(command_rx, move |event| {
        if let Err(e) = publisher.publish(event) {
            warn!(error = %e, "Event dropped");
        }
    });

    let bind_addr = config.bind_addr();
    let help_page = HelpPage::new(config.web.help_page.clone());
    let hub = web::Data::new(hub);

    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, config.web.workers
    );

    let server = HttpServer::new(move || {
        App::new()
            .app_data(hub.clone())
            .app_data(web::Data::new(help_page.clone()))
            // Middleware
            .wrap(middleware::Logger::new("%a \"%r\" %s %b %Dms"))
            .wrap(TracingLogger::default())
            .configure(configure_routes)
    })
    .workers(config.web.workers)
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run();

    // Stop serving subscribers once the event source is gone
    let (lost_tx, mut lost_rx) = oneshot::channel();
    let server_handle = server.handle();
    let watchdog = actix_web::rt::spawn(async move {
        let err = link.closed().await;
        error!("Control link lost, shutting down HTTP server");
        let _ = lost_tx.send(err);
        server_handle.stop(false).await;
    });

    server.await.context("HTTP server failed")?;
    hub_task.abort();

    if let Ok(err) = lost_rx.try_recv() {
        return Err(anyhow::Error::new(err).context("FreeSWITCH control link closed"));
    }

    watchdog.abort();
    info!("Callgate stopped");
    Ok(())
}
