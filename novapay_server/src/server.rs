use std::{net::IpAddr, time::Duration};

use actix_web::{
    dev::{Server, Service},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
};
use futures::{future::ok, FutureExt};
use log::{info, warn};
use novapay_engine::{AuditRecorder, CallbackProcessor, SqliteDatabase};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    helpers::{forwarded_header_ip, x_forwarded_for_ip},
    routes::{health, novapay_callback},
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let srv = create_server_instance(config, db)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(config: ServerConfig, db: SqliteDatabase) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let audit = AuditRecorder::new(db.clone(), config.verbose_audit);
        let processor =
            CallbackProcessor::new(db.clone(), audit, config.verification_config(), config.processing_policy());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("npg::access_log"))
            .app_data(web::Data::new(processor));
        let use_x_forwarded_for = config.use_x_forwarded_for;
        let use_forwarded = config.use_forwarded;
        let whitelist = config.platform_whitelist.clone();
        let callback_scope = web::scope("/novapay")
            .wrap_fn(move |req, srv| {
                // Collect the peer IP from the X-Forwarded-For or Forwarded headers _if_ the matching `use_nnn`
                // flag has been set in the configuration. Otherwise, use the peer address from the connection.
                let peer_ip: Option<IpAddr> = req
                    .headers()
                    .get("X-Forwarded-For")
                    .and_then(|v| use_x_forwarded_for.then(|| v.to_str().ok()).flatten())
                    .and_then(x_forwarded_for_ip)
                    .or_else(|| {
                        req.headers()
                            .get("Forwarded")
                            .and_then(|v| use_forwarded.then(|| v.to_str().ok()).flatten())
                            .and_then(forwarded_header_ip)
                    })
                    .or_else(|| req.peer_addr().map(|a| a.ip()));
                let whitelisted = match (peer_ip, &whitelist) {
                    (Some(ip), Some(whitelist)) => {
                        info!("📨️ NovaPay callback from {ip}");
                        whitelist.contains(&ip)
                    },
                    (_, None) => true,
                    (None, Some(_)) => {
                        warn!("No IP address found in the callback request, denying access.");
                        false
                    },
                };
                if whitelisted {
                    srv.call(req)
                } else {
                    ok(req.error_response(ServerError::ForbiddenPeer)).boxed_local()
                }
            })
            .route("/callback", web::post().to(novapay_callback::<SqliteDatabase>));
        app.service(health).service(callback_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
