use actix_web::http::header;
use actix_web::web::{self, Data};
use actix_web::{App, HttpRequest, HttpResponse, HttpServer};
use tracing::{error, info, warn};

use crate::accept::{AcceptValues, MediaType};
use crate::registry::Registry;
use crate::Error;

/// Path pattern shared by the read and write endpoints: a store name that
/// is valid as part of a filename, then a key which may contain slashes.
const KV_PATH: &str = r#"/kv/{store:[^/<>:"\\|?*]+}/{key:.+}"#;

const LISTING_TEMPLATE: &str = include_str!("../static/all-keys.html");
const HELP_TEXT: &str = include_str!("../static/help.html");

/// Register all routes. Split out from [`ApiServer`] so tests can mount the
/// same surface on an in-memory service.
pub fn config(cfg: &mut web::ServiceConfig) {
    // Values are bounded by the record format, not by the default payload
    // limit.
    cfg.app_data(web::PayloadConfig::new(u32::MAX as usize))
        .service(
            web::resource(KV_PATH)
                .route(web::get().to(get_value))
                .route(web::post().to(put_value)),
        )
        .service(web::resource("/merge/{store:.+}").route(web::get().to(merge_store)))
        .service(web::resource("/all-keys/{store:.+}").route(web::get().to(all_keys)))
        .service(web::resource("/help").route(web::get().to(help)));
}

/// HTTP front end over a [`Registry`] of stores.
pub struct ApiServer {
    registry: Data<Registry>,
    addr: (String, u16),
}

impl ApiServer {
    pub fn new(registry: Registry, host: impl Into<String>, port: u16) -> Self {
        Self {
            registry: Data::new(registry),
            addr: (host.into(), port),
        }
    }

    /// Run until SIGINT/SIGTERM. The server's built-in signal handling is
    /// disabled in favour of an explicit handle so shutdown is
    /// deterministic.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!("Listening on [{}]:{}", self.addr.0, self.addr.1);
        info!(
            "POST/GET to http://{}:{}/kv/<store>/<key>",
            self.addr.0, self.addr.1
        );
        info!("How-to: http://{}:{}/help", self.addr.0, self.addr.1);

        let registry = self.registry.clone();
        let server = HttpServer::new(move || App::new().app_data(registry.clone()).configure(config))
            .bind((self.addr.0.as_str(), self.addr.1))?
            .disable_signals()
            .run();

        let handle = server.handle();
        actix_web::rt::spawn(async move {
            shutdown_signal().await;
            info!("Closing via SIGINT/SIGTERM");
            handle.stop(true).await;
        });

        server.await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn get_value(
    registry: Data<Registry>,
    path: web::Path<(String, String)>,
    req: HttpRequest,
) -> HttpResponse {
    let (store_name, key) = path.into_inner();
    let Some(store) = registry.get(&store_name) else {
        error!(
            "GET {}: requested store \"{}\" doesn't exist",
            req.path(),
            store_name
        );
        return not_found();
    };

    match web::block(move || store.get(&key)).await {
        Ok(Ok((value, mime))) => HttpResponse::Ok().content_type(mime).body(value),
        Ok(Err(Error::NotFound)) => {
            info!("GET {}: not found", req.path());
            not_found()
        }
        Ok(Err(e)) => internal_error(req.path(), &e),
        Err(e) => blocking_failure(req.path(), &e),
    }
}

async fn put_value(
    registry: Data<Registry>,
    path: web::Path<(String, String)>,
    body: web::Bytes,
    req: HttpRequest,
) -> HttpResponse {
    let (store_name, key) = path.into_inner();
    let mime = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();

    let store = match registry.get_or_create(&store_name) {
        Ok(store) => store,
        Err(e) => return internal_error(req.path(), &e),
    };

    info!("POST {} ({}): {} bytes", req.path(), mime, body.len());
    match web::block(move || store.put(&key, &body, &mime)).await {
        Ok(Ok(())) => HttpResponse::Ok().content_type("text/plain").body("OK"),
        Ok(Err(e)) => internal_error(req.path(), &e),
        Err(e) => blocking_failure(req.path(), &e),
    }
}

async fn merge_store(
    registry: Data<Registry>,
    path: web::Path<String>,
    req: HttpRequest,
) -> HttpResponse {
    let store_name = path.into_inner();
    let Some(store) = registry.get(&store_name) else {
        error!(
            "GET {}: requested store \"{}\" doesn't exist",
            req.path(),
            store_name
        );
        return not_found();
    };

    let outcome = web::block(move || -> crate::Result<(u64, u64)> {
        let before = store.size()?;
        store.merge()?;
        let after = store.size()?;
        Ok((before, after))
    })
    .await;

    match outcome {
        Ok(Ok((before, after))) => HttpResponse::Ok()
            .content_type("text/plain")
            .body(format!("before: {before} bytes, after: {after} bytes")),
        Ok(Err(e)) => internal_error(req.path(), &e),
        Err(e) => blocking_failure(req.path(), &e),
    }
}

async fn all_keys(
    registry: Data<Registry>,
    path: web::Path<String>,
    req: HttpRequest,
) -> HttpResponse {
    let store_name = path.into_inner();
    let Some(store) = registry.get(&store_name) else {
        error!(
            "GET {}: requested store \"{}\" doesn't exist",
            req.path(),
            store_name
        );
        return not_found();
    };

    let offered = [
        MediaType::new("application", "json"),
        MediaType::new("text", "html"),
    ];
    let media = match req
        .headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
    {
        None | Some("") => {
            warn!("/all-keys requested without 'Accept' header, assuming application/json");
            offered[0].clone()
        }
        Some(accept) => {
            let negotiated = AcceptValues::parse(accept).highest_in(&offered);
            if negotiated.is_any() {
                warn!(
                    "/all-keys 'Accept' header offers nothing this server can provide, \
                     sending application/json instead"
                );
                offered[0].clone()
            } else {
                negotiated
            }
        }
    };

    let mut keys = store.keys();
    keys.sort();

    if media == offered[1] {
        let rows: String = keys
            .iter()
            .map(|key| format!("<tr><td>{key}</td></tr>"))
            .collect();
        HttpResponse::Ok()
            .content_type("text/html")
            .body(LISTING_TEMPLATE.replace("{rows}", &rows))
    } else {
        match serde_json::to_string(&keys) {
            Ok(json) => HttpResponse::Ok()
                .content_type("application/json")
                .body(json),
            Err(e) => {
                error!("GET {}: {e}", req.path());
                HttpResponse::InternalServerError()
                    .content_type("text/plain")
                    .body("Internal server error")
            }
        }
    }
}

async fn help() -> HttpResponse {
    HttpResponse::Ok().content_type("text/html").body(HELP_TEXT)
}

fn not_found() -> HttpResponse {
    HttpResponse::NotFound()
        .content_type("text/plain")
        .body("Not found")
}

fn internal_error(path: &str, err: &Error) -> HttpResponse {
    error!("{path}: {err}");
    HttpResponse::InternalServerError()
        .content_type("text/plain")
        .body(format!("error: {err}"))
}

fn blocking_failure(path: &str, err: &actix_web::error::BlockingError) -> HttpResponse {
    error!("{path}: blocking task failed: {err}");
    HttpResponse::InternalServerError()
        .content_type("text/plain")
        .body("Internal server error")
}
