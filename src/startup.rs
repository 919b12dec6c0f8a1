use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{SessionIssuer, TokenCodec};
use crate::configuration::Settings;
use crate::error::AppError;
use crate::logger::LoggerMiddleware;
use crate::middleware::{JwtMiddleware, RoleGuard};
use crate::rate_limit::{counter_from_settings, RateLimiter};
use crate::routes::{auth, health_check, users};
use crate::store::Store;

/// Build and start the HTTP server on `listener`
///
/// Fails with `InvalidInput` when the JWT or rate-limit configuration is unusable.
pub fn run(
    listener: TcpListener,
    store: Arc<dyn Store>,
    settings: Settings,
) -> Result<Server, std::io::Error> {
    let codec = TokenCodec::new(&settings.jwt).map_err(invalid_config)?;
    let counter = counter_from_settings(&settings.rate_limit).map_err(invalid_config)?;

    let sessions = web::Data::new(SessionIssuer::new(codec.clone(), store.clone()));
    let login_limiter = web::Data::new(RateLimiter::login(counter, &settings.rate_limit));
    let store_data: web::Data<dyn Store> = web::Data::from(store.clone());

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)

            // Shared state
            .app_data(store_data.clone())
            .app_data(sessions.clone())
            .app_data(login_limiter.clone())
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                AppError::rejected(format!("Invalid request body: {}", err)).into()
            }))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                AppError::rejected(format!("Invalid query: {}", err)).into()
            }))
            .app_data(web::PathConfig::default().error_handler(|err, _req| {
                AppError::rejected(format!("Invalid path: {}", err)).into()
            }))

            .route("/health_check", web::get().to(health_check))

            // Public auth routes, plus /auth/me behind the access-token guard
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(auth::register))
                    .route("/verify-otp", web::post().to(auth::verify_otp))
                    .route("/login", web::post().to(auth::login))
                    .route("/refresh", web::post().to(auth::refresh))
                    .route("/logout", web::post().to(auth::logout))
                    .service(
                        web::resource("/me")
                            .wrap(JwtMiddleware::new(codec.clone(), store.clone()))
                            .route(web::get().to(auth::get_current_user)),
                    ),
            )

            // Signed-in users; admin-only resources add the role filter
            .service(
                web::scope("/users")
                    .wrap(JwtMiddleware::new(codec.clone(), store.clone()))
                    .route("/me", web::get().to(users::me))
                    .route("/change-password", web::put().to(users::change_password))
                    .service(
                        web::resource("")
                            .wrap(RoleGuard::admin_only())
                            .route(web::get().to(users::list))
                            .route(web::post().to(users::create)),
                    )
                    .service(
                        web::resource("/{id}")
                            .wrap(RoleGuard::admin_only())
                            .route(web::get().to(users::get)),
                    )
                    .service(
                        web::resource("/{id}/role")
                            .wrap(RoleGuard::admin_only())
                            .route(web::patch().to(users::update_role)),
                    )
                    .service(
                        web::resource("/{id}/disable")
                            .wrap(RoleGuard::admin_only())
                            .route(web::patch().to(users::disable)),
                    )
                    .service(
                        web::resource("/{id}/enable")
                            .wrap(RoleGuard::admin_only())
                            .route(web::patch().to(users::enable)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}

fn invalid_config(err: AppError) -> std::io::Error {
    tracing::error!(error = %err, "Invalid configuration");
    std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string())
}
