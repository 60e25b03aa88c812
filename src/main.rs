mod auth;
mod config;
mod handlers;
mod models;

use actix_cors::Cors;
use actix_web::{http::header, web, App, HttpServer};
use auth::AuthMiddleware;
use config::MongoConfig;
use handlers::{orders, products, settings, stats, users};
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{self, EnvFilter};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("actix_web=info".parse().unwrap())
                .add_directive("boutique_admin_api=debug".parse().unwrap()),
        )
        .init();

    info!("Starting boutique admin API server");

    let mongo_config = MongoConfig::init()
        .await
        .expect("Failed to initialize MongoDB");

    info!("MongoDB connection established");

    auth::ensure_bootstrap_admin(&mongo_config)
        .await
        .expect("Failed to seed the bootstrap admin");

    let db_data = web::Data::new(mongo_config);
    let dashboard_origin = config::dashboard_origin();
    let addr = config::server_addr();
    info!("Listening on {}", addr);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&dashboard_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
            .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(TracingLogger::default())
            .app_data(db_data.clone())
            .service(
                web::scope("/api/auth")
                    .route("/login", web::post().to(auth::login))
                    .service(
                        web::scope("/admins")
                            .wrap(AuthMiddleware)
                            .route("", web::post().to(auth::create_admin)),
                    ),
            )
            .service(
                web::scope("/api/products")
                    .wrap(AuthMiddleware)
                    .route("", web::post().to(products::create_product))
                    .route("", web::get().to(products::list_products))
                    .route("/{id}", web::get().to(products::get_product))
                    .route("/{id}", web::put().to(products::update_product))
                    .route("/{id}", web::delete().to(products::delete_product)),
            )
            .service(
                web::scope("/api/orders")
                    .wrap(AuthMiddleware)
                    .route("", web::get().to(orders::list_orders))
                    .route("/{id}", web::put().to(orders::update_order_status))
                    .route("/{id}", web::delete().to(orders::delete_order)),
            )
            .service(
                web::scope("/api/guest-order")
                    .wrap(AuthMiddleware)
                    .route("", web::get().to(orders::list_guest_orders))
                    .route("/{id}", web::delete().to(orders::delete_order)),
            )
            .service(
                web::scope("/api/settings")
                    .wrap(AuthMiddleware)
                    .route("", web::get().to(settings::get_cover_video))
                    .route("", web::post().to(settings::replace_cover_video)),
            )
            .service(
                web::scope("/api/stats")
                    .wrap(AuthMiddleware)
                    .route("", web::get().to(stats::get_stats)),
            )
            .service(
                web::scope("/api/users")
                    .wrap(AuthMiddleware)
                    .route("", web::get().to(users::list_users))
                    .route("/{id}", web::get().to(users::get_user))
                    .route("/{id}", web::put().to(users::update_user))
                    .route("/{id}", web::delete().to(users::delete_user)),
            )
    })
    .bind(addr)?
    .run()
    .await
}
