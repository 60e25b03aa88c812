use dotenv::dotenv;
use mongodb::{Client, Database};
use std::env;

pub struct MongoConfig {
    pub database: Database,
}

impl MongoConfig {
    pub async fn init() -> Result<Self, mongodb::error::Error> {
        dotenv().ok();

        let mongo_uri = env::var("MONGODB_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let database_name =
            env::var("DATABASE_NAME").unwrap_or_else(|_| "boutique_admin".to_string());

        let client = Client::with_uri_str(&mongo_uri).await?;
        let database = client.database(&database_name);

        Ok(MongoConfig { database })
    }
}

/// Bind address for the HTTP server; `HOST`/`PORT` env overrides.
pub fn server_addr() -> String {
    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    format!("{}:{}", host, port)
}

/// Dashboard frontend origin allowed through CORS.
pub fn dashboard_origin() -> String {
    env::var("DASHBOARD_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string())
}
