use actix_web::{web, HttpMessage, HttpResponse, Error, error::ErrorUnauthorized, dev::{Service, Transform, ServiceRequest, ServiceResponse}};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, decode, Header, EncodingKey, DecodingKey, Validation, errors::Error as JwtError};
use mongodb::{Collection, bson::{doc, oid::ObjectId}};
use serde::{Deserialize, Serialize};
use validator::Validate;
use tracing::{debug, error, info, warn};
use std::{
    env,
    future::{Ready, Future},
    pin::Pin,
    task::{Context, Poll},
};
use futures_util::future::{ok, Ready as FutureReady};

use crate::config::MongoConfig;

/// Dashboard sessions last three days, matching the storefront admin's
/// existing cookie lifetime.
const SESSION_TTL_DAYS: i64 = 3;

fn jwt_secret() -> Vec<u8> {
    env::var("AUTH_SECRET")
        .unwrap_or_else(|_| "insecure-dev-secret".to_string())
        .into_bytes()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAdminRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 2))]
    pub name: String,
    #[validate(length(min = 8))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub admin: AdminResponse,
}

#[derive(Debug, Serialize)]
pub struct AdminResponse {
    pub id: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,     // Admin ID
    pub email: String,
    pub exp: i64,        // Expiration time
    pub iat: i64,        // Issued at
}

pub async fn login(
    db: web::Data<MongoConfig>,
    credentials: web::Json<LoginRequest>,
) -> Result<HttpResponse, Error> {
    let collection: Collection<Admin> = db.database.collection("admins");

    let admin = match collection
        .find_one(doc! { "email": &credentials.email }, None)
        .await
        .map_err(|e| {
            error!("Database error: {}", e);
            actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
        })? {
        Some(admin) => admin,
        None => {
            debug!("Login attempt for unknown email");
            return Ok(HttpResponse::Unauthorized().json(doc! {
                "message": "Invalid credentials"
            }));
        }
    };

    if !verify(&credentials.password, &admin.password_hash).map_err(|e| {
        error!("Password verification error: {}", e);
        actix_web::error::ErrorInternalServerError("Password verification failed")
    })? {
        return Ok(HttpResponse::Unauthorized().json(doc! {
            "message": "Invalid credentials"
        }));
    }

    let admin_id = admin.id.as_ref().ok_or_else(|| {
        error!("Admin document without an id: {}", admin.email);
        actix_web::error::ErrorInternalServerError("Corrupt admin record")
    })?;
    let token = generate_token(admin_id, &admin.email)?;

    info!("Admin {} logged in", admin_id);
    Ok(HttpResponse::Ok().json(AuthResponse {
        token,
        admin: AdminResponse {
            id: admin_id.to_string(),
            email: admin.email,
            name: admin.name,
        },
    }))
}

pub async fn create_admin(
    db: web::Data<MongoConfig>,
    admin_data: web::Json<CreateAdminRequest>,
) -> Result<HttpResponse, Error> {
    if let Err(errors) = admin_data.validate() {
        return Ok(HttpResponse::BadRequest().json(errors));
    }

    let collection: Collection<Admin> = db.database.collection("admins");

    if let Ok(Some(_)) = collection
        .find_one(doc! { "email": &admin_data.email }, None)
        .await
    {
        return Ok(HttpResponse::BadRequest().json(doc! {
            "message": "Email already registered"
        }));
    }

    let password_hash = hash(admin_data.password.as_bytes(), DEFAULT_COST).map_err(|e| {
        error!("Failed to hash password: {}", e);
        actix_web::error::ErrorInternalServerError("Password hashing failed")
    })?;

    let admin = Admin {
        id: None,
        email: admin_data.email.clone(),
        name: admin_data.name.clone(),
        password_hash,
    };

    let result = collection.insert_one(&admin, None).await.map_err(|e| {
        error!("Failed to insert admin: {}", e);
        actix_web::error::ErrorInternalServerError("Failed to create admin")
    })?;

    info!("Created new admin with ID: {}", result.inserted_id);
    Ok(HttpResponse::Created().json(doc! {
        "message": "Admin account created",
        "id": result.inserted_id
    }))
}

/// Seeds the credential store on first start. Does nothing once any
/// admin exists, or when the bootstrap env vars are unset.
pub async fn ensure_bootstrap_admin(db: &MongoConfig) -> Result<(), Box<dyn std::error::Error>> {
    let collection: Collection<Admin> = db.database.collection("admins");

    if collection.count_documents(None, None).await? > 0 {
        return Ok(());
    }

    let (email, password) = match (env::var("ADMIN_EMAIL"), env::var("ADMIN_PASSWORD")) {
        (Ok(email), Ok(password)) => (email, password),
        _ => {
            warn!("No admins exist and ADMIN_EMAIL/ADMIN_PASSWORD are unset; login will be impossible");
            return Ok(());
        }
    };

    let password_hash = hash(password.as_bytes(), DEFAULT_COST)?;
    let admin = Admin {
        id: None,
        email: email.clone(),
        name: env::var("ADMIN_NAME").unwrap_or_else(|_| "Administrator".to_string()),
        password_hash,
    };
    collection.insert_one(&admin, None).await?;

    info!("Bootstrapped admin account for {}", email);
    Ok(())
}

pub fn generate_token(admin_id: &ObjectId, email: &str) -> Result<String, Error> {
    let now = Utc::now();

    let claims = Claims {
        sub: admin_id.to_string(),
        email: email.to_string(),
        exp: (now + Duration::days(SESSION_TTL_DAYS)).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(&jwt_secret()),
    ).map_err(|e| {
        error!("Token generation error: {}", e);
        actix_web::error::ErrorInternalServerError("Token generation failed")
    })
}

pub fn verify_token(token: &str) -> Result<Claims, JwtError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(&jwt_secret()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

// Auth middleware implementation
pub struct AuthMiddleware;

impl Default for AuthMiddleware {
    fn default() -> Self {
        AuthMiddleware
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareMiddleware<S>;
    type Future = FutureReady<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareMiddleware { service })
    }
}

pub struct AuthMiddlewareMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let auth_header = req.headers().get("Authorization");

        let auth_header = match auth_header {
            Some(header) => header,
            None => {
                return Box::pin(async move {
                    Err(ErrorUnauthorized("No authorization header"))
                });
            }
        };

        let auth_str = match auth_header.to_str() {
            Ok(str) => str,
            Err(_) => {
                return Box::pin(async move {
                    Err(ErrorUnauthorized("Invalid authorization header"))
                });
            }
        };

        if !auth_str.starts_with("Bearer ") {
            return Box::pin(async move {
                Err(ErrorUnauthorized("Invalid authorization header format"))
            });
        }

        let token = &auth_str[7..];

        match verify_token(token) {
            Ok(claims) => {
                req.extensions_mut().insert(claims);
                let fut = self.service.call(req);
                Box::pin(async move {
                    let res = fut.await?;
                    Ok(res)
                })
            }
            Err(_) => Box::pin(async move {
                Err(ErrorUnauthorized("Invalid token"))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_with_three_day_expiry() {
        let id = ObjectId::new();
        let token = generate_token(&id, "admin@example.com").unwrap();

        let claims = verify_token(&token).unwrap();
        assert_eq!(claims.sub, id.to_string());
        assert_eq!(claims.email, "admin@example.com");
        assert_eq!(claims.exp - claims.iat, SESSION_TTL_DAYS * 24 * 60 * 60);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let token = generate_token(&ObjectId::new(), "admin@example.com").unwrap();
        let mut tampered = token.clone();
        tampered.pop();
        assert!(verify_token(&tampered).is_err());
        assert!(verify_token("not-a-token").is_err());
    }

    #[test]
    fn password_hash_verifies_only_the_original() {
        let hashed = hash(b"CorrectHorse22!", DEFAULT_COST).unwrap();
        assert!(verify("CorrectHorse22!", &hashed).unwrap());
        assert!(!verify("correcthorse22!", &hashed).unwrap());
    }
}
