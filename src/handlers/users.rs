use actix_web::{web, Error, HttpResponse};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    options::{FindOneAndUpdateOptions, ReturnDocument},
    Collection,
};
use tracing::{debug, error, info};
use validator::Validate;

use crate::config::MongoConfig;
use crate::models::{UpdateUserRequest, User};

pub async fn list_users(db: web::Data<MongoConfig>) -> Result<HttpResponse, Error> {
    let collection: Collection<User> = db.database.collection("users");

    debug!("Fetching users");

    let mut cursor = collection.find(None, None).await.map_err(|e| {
        error!("Failed to fetch users: {}", e);
        actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
    })?;

    let mut users = Vec::new();
    while let Some(user) = cursor.try_next().await.map_err(|e| {
        error!("Error while iterating users: {}", e);
        actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
    })? {
        users.push(user);
    }

    info!("Retrieved {} users", users.len());
    Ok(HttpResponse::Ok().json(users))
}

pub async fn get_user(
    db: web::Data<MongoConfig>,
    id: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let collection: Collection<User> = db.database.collection("users");

    debug!("Fetching user with ID: {}", id);

    let object_id = ObjectId::parse_str(id.as_str()).map_err(|_| {
        error!("Invalid user ID format: {}", id);
        actix_web::error::ErrorBadRequest("Invalid ID format")
    })?;

    let user = collection
        .find_one(doc! { "_id": object_id }, None)
        .await
        .map_err(|e| {
            error!("Failed to fetch user {}: {}", id, e);
            actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
        })?;

    match user {
        Some(user) => Ok(HttpResponse::Ok().json(user)),
        None => {
            debug!("User not found: {}", id);
            Ok(HttpResponse::NotFound().finish())
        }
    }
}

pub async fn update_user(
    db: web::Data<MongoConfig>,
    id: web::Path<String>,
    update: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, Error> {
    if let Err(errors) = update.validate() {
        return Ok(HttpResponse::BadRequest().json(errors));
    }

    let collection: Collection<User> = db.database.collection("users");

    debug!("Updating user {}: {:?}", id, update);

    let object_id = ObjectId::parse_str(id.as_str()).map_err(|_| {
        error!("Invalid user ID format: {}", id);
        actix_web::error::ErrorBadRequest("Invalid ID format")
    })?;

    // Unlike products, user edits set exactly what the request carries;
    // an empty string overwrites.
    let set = build_user_update(&update);

    if set.is_empty() {
        let user = collection
            .find_one(doc! { "_id": object_id }, None)
            .await
            .map_err(|e| {
                error!("Failed to fetch user {}: {}", id, e);
                actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
            })?;
        return match user {
            Some(user) => Ok(HttpResponse::Ok().json(user)),
            None => Ok(HttpResponse::NotFound().finish()),
        };
    }

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();

    let updated = collection
        .find_one_and_update(doc! { "_id": object_id }, doc! { "$set": set }, options)
        .await
        .map_err(|e| {
            error!("Failed to update user {}: {}", id, e);
            actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
        })?;

    match updated {
        Some(user) => {
            info!("User updated: {}", id);
            Ok(HttpResponse::Ok().json(user))
        }
        None => {
            debug!("User not found for update: {}", id);
            Ok(HttpResponse::NotFound().finish())
        }
    }
}

pub(crate) fn build_user_update(update: &UpdateUserRequest) -> Document {
    let mut set = Document::new();
    if let Some(first_name) = &update.first_name {
        set.insert("firstName", first_name);
    }
    if let Some(last_name) = &update.last_name {
        set.insert("lastName", last_name);
    }
    if let Some(email) = &update.email {
        set.insert("email", email);
    }
    if let Some(phone) = &update.phone {
        set.insert("phone", phone);
    }
    if let Some(address) = &update.address {
        set.insert("address", address);
    }
    if let Some(city) = &update.city {
        set.insert("city", city);
    }
    if let Some(country) = &update.country {
        set.insert("country", country);
    }
    set
}

pub async fn delete_user(
    db: web::Data<MongoConfig>,
    id: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let collection: Collection<User> = db.database.collection("users");

    debug!("Deleting user: {}", id);

    let object_id = ObjectId::parse_str(id.as_str()).map_err(|_| {
        error!("Invalid user ID format: {}", id);
        actix_web::error::ErrorBadRequest("Invalid ID format")
    })?;

    let result = collection
        .delete_one(doc! { "_id": object_id }, None)
        .await
        .map_err(|e| {
            error!("Failed to delete user {}: {}", id, e);
            actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
        })?;

    if result.deleted_count == 0 {
        debug!("User not found for deletion: {}", id);
        Ok(HttpResponse::NotFound().finish())
    } else {
        info!("User deleted: {}", id);
        Ok(HttpResponse::Ok().finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_doc_sets_exactly_the_provided_fields() {
        let update = UpdateUserRequest {
            first_name: Some("Rachid".into()),
            city: Some(String::new()),
            ..Default::default()
        };
        let set = build_user_update(&update);
        assert_eq!(set.get_str("firstName").unwrap(), "Rachid");
        assert_eq!(set.get_str("city").unwrap(), "");
        assert!(set.get("email").is_none());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn email_must_be_well_formed() {
        let update = UpdateUserRequest {
            email: Some("not-an-email".into()),
            ..Default::default()
        };
        assert!(update.validate().is_err());

        let update = UpdateUserRequest {
            email: Some("amina@example.com".into()),
            ..Default::default()
        };
        assert!(update.validate().is_ok());
    }
}
