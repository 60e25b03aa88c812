use actix_web::{web, Error, HttpResponse};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson},
    options::FindOptions,
    Collection,
};
use tracing::{debug, error};

use crate::config::MongoConfig;
use crate::models::{Order, Product, StatsResponse, User};

pub async fn get_stats(db: web::Data<MongoConfig>) -> Result<HttpResponse, Error> {
    let orders: Collection<Order> = db.database.collection("orders");
    let users: Collection<User> = db.database.collection("users");
    let products: Collection<Product> = db.database.collection("products");

    debug!("Computing dashboard stats");

    let (total_orders, total_users, total_products) = futures::try_join!(
        orders.count_documents(None, None),
        users.count_documents(None, None),
        products.count_documents(None, None),
    )
    .map_err(|e| {
        error!("Failed to count collections: {}", e);
        actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
    })?;

    let pipeline = vec![doc! {
        "$group": { "_id": null, "total": { "$sum": "$total" } }
    }];
    let mut cursor = orders.aggregate(pipeline, None).await.map_err(|e| {
        error!("Failed to aggregate revenue: {}", e);
        actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
    })?;
    let total_revenue = cursor
        .try_next()
        .await
        .map_err(|e| {
            error!("Failed to read revenue aggregation: {}", e);
            actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
        })?
        .and_then(|group| group.get("total").and_then(Bson::as_f64))
        .unwrap_or(0.0);

    let options = FindOptions::builder()
        .sort(doc! { "createdAt": -1 })
        .limit(5)
        .build();
    let mut cursor = orders.find(None, options).await.map_err(|e| {
        error!("Failed to fetch recent orders: {}", e);
        actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
    })?;
    let mut recent_orders = Vec::new();
    while let Some(order) = cursor.try_next().await.map_err(|e| {
        error!("Error while iterating recent orders: {}", e);
        actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
    })? {
        recent_orders.push(order);
    }

    Ok(HttpResponse::Ok().json(StatsResponse {
        total_orders,
        total_users,
        total_products,
        total_revenue,
        recent_orders,
    }))
}
