use actix_web::{web, Error, HttpResponse};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
    Collection,
};
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::config::MongoConfig;
use crate::models::{
    GuestContact, GuestOrderView, Order, OrderItem, OrderStatus, OrderWithUser, Product,
    UpdateOrderStatusRequest, User, UserContact,
};

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub limit: Option<i64>,
}

pub async fn list_orders(
    db: web::Data<MongoConfig>,
    query: web::Query<OrderListQuery>,
) -> Result<HttpResponse, Error> {
    let orders: Collection<Order> = db.database.collection("orders");
    let users: Collection<User> = db.database.collection("users");

    debug!("Listing orders (limit {:?})", query.limit);

    let options = FindOptions::builder()
        .sort(doc! { "createdAt": -1 })
        .limit(query.limit)
        .build();

    let mut cursor = orders.find(None, options).await.map_err(|e| {
        error!("Failed to fetch orders: {}", e);
        actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
    })?;

    let mut rows = Vec::new();
    while let Some(order) = cursor.try_next().await.map_err(|e| {
        error!("Error while iterating orders: {}", e);
        actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
    })? {
        // Stale references leave the user object empty rather than
        // dropping the order from the listing.
        let user = match order.user_id {
            Some(user_id) => users
                .find_one(doc! { "_id": user_id }, None)
                .await
                .map_err(|e| {
                    error!("Failed to fetch user {}: {}", user_id, e);
                    actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
                })?
                .map(|user| UserContact {
                    first_name: Some(user.first_name),
                    last_name: Some(user.last_name),
                    email: Some(user.email),
                    phone: Some(user.phone),
                    address: Some(user.address),
                })
                .unwrap_or_default(),
            None => UserContact::default(),
        };
        rows.push(OrderWithUser { order, user });
    }

    info!("Retrieved {} orders", rows.len());
    Ok(HttpResponse::Ok().json(rows))
}

pub async fn list_guest_orders(
    db: web::Data<MongoConfig>,
    query: web::Query<OrderListQuery>,
) -> Result<HttpResponse, Error> {
    let orders: Collection<Order> = db.database.collection("orders");

    debug!("Listing guest orders (limit {:?})", query.limit);

    let options = FindOptions::builder()
        .sort(doc! { "createdAt": -1 })
        .limit(query.limit)
        .build();

    let mut cursor = orders
        .find(doc! { "guest": true }, options)
        .await
        .map_err(|e| {
            error!("Failed to fetch guest orders: {}", e);
            actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
        })?;

    let mut rows = Vec::new();
    while let Some(order) = cursor.try_next().await.map_err(|e| {
        error!("Error while iterating guest orders: {}", e);
        actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
    })? {
        let user = match &order.guest_info {
            Some(info) => GuestContact {
                name: Some(info.name.clone()),
                email: Some(info.email.clone()),
                phone: Some(info.phone.clone()),
                address: Some(info.address.clone()),
            },
            None => GuestContact::default(),
        };
        rows.push(GuestOrderView { order, user });
    }

    info!("Retrieved {} guest orders", rows.len());
    Ok(HttpResponse::Ok().json(rows))
}

pub async fn update_order_status(
    db: web::Data<MongoConfig>,
    id: web::Path<String>,
    update: web::Json<UpdateOrderStatusRequest>,
) -> Result<HttpResponse, Error> {
    let orders: Collection<Order> = db.database.collection("orders");

    debug!("Updating order {} to status {:?}", id, update.status);

    let object_id = ObjectId::parse_str(id.as_str()).map_err(|_| {
        error!("Invalid order ID format: {}", id);
        actix_web::error::ErrorBadRequest("Invalid ID format")
    })?;

    let status: OrderStatus = update.status.parse().map_err(|_| {
        debug!("Rejected order status {:?} for {}", update.status, id);
        actix_web::error::ErrorBadRequest("Invalid order status")
    })?;

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();

    let updated = orders
        .find_one_and_update(
            doc! { "_id": object_id },
            doc! { "$set": { "status": status.as_str(), "updatedAt": DateTime::now() } },
            options,
        )
        .await
        .map_err(|e| {
            error!("Failed to update order {}: {}", id, e);
            actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
        })?;

    let mut order = match updated {
        Some(order) => order,
        None => {
            debug!("Order not found for status update: {}", id);
            return Ok(HttpResponse::NotFound().json(doc! { "error": "Order not found" }));
        }
    };

    if status == OrderStatus::Completed && apply_stock_once(&db, object_id, &order).await? {
        order.stock_applied = true;
    }

    info!("Order {} is now {}", id, status);
    Ok(HttpResponse::Ok().json(order))
}

/// Claims the order's one-time stock application, then issues the
/// decrements. The claim is a single filtered update, so concurrent
/// completions of the same order apply the adjustment at most once
/// between them, and a completed order cycled back through `pending`
/// never applies it again. Returns whether this call won the claim.
async fn apply_stock_once(
    db: &MongoConfig,
    order_id: ObjectId,
    order: &Order,
) -> Result<bool, Error> {
    let orders: Collection<Order> = db.database.collection("orders");

    let claim = orders
        .update_one(
            doc! { "_id": order_id, "stockApplied": { "$ne": true } },
            doc! { "$set": { "stockApplied": true } },
            None,
        )
        .await
        .map_err(|e| {
            error!("Failed to claim stock application for {}: {}", order_id, e);
            actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
        })?;

    if claim.modified_count == 0 {
        debug!("Stock already applied for order {}", order_id);
        return Ok(false);
    }

    let products: Collection<Product> = db.database.collection("products");
    for (product_id, quantity) in stock_adjustments(&order.items) {
        // A product deleted since checkout matches nothing; the
        // decrement is a silent no-op in that case.
        products
            .update_one(
                doc! { "_id": product_id },
                doc! { "$inc": { "stock": -quantity } },
                None,
            )
            .await
            .map_err(|e| {
                error!("Failed to decrement stock for {}: {}", product_id, e);
                actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
            })?;
        info!("Decremented stock of {} by {}", product_id, quantity);
    }

    Ok(true)
}

/// Sums line-item quantities per product, so an order carrying the same
/// product in several sizes issues one decrement for it.
pub(crate) fn stock_adjustments(items: &[OrderItem]) -> Vec<(ObjectId, i64)> {
    let mut totals: Vec<(ObjectId, i64)> = Vec::new();
    for item in items {
        match totals.iter_mut().find(|(id, _)| *id == item.product_id) {
            Some((_, quantity)) => *quantity += item.quantity,
            None => totals.push((item.product_id, item.quantity)),
        }
    }
    totals
}

/// Deletes are idempotent: a missing id deletes nothing and still
/// answers 200 with `null`, which is what the dashboard expects. No
/// stock is restored.
pub async fn delete_order(
    db: web::Data<MongoConfig>,
    id: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let orders: Collection<Order> = db.database.collection("orders");

    debug!("Deleting order: {}", id);

    let object_id = ObjectId::parse_str(id.as_str()).map_err(|_| {
        error!("Invalid order ID format: {}", id);
        actix_web::error::ErrorBadRequest("Invalid ID format")
    })?;

    let deleted = orders
        .find_one_and_delete(doc! { "_id": object_id }, None)
        .await
        .map_err(|e| {
            error!("Failed to delete order {}: {}", id, e);
            actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
        })?;

    if deleted.is_some() {
        info!("Order deleted: {}", id);
    }
    Ok(HttpResponse::Ok().json(deleted))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(product_id: ObjectId, quantity: i64) -> OrderItem {
        OrderItem {
            product_id,
            name: "Caftan brodé".into(),
            unit_price: 500.0,
            quantity,
            image: String::new(),
            size: None,
            volume: None,
        }
    }

    #[test]
    fn single_item_order_adjusts_by_its_quantity() {
        let p = ObjectId::new();
        assert_eq!(stock_adjustments(&[item(p, 3)]), vec![(p, 3)]);
    }

    #[test]
    fn quantities_sum_per_product_across_line_items() {
        let p1 = ObjectId::new();
        let p2 = ObjectId::new();
        // Same product twice, e.g. in two sizes.
        let items = vec![item(p1, 3), item(p2, 1), item(p1, 2)];
        assert_eq!(stock_adjustments(&items), vec![(p1, 5), (p2, 1)]);
    }

    #[test]
    fn empty_order_produces_no_adjustments() {
        assert!(stock_adjustments(&[]).is_empty());
    }
}
