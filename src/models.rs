use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Timelike, Utc};
use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// Storefront catalog sections. The set is fixed; anything else on a
/// create/update request is rejected.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    MikhwarEmarati,
    AbayaFemme,
    DjellabasFemme,
    DjellabasHomme,
    DjellabasEnfant,
    Caftans,
    Parfums,
    Folar,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::MikhwarEmarati => "mikhwar-emarati",
            Category::AbayaFemme => "abaya-femme",
            Category::DjellabasFemme => "djellabas-femme",
            Category::DjellabasHomme => "djellabas-homme",
            Category::DjellabasEnfant => "djellabas-enfant",
            Category::Caftans => "caftans",
            Category::Parfums => "parfums",
            Category::Folar => "folar",
        }
    }
}

impl FromStr for Category {
    type Err = InvalidCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mikhwar-emarati" => Ok(Category::MikhwarEmarati),
            "abaya-femme" => Ok(Category::AbayaFemme),
            "djellabas-femme" => Ok(Category::DjellabasFemme),
            "djellabas-homme" => Ok(Category::DjellabasHomme),
            "djellabas-enfant" => Ok(Category::DjellabasEnfant),
            "caftans" => Ok(Category::Caftans),
            "parfums" => Ok(Category::Parfums),
            "folar" => Ok(Category::Folar),
            _ => Err(InvalidCategory),
        }
    }
}

#[derive(Debug)]
pub struct InvalidCategory;

impl fmt::Display for InvalidCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown product category")
    }
}

impl std::error::Error for InvalidCategory {}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub care: Option<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub price: f64,
    /// Base64 data-URL, tagged with the upload's MIME type.
    #[serde(default)]
    pub image: String,
    pub description: String,
    pub category: Category,
    pub details: ProductDetails,
    /// Percentage, 0-100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<f64>,
    #[serde(default)]
    pub stock: i64,
    pub created_at: DateTime,
}

/// Partial update for a product. Fields that are absent or "falsy"
/// (empty string, zero, empty array) leave the stored value untouched;
/// there is no way to clear a field through this request.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub image: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub material: Option<String>,
    pub origin: Option<String>,
    pub care: Option<String>,
    pub sizes: Option<Vec<String>>,
    pub discount: Option<f64>,
    pub stock: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

#[derive(Debug, Serialize)]
pub struct ProductListResponse {
    pub products: Vec<Product>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = InvalidOrderStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            _ => Err(InvalidOrderStatus),
        }
    }
}

#[derive(Debug)]
pub struct InvalidOrderStatus;

impl fmt::Display for InvalidOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid order status")
    }
}

impl std::error::Error for InvalidOrderStatus {}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Cash,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ObjectId,
    pub name: String,
    pub unit_price: f64,
    pub quantity: i64,
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
}

/// Inline customer details carried by guest orders instead of a user
/// reference.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GuestInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
}

/// An order as written by the storefront checkout. Exactly one of
/// `user_id` / `guest_info` is populated, switched by `guest`.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub order_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<ObjectId>,
    pub items: Vec<OrderItem>,
    pub total: f64,
    pub shipping: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    pub status: OrderStatus,
    #[serde(default)]
    pub guest: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_info: Option<GuestInfo>,
    /// Set once the completed-order stock adjustment has been issued;
    /// guards against applying it twice for the same order.
    #[serde(default)]
    pub stock_applied: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserContact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Order list row enriched with the registered customer's contact
/// fields. The `user` object is empty when the reference no longer
/// resolves.
#[derive(Debug, Serialize)]
pub struct OrderWithUser {
    #[serde(flatten)]
    pub order: Order,
    pub user: UserContact,
}

#[derive(Debug, Serialize, Default)]
pub struct GuestContact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GuestOrderView {
    #[serde(flatten)]
    pub order: Order,
    pub user: GuestContact,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
}

#[derive(Debug, Deserialize, Default, validator::Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

/// The homepage cover video, stored as a single document under a fixed
/// key so replacement is one upsert.
pub const COVER_VIDEO_KEY: &str = "cover";

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CoverVideo {
    #[serde(rename = "_id")]
    pub id: String,
    pub data: String,
    pub content_type: String,
    pub updated_at: DateTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_orders: u64,
    pub total_users: u64,
    pub total_products: u64,
    pub total_revenue: f64,
    pub recent_orders: Vec<Order>,
}

/// Human-readable order reference, `ORD-<year><minute><second>-<ms>`.
/// Display-only; `_id` remains the real identity and collisions under
/// concurrent checkouts are tolerated.
pub fn generate_order_number() -> String {
    let now = Utc::now();
    format!(
        "ORD-{}{}{}-{}",
        now.year(),
        now.minute(),
        now.second(),
        now.timestamp_subsec_millis()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson;
    use regex::Regex;

    #[test]
    fn order_status_parses_all_valid_values() {
        assert_eq!("pending".parse::<OrderStatus>().unwrap(), OrderStatus::Pending);
        assert_eq!("processing".parse::<OrderStatus>().unwrap(), OrderStatus::Processing);
        assert_eq!("completed".parse::<OrderStatus>().unwrap(), OrderStatus::Completed);
        assert_eq!("cancelled".parse::<OrderStatus>().unwrap(), OrderStatus::Cancelled);
    }

    #[test]
    fn order_status_rejects_anything_else() {
        assert!("shipped".parse::<OrderStatus>().is_err());
        assert!("COMPLETED".parse::<OrderStatus>().is_err());
        assert!("".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn order_status_round_trips_through_bson() {
        let b = bson::to_bson(&OrderStatus::Processing).unwrap();
        assert_eq!(b, bson::Bson::String("processing".into()));
        let back: OrderStatus = bson::from_bson(b).unwrap();
        assert_eq!(back, OrderStatus::Processing);
    }

    #[test]
    fn category_uses_storefront_slugs() {
        let b = bson::to_bson(&Category::DjellabasFemme).unwrap();
        assert_eq!(b, bson::Bson::String("djellabas-femme".into()));
        assert_eq!("caftans".parse::<Category>().unwrap(), Category::Caftans);
        assert!("electronics".parse::<Category>().is_err());
        assert_eq!(Category::MikhwarEmarati.as_str(), "mikhwar-emarati");
    }

    #[test]
    fn order_number_matches_expected_shape() {
        let number = generate_order_number();
        let re = Regex::new(r"^ORD-\d{4,}-\d{1,3}$").unwrap();
        assert!(re.is_match(&number), "unexpected order number: {}", number);
        assert!(number.starts_with("ORD-2"));
    }

    #[test]
    fn guest_order_serializes_guest_info_without_user_id() {
        let order = Order {
            id: None,
            order_number: generate_order_number(),
            user_id: None,
            items: vec![],
            total: 350.0,
            shipping: 30.0,
            payment_method: Some(PaymentMethod::Cash),
            status: OrderStatus::Pending,
            guest: true,
            guest_info: Some(GuestInfo {
                name: "Aya B.".into(),
                email: "aya@example.com".into(),
                phone: "0600000000".into(),
                address: "12 Rue des Orangers".into(),
            }),
            stock_applied: false,
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        };

        let doc = bson::to_document(&order).unwrap();
        assert!(doc.get("userId").is_none());
        assert_eq!(
            doc.get_document("guestInfo").unwrap().get_str("name").unwrap(),
            "Aya B."
        );
        assert_eq!(doc.get_str("paymentMethod").unwrap(), "cash");
        assert_eq!(doc.get_bool("stockApplied").unwrap(), false);
    }

    #[test]
    fn order_defaults_apply_for_legacy_documents() {
        // Checkout-written documents predate the stockApplied marker.
        let doc = bson::doc! {
            "orderNumber": "ORD-20251230-512",
            "userId": ObjectId::new(),
            "items": [],
            "total": 100.0,
            "shipping": 0.0,
            "status": "completed",
            "guest": false,
            "createdAt": DateTime::now(),
            "updatedAt": DateTime::now(),
        };
        let order: Order = bson::from_document(doc).unwrap();
        assert!(!order.stock_applied);
        assert!(order.payment_method.is_none());
        assert!(order.guest_info.is_none());
    }
}
