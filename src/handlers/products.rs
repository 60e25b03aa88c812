use actix_multipart::Multipart;
use actix_web::{web, Error, HttpResponse};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime, Document},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
    Collection,
};
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::config::MongoConfig;
use crate::models::{
    Category, Pagination, Product, ProductDetails, ProductListResponse, UpdateProductRequest,
};

#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

pub async fn list_products(
    db: web::Data<MongoConfig>,
    query: web::Query<ListProductsQuery>,
) -> Result<HttpResponse, Error> {
    let collection: Collection<Product> = db.database.collection("products");

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).max(1);

    debug!("Listing products page {} (limit {})", page, limit);

    let total = collection.count_documents(None, None).await.map_err(|e| {
        error!("Failed to count products: {}", e);
        actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
    })?;

    let options = FindOptions::builder()
        .sort(doc! { "createdAt": -1 })
        .skip((page - 1) * limit)
        .limit(limit as i64)
        .build();

    let mut cursor = collection.find(None, options).await.map_err(|e| {
        error!("Failed to fetch products: {}", e);
        actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
    })?;

    let mut products = Vec::new();
    while let Some(product) = cursor.try_next().await.map_err(|e| {
        error!("Error while iterating products: {}", e);
        actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
    })? {
        products.push(product);
    }

    info!("Retrieved {} of {} products", products.len(), total);
    Ok(HttpResponse::Ok().json(ProductListResponse {
        products,
        pagination: Pagination {
            total,
            page,
            limit,
            total_pages: (total + limit - 1) / limit,
        },
    }))
}

pub async fn create_product(
    db: web::Data<MongoConfig>,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let collection: Collection<Product> = db.database.collection("products");

    let mut form = ProductForm::default();

    while let Some(mut field) = payload.try_next().await? {
        let name = field.name().to_string();
        let content_type = field.content_type().map(|mime| mime.to_string());

        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            data.extend_from_slice(&chunk);
        }

        if name == "image" {
            form.image = Some((
                content_type.unwrap_or_else(|| "image/webp".to_string()),
                data,
            ));
            continue;
        }

        let value = String::from_utf8(data).map_err(|_| {
            actix_web::error::ErrorBadRequest(format!("Field {} is not valid UTF-8", name))
        })?;
        form.set_text(&name, value);
    }

    let product = match form.into_product() {
        Ok(product) => product,
        Err(reason) => {
            debug!("Rejected product form: {}", reason);
            return Ok(HttpResponse::BadRequest().json(doc! { "error": reason }));
        }
    };

    let result = collection.insert_one(&product, None).await.map_err(|e| {
        error!("Failed to create product: {}", e);
        actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
    })?;

    info!("Product created with ID: {}", result.inserted_id);
    let mut created = product;
    created.id = result.inserted_id.as_object_id();
    Ok(HttpResponse::Created().json(created))
}

/// Product-creation form as it arrives over multipart: every value is
/// text until `into_product` parses and validates the lot.
#[derive(Debug, Default)]
struct ProductForm {
    name: Option<String>,
    price: Option<String>,
    description: Option<String>,
    category: Option<String>,
    material: Option<String>,
    origin: Option<String>,
    care: Option<String>,
    sizes: Option<String>,
    discount: Option<String>,
    stock: Option<String>,
    image: Option<(String, Vec<u8>)>,
}

impl ProductForm {
    fn set_text(&mut self, field: &str, value: String) {
        match field {
            "name" => self.name = Some(value),
            "price" => self.price = Some(value),
            "description" => self.description = Some(value),
            "category" => self.category = Some(value),
            "material" => self.material = Some(value),
            "origin" => self.origin = Some(value),
            "care" => self.care = Some(value),
            "sizes" => self.sizes = Some(value),
            "discount" => self.discount = Some(value),
            "stock" => self.stock = Some(value),
            _ => debug!("Ignoring unknown form field: {}", field),
        }
    }

    fn into_product(self) -> Result<Product, String> {
        let name = require_text(self.name, "name")?;
        let description = require_text(self.description, "description")?;
        let origin = require_text(self.origin, "origin")?;

        let price: f64 = require_text(self.price, "price")?
            .parse()
            .map_err(|_| "price must be a number".to_string())?;
        if price < 0.0 {
            return Err("price must not be negative".to_string());
        }

        let category: Category = require_text(self.category, "category")?
            .parse()
            .map_err(|_| "unknown product category".to_string())?;

        // The dashboard form serializes the size list as JSON.
        let sizes = match self.sizes {
            Some(raw) => serde_json::from_str::<Vec<String>>(&raw)
                .map_err(|_| "sizes must be a JSON array of strings".to_string())?,
            None => Vec::new(),
        };

        let discount = match self.discount {
            Some(raw) if !raw.is_empty() => {
                let value: f64 = raw
                    .parse()
                    .map_err(|_| "discount must be a number".to_string())?;
                if !(0.0..=100.0).contains(&value) {
                    return Err("discount must be between 0 and 100".to_string());
                }
                Some(value)
            }
            _ => None,
        };

        let stock: i64 = match self.stock {
            Some(raw) if !raw.is_empty() => raw
                .parse()
                .map_err(|_| "stock must be an integer".to_string())?,
            _ => 0,
        };

        let image = match self.image {
            Some((content_type, bytes)) => {
                format!("data:{};base64,{}", content_type, STANDARD.encode(bytes))
            }
            None => String::new(),
        };

        Ok(Product {
            id: None,
            name,
            price,
            image,
            description,
            category,
            details: ProductDetails {
                material: self.material.filter(|m| !m.is_empty()),
                origin,
                care: self.care.filter(|c| !c.is_empty()),
                sizes,
            },
            discount,
            stock,
            created_at: DateTime::now(),
        })
    }
}

fn require_text(value: Option<String>, field: &str) -> Result<String, String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(format!("Missing required field: {}", field)),
    }
}

pub async fn get_product(
    db: web::Data<MongoConfig>,
    id: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let collection: Collection<Product> = db.database.collection("products");

    debug!("Fetching product with ID: {}", id);

    let object_id = ObjectId::parse_str(id.as_str()).map_err(|_| {
        error!("Invalid product ID format: {}", id);
        actix_web::error::ErrorBadRequest("Invalid ID format")
    })?;

    let product = collection
        .find_one(doc! { "_id": object_id }, None)
        .await
        .map_err(|e| {
            error!("Failed to fetch product {}: {}", id, e);
            actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
        })?;

    match product {
        Some(product) => Ok(HttpResponse::Ok().json(product)),
        None => {
            debug!("Product not found: {}", id);
            Ok(HttpResponse::NotFound().finish())
        }
    }
}

pub async fn update_product(
    db: web::Data<MongoConfig>,
    id: web::Path<String>,
    update: web::Json<UpdateProductRequest>,
) -> Result<HttpResponse, Error> {
    let collection: Collection<Product> = db.database.collection("products");

    debug!("Updating product {}: {:?}", id, update);

    let object_id = ObjectId::parse_str(id.as_str()).map_err(|_| {
        error!("Invalid product ID format: {}", id);
        actix_web::error::ErrorBadRequest("Invalid ID format")
    })?;

    let set = match build_product_update(&update) {
        Ok(set) => set,
        Err(reason) => {
            debug!("Rejected product update for {}: {}", id, reason);
            return Ok(HttpResponse::BadRequest().json(doc! { "error": reason }));
        }
    };

    if set.is_empty() {
        // Everything was absent or empty; nothing to write, but the
        // dashboard still expects the current document back.
        let product = collection
            .find_one(doc! { "_id": object_id }, None)
            .await
            .map_err(|e| {
                error!("Failed to fetch product {}: {}", id, e);
                actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
            })?;
        return match product {
            Some(product) => Ok(HttpResponse::Ok().json(product)),
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
            error!("Failed to update product {}: {}", id, e);
            actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
        })?;

    match updated {
        Some(product) => {
            info!("Product updated: {}", id);
            Ok(HttpResponse::Ok().json(product))
        }
        None => {
            debug!("Product not found for update: {}", id);
            Ok(HttpResponse::NotFound().finish())
        }
    }
}

/// Builds the `$set` document for a partial update. Absent and empty
/// values both mean "leave as is": an empty string, a zero, or an empty
/// array never clears a stored field.
pub(crate) fn build_product_update(update: &UpdateProductRequest) -> Result<Document, String> {
    let mut set = Document::new();

    if let Some(name) = provided(&update.name) {
        set.insert("name", name);
    }
    if let Some(price) = update.price.filter(|p| *p != 0.0) {
        set.insert("price", price);
    }
    if let Some(image) = provided(&update.image) {
        set.insert("image", image);
    }
    if let Some(description) = provided(&update.description) {
        set.insert("description", description);
    }
    if let Some(category) = provided(&update.category) {
        let category: Category = category
            .parse()
            .map_err(|_| "unknown product category".to_string())?;
        set.insert("category", category.as_str());
    }
    if let Some(material) = provided(&update.material) {
        set.insert("details.material", material);
    }
    if let Some(origin) = provided(&update.origin) {
        set.insert("details.origin", origin);
    }
    if let Some(care) = provided(&update.care) {
        set.insert("details.care", care);
    }
    if let Some(sizes) = update.sizes.as_ref().filter(|s| !s.is_empty()) {
        set.insert("details.sizes", sizes.clone());
    }
    if let Some(discount) = update.discount.filter(|d| *d != 0.0) {
        if !(0.0..=100.0).contains(&discount) {
            return Err("discount must be between 0 and 100".to_string());
        }
        set.insert("discount", discount);
    }
    if let Some(stock) = update.stock.filter(|s| *s != 0) {
        set.insert("stock", stock);
    }

    Ok(set)
}

fn provided(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

pub async fn delete_product(
    db: web::Data<MongoConfig>,
    id: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let collection: Collection<Product> = db.database.collection("products");

    debug!("Deleting product: {}", id);

    let object_id = ObjectId::parse_str(id.as_str()).map_err(|_| {
        error!("Invalid product ID format: {}", id);
        actix_web::error::ErrorBadRequest("Invalid ID format")
    })?;

    let result = collection
        .delete_one(doc! { "_id": object_id }, None)
        .await
        .map_err(|e| {
            error!("Failed to delete product {}: {}", id, e);
            actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
        })?;

    if result.deleted_count == 0 {
        debug!("Product not found for deletion: {}", id);
        Ok(HttpResponse::NotFound().finish())
    } else {
        info!("Product deleted: {}", id);
        Ok(HttpResponse::Ok().finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_form() -> ProductForm {
        ProductForm {
            name: Some("Caftan brodé".into()),
            price: Some("500".into()),
            description: Some("Caftan en soie, broderie main".into()),
            category: Some("caftans".into()),
            material: Some("Soie".into()),
            origin: Some("Maroc".into()),
            care: None,
            sizes: Some(r#"["S","M","L"]"#.into()),
            discount: Some("10".into()),
            stock: Some("2".into()),
            image: Some(("image/webp".into(), vec![1, 2, 3])),
        }
    }

    #[test]
    fn form_builds_a_complete_product() {
        let product = full_form().into_product().unwrap();
        assert_eq!(product.name, "Caftan brodé");
        assert_eq!(product.price, 500.0);
        assert_eq!(product.category, Category::Caftans);
        assert_eq!(product.details.sizes, vec!["S", "M", "L"]);
        assert_eq!(product.discount, Some(10.0));
        assert_eq!(product.stock, 2);
        assert!(product.image.starts_with("data:image/webp;base64,"));
    }

    #[test]
    fn form_requires_the_core_fields() {
        let mut form = full_form();
        form.name = None;
        assert!(form.into_product().is_err());

        let mut form = full_form();
        form.origin = Some(String::new());
        assert!(form.into_product().is_err());

        let mut form = full_form();
        form.price = Some("abc".into());
        assert!(form.into_product().is_err());
    }

    #[test]
    fn form_rejects_out_of_range_discount() {
        let mut form = full_form();
        form.discount = Some("150".into());
        assert!(form.into_product().is_err());
    }

    #[test]
    fn form_rejects_unknown_category() {
        let mut form = full_form();
        form.category = Some("electronics".into());
        assert!(form.into_product().is_err());
    }

    #[test]
    fn optional_form_fields_have_defaults() {
        let mut form = full_form();
        form.sizes = None;
        form.discount = None;
        form.stock = None;
        form.image = None;
        form.care = Some(String::new());
        let product = form.into_product().unwrap();
        assert!(product.details.sizes.is_empty());
        assert!(product.details.care.is_none());
        assert!(product.discount.is_none());
        assert_eq!(product.stock, 0);
        assert_eq!(product.image, "");
    }

    #[test]
    fn update_skips_absent_and_empty_fields() {
        let update = UpdateProductRequest {
            price: Some(0.0),
            name: Some(String::new()),
            ..Default::default()
        };
        assert!(build_product_update(&update).unwrap().is_empty());
    }

    #[test]
    fn update_applies_non_empty_fields() {
        let update = UpdateProductRequest {
            price: Some(50.0),
            name: Some("Djellaba d'hiver".into()),
            material: Some("Laine".into()),
            ..Default::default()
        };
        let set = build_product_update(&update).unwrap();
        assert_eq!(set.get_f64("price").unwrap(), 50.0);
        assert_eq!(set.get_str("name").unwrap(), "Djellaba d'hiver");
        assert_eq!(set.get_str("details.material").unwrap(), "Laine");
        assert!(set.get("stock").is_none());
    }

    #[test]
    fn update_validates_category_and_discount() {
        let update = UpdateProductRequest {
            category: Some("electronics".into()),
            ..Default::default()
        };
        assert!(build_product_update(&update).is_err());

        let update = UpdateProductRequest {
            discount: Some(120.0),
            ..Default::default()
        };
        assert!(build_product_update(&update).is_err());
    }

    #[test]
    fn empty_size_list_never_clears_the_stored_one() {
        let update = UpdateProductRequest {
            sizes: Some(vec![]),
            ..Default::default()
        };
        assert!(build_product_update(&update).unwrap().is_empty());

        let update = UpdateProductRequest {
            sizes: Some(vec!["XL".into()]),
            ..Default::default()
        };
        let set = build_product_update(&update).unwrap();
        assert_eq!(set.get_array("details.sizes").unwrap().len(), 1);
    }
}
