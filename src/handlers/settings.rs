use actix_multipart::Multipart;
use actix_web::{web, Error, HttpResponse};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, DateTime},
    options::UpdateOptions,
    Collection,
};
use tracing::{debug, error, info};

use crate::config::MongoConfig;
use crate::models::{CoverVideo, COVER_VIDEO_KEY};

/// Upload ceiling for the homepage cover video.
const MAX_VIDEO_BYTES: usize = 10 * 1024 * 1024;

/// Replaces the cover video in one upsert against the fixed key, so a
/// reader never observes a window with no video.
pub async fn replace_cover_video(
    db: web::Data<MongoConfig>,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let mut video: Option<(String, Vec<u8>)> = None;

    while let Some(mut field) = payload.try_next().await? {
        if field.name() != "video" {
            debug!("Ignoring form field: {}", field.name());
            while field.try_next().await?.is_some() {}
            continue;
        }

        let content_type = field
            .content_type()
            .map(|mime| mime.to_string())
            .unwrap_or_else(|| "video/mp4".to_string());

        // The cap is enforced while streaming; an oversize upload is
        // rejected without buffering the remainder.
        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            if !buffer_chunk(&mut data, &chunk) {
                debug!("Rejected cover video over the {} byte cap", MAX_VIDEO_BYTES);
                return Ok(HttpResponse::BadRequest().json(doc! {
                    "error": "Video exceeds the 10MB limit"
                }));
            }
        }
        video = Some((content_type, data));
    }

    let (content_type, data) = match video {
        Some(video) => video,
        None => {
            debug!("Cover video upload without a video field");
            return Ok(HttpResponse::BadRequest().json(doc! { "error": "No video provided" }));
        }
    };

    let collection: Collection<CoverVideo> = db.database.collection("settings");
    let options = UpdateOptions::builder().upsert(true).build();
    collection
        .update_one(
            doc! { "_id": COVER_VIDEO_KEY },
            doc! { "$set": {
                "data": STANDARD.encode(&data),
                "contentType": &content_type,
                "updatedAt": DateTime::now(),
            }},
            options,
        )
        .await
        .map_err(|e| {
            error!("Failed to store cover video: {}", e);
            actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
        })?;

    info!("Cover video replaced ({} bytes, {})", data.len(), content_type);
    Ok(HttpResponse::Ok().json(doc! {
        "success": true,
        "contentType": content_type,
        "size": data.len() as i64,
    }))
}

fn buffer_chunk(data: &mut Vec<u8>, chunk: &[u8]) -> bool {
    if data.len() + chunk.len() > MAX_VIDEO_BYTES {
        return false;
    }
    data.extend_from_slice(chunk);
    true
}

pub async fn get_cover_video(db: web::Data<MongoConfig>) -> Result<HttpResponse, Error> {
    let collection: Collection<CoverVideo> = db.database.collection("settings");

    let video = collection
        .find_one(doc! { "_id": COVER_VIDEO_KEY }, None)
        .await
        .map_err(|e| {
            error!("Failed to fetch cover video: {}", e);
            actix_web::error::ErrorInternalServerError(format!("Database error: {}", e))
        })?;

    match video {
        Some(video) => Ok(HttpResponse::Ok().json(video)),
        None => {
            debug!("No cover video configured");
            Ok(HttpResponse::NotFound().finish())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_accumulate_below_the_cap() {
        let mut data = Vec::new();
        assert!(buffer_chunk(&mut data, &[0u8; 1024]));
        assert!(buffer_chunk(&mut data, &[0u8; 1024]));
        assert_eq!(data.len(), 2048);
    }

    #[test]
    fn the_cap_is_inclusive() {
        let mut data = vec![0u8; MAX_VIDEO_BYTES - 1];
        assert!(buffer_chunk(&mut data, &[0u8]));
        assert!(!buffer_chunk(&mut data, &[0u8]));
        assert_eq!(data.len(), MAX_VIDEO_BYTES);
    }

    #[test]
    fn payload_round_trips_through_base64() {
        let payload: Vec<u8> = (0u8..=255).cycle().take(1024).collect();
        let encoded = STANDARD.encode(&payload);
        assert_eq!(STANDARD.decode(encoded).unwrap(), payload);
    }
}
