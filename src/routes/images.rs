/**
 * Owned Images
 * Attach/upload/detach logic shared by project and service images
 */
use serde::{Deserialize, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use std::collections::HashSet;

use crate::error::ApiError;
use crate::media::{self, CloudinaryConfig, MediaError, UploadedAsset};
use crate::routes::UploadedFile;

/// Table layout of an image collection owned by one resource kind
#[derive(Debug, Clone, Copy)]
pub struct ImageOwner {
    pub table: &'static str,
    pub owner_column: &'static str,
    pub owner_table: &'static str,
    pub folder: &'static str,
    /// Post bodies may embed these URLs, so a referenced row is detached, not deleted.
    pub shared_with_posts: bool,
}

pub const PROJECT_IMAGES: ImageOwner = ImageOwner {
    table: "project_images",
    owner_column: "project_id",
    owner_table: "project",
    folder: media::PROJECT_FOLDER,
    shared_with_posts: true,
};

pub const SERVICE_IMAGES: ImageOwner = ImageOwner {
    table: "service_image",
    owner_column: "service_id",
    owner_table: "service",
    folder: media::SERVICE_FOLDER,
    shared_with_posts: false,
};

/// Image row as returned by attach/upload
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredImage {
    pub image_id: i64,
    pub image: String,
    pub public_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadImagesResponse {
    pub message: String,
    pub images: Vec<StoredImage>,
}

/// What happens to a single image row on removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRemoval {
    /// Still used by a post: unlink from the owner, keep row and asset.
    Detach,
    /// Drop the row and, when it has one, the remote asset.
    Delete { asset: Option<String> },
}

pub fn plan_removal(post_references: i64, public_id: Option<String>) -> ImageRemoval {
    if post_references > 0 {
        ImageRemoval::Detach
    } else {
        ImageRemoval::Delete { asset: public_id }
    }
}

/// Distinct URLs no post refers to anymore, in first-seen order.
pub fn orphaned_urls(urls: &[String], still_referenced: &HashSet<String>) -> Vec<String> {
    let mut orphans: Vec<String> = Vec::new();
    for url in urls {
        if !still_referenced.contains(url) && !orphans.contains(url) {
            orphans.push(url.clone());
        }
    }
    orphans
}

async fn post_references(conn: &mut MySqlConnection, url: &str) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM post_images WHERE image = ?")
        .bind(url)
        .fetch_one(conn)
        .await?;
    Ok(count)
}

/// Deletes project image rows that were detached from their project and whose URL
/// is no longer used by any post. Runs inside the caller's transaction; returns the
/// asset ids to destroy once it commits.
pub async fn purge_detached_images(
    conn: &mut MySqlConnection,
    urls: &[String],
) -> Result<Vec<String>, sqlx::Error> {
    let mut referenced = HashSet::new();
    for url in urls {
        if post_references(&mut *conn, url).await? > 0 {
            referenced.insert(url.clone());
        }
    }

    let mut public_ids = Vec::new();
    for url in orphaned_urls(urls, &referenced) {
        let orphans = sqlx::query_as::<_, StoredImage>(
            "SELECT image_id, image, public_id FROM project_images WHERE project_id IS NULL AND image = ?",
        )
        .bind(&url)
        .fetch_all(&mut *conn)
        .await?;

        for orphan in orphans {
            sqlx::query("DELETE FROM project_images WHERE image_id = ?")
                .bind(orphan.image_id)
                .execute(&mut *conn)
                .await?;
            tracing::info!(image_id = orphan.image_id, "detached project image purged");
            public_ids.extend(orphan.public_id);
        }
    }

    Ok(public_ids)
}

/// Uploads every file; if one fails, the assets already stored are destroyed again.
async fn upload_assets(
    media: &CloudinaryConfig,
    folder: &str,
    files: Vec<UploadedFile>,
) -> Result<Vec<UploadedAsset>, MediaError> {
    let mut uploaded: Vec<UploadedAsset> = Vec::with_capacity(files.len());
    for file in files {
        match media.upload_image(file.bytes, &file.filename, folder).await {
            Ok(asset) => uploaded.push(asset),
            Err(e) => {
                if !uploaded.is_empty() {
                    tracing::warn!(
                        folder,
                        stored = uploaded.len(),
                        error = %e,
                        "upload batch failed, destroying assets already stored"
                    );
                    media.destroy_all(&public_ids_of(&uploaded)).await;
                }
                return Err(e);
            }
        }
    }
    Ok(uploaded)
}

fn public_ids_of(assets: &[UploadedAsset]) -> Vec<String> {
    assets.iter().map(|a| a.public_id.clone()).collect()
}

impl ImageOwner {
    pub async fn owner_exists(&self, pool: &MySqlPool, owner_id: i64) -> Result<bool, sqlx::Error> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?",
            self.owner_table, self.owner_column
        );
        let (count,): (i64,) = sqlx::query_as(&sql)
            .bind(owner_id)
            .fetch_one(pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn list(&self, pool: &MySqlPool, owner_id: i64) -> Result<Vec<StoredImage>, sqlx::Error> {
        let sql = format!(
            "SELECT image_id, image, public_id FROM {} WHERE {} = ? ORDER BY image_id",
            self.table, self.owner_column
        );
        sqlx::query_as::<_, StoredImage>(&sql)
            .bind(owner_id)
            .fetch_all(pool)
            .await
    }

    async fn insert<'e, E>(
        &self,
        executor: E,
        owner_id: i64,
        url: &str,
        public_id: Option<&str>,
    ) -> Result<i64, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::MySql>,
    {
        let sql = format!(
            "INSERT INTO {} ({}, image, public_id) VALUES (?, ?, ?)",
            self.table, self.owner_column
        );
        let result = sqlx::query(&sql)
            .bind(owner_id)
            .bind(url)
            .bind(public_id)
            .execute(executor)
            .await?;
        Ok(result.last_insert_id() as i64)
    }

    /// Stores an externally hosted image URL.
    pub async fn attach_url(
        &self,
        pool: &MySqlPool,
        owner_id: i64,
        url: &str,
    ) -> Result<StoredImage, ApiError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ApiError::bad_request("Image URL is required"));
        }
        if !self.owner_exists(pool, owner_id).await? {
            return Err(ApiError::not_found(format!("{} not found", self.owner_table)));
        }

        let image_id = self.insert(pool, owner_id, url, None).await?;
        Ok(StoredImage {
            image_id,
            image: url.to_string(),
            public_id: None,
        })
    }

    async fn insert_all(
        &self,
        pool: &MySqlPool,
        owner_id: i64,
        assets: &[UploadedAsset],
    ) -> Result<Vec<StoredImage>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let mut stored = Vec::with_capacity(assets.len());
        for asset in assets {
            let image_id = self
                .insert(&mut *tx, owner_id, &asset.secure_url, Some(&asset.public_id))
                .await?;
            stored.push(StoredImage {
                image_id,
                image: asset.secure_url.clone(),
                public_id: Some(asset.public_id.clone()),
            });
        }
        tx.commit().await?;
        Ok(stored)
    }

    /// Sends every file to media storage and records URL + asset id. Either all
    /// files end up stored with their rows, or none do.
    pub async fn upload(
        &self,
        pool: &MySqlPool,
        media: Option<&CloudinaryConfig>,
        owner_id: i64,
        files: Vec<UploadedFile>,
    ) -> Result<Vec<StoredImage>, ApiError> {
        for file in &files {
            media::validate_image(&file.bytes)?;
        }
        if !self.owner_exists(pool, owner_id).await? {
            return Err(ApiError::not_found(format!("{} not found", self.owner_table)));
        }
        let media = media.ok_or(MediaError::NotConfigured)?;

        let assets = upload_assets(media, self.folder, files).await?;

        let stored = match self.insert_all(pool, owner_id, &assets).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!(
                    table = self.table,
                    owner_id,
                    error = %e,
                    "failed to record uploaded images, destroying assets"
                );
                media.destroy_all(&public_ids_of(&assets)).await;
                return Err(e.into());
            }
        };

        tracing::info!(
            table = self.table,
            owner_id,
            count = stored.len(),
            "images uploaded"
        );
        Ok(stored)
    }

    /// Removes one image of an owner. A project image still used by a post is only
    /// detached. Otherwise the row delete is committed once the provider confirmed
    /// the asset is gone.
    pub async fn remove(
        &self,
        pool: &MySqlPool,
        media: Option<&CloudinaryConfig>,
        owner_id: i64,
        url: &str,
    ) -> Result<ImageRemoval, ApiError> {
        let sql = format!(
            "SELECT image_id, image, public_id FROM {} WHERE {} = ? AND image = ? LIMIT 1",
            self.table, self.owner_column
        );
        let row = sqlx::query_as::<_, StoredImage>(&sql)
            .bind(owner_id)
            .bind(url)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Image not found"))?;

        let mut tx = pool.begin().await?;

        let references = if self.shared_with_posts {
            post_references(&mut *tx, &row.image).await?
        } else {
            0
        };
        let removal = plan_removal(references, row.public_id.clone());

        match &removal {
            ImageRemoval::Detach => {
                let sql = format!(
                    "UPDATE {} SET {} = NULL WHERE image_id = ?",
                    self.table, self.owner_column
                );
                sqlx::query(&sql)
                    .bind(row.image_id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                tracing::info!(
                    table = self.table,
                    image_id = row.image_id,
                    "image detached, still used by a post"
                );
            }
            ImageRemoval::Delete { asset } => {
                let sql = format!("DELETE FROM {} WHERE image_id = ?", self.table);
                sqlx::query(&sql)
                    .bind(row.image_id)
                    .execute(&mut *tx)
                    .await?;

                if let Some(public_id) = asset.as_deref() {
                    let destroyed = match media {
                        Some(media) => media.destroy(public_id).await,
                        None => Err(MediaError::NotConfigured),
                    };
                    if let Err(e) = destroyed {
                        tx.rollback().await?;
                        return Err(e.into());
                    }
                }

                tx.commit().await?;
                tracing::info!(table = self.table, image_id = row.image_id, "image removed");
            }
        }

        Ok(removal)
    }
}

/// Asset ids whose rows are gone and whose files should now be destroyed
pub fn collect_public_ids(images: &[StoredImage]) -> Vec<String> {
    images.iter().filter_map(|i| i.public_id.clone()).collect()
}
