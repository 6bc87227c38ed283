/**
 * Project Routes
 * Project CRUD, tools/clients and their links, images and demos
 */
use axum::{
    extract::{Multipart, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use std::collections::{BTreeSet, HashSet};

use crate::db::{
    self,
    models::{Client, Project, ProjectDemo, ProjectImage, Tool},
};
use crate::error::ApiError;
use crate::media;
use crate::routes::auth::verify_auth;
use crate::routes::images::{ImageRemoval, StoredImage, UploadImagesResponse, PROJECT_IMAGES};
use crate::routes::{
    non_blank, optional_date, read_upload_form, require_text, today, MessageResponse,
};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Editable project columns
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ProjectFields {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub live_link: Option<String>,
    pub git_link: Option<String>,
    #[serde(default, deserialize_with = "optional_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "optional_date")]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ModifyProjectRequest {
    pub project_id: Option<i64>,
    #[serde(flatten)]
    pub fields: ProjectFields,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ProjectIdRequest {
    pub project_id: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ProjectToolRequest {
    pub project_id: Option<i64>,
    pub tool_id: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ProjectClientRequest {
    pub project_id: Option<i64>,
    pub client_id: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NewToolRequest {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub category: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ToolIdRequest {
    pub tool_id: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NewClientRequest {
    #[serde(default)]
    pub name: String,
    pub tel: Option<String>,
    pub e_mail: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ClientIdRequest {
    pub client_id: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ProjectImageRequest {
    pub project_id: Option<i64>,
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ProjectDemoRequest {
    pub project_id: Option<i64>,
    #[serde(default)]
    pub demo: String,
}

/// Full set of ids that should be linked after the call
#[derive(Debug, Deserialize, Serialize)]
pub struct SyncLinksRequest {
    #[serde(default, alias = "tool_ids", alias = "client_ids")]
    pub ids: Vec<i64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreatedProjectResponse {
    pub message: String,
    pub project_id: i64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreatedToolResponse {
    pub message: String,
    pub tool_id: i64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreatedClientResponse {
    pub message: String,
    pub client_id: i64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreatedDemoResponse {
    pub message: String,
    pub demo_id: i64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreatedImageResponse {
    pub message: String,
    pub image: StoredImage,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LinkResponse {
    pub message: String,
    /// False when the link already existed (add) or was absent (remove)
    pub changed: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DeleteProjectResponse {
    pub message: String,
    pub detached_images: usize,
    pub deleted_images: usize,
}

/// Ids added and removed by a link sync
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct AssociationDiff {
    pub added: Vec<i64>,
    pub removed: Vec<i64>,
}

// ============================================================================
// Derived state
// ============================================================================

/// A project is completed once its end date lies strictly in the past.
pub fn is_completed(end_date: Option<NaiveDate>, today: NaiveDate) -> bool {
    matches!(end_date, Some(end) if end < today)
}

/// Recomputes the completed flag and writes back rows whose stored value is stale.
async fn refresh_status(
    pool: &MySqlPool,
    projects: &mut [Project],
    today: NaiveDate,
) -> Result<usize, sqlx::Error> {
    let mut changed = 0;
    for project in projects.iter_mut() {
        let derived = is_completed(project.end_date, today);
        if derived == project.status {
            continue;
        }
        sqlx::query("UPDATE project SET status = ? WHERE project_id = ?")
            .bind(derived)
            .bind(project.project_id)
            .execute(pool)
            .await?;
        project.status = derived;
        changed += 1;
    }

    if changed > 0 {
        tracing::info!(changed, "project status refreshed");
    }
    Ok(changed)
}

/// Difference between the linked ids and the wanted ids.
pub fn diff_links(current: &[i64], selected: &[i64]) -> AssociationDiff {
    let current: BTreeSet<i64> = current.iter().copied().collect();
    let selected: BTreeSet<i64> = selected.iter().copied().collect();

    AssociationDiff {
        added: selected.difference(&current).copied().collect(),
        removed: current.difference(&selected).copied().collect(),
    }
}

/// What happens to a deleted project's images
#[derive(Debug, Default, PartialEq)]
pub struct ImageCleanupPlan {
    /// Still used by a blog post: keep the row, null its project reference
    pub detach: Vec<i64>,
    pub delete: Vec<i64>,
    /// Assets of deleted rows
    pub destroy_assets: Vec<String>,
}

pub fn plan_image_cleanup(images: &[ProjectImage], shared_urls: &HashSet<String>) -> ImageCleanupPlan {
    let mut plan = ImageCleanupPlan::default();
    for image in images {
        if shared_urls.contains(&image.image) {
            plan.detach.push(image.image_id);
        } else {
            plan.delete.push(image.image_id);
            if let Some(public_id) = &image.public_id {
                plan.destroy_assets.push(public_id.clone());
            }
        }
    }
    plan
}

// ============================================================================
// Helpers
// ============================================================================

fn required_id(value: Option<i64>, field: &str) -> Result<i64, ApiError> {
    value.ok_or_else(|| ApiError::bad_request(format!("{} is required", field)))
}

fn validate_fields(fields: &ProjectFields) -> Result<(), ApiError> {
    require_text(&fields.title, "Title")?;
    if let (Some(start), Some(end)) = (fields.start_date, fields.end_date) {
        if end < start {
            return Err(ApiError::bad_request("End date must not be before start date"));
        }
    }
    Ok(())
}

async fn project_exists(pool: &MySqlPool, project_id: i64) -> Result<bool, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM project WHERE project_id = ?")
        .bind(project_id)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

async fn ensure_project(pool: &MySqlPool, project_id: i64) -> Result<(), ApiError> {
    if project_exists(pool, project_id).await? {
        Ok(())
    } else {
        Err(ApiError::not_found("Project not found"))
    }
}

async fn write_project(pool: &MySqlPool, project_id: i64, fields: ProjectFields) -> Result<(), ApiError> {
    validate_fields(&fields)?;
    ensure_project(pool, project_id).await?;

    sqlx::query(
        r#"
        UPDATE project
        SET title = ?, description = ?, live_link = ?, git_link = ?,
            start_date = ?, end_date = ?, status = ?
        WHERE project_id = ?
        "#,
    )
    .bind(fields.title.trim())
    .bind(non_blank(fields.description))
    .bind(non_blank(fields.live_link))
    .bind(non_blank(fields.git_link))
    .bind(fields.start_date)
    .bind(fields.end_date)
    .bind(is_completed(fields.end_date, today()))
    .bind(project_id)
    .execute(pool)
    .await?;

    tracing::info!(project_id, "project updated");
    Ok(())
}

/// Which junction table a link operation targets
#[derive(Debug, Clone, Copy)]
enum Link {
    Tool,
    Client,
}

impl Link {
    fn table(self) -> &'static str {
        match self {
            Link::Tool => "project_tool",
            Link::Client => "project_client",
        }
    }

    fn column(self) -> &'static str {
        match self {
            Link::Tool => "tool_id",
            Link::Client => "client_id",
        }
    }

    fn target_table(self) -> &'static str {
        match self {
            Link::Tool => "tool",
            Link::Client => "client",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Link::Tool => "Tool",
            Link::Client => "Client",
        }
    }
}

async fn target_exists<'e, E>(executor: E, kind: Link, id: i64) -> Result<bool, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::MySql>,
{
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {} = ?",
        kind.target_table(),
        kind.column()
    );
    let (count,): (i64,) = sqlx::query_as(&sql).bind(id).fetch_one(executor).await?;
    Ok(count > 0)
}

async fn add_link(pool: &MySqlPool, kind: Link, project_id: i64, target_id: i64) -> Result<bool, ApiError> {
    ensure_project(pool, project_id).await?;
    if !target_exists(pool, kind, target_id).await? {
        return Err(ApiError::not_found(format!("{} not found", kind.label())));
    }

    let sql = format!(
        "INSERT IGNORE INTO {} (project_id, {}) VALUES (?, ?)",
        kind.table(),
        kind.column()
    );
    let inserted = sqlx::query(&sql)
        .bind(project_id)
        .bind(target_id)
        .execute(pool)
        .await?
        .rows_affected();

    Ok(inserted == 1)
}

async fn remove_link(pool: &MySqlPool, kind: Link, project_id: i64, target_id: i64) -> Result<bool, ApiError> {
    let sql = format!(
        "DELETE FROM {} WHERE project_id = ? AND {} = ?",
        kind.table(),
        kind.column()
    );
    let deleted = sqlx::query(&sql)
        .bind(project_id)
        .bind(target_id)
        .execute(pool)
        .await?
        .rows_affected();

    Ok(deleted > 0)
}

/// Applies the diff between linked and selected ids in a single transaction.
async fn sync_links(
    pool: &MySqlPool,
    kind: Link,
    project_id: i64,
    selected: &[i64],
) -> Result<AssociationDiff, ApiError> {
    ensure_project(pool, project_id).await?;

    let mut tx = pool.begin().await?;

    let sql = format!(
        "SELECT {} FROM {} WHERE project_id = ? FOR UPDATE",
        kind.column(),
        kind.table()
    );
    let current: Vec<i64> = sqlx::query_as::<_, (i64,)>(&sql)
        .bind(project_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|(id,)| id)
        .collect();

    let diff = diff_links(&current, selected);

    for &id in &diff.added {
        if !target_exists(&mut *tx, kind, id).await? {
            tx.rollback().await?;
            return Err(ApiError::not_found(format!("{} {} not found", kind.label(), id)));
        }
        let sql = format!(
            "INSERT IGNORE INTO {} (project_id, {}) VALUES (?, ?)",
            kind.table(),
            kind.column()
        );
        sqlx::query(&sql)
            .bind(project_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    for &id in &diff.removed {
        let sql = format!(
            "DELETE FROM {} WHERE project_id = ? AND {} = ?",
            kind.table(),
            kind.column()
        );
        sqlx::query(&sql)
            .bind(project_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    tracing::info!(
        project_id,
        table = kind.table(),
        added = diff.added.len(),
        removed = diff.removed.len(),
        "project links synced"
    );
    Ok(diff)
}

/// Deletes a project and everything hanging off it in one transaction. Returns
/// `None` when the project does not exist. Remote assets are destroyed by the
/// caller once the transaction has committed.
pub async fn delete_project_cascade(
    pool: &MySqlPool,
    project_id: i64,
) -> Result<Option<ImageCleanupPlan>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let exists: Option<(i64,)> =
        sqlx::query_as("SELECT project_id FROM project WHERE project_id = ? FOR UPDATE")
            .bind(project_id)
            .fetch_optional(&mut *tx)
            .await?;
    if exists.is_none() {
        tx.rollback().await?;
        return Ok(None);
    }

    let images = sqlx::query_as::<_, ProjectImage>(
        "SELECT image_id, project_id, image, public_id FROM project_images WHERE project_id = ?",
    )
    .bind(project_id)
    .fetch_all(&mut *tx)
    .await?;

    let shared: HashSet<String> = sqlx::query_as::<_, (String,)>(
        r#"
        SELECT DISTINCT pi.image
        FROM project_images pi
        JOIN post_images po ON po.image = pi.image
        WHERE pi.project_id = ?
        "#,
    )
    .bind(project_id)
    .fetch_all(&mut *tx)
    .await?
    .into_iter()
    .map(|(url,)| url)
    .collect();

    let plan = plan_image_cleanup(&images, &shared);

    for &image_id in &plan.detach {
        sqlx::query("UPDATE project_images SET project_id = NULL WHERE image_id = ?")
            .bind(image_id)
            .execute(&mut *tx)
            .await?;
    }
    for &image_id in &plan.delete {
        sqlx::query("DELETE FROM project_images WHERE image_id = ?")
            .bind(image_id)
            .execute(&mut *tx)
            .await?;
    }

    for sql in [
        "DELETE FROM project_demos WHERE project_id = ?",
        "DELETE FROM project_tool WHERE project_id = ?",
        "DELETE FROM project_client WHERE project_id = ?",
        "DELETE FROM project WHERE project_id = ?",
    ] {
        sqlx::query(sql).bind(project_id).execute(&mut *tx).await?;
    }

    tx.commit().await?;

    tracing::info!(
        project_id,
        detached = plan.detach.len(),
        deleted = plan.delete.len(),
        "project deleted"
    );
    Ok(Some(plan))
}

// ============================================================================
// Project handlers
// ============================================================================

/// POST /api/projects
pub async fn create_project(
    headers: HeaderMap,
    Json(payload): Json<ProjectFields>,
) -> Result<impl IntoResponse, ApiError> {
    verify_auth(&headers)?;
    validate_fields(&payload)?;
    let pool = db::require_pool()?;

    let result = sqlx::query(
        r#"
        INSERT INTO project (title, description, live_link, git_link, start_date, end_date, status)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.title.trim())
    .bind(non_blank(payload.description))
    .bind(non_blank(payload.live_link))
    .bind(non_blank(payload.git_link))
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(is_completed(payload.end_date, today()))
    .execute(pool.as_ref())
    .await?;

    let project_id = result.last_insert_id() as i64;
    tracing::info!(project_id, "project created");

    Ok((
        StatusCode::CREATED,
        Json(CreatedProjectResponse {
            message: "Project added".to_string(),
            project_id,
        }),
    ))
}

/// GET /api/projects
/// Side-effecting read: stale completed flags are written back.
pub async fn list_projects() -> Result<Json<Vec<Project>>, ApiError> {
    let pool = db::require_pool()?;

    let mut projects = sqlx::query_as::<_, Project>(
        r#"
        SELECT project_id, title, description, live_link, git_link, start_date, end_date, status
        FROM project
        ORDER BY project_id
        "#,
    )
    .fetch_all(pool.as_ref())
    .await?;

    refresh_status(pool.as_ref(), &mut projects, today()).await?;
    Ok(Json(projects))
}

/// GET /api/projects/{id}
pub async fn get_project(Path(project_id): Path<i64>) -> Result<Json<Project>, ApiError> {
    let pool = db::require_pool()?;

    let project = sqlx::query_as::<_, Project>(
        r#"
        SELECT project_id, title, description, live_link, git_link, start_date, end_date, status
        FROM project
        WHERE project_id = ?
        "#,
    )
    .bind(project_id)
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or_else(|| ApiError::not_found("Project not found"))?;

    let mut projects = [project];
    refresh_status(pool.as_ref(), &mut projects, today()).await?;
    let [project] = projects;
    Ok(Json(project))
}

/// POST /api/projects/modify
pub async fn modify_project(
    headers: HeaderMap,
    Json(payload): Json<ModifyProjectRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    verify_auth(&headers)?;
    let project_id = required_id(payload.project_id, "Project ID")?;
    let pool = db::require_pool()?;

    write_project(pool.as_ref(), project_id, payload.fields).await?;
    Ok(Json(MessageResponse::new("Project modified")))
}

/// PUT /api/projects/{id}
pub async fn replace_project(
    headers: HeaderMap,
    Path(project_id): Path<i64>,
    Json(payload): Json<ProjectFields>,
) -> Result<Json<MessageResponse>, ApiError> {
    verify_auth(&headers)?;
    let pool = db::require_pool()?;

    write_project(pool.as_ref(), project_id, payload).await?;
    Ok(Json(MessageResponse::new("Project modified")))
}

/// POST /api/projects/delete
pub async fn delete_project(
    headers: HeaderMap,
    Json(payload): Json<ProjectIdRequest>,
) -> Result<Json<DeleteProjectResponse>, ApiError> {
    verify_auth(&headers)?;
    let project_id = required_id(payload.project_id, "Project ID")?;
    let pool = db::require_pool()?;

    let plan = delete_project_cascade(pool.as_ref(), project_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;

    media::destroy_all(&plan.destroy_assets).await;

    Ok(Json(DeleteProjectResponse {
        message: "Project deleted".to_string(),
        detached_images: plan.detach.len(),
        deleted_images: plan.delete.len(),
    }))
}

// ============================================================================
// Tools & clients
// ============================================================================

/// GET /api/projects/{id}/tools
pub async fn project_tools(Path(project_id): Path<i64>) -> Result<Json<Vec<Tool>>, ApiError> {
    let pool = db::require_pool()?;

    let tools = sqlx::query_as::<_, Tool>(
        r#"
        SELECT t.tool_id, t.name, t.type, t.image
        FROM tool t
        JOIN project_tool pt ON pt.tool_id = t.tool_id
        WHERE pt.project_id = ?
        ORDER BY t.name
        "#,
    )
    .bind(project_id)
    .fetch_all(pool.as_ref())
    .await?;

    Ok(Json(tools))
}

/// GET /api/projects/{id}/clients
pub async fn project_clients(Path(project_id): Path<i64>) -> Result<Json<Vec<Client>>, ApiError> {
    let pool = db::require_pool()?;

    let clients = sqlx::query_as::<_, Client>(
        r#"
        SELECT c.client_id, c.name, c.tel, c.e_mail, c.image
        FROM client c
        JOIN project_client pc ON pc.client_id = c.client_id
        WHERE pc.project_id = ?
        ORDER BY c.name
        "#,
    )
    .bind(project_id)
    .fetch_all(pool.as_ref())
    .await?;

    Ok(Json(clients))
}

/// GET /api/projects/tools
pub async fn list_tools() -> Result<Json<Vec<Tool>>, ApiError> {
    let pool = db::require_pool()?;
    let tools = sqlx::query_as::<_, Tool>("SELECT tool_id, name, type, image FROM tool ORDER BY name")
        .fetch_all(pool.as_ref())
        .await?;
    Ok(Json(tools))
}

/// POST /api/projects/tools/add
pub async fn add_tool(
    headers: HeaderMap,
    Json(payload): Json<NewToolRequest>,
) -> Result<impl IntoResponse, ApiError> {
    verify_auth(&headers)?;
    require_text(&payload.name, "Name")?;
    let pool = db::require_pool()?;

    let tool_id = sqlx::query("INSERT INTO tool (name, type, image) VALUES (?, ?, ?)")
        .bind(payload.name.trim())
        .bind(non_blank(payload.category))
        .bind(non_blank(payload.image))
        .execute(pool.as_ref())
        .await?
        .last_insert_id() as i64;

    Ok((
        StatusCode::CREATED,
        Json(CreatedToolResponse {
            message: "Tool added".to_string(),
            tool_id,
        }),
    ))
}

/// POST /api/projects/tools/delete
/// Removes the tool and every project link to it.
pub async fn delete_tool(
    headers: HeaderMap,
    Json(payload): Json<ToolIdRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    verify_auth(&headers)?;
    let tool_id = required_id(payload.tool_id, "Tool ID")?;
    let pool = db::require_pool()?;

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM project_tool WHERE tool_id = ?")
        .bind(tool_id)
        .execute(&mut *tx)
        .await?;
    let deleted = sqlx::query("DELETE FROM tool WHERE tool_id = ?")
        .bind(tool_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if deleted == 0 {
        tx.rollback().await?;
        return Err(ApiError::not_found("Tool not found"));
    }
    tx.commit().await?;

    Ok(Json(MessageResponse::new("Tool deleted")))
}

/// GET /api/projects/clients
pub async fn list_clients() -> Result<Json<Vec<Client>>, ApiError> {
    let pool = db::require_pool()?;
    let clients = sqlx::query_as::<_, Client>(
        "SELECT client_id, name, tel, e_mail, image FROM client ORDER BY name",
    )
    .fetch_all(pool.as_ref())
    .await?;
    Ok(Json(clients))
}

/// POST /api/projects/clients
pub async fn add_client(
    headers: HeaderMap,
    Json(payload): Json<NewClientRequest>,
) -> Result<impl IntoResponse, ApiError> {
    verify_auth(&headers)?;
    require_text(&payload.name, "Name")?;
    let pool = db::require_pool()?;

    let client_id = sqlx::query("INSERT INTO client (name, tel, e_mail, image) VALUES (?, ?, ?, ?)")
        .bind(payload.name.trim())
        .bind(non_blank(payload.tel))
        .bind(non_blank(payload.e_mail))
        .bind(non_blank(payload.image))
        .execute(pool.as_ref())
        .await?
        .last_insert_id() as i64;

    Ok((
        StatusCode::CREATED,
        Json(CreatedClientResponse {
            message: "Client added".to_string(),
            client_id,
        }),
    ))
}

/// POST /api/projects/clients/delete
pub async fn delete_client(
    headers: HeaderMap,
    Json(payload): Json<ClientIdRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    verify_auth(&headers)?;
    let client_id = required_id(payload.client_id, "Client ID")?;
    let pool = db::require_pool()?;

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM project_client WHERE client_id = ?")
        .bind(client_id)
        .execute(&mut *tx)
        .await?;
    let deleted = sqlx::query("DELETE FROM client WHERE client_id = ?")
        .bind(client_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if deleted == 0 {
        tx.rollback().await?;
        return Err(ApiError::not_found("Client not found"));
    }
    tx.commit().await?;

    Ok(Json(MessageResponse::new("Client deleted")))
}

/// POST /api/projects/add_project_tool
pub async fn add_project_tool(
    headers: HeaderMap,
    Json(payload): Json<ProjectToolRequest>,
) -> Result<impl IntoResponse, ApiError> {
    verify_auth(&headers)?;
    let project_id = required_id(payload.project_id, "Project ID")?;
    let tool_id = required_id(payload.tool_id, "Tool ID")?;
    let pool = db::require_pool()?;

    let changed = add_link(pool.as_ref(), Link::Tool, project_id, tool_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(LinkResponse {
            message: "Tool linked to project".to_string(),
            changed,
        }),
    ))
}

/// POST /api/projects/remove_project_tool
pub async fn remove_project_tool(
    headers: HeaderMap,
    Json(payload): Json<ProjectToolRequest>,
) -> Result<Json<LinkResponse>, ApiError> {
    verify_auth(&headers)?;
    let project_id = required_id(payload.project_id, "Project ID")?;
    let tool_id = required_id(payload.tool_id, "Tool ID")?;
    let pool = db::require_pool()?;

    let changed = remove_link(pool.as_ref(), Link::Tool, project_id, tool_id).await?;
    Ok(Json(LinkResponse {
        message: "Tool removed from project".to_string(),
        changed,
    }))
}

/// POST /api/projects/add_project_client
pub async fn add_project_client(
    headers: HeaderMap,
    Json(payload): Json<ProjectClientRequest>,
) -> Result<impl IntoResponse, ApiError> {
    verify_auth(&headers)?;
    let project_id = required_id(payload.project_id, "Project ID")?;
    let client_id = required_id(payload.client_id, "Client ID")?;
    let pool = db::require_pool()?;

    let changed = add_link(pool.as_ref(), Link::Client, project_id, client_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(LinkResponse {
            message: "Client linked to project".to_string(),
            changed,
        }),
    ))
}

/// POST /api/projects/remove_project_client
pub async fn remove_project_client(
    headers: HeaderMap,
    Json(payload): Json<ProjectClientRequest>,
) -> Result<Json<LinkResponse>, ApiError> {
    verify_auth(&headers)?;
    let project_id = required_id(payload.project_id, "Project ID")?;
    let client_id = required_id(payload.client_id, "Client ID")?;
    let pool = db::require_pool()?;

    let changed = remove_link(pool.as_ref(), Link::Client, project_id, client_id).await?;
    Ok(Json(LinkResponse {
        message: "Client removed from project".to_string(),
        changed,
    }))
}

/// POST /api/projects/{id}/tools/sync
pub async fn sync_project_tools(
    headers: HeaderMap,
    Path(project_id): Path<i64>,
    Json(payload): Json<SyncLinksRequest>,
) -> Result<Json<AssociationDiff>, ApiError> {
    verify_auth(&headers)?;
    let pool = db::require_pool()?;
    let diff = sync_links(pool.as_ref(), Link::Tool, project_id, &payload.ids).await?;
    Ok(Json(diff))
}

/// POST /api/projects/{id}/clients/sync
pub async fn sync_project_clients(
    headers: HeaderMap,
    Path(project_id): Path<i64>,
    Json(payload): Json<SyncLinksRequest>,
) -> Result<Json<AssociationDiff>, ApiError> {
    verify_auth(&headers)?;
    let pool = db::require_pool()?;
    let diff = sync_links(pool.as_ref(), Link::Client, project_id, &payload.ids).await?;
    Ok(Json(diff))
}

// ============================================================================
// Images & demos
// ============================================================================

/// GET /api/projects/{id}/images
pub async fn project_images(Path(project_id): Path<i64>) -> Result<Json<Vec<StoredImage>>, ApiError> {
    let pool = db::require_pool()?;
    let images = PROJECT_IMAGES.list(pool.as_ref(), project_id).await?;
    Ok(Json(images))
}

/// POST /api/projects/image
/// Link an already hosted image URL
pub async fn add_project_image(
    headers: HeaderMap,
    Json(payload): Json<ProjectImageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    verify_auth(&headers)?;
    let project_id = required_id(payload.project_id, "Project ID")?;
    let pool = db::require_pool()?;

    let image = PROJECT_IMAGES
        .attach_url(pool.as_ref(), project_id, &payload.image)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedImageResponse {
            message: "Image added to project".to_string(),
            image,
        }),
    ))
}

/// POST /api/projects/upload_image
/// Multipart: `project_id` plus one or more `project_images` files
pub async fn upload_project_images(
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    verify_auth(&headers)?;
    let pool = db::require_pool()?;

    let form = read_upload_form(&mut multipart, &["project_images", "image"]).await?;
    let project_id = match form.id_field("project_id") {
        Some(id) if !form.files.is_empty() => id,
        _ => {
            return Err(ApiError::bad_request(
                "Project ID and image file are required",
            ))
        }
    };

    let images = PROJECT_IMAGES
        .upload(pool.as_ref(), media::settings(), project_id, form.files)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(UploadImagesResponse {
            message: "Images uploaded and linked to project".to_string(),
            images,
        }),
    ))
}

/// POST /api/projects/remove_image
pub async fn remove_project_image(
    headers: HeaderMap,
    Json(payload): Json<ProjectImageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    verify_auth(&headers)?;
    let project_id = required_id(payload.project_id, "Project ID")?;
    require_text(&payload.image, "Image")?;
    let pool = db::require_pool()?;

    let removal = PROJECT_IMAGES
        .remove(pool.as_ref(), media::settings(), project_id, &payload.image)
        .await?;
    Ok(Json(MessageResponse::new(match removal {
        ImageRemoval::Detach => "Image detached from project, still used by a post",
        ImageRemoval::Delete { .. } => "Image removed from project",
    })))
}

/// GET /api/projects/{id}/demos
pub async fn project_demos(Path(project_id): Path<i64>) -> Result<Json<Vec<ProjectDemo>>, ApiError> {
    let pool = db::require_pool()?;
    let demos = sqlx::query_as::<_, ProjectDemo>(
        "SELECT demo_id, project_id, demo FROM project_demos WHERE project_id = ? ORDER BY demo_id",
    )
    .bind(project_id)
    .fetch_all(pool.as_ref())
    .await?;
    Ok(Json(demos))
}

/// POST /api/projects/demo
pub async fn add_project_demo(
    headers: HeaderMap,
    Json(payload): Json<ProjectDemoRequest>,
) -> Result<impl IntoResponse, ApiError> {
    verify_auth(&headers)?;
    let project_id = required_id(payload.project_id, "Project ID")?;
    require_text(&payload.demo, "Demo")?;
    let pool = db::require_pool()?;
    ensure_project(pool.as_ref(), project_id).await?;

    let demo_id = sqlx::query("INSERT INTO project_demos (project_id, demo) VALUES (?, ?)")
        .bind(project_id)
        .bind(payload.demo.trim())
        .execute(pool.as_ref())
        .await?
        .last_insert_id() as i64;

    Ok((
        StatusCode::CREATED,
        Json(CreatedDemoResponse {
            message: "Demo added to project".to_string(),
            demo_id,
        }),
    ))
}

/// POST /api/projects/remove_demo
pub async fn remove_project_demo(
    headers: HeaderMap,
    Json(payload): Json<ProjectDemoRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    verify_auth(&headers)?;
    let project_id = required_id(payload.project_id, "Project ID")?;
    let pool = db::require_pool()?;

    let deleted = sqlx::query("DELETE FROM project_demos WHERE project_id = ? AND demo = ?")
        .bind(project_id)
        .bind(payload.demo.trim())
        .execute(pool.as_ref())
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(ApiError::not_found("Demo not found"));
    }

    Ok(Json(MessageResponse::new("Demo removed from project")))
}
