//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::adapters::xml::{extract_invoice_fields, ParsedInvoice};
use crate::web::protocol::ServerMessage;
use crate::web::state::AppState;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, NaiveDate, Utc};
use invoice_core::classify::classify;
use invoice_core::domain::{Invoice, Notification, NotificationKind};
use invoice_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        upload_invoice_handler,
        list_invoices_handler,
        mark_paid_handler,
        list_notifications_handler,
        mark_notification_read_handler,
    ),
    components(
        schemas(InvoiceDto, NotificationDto, UploadInvoiceResponse)
    ),
    tags(
        (name = "Invoice Tracker API", description = "API endpoints for supplier invoice tracking and due-date notifications.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// An invoice as presented to the frontend.
#[derive(Serialize, ToSchema)]
pub struct InvoiceDto {
    pub id: Uuid,
    pub filename: String,
    pub due_date: NaiveDate,
    pub supplier: Option<String>,
    pub amount: Option<f64>,
    pub paid: bool,
    pub notified_5d: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Invoice> for InvoiceDto {
    fn from(invoice: Invoice) -> Self {
        Self {
            id: invoice.id,
            filename: invoice.filename,
            due_date: invoice.due_date,
            supplier: invoice.supplier,
            amount: invoice.amount,
            paid: invoice.paid,
            notified_5d: invoice.notified_5d,
            created_at: invoice.created_at,
        }
    }
}

/// A notification as presented to the frontend.
#[derive(Serialize, ToSchema)]
pub struct NotificationDto {
    pub id: Uuid,
    pub kind: String,
    pub message: String,
    pub invoice_id: Uuid,
    pub due_date: NaiveDate,
    pub days_left: i64,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for NotificationDto {
    fn from(notification: Notification) -> Self {
        Self {
            id: notification.id,
            kind: notification.kind.as_str().to_string(),
            message: notification.message,
            invoice_id: notification.invoice_id,
            due_date: notification.due_date,
            days_left: notification.days_left,
            read: notification.read,
            created_at: notification.created_at,
        }
    }
}

/// The response payload sent after an invoice XML upload.
///
/// `created` is false when the document had no parsable due date: the parse
/// results and advisory notes still come back so the frontend can show them,
/// but no invoice record exists.
#[derive(Serialize, ToSchema)]
pub struct UploadInvoiceResponse {
    pub created: bool,
    pub invoice: Option<InvoiceDto>,
    #[schema(value_type = Object)]
    pub parsed: ParsedInvoice,
}

#[derive(Deserialize)]
pub struct NotificationListParams {
    pub limit: Option<i64>,
    pub unread_only: Option<bool>,
}

/// Maps a port error onto an HTTP status + message pair.
fn port_error_response(e: PortError) -> (StatusCode, String) {
    match e {
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        PortError::Unexpected(msg) => {
            error!("Port error: {}", msg);
            (StatusCode::INTERNAL_SERVER_ERROR, msg)
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Upload an invoice XML document.
///
/// Accepts a multipart/form-data request with a single file part. The file is
/// stored and its fields extracted; when a due date was parsed, an
/// invoice record is created and immediately classified, so a document that
/// is already inside a notification window fires without waiting for the
/// nightly scan.
#[utoipa::path(
    post,
    path = "/invoices",
    request_body(content_type = "multipart/form-data", description = "The invoice XML to upload."),
    responses(
        (status = 201, description = "Invoice created", body = UploadInvoiceResponse),
        (status = 200, description = "Document processed but no invoice created (unparseable due date)", body = UploadInvoiceResponse),
        (status = 400, description = "Bad request (e.g., missing file part)"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn upload_invoice_handler(
    State(app_state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let (file_name, file_text) = if let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read multipart data: {}", e),
        )
    })? {
        let name = field.file_name().unwrap_or("fattura.xml").to_string();
        let data = field.bytes().await.map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to read file bytes: {}", e),
            )
        })?;
        let text = String::from_utf8(data.to_vec()).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Uploaded file is not valid UTF-8 XML: {}", e),
            )
        })?;
        (name, text)
    } else {
        return Err((
            StatusCode::BAD_REQUEST,
            "Multipart form must include a file".to_string(),
        ));
    };

    // Keep the original document on disk for later inspection. A failure
    // here is logged but does not reject the upload.
    if let Err(e) = store_upload(&app_state, &file_name, &file_text).await {
        warn!("Failed to store uploaded file {}: {}", file_name, e);
    }

    let mut parsed = extract_invoice_fields(&file_name, &file_text);

    let Some(due_date) = parsed.due_date else {
        // Parse errors are advisory: the caller gets the notes, no invoice
        // is created, nothing fails hard.
        return Ok((
            StatusCode::OK,
            Json(UploadInvoiceResponse { created: false, invoice: None, parsed }),
        ));
    };

    let amount = match app_state.amount_estimator.estimate_amount(&file_text).await {
        Ok(amount) => Some(amount),
        Err(e) => {
            warn!("Amount inference failed for {}: {}", file_name, e);
            parsed.notes.push("amount inference unavailable".to_string());
            None
        }
    };

    let mut invoice = Invoice::new(file_name, due_date, parsed.supplier.clone(), amount);
    invoice.paid = parsed.paid;

    app_state
        .store
        .create_invoice(&invoice)
        .await
        .map_err(port_error_response)?;

    // Secondary entry point into the notification pipeline: classify at
    // ingestion time so the daily scan is not the only trigger.
    let status = classify(app_state.clock.today(), invoice.due_date, invoice.paid);
    match app_state.engine.generate(&invoice, status).await {
        Ok(Some(notification)) => {
            // Reflect the latch in the response payload.
            if notification.kind == NotificationKind::DueSoon {
                invoice.notified_5d = true;
            }
            app_state
                .broadcaster
                .broadcast(ServerMessage::Notification { notification })
                .await;
        }
        Ok(None) => {}
        Err(e) => {
            // The invoice exists; only its notification failed. Advisory.
            warn!("Notification generation failed for {}: {}", invoice.filename, e);
            parsed.notes.push("notification generation failed".to_string());
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(UploadInvoiceResponse {
            created: true,
            invoice: Some(invoice.into()),
            parsed,
        }),
    ))
}

/// List all invoices, newest first.
#[utoipa::path(
    get,
    path = "/invoices",
    responses(
        (status = 200, description = "All invoices", body = [InvoiceDto]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_invoices_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<InvoiceDto>>, (StatusCode, String)> {
    let invoices = app_state
        .store
        .list_invoices()
        .await
        .map_err(port_error_response)?;
    Ok(Json(invoices.into_iter().map(InvoiceDto::from).collect()))
}

/// Mark an invoice as paid. Suppresses all future due-date notifications.
#[utoipa::path(
    post,
    path = "/invoices/{id}/pay",
    params(("id" = Uuid, Path, description = "The invoice id")),
    responses(
        (status = 200, description = "Invoice marked paid", body = InvoiceDto),
        (status = 404, description = "No such invoice"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn mark_paid_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceDto>, (StatusCode, String)> {
    let invoice = app_state
        .store
        .mark_paid(id)
        .await
        .map_err(port_error_response)?;
    Ok(Json(invoice.into()))
}

/// List notifications, newest first.
///
/// This is the pull-based companion to the WebSocket push: clients that
/// connected after an event use it to catch up, since broadcasts are never
/// replayed.
#[utoipa::path(
    get,
    path = "/notifications",
    params(
        ("limit" = Option<i64>, Query, description = "Maximum number of notifications (default 50)"),
        ("unread_only" = Option<bool>, Query, description = "Only unread notifications")
    ),
    responses(
        (status = 200, description = "Notifications", body = [NotificationDto]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_notifications_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<NotificationListParams>,
) -> Result<Json<Vec<NotificationDto>>, (StatusCode, String)> {
    let limit = params.limit.unwrap_or(50);
    let unread_only = params.unread_only.unwrap_or(false);

    let notifications = app_state
        .store
        .list_notifications(limit, unread_only)
        .await
        .map_err(port_error_response)?;
    Ok(Json(notifications.into_iter().map(NotificationDto::from).collect()))
}

/// Acknowledge a notification.
#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    params(("id" = Uuid, Path, description = "The notification id")),
    responses(
        (status = 204, description = "Notification marked read"),
        (status = 404, description = "No such notification"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn mark_notification_read_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    app_state
        .store
        .mark_notification_read(id)
        .await
        .map_err(port_error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Liveness check.
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Writes the uploaded document into the configured upload directory.
async fn store_upload(app_state: &AppState, file_name: &str, text: &str) -> std::io::Result<()> {
    // Strip any client-supplied path components before touching the disk.
    let safe_name = std::path::Path::new(file_name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "fattura.xml".to_string());

    tokio::fs::create_dir_all(&app_state.config.upload_dir).await?;
    tokio::fs::write(app_state.config.upload_dir.join(safe_name), text).await
}
