//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `InvoiceStore` port from the `core` crate. It handles all interactions
//! with the SQLite database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use invoice_core::domain::{Invoice, Notification, NotificationKind};
use invoice_core::ports::{InvoiceStore, PortError, PortResult};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `InvoiceStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: SqlitePool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: impl std::fmt::Display) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

// Ids are stored as TEXT; the records keep them as `String` and parse back to
// `Uuid` when converting to the domain type.

#[derive(FromRow)]
struct InvoiceRecord {
    id: String,
    filename: String,
    due_date: NaiveDate,
    supplier: Option<String>,
    amount: Option<f64>,
    paid: bool,
    notified_5d: bool,
    created_at: DateTime<Utc>,
}

impl InvoiceRecord {
    fn to_domain(self) -> PortResult<Invoice> {
        Ok(Invoice {
            id: Uuid::parse_str(&self.id).map_err(unexpected)?,
            filename: self.filename,
            due_date: self.due_date,
            supplier: self.supplier,
            amount: self.amount,
            paid: self.paid,
            notified_5d: self.notified_5d,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct NotificationRecord {
    id: String,
    kind: String,
    message: String,
    invoice_id: String,
    due_date: NaiveDate,
    days_left: i64,
    read: bool,
    created_at: DateTime<Utc>,
}

impl NotificationRecord {
    fn to_domain(self) -> PortResult<Notification> {
        let kind = match self.kind.as_str() {
            "due_soon" => NotificationKind::DueSoon,
            "due_today" => NotificationKind::DueToday,
            "overdue" => NotificationKind::Overdue,
            other => return Err(unexpected(format!("unknown notification kind '{}'", other))),
        };
        Ok(Notification {
            id: Uuid::parse_str(&self.id).map_err(unexpected)?,
            kind,
            message: self.message,
            invoice_id: Uuid::parse_str(&self.invoice_id).map_err(unexpected)?,
            due_date: self.due_date,
            days_left: self.days_left,
            read: self.read,
            created_at: self.created_at,
        })
    }
}

const INVOICE_COLUMNS: &str =
    "id, filename, due_date, supplier, amount, paid, notified_5d, created_at";
const NOTIFICATION_COLUMNS: &str =
    "id, kind, message, invoice_id, due_date, days_left, read, created_at";

//=========================================================================================
// `InvoiceStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl InvoiceStore for DbAdapter {
    async fn create_invoice(&self, invoice: &Invoice) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO invoices (id, filename, due_date, supplier, amount, paid, notified_5d, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(invoice.id.to_string())
        .bind(&invoice.filename)
        .bind(invoice.due_date)
        .bind(&invoice.supplier)
        .bind(invoice.amount)
        .bind(invoice.paid)
        .bind(invoice.notified_5d)
        .bind(invoice.created_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn get_invoice(&self, invoice_id: Uuid) -> PortResult<Invoice> {
        let record = sqlx::query_as::<_, InvoiceRecord>(&format!(
            "SELECT {} FROM invoices WHERE id = ?",
            INVOICE_COLUMNS
        ))
        .bind(invoice_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Invoice {} not found", invoice_id))
            }
            _ => unexpected(e),
        })?;
        record.to_domain()
    }

    async fn list_invoices(&self) -> PortResult<Vec<Invoice>> {
        let records = sqlx::query_as::<_, InvoiceRecord>(&format!(
            "SELECT {} FROM invoices ORDER BY created_at DESC",
            INVOICE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn mark_paid(&self, invoice_id: Uuid) -> PortResult<Invoice> {
        let result = sqlx::query("UPDATE invoices SET paid = 1 WHERE id = ?")
            .bind(invoice_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Invoice {} not found", invoice_id)));
        }
        self.get_invoice(invoice_id).await
    }

    async fn list_unpaid_due_on(&self, date: NaiveDate) -> PortResult<Vec<Invoice>> {
        let records = sqlx::query_as::<_, InvoiceRecord>(&format!(
            "SELECT {} FROM invoices WHERE paid = 0 AND due_date = ? ORDER BY created_at ASC",
            INVOICE_COLUMNS
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn list_unpaid_overdue_before(&self, date: NaiveDate) -> PortResult<Vec<Invoice>> {
        let records = sqlx::query_as::<_, InvoiceRecord>(&format!(
            "SELECT {} FROM invoices WHERE paid = 0 AND due_date < ? ORDER BY due_date ASC",
            INVOICE_COLUMNS
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn fire_due_soon(&self, invoice_id: Uuid, notification: &Notification) -> PortResult<bool> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // Check-and-set of the latch. Zero rows affected means the latch was
        // already taken, the invoice is paid, or it no longer exists; in all
        // three cases nothing must be inserted.
        let updated = sqlx::query(
            "UPDATE invoices SET notified_5d = 1 WHERE id = ? AND notified_5d = 0 AND paid = 0",
        )
        .bind(invoice_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        if updated.rows_affected() == 0 {
            tx.rollback().await.map_err(unexpected)?;
            return Ok(false);
        }

        insert_notification(&mut tx, notification).await?;
        tx.commit().await.map_err(unexpected)?;
        Ok(true)
    }

    async fn create_notification(&self, notification: &Notification) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        insert_notification(&mut tx, notification).await?;
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn list_notifications(&self, limit: i64, unread_only: bool) -> PortResult<Vec<Notification>> {
        let query = if unread_only {
            format!(
                "SELECT {} FROM notifications WHERE read = 0 ORDER BY created_at DESC LIMIT ?",
                NOTIFICATION_COLUMNS
            )
        } else {
            format!(
                "SELECT {} FROM notifications ORDER BY created_at DESC LIMIT ?",
                NOTIFICATION_COLUMNS
            )
        };

        let records = sqlx::query_as::<_, NotificationRecord>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn mark_notification_read(&self, notification_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("UPDATE notifications SET read = 1 WHERE id = ?")
            .bind(notification_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Notification {} not found",
                notification_id
            )));
        }
        Ok(())
    }
}

/// Inserts a notification row inside an open transaction.
async fn insert_notification(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    notification: &Notification,
) -> PortResult<()> {
    sqlx::query(
        "INSERT INTO notifications (id, kind, message, invoice_id, due_date, days_left, read, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(notification.id.to_string())
    .bind(notification.kind.as_str())
    .bind(&notification.message)
    .bind(notification.invoice_id.to_string())
    .bind(notification.due_date)
    .bind(notification.days_left)
    .bind(notification.read)
    .bind(notification.created_at)
    .execute(&mut **tx)
    .await
    .map_err(unexpected)?;
    Ok(())
}

//=========================================================================================
// Tests (in-memory SQLite)
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn adapter() -> DbAdapter {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let adapter = DbAdapter::new(pool);
        adapter.run_migrations().await.unwrap();
        adapter
    }

    fn invoice(filename: &str, due: NaiveDate) -> Invoice {
        Invoice::new(filename.to_string(), due, Some("ACME SRL".to_string()), Some(120.5))
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn create_and_get_round_trip() {
        let db = adapter().await;
        let inv = invoice("a.xml", day(2025, 6, 1));
        db.create_invoice(&inv).await.unwrap();

        let fetched = db.get_invoice(inv.id).await.unwrap();
        assert_eq!(fetched.id, inv.id);
        assert_eq!(fetched.filename, "a.xml");
        assert_eq!(fetched.due_date, day(2025, 6, 1));
        assert_eq!(fetched.supplier.as_deref(), Some("ACME SRL"));
        assert!(!fetched.paid);
        assert!(!fetched.notified_5d);
    }

    #[tokio::test]
    async fn get_missing_invoice_is_not_found() {
        let db = adapter().await;
        let err = db.get_invoice(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[tokio::test]
    async fn mark_paid_flips_the_flag() {
        let db = adapter().await;
        let inv = invoice("a.xml", day(2025, 6, 1));
        db.create_invoice(&inv).await.unwrap();

        let updated = db.mark_paid(inv.id).await.unwrap();
        assert!(updated.paid);
    }

    #[tokio::test]
    async fn scan_queries_filter_on_due_date_and_paid() {
        let db = adapter().await;
        let today = day(2025, 6, 10);

        let due_today = invoice("today.xml", today);
        let due_soon = invoice("soon.xml", today + Duration::days(5));
        let overdue = invoice("late.xml", today - Duration::days(2));
        let mut paid_overdue = invoice("paid.xml", today - Duration::days(9));
        paid_overdue.paid = true;

        for inv in [&due_today, &due_soon, &overdue, &paid_overdue] {
            db.create_invoice(inv).await.unwrap();
        }

        let on_today = db.list_unpaid_due_on(today).await.unwrap();
        assert_eq!(on_today.len(), 1);
        assert_eq!(on_today[0].id, due_today.id);

        let in_window = db.list_unpaid_due_on(today + Duration::days(5)).await.unwrap();
        assert_eq!(in_window.len(), 1);
        assert_eq!(in_window[0].id, due_soon.id);

        // The paid overdue invoice must be excluded.
        let late = db.list_unpaid_overdue_before(today).await.unwrap();
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].id, overdue.id);
    }

    #[tokio::test]
    async fn fire_due_soon_sets_latch_and_inserts_once() {
        let db = adapter().await;
        let inv = invoice("a.xml", day(2025, 6, 6));
        db.create_invoice(&inv).await.unwrap();

        let n1 = Notification::new(NotificationKind::DueSoon, "msg".into(), &inv, 5);
        assert!(db.fire_due_soon(inv.id, &n1).await.unwrap());

        // Latch is now set, a second fire inserts nothing.
        let n2 = Notification::new(NotificationKind::DueSoon, "msg".into(), &inv, 5);
        assert!(!db.fire_due_soon(inv.id, &n2).await.unwrap());

        let fetched = db.get_invoice(inv.id).await.unwrap();
        assert!(fetched.notified_5d);
        assert_eq!(db.list_notifications(50, false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fire_due_soon_skips_paid_invoices() {
        let db = adapter().await;
        let inv = invoice("a.xml", day(2025, 6, 6));
        db.create_invoice(&inv).await.unwrap();
        db.mark_paid(inv.id).await.unwrap();

        let n = Notification::new(NotificationKind::DueSoon, "msg".into(), &inv, 5);
        assert!(!db.fire_due_soon(inv.id, &n).await.unwrap());
        assert!(db.list_notifications(50, false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_notification_insert_rolls_back_the_latch() {
        let db = adapter().await;
        let inv = invoice("a.xml", day(2025, 6, 6));
        db.create_invoice(&inv).await.unwrap();

        // Occupy the notification's primary key so the insert inside
        // fire_due_soon fails after the latch update.
        let n = Notification::new(NotificationKind::DueSoon, "msg".into(), &inv, 5);
        db.create_notification(&n).await.unwrap();

        assert!(db.fire_due_soon(inv.id, &n).await.is_err());

        // The latch update must have rolled back with the failed insert.
        let fetched = db.get_invoice(inv.id).await.unwrap();
        assert!(!fetched.notified_5d);
    }

    #[tokio::test]
    async fn notification_listing_orders_filters_and_limits() {
        let db = adapter().await;
        let inv = invoice("a.xml", day(2025, 6, 1));
        db.create_invoice(&inv).await.unwrap();

        let mut first = Notification::new(NotificationKind::DueToday, "first".into(), &inv, 0);
        first.created_at = Utc::now() - Duration::seconds(10);
        let second = Notification::new(NotificationKind::Overdue, "second".into(), &inv, -1);
        db.create_notification(&first).await.unwrap();
        db.create_notification(&second).await.unwrap();

        let all = db.list_notifications(50, false).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].message, "second"); // newest first

        db.mark_notification_read(first.id).await.unwrap();
        let unread = db.list_notifications(50, true).await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, second.id);

        let limited = db.list_notifications(1, false).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn notifications_survive_without_their_invoice() {
        // The invoice reference is weak: no foreign key enforcement.
        let db = adapter().await;
        let inv = invoice("ghost.xml", day(2025, 6, 1));
        let n = Notification::new(NotificationKind::Overdue, "dangling".into(), &inv, -4);
        db.create_notification(&n).await.unwrap();

        let all = db.list_notifications(10, false).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].invoice_id, inv.id);
    }
}
