//! services/api/src/scanner.rs
//!
//! The daily due-date scanner: a background task that wakes at a configured
//! local time, classifies every unpaid invoice near or past its due date,
//! drives the notification generator, and hands anything generated to the
//! broadcast channel.
//!
//! The scanner is an explicit component: injected store, injected clock,
//! explicit start/stop via a cancellation token. No ambient globals.

use crate::web::broadcast::NotificationBroadcaster;
use crate::web::protocol::ServerMessage;
use chrono::{Duration, FixedOffset, NaiveDateTime, NaiveTime};
use invoice_core::classify::{classify, DUE_SOON_DAYS};
use invoice_core::domain::Invoice;
use invoice_core::notify::NotificationEngine;
use invoice_core::ports::{Clock, InvoiceStore, PortError, PortResult};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Outcome counters for a single scan run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    pub scanned: usize,
    pub generated: usize,
    pub failed: usize,
}

/// The scheduled scanner component.
pub struct DueDateScanner {
    store: Arc<dyn InvoiceStore>,
    clock: Arc<dyn Clock>,
    engine: NotificationEngine,
    broadcaster: Arc<NotificationBroadcaster>,
    scan_time: NaiveTime,
    utc_offset: FixedOffset,
    /// Upper bound on any single store call or per-invoice step. A hung
    /// collaborator costs one invoice (or one batch query), never the run.
    invoice_timeout: StdDuration,
    token: CancellationToken,
}

impl DueDateScanner {
    pub fn new(
        store: Arc<dyn InvoiceStore>,
        clock: Arc<dyn Clock>,
        broadcaster: Arc<NotificationBroadcaster>,
        scan_time: NaiveTime,
        utc_offset: FixedOffset,
        invoice_timeout: StdDuration,
    ) -> Self {
        Self {
            engine: NotificationEngine::new(store.clone()),
            store,
            clock,
            broadcaster,
            scan_time,
            utc_offset,
            invoice_timeout,
            token: CancellationToken::new(),
        }
    }

    /// Spawns the daily loop. The handle resolves after `shutdown`.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let scanner = Arc::clone(self);
        tokio::spawn(async move { scanner.run_loop().await })
    }

    /// Signals the loop to stop after the current wait or scan.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    async fn run_loop(&self) {
        info!("Due-date scanner started (daily at {})", self.scan_time);
        loop {
            let now_local = self.clock.now().with_timezone(&self.utc_offset).naive_local();
            let sleep_for = time_until_next_run(now_local, self.scan_time);

            tokio::select! {
                _ = self.token.cancelled() => {
                    info!("Due-date scanner stopped");
                    break;
                }
                _ = tokio::time::sleep(sleep_for) => {
                    let summary = self.run_once().await;
                    info!(
                        scanned = summary.scanned,
                        generated = summary.generated,
                        failed = summary.failed,
                        "Daily due-date scan complete"
                    );
                }
            }
        }
    }

    /// One full scan: due-soon window, due today, overdue.
    ///
    /// Every invoice is processed independently; a per-invoice failure or
    /// timeout is logged and counted, never propagated. A failing store
    /// listing skips that batch only. Nothing here can take the process
    /// down, and nothing can block it past `invoice_timeout`: the loop
    /// always survives to the next day.
    ///
    /// Due-today and overdue notifications carry no latch, so running the
    /// scan twice on the same day duplicates them (see
    /// `NotificationEngine::generate`).
    pub async fn run_once(&self) -> ScanSummary {
        let today = self.clock.today();
        let mut summary = ScanSummary::default();

        let batches = [
            self.bounded(self.store.list_unpaid_due_on(today + Duration::days(DUE_SOON_DAYS))).await,
            self.bounded(self.store.list_unpaid_due_on(today)).await,
            self.bounded(self.store.list_unpaid_overdue_before(today)).await,
        ];

        for batch in batches {
            let invoices = match batch {
                Ok(invoices) => invoices,
                Err(e) => {
                    error!("Scan query failed, skipping batch: {}", e);
                    summary.failed += 1;
                    continue;
                }
            };

            for invoice in invoices {
                summary.scanned += 1;
                match timeout(self.invoice_timeout, self.process_invoice(&invoice)).await {
                    Ok(Ok(true)) => summary.generated += 1,
                    Ok(Ok(false)) => {}
                    Ok(Err(())) => summary.failed += 1,
                    Err(_) => {
                        error!(
                            invoice = %invoice.filename,
                            "Invoice processing timed out after {:?}",
                            self.invoice_timeout
                        );
                        summary.failed += 1;
                    }
                }
            }
        }

        summary
    }

    /// Applies the per-invoice bound to a store listing query.
    async fn bounded(
        &self,
        query: impl std::future::Future<Output = PortResult<Vec<Invoice>>>,
    ) -> PortResult<Vec<Invoice>> {
        match timeout(self.invoice_timeout, query).await {
            Ok(result) => result,
            Err(_) => Err(PortError::Unexpected(format!(
                "query timed out after {:?}",
                self.invoice_timeout
            ))),
        }
    }

    /// Classifies and notifies for a single invoice. `Ok(true)` means a
    /// notification was generated and broadcast; the error case has already
    /// been logged.
    async fn process_invoice(&self, invoice: &Invoice) -> Result<bool, ()> {
        let today = self.clock.today();
        let status = classify(today, invoice.due_date, invoice.paid);

        match self.engine.generate(invoice, status).await {
            Ok(Some(notification)) => {
                let delivered = self
                    .broadcaster
                    .broadcast(ServerMessage::Notification { notification })
                    .await;
                info!(
                    invoice = %invoice.filename,
                    subscribers = delivered,
                    "Due-date notification generated"
                );
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => {
                error!(invoice = %invoice.filename, "Failed to process invoice: {}", e);
                Err(())
            }
        }
    }
}

/// How long to wait until the next occurrence of `scan_time`, given the
/// current local wall-clock time. If today's slot already passed, the next
/// run is tomorrow.
fn time_until_next_run(now_local: NaiveDateTime, scan_time: NaiveTime) -> std::time::Duration {
    let mut target_date = now_local.date();
    if now_local.time() >= scan_time {
        target_date += Duration::days(1);
    }
    let target = target_date.and_time(scan_time);
    (target - now_local).to_std().unwrap_or(std::time::Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use invoice_core::domain::{Notification, NotificationKind};
    use invoice_core::ports::{PortError, PortResult};
    use std::sync::Mutex;
    use uuid::Uuid;

    /// A clock pinned to one instant, in UTC (offset 0 in the tests).
    struct FixedClock {
        now: DateTime<Utc>,
    }

    impl FixedClock {
        fn at(date: NaiveDate) -> Self {
            let now = Utc.from_utc_datetime(&date.and_hms_opt(9, 0, 0).unwrap());
            Self { now }
        }
    }

    impl Clock for FixedClock {
        fn today(&self) -> NaiveDate {
            self.now.date_naive()
        }

        fn now(&self) -> DateTime<Utc> {
            self.now
        }
    }

    /// In-memory store seeded with invoices; insertion of notifications for
    /// a designated "poison" invoice fails, and for a designated "hang"
    /// invoice never resolves, to prove batch isolation.
    #[derive(Default)]
    struct SeededStore {
        invoices: Mutex<Vec<Invoice>>,
        notifications: Mutex<Vec<Notification>>,
        poison: Option<Uuid>,
        hang: Option<Uuid>,
    }

    impl SeededStore {
        fn with_invoices(invoices: Vec<Invoice>) -> Self {
            Self { invoices: Mutex::new(invoices), ..Default::default() }
        }

        fn notifications(&self) -> Vec<Notification> {
            self.notifications.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InvoiceStore for SeededStore {
        async fn create_invoice(&self, invoice: &Invoice) -> PortResult<()> {
            self.invoices.lock().unwrap().push(invoice.clone());
            Ok(())
        }

        async fn get_invoice(&self, invoice_id: Uuid) -> PortResult<Invoice> {
            self.invoices
                .lock()
                .unwrap()
                .iter()
                .find(|i| i.id == invoice_id)
                .cloned()
                .ok_or_else(|| PortError::NotFound(invoice_id.to_string()))
        }

        async fn list_invoices(&self) -> PortResult<Vec<Invoice>> {
            Ok(self.invoices.lock().unwrap().clone())
        }

        async fn mark_paid(&self, invoice_id: Uuid) -> PortResult<Invoice> {
            let mut invoices = self.invoices.lock().unwrap();
            let invoice = invoices
                .iter_mut()
                .find(|i| i.id == invoice_id)
                .ok_or_else(|| PortError::NotFound(invoice_id.to_string()))?;
            invoice.paid = true;
            Ok(invoice.clone())
        }

        async fn list_unpaid_due_on(&self, date: NaiveDate) -> PortResult<Vec<Invoice>> {
            Ok(self
                .invoices
                .lock()
                .unwrap()
                .iter()
                .filter(|i| !i.paid && i.due_date == date)
                .cloned()
                .collect())
        }

        async fn list_unpaid_overdue_before(&self, date: NaiveDate) -> PortResult<Vec<Invoice>> {
            Ok(self
                .invoices
                .lock()
                .unwrap()
                .iter()
                .filter(|i| !i.paid && i.due_date < date)
                .cloned()
                .collect())
        }

        async fn fire_due_soon(&self, invoice_id: Uuid, notification: &Notification) -> PortResult<bool> {
            if self.poison == Some(invoice_id) {
                return Err(PortError::Unexpected("store down".into()));
            }
            let mut invoices = self.invoices.lock().unwrap();
            let invoice = invoices
                .iter_mut()
                .find(|i| i.id == invoice_id && !i.notified_5d && !i.paid);
            match invoice {
                Some(invoice) => {
                    invoice.notified_5d = true;
                    self.notifications.lock().unwrap().push(notification.clone());
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn create_notification(&self, notification: &Notification) -> PortResult<()> {
            if self.poison == Some(notification.invoice_id) {
                return Err(PortError::Unexpected("store down".into()));
            }
            if self.hang == Some(notification.invoice_id) {
                std::future::pending::<()>().await;
            }
            self.notifications.lock().unwrap().push(notification.clone());
            Ok(())
        }

        async fn list_notifications(&self, _limit: i64, _unread_only: bool) -> PortResult<Vec<Notification>> {
            Ok(self.notifications())
        }

        async fn mark_notification_read(&self, _notification_id: Uuid) -> PortResult<()> {
            Ok(())
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn invoice(filename: &str, due: NaiveDate) -> Invoice {
        Invoice::new(filename.to_string(), due, None, None)
    }

    fn scanner_with(store: Arc<SeededStore>, today: NaiveDate) -> (Arc<DueDateScanner>, Arc<NotificationBroadcaster>) {
        let broadcaster = Arc::new(NotificationBroadcaster::new());
        let scanner = Arc::new(DueDateScanner::new(
            store,
            Arc::new(FixedClock::at(today)),
            broadcaster.clone(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            FixedOffset::east_opt(0).unwrap(),
            StdDuration::from_millis(100),
        ));
        (scanner, broadcaster)
    }

    #[tokio::test]
    async fn scan_covers_all_three_windows() {
        let today = day(2025, 6, 10);
        let store = Arc::new(SeededStore::with_invoices(vec![
            invoice("soon.xml", today + Duration::days(5)),
            invoice("today.xml", today),
            invoice("late.xml", today - Duration::days(3)),
            invoice("not_yet.xml", today + Duration::days(20)),
        ]));
        let (scanner, _) = scanner_with(store.clone(), today);

        let summary = scanner.run_once().await;
        assert_eq!(summary.scanned, 3);
        assert_eq!(summary.generated, 3);
        assert_eq!(summary.failed, 0);

        let kinds: Vec<NotificationKind> =
            store.notifications().iter().map(|n| n.kind).collect();
        assert!(kinds.contains(&NotificationKind::DueSoon));
        assert!(kinds.contains(&NotificationKind::DueToday));
        assert!(kinds.contains(&NotificationKind::Overdue));
    }

    #[tokio::test]
    async fn due_today_notification_is_broadcast_with_zero_days_left() {
        let today = day(2025, 6, 10);
        let store = Arc::new(SeededStore::with_invoices(vec![invoice("today.xml", today)]));
        let (scanner, broadcaster) = scanner_with(store.clone(), today);

        let (_id_a, mut rx_a) = broadcaster.subscribe().await;
        let (_id_b, mut rx_b) = broadcaster.subscribe().await;

        scanner.run_once().await;

        for rx in [&mut rx_a, &mut rx_b] {
            let ServerMessage::Notification { notification } = rx.recv().await.unwrap();
            assert_eq!(notification.kind, NotificationKind::DueToday);
            assert_eq!(notification.days_left, 0);
        }
    }

    #[tokio::test]
    async fn paid_invoices_generate_nothing() {
        let today = day(2025, 6, 10);
        let mut paid = invoice("paid.xml", today);
        paid.paid = true;
        let store = Arc::new(SeededStore::with_invoices(vec![paid]));
        let (scanner, _) = scanner_with(store.clone(), today);

        let summary = scanner.run_once().await;
        assert_eq!(summary.generated, 0);
        assert!(store.notifications().is_empty());
    }

    #[tokio::test]
    async fn one_failing_invoice_does_not_halt_the_batch() {
        let today = day(2025, 6, 10);
        let poisoned = invoice("poison.xml", today);
        let healthy = invoice("ok.xml", today);
        let store = Arc::new(SeededStore {
            poison: Some(poisoned.id),
            ..SeededStore::with_invoices(vec![poisoned, healthy])
        });
        let (scanner, _) = scanner_with(store.clone(), today);

        let summary = scanner.run_once().await;
        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.generated, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(store.notifications().len(), 1);
        assert_eq!(store.notifications()[0].invoice_id, store.invoices.lock().unwrap()[1].id);
    }

    #[tokio::test]
    async fn hung_store_call_times_out_and_the_batch_still_completes() {
        let today = day(2025, 6, 10);
        let stuck = invoice("stuck.xml", today);
        let healthy = invoice("ok.xml", today);
        let store = Arc::new(SeededStore {
            hang: Some(stuck.id),
            ..SeededStore::with_invoices(vec![stuck, healthy])
        });
        let (scanner, _) = scanner_with(store.clone(), today);

        // Without the per-invoice bound this await would never resolve.
        let summary = scanner.run_once().await;
        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.generated, 1);
        assert_eq!(summary.failed, 1);

        let notifications = store.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].invoice_id, store.invoices.lock().unwrap()[1].id);
    }

    #[tokio::test]
    async fn second_scan_same_day_latches_due_soon_but_duplicates_the_rest() {
        let today = day(2025, 6, 10);
        let store = Arc::new(SeededStore::with_invoices(vec![
            invoice("soon.xml", today + Duration::days(5)),
            invoice("today.xml", today),
            invoice("late.xml", today - Duration::days(1)),
        ]));
        let (scanner, _) = scanner_with(store.clone(), today);

        scanner.run_once().await;
        scanner.run_once().await;

        let notifications = store.notifications();
        let due_soon = notifications.iter().filter(|n| n.kind == NotificationKind::DueSoon).count();
        let due_today = notifications.iter().filter(|n| n.kind == NotificationKind::DueToday).count();
        let overdue = notifications.iter().filter(|n| n.kind == NotificationKind::Overdue).count();

        assert_eq!(due_soon, 1); // latched
        assert_eq!(due_today, 2); // duplicated by design
        assert_eq!(overdue, 2); // duplicated by design
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let today = day(2025, 6, 10);
        let store = Arc::new(SeededStore::default());
        let (scanner, _) = scanner_with(store, today);

        let handle = scanner.start();
        scanner.shutdown();
        handle.await.unwrap();
    }

    #[test]
    fn next_run_is_later_today_when_slot_has_not_passed() {
        let now = day(2025, 6, 10).and_hms_opt(7, 30, 0).unwrap();
        let scan_time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert_eq!(
            time_until_next_run(now, scan_time),
            std::time::Duration::from_secs(90 * 60)
        );
    }

    #[test]
    fn next_run_rolls_over_to_tomorrow_when_slot_passed() {
        let now = day(2025, 6, 10).and_hms_opt(9, 0, 0).unwrap();
        let scan_time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        // Exactly at the slot counts as passed: the run for today is the one
        // that just fired.
        assert_eq!(
            time_until_next_run(now, scan_time),
            std::time::Duration::from_secs(24 * 60 * 60)
        );
    }
}
