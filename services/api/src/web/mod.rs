pub mod broadcast;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

// Re-export the main WebSocket handler to make it easily accessible
// to the binary that will build the web server router.
pub use rest::{
    health_handler, list_invoices_handler, list_notifications_handler, mark_notification_read_handler,
    mark_paid_handler, upload_invoice_handler,
};
pub use ws_handler::ws_handler;
