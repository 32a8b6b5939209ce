pub mod amount;
pub mod clock;
pub mod db;
pub mod xml;

pub use amount::OllamaAmountAdapter;
pub use clock::SystemClock;
pub use db::DbAdapter;
pub use xml::{extract_invoice_fields, ParsedInvoice};
