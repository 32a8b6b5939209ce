//! services/api/src/adapters/xml.rs
//!
//! Field extraction from uploaded invoice XML documents (FatturaPA layout).
//!
//! Extraction is deliberately lenient: tags are matched by case-insensitive
//! local-name suffix so namespace prefixes and vendor variations don't matter,
//! and every failure degrades to an advisory note instead of a hard error.

use chrono::NaiveDate;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;

/// Payment method codes that mean the invoice was already settled
/// (MP09 = RID, MP19 = SEPA direct debit).
const PAID_MARKERS: [&str; 2] = ["MP09", "MP19"];

/// The issuing company's own name; anagrafica values containing it belong to
/// the recipient side of the document, not the supplier.
const OWN_COMPANY_MARKER: &str = "FORTUNY";

/// Everything the extractor could read out of one uploaded document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParsedInvoice {
    pub filename: String,
    /// Raw text of the last DataScadenzaPagamento tag, if present.
    pub due_date_raw: Option<String>,
    /// The due date, when the raw text parsed as an ISO calendar date.
    pub due_date: Option<NaiveDate>,
    /// Text of the first Data tag (document issue date), kept as-is.
    pub issue_date: Option<String>,
    pub supplier: Option<String>,
    pub paid: bool,
    /// The matched MP09/MP19 snippets, for the frontend's detail view.
    pub payment_markers: Vec<String>,
    /// Advisory notes for fields that were missing or unparseable.
    pub notes: Vec<String>,
}

/// Extracts invoice fields from an XML document.
///
/// Never fails: malformed XML or missing tags only add advisory notes. The
/// caller decides what to do with a `ParsedInvoice` that has no `due_date`.
pub fn extract_invoice_fields(filename: &str, xml: &str) -> ParsedInvoice {
    let mut parsed = ParsedInvoice {
        filename: filename.to_string(),
        ..Default::default()
    };

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    // Stack of lowercased local tag names, for suffix matching on the
    // innermost element when a text node arrives.
    let mut stack: Vec<String> = Vec::new();
    // Depth of the anagrafica section we are currently inside, if any.
    let mut anagrafica_depth: Option<usize> = None;
    let mut saw_denominazione = false;
    let mut supplier_parts: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = local_name(e.name().as_ref());
                for attr in e.attributes().flatten() {
                    let value = String::from_utf8_lossy(&attr.value).to_string();
                    if contains_paid_marker(&value) {
                        parsed.payment_markers.push(value);
                    }
                }
                if name.ends_with("anagrafica") && anagrafica_depth.is_none() {
                    anagrafica_depth = Some(stack.len());
                    saw_denominazione = false;
                }
                stack.push(name);
            }
            Ok(Event::Empty(ref e)) => {
                // Self-closing elements carry no text but may carry markers
                // in their attributes.
                for attr in e.attributes().flatten() {
                    let value = String::from_utf8_lossy(&attr.value).to_string();
                    if contains_paid_marker(&value) {
                        parsed.payment_markers.push(value);
                    }
                }
            }
            Ok(Event::End(_)) => {
                stack.pop();
                if anagrafica_depth == Some(stack.len()) {
                    anagrafica_depth = None;
                }
            }
            Ok(Event::Text(ref t)) => {
                let value = match t.unescape() {
                    Ok(v) => v.trim().to_string(),
                    Err(_) => continue,
                };
                if value.is_empty() {
                    continue;
                }
                if contains_paid_marker(&value) {
                    parsed.payment_markers.push(value.clone());
                }

                let tag = match stack.last() {
                    Some(tag) => tag.as_str(),
                    None => continue,
                };

                // Documents with installment plans repeat DataScadenzaPagamento
                // once per rata; the last one is the final deadline.
                if tag.ends_with("datascadenzapagamento") {
                    parsed.due_date_raw = Some(value.clone());
                } else if tag.ends_with("data") && parsed.issue_date.is_none() {
                    parsed.issue_date = Some(value.clone());
                }

                if anagrafica_depth.is_some() {
                    let own_company = value.to_uppercase().contains(OWN_COMPANY_MARKER);
                    if tag.ends_with("denominazione") {
                        saw_denominazione = true;
                        if !own_company {
                            parsed.supplier = Some(value);
                        }
                    } else if !saw_denominazione && !own_company {
                        supplier_parts.push(value);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                parsed.notes.push(format!("document is not well-formed XML: {}", e));
                break;
            }
        }
    }

    // Fallback: no usable denominazione, concatenate the other anagrafica
    // values the way the original extraction did.
    if parsed.supplier.is_none() && !supplier_parts.is_empty() {
        parsed.supplier = Some(supplier_parts.join(" "));
    }

    parsed.paid = !parsed.payment_markers.is_empty();

    match &parsed.due_date_raw {
        None => parsed
            .notes
            .push("no DataScadenzaPagamento tag found, due date needs manual review".to_string()),
        Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => parsed.due_date = Some(date),
            Err(_) => parsed
                .notes
                .push(format!("due date '{}' is not a valid calendar date", raw)),
        },
    }

    parsed
}

/// Lowercased tag name with any namespace prefix stripped.
fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    name.rsplit(':').next().unwrap_or(&name).to_lowercase()
}

fn contains_paid_marker(value: &str) -> bool {
    PAID_MARKERS.iter().any(|m| value.contains(m))
}
