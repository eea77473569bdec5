//! Normalizer: turns stored [`CompanyDocument`]s into [`CompanyRecord`]s.
//!
//! Dates arrive either as native timestamps or as plain strings depending on
//! how the document was written. Timestamps are reduced to their UTC calendar
//! date; strings pass through untouched.

use crate::types::{CompanyDocument, CompanyField, CompanyRecord, StoredValue};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Normalise a stored `lastEngagementDate` value.
pub fn normalize_engagement_date(value: Option<&StoredValue>) -> Option<String> {
    match value? {
        StoredValue::Null => None,
        StoredValue::Timestamp(ts) => Some(ts.format(DATE_FORMAT).to_string()),
        StoredValue::String(s) => Some(s.clone()),
        other => {
            tracing::debug!(?other, "ignoring non-date lastEngagementDate");
            None
        }
    }
}

/// Convert a stored document into the output record shape.
pub fn normalize_document(doc: &CompanyDocument) -> CompanyRecord {
    let text = |field: CompanyField| match doc.get(field.as_str()) {
        None => String::new(),
        Some(StoredValue::String(s)) => s.clone(),
        Some(other) => other.to_json().to_string(),
    };

    CompanyRecord {
        id: doc.id.clone(),
        name: text(CompanyField::Name),
        town: text(CompanyField::Town),
        sector: text(CompanyField::Sector),
        status: text(CompanyField::Status),
        last_engagement_date: normalize_engagement_date(
            doc.get(CompanyField::LastEngagementDate.as_str()),
        ),
    }
}
