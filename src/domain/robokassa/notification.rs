//! Inbound gateway callbacks.
//!
//! Result notifications and success redirects carry the same fields:
//! `OutSum`, `InvId`, `SignatureValue`, an optional `IsTest` marker and any
//! number of `Shp_` correlation fields. Field names are matched ignoring
//! ASCII case.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::domain::foundation::{InvoiceId, ValidationError};
use crate::domain::payment::{Amount, CorrelationBag, PaymentError};

pub const OUT_SUM_FIELD: &str = "OutSum";
pub const INVOICE_ID_FIELD: &str = "InvId";
pub const SIGNATURE_FIELD: &str = "SignatureValue";
pub const TEST_MODE_FIELD: &str = "IsTest";

/// A parsed, not yet authenticated, gateway callback.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayCallback {
    pub invoice_id: InvoiceId,
    pub amount: Amount,
    /// `OutSum` exactly as transmitted; the gateway signs this text.
    pub out_sum: String,
    pub signature: String,
    pub is_test: bool,
    pub correlation: CorrelationBag,
    fields: BTreeMap<String, String>,
}

impl GatewayCallback {
    /// Parses and range-checks a form-encoded callback.
    ///
    /// # Errors
    ///
    /// `Validation` for a missing or malformed amount, invoice ID, signature
    /// or test marker.
    pub fn from_form(fields: BTreeMap<String, String>) -> Result<Self, PaymentError> {
        let out_sum = required(&fields, OUT_SUM_FIELD)?.to_string();
        let amount = Amount::parse(&out_sum)?;
        let invoice_id = InvoiceId::parse(required(&fields, INVOICE_ID_FIELD)?)?;
        let signature = required(&fields, SIGNATURE_FIELD)?.to_string();
        let is_test = parse_test_marker(field(&fields, TEST_MODE_FIELD))?;
        let correlation = CorrelationBag::from_fields(&fields);

        Ok(Self {
            invoice_id,
            amount,
            out_sum,
            signature,
            is_test,
            correlation,
            fields,
        })
    }

    /// The received fields as a JSON object, for audit.
    pub fn to_payload(&self) -> JsonValue {
        JsonValue::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
                .collect(),
        )
    }
}

fn field<'a>(fields: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn required<'a>(
    fields: &'a BTreeMap<String, String>,
    name: &'static str,
) -> Result<&'a str, ValidationError> {
    match field(fields, name) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ValidationError::empty_field(name)),
    }
}

fn parse_test_marker(value: Option<&str>) -> Result<bool, ValidationError> {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("0") | Some("false") => Ok(false),
        Some("1") | Some("true") => Ok(true),
        Some(other) => Err(ValidationError::invalid_format(
            TEST_MODE_FIELD,
            format!("unrecognized test marker '{}'", other),
        )),
    }
}
