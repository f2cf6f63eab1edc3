// 🔎 Invoice Matcher - CFDI issuer → supplier → candidate contracts → line items
//
// Read-only against the catalog. Each query opens its own connection.

use crate::db::Store;
use crate::entities::line_item::{contracts_for_supplier, line_items_for_contract};
use crate::entities::supplier::find_supplier;
use crate::entities::{LineItemOption, Supplier};
use crate::error::{LookupFailure, Result};
use crate::normalize::normalize;
use crate::xml::{parse_xml, XmlValue};
use serde::Serialize;
use tracing::{debug, info};

/// Location of the issuer tax id inside an extracted CFDI
const ISSUER_RFC_PATH: [&str; 3] = ["Comprobante", "Emisor", "Rfc"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceMatch {
    pub issuer_rfc: String,
    pub issuer: Supplier,
    /// Candidate contracts, in first-stored order
    pub contracts: Vec<String>,
}

pub struct InvoiceMatcher {
    store: Store,
}

impl InvoiceMatcher {
    pub fn new(store: Store) -> Self {
        InvoiceMatcher { store }
    }

    /// Parse, extract and match a raw CFDI document
    pub fn process_invoice(&self, bytes: &[u8]) -> Result<InvoiceMatch> {
        let root = parse_xml(bytes)?;
        let document = XmlValue::from_document(&root);
        self.match_invoice(&document)
    }

    pub fn match_invoice(&self, document: &XmlValue) -> Result<InvoiceMatch> {
        let rfc = issuer_rfc(document).ok_or(LookupFailure::IdentifierNotFound)?;
        debug!(rfc = %rfc, "issuer extracted");

        let conn = self.store.connect()?;

        let issuer = find_supplier(&conn, &rfc)?
            .ok_or_else(|| LookupFailure::UnknownIssuer { rfc: rfc.clone() })?;

        let contracts = contracts_for_supplier(&conn, &rfc)?;
        if contracts.is_empty() {
            return Err(LookupFailure::NoAssociatedContracts { rfc }.into());
        }

        info!(rfc = %rfc, contracts = contracts.len(), "invoice matched");
        Ok(InvoiceMatch {
            issuer_rfc: rfc,
            issuer,
            contracts,
        })
    }

    /// Line items under one contract; an empty answer is a lookup failure
    pub fn line_items(&self, contract_number: &str) -> Result<Vec<LineItemOption>> {
        let contract = normalize(contract_number);
        let conn = self.store.connect()?;

        let items = line_items_for_contract(&conn, &contract)?;
        if items.is_empty() {
            return Err(LookupFailure::NoLineItems { contract }.into());
        }
        Ok(items)
    }
}

/// Canonical issuer RFC, if the invoice carries a non-blank one
pub fn issuer_rfc(document: &XmlValue) -> Option<String> {
    let raw = document.path(&ISSUER_RFC_PATH)?.as_text()?;
    let rfc = normalize(raw);
    if rfc.is_empty() {
        None
    } else {
        Some(rfc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{CatalogEntity, LineItem};
    use crate::error::CatalogError;
    use tempfile::TempDir;

    fn invoice(rfc_attr: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<cfdi:Comprobante xmlns:cfdi="http://www.sat.gob.mx/cfd/4" Version="4.0">
  <cfdi:Emisor {} Nombre="PAPELERIA LOPEZ"/>
  <cfdi:Receptor Rfc="XAXX010101000"/>
</cfdi:Comprobante>"#,
            rfc_attr
        )
    }

    fn seeded() -> (TempDir, InvoiceMatcher) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("catalog.db")).unwrap();
        let conn = store.connect().unwrap();

        Supplier {
            rfc: "AAA010101AAA".to_string(),
            legal_name: Some("PAPELERIA LOPEZ".to_string()),
            person_type: None,
            phone: None,
            email: None,
            status: None,
        }
        .insert_if_absent(&conn, 2)
        .unwrap();
        Supplier {
            rfc: "BBB010101BBB".to_string(),
            legal_name: None,
            person_type: None,
            phone: None,
            email: None,
            status: None,
        }
        .insert_if_absent(&conn, 3)
        .unwrap();

        for (contract, code) in [("C-002", "2110"), ("C-001", "2110"), ("C-002", "2120")] {
            LineItem {
                contract_number: contract.to_string(),
                line_item_code: code.to_string(),
                short_description: Some(format!("PARTIDA {}", code)),
                assigned_amount: 0.0,
                supplier_rfc: Some("AAA010101AAA".to_string()),
            }
            .insert_if_absent(&conn, 2)
            .unwrap();
        }
        drop(conn);

        (dir, InvoiceMatcher::new(store))
    }

    fn lookup_failure(err: CatalogError) -> LookupFailure {
        match err {
            CatalogError::Lookup(failure) => failure,
            other => panic!("expected a lookup failure, got {:?}", other),
        }
    }

    #[test]
    fn test_match_known_issuer() {
        let (_dir, matcher) = seeded();
        let matched = matcher.process_invoice(invoice(r#"Rfc="aaa010101aaa""#).as_bytes()).unwrap();

        assert_eq!(matched.issuer_rfc, "AAA010101AAA");
        assert_eq!(matched.issuer.legal_name.as_deref(), Some("PAPELERIA LOPEZ"));
        assert_eq!(matched.contracts, vec!["C-002", "C-001"]);
    }

    #[test]
    fn test_missing_rfc_attribute() {
        let (_dir, matcher) = seeded();
        let err = matcher.process_invoice(invoice("").as_bytes()).unwrap_err();
        assert_eq!(lookup_failure(err), LookupFailure::IdentifierNotFound);

        let err = matcher.process_invoice(invoice(r#"Rfc="  ""#).as_bytes()).unwrap_err();
        assert_eq!(lookup_failure(err), LookupFailure::IdentifierNotFound);
    }

    #[test]
    fn test_missing_issuer_element() {
        let (_dir, matcher) = seeded();
        let err = matcher
            .process_invoice(br#"<Comprobante><Receptor Rfc="X"/></Comprobante>"#)
            .unwrap_err();
        assert_eq!(lookup_failure(err), LookupFailure::IdentifierNotFound);
    }

    #[test]
    fn test_unknown_issuer() {
        let (_dir, matcher) = seeded();
        let err = matcher.process_invoice(invoice(r#"Rfc="ZZZ999999ZZZ""#).as_bytes()).unwrap_err();
        assert_eq!(
            lookup_failure(err),
            LookupFailure::UnknownIssuer {
                rfc: "ZZZ999999ZZZ".to_string()
            }
        );
    }

    #[test]
    fn test_known_issuer_without_contracts() {
        let (_dir, matcher) = seeded();
        let err = matcher.process_invoice(invoice(r#"Rfc="BBB010101BBB""#).as_bytes()).unwrap_err();
        assert_eq!(
            lookup_failure(err),
            LookupFailure::NoAssociatedContracts {
                rfc: "BBB010101BBB".to_string()
            }
        );
    }

    #[test]
    fn test_malformed_invoice_is_input_error() {
        let (_dir, matcher) = seeded();
        let err = matcher.process_invoice(b"<Comprobante><Emisor>").unwrap_err();
        assert!(matches!(err, CatalogError::MalformedXml(_)));
    }

    #[test]
    fn test_line_items_query() {
        let (_dir, matcher) = seeded();

        let items = matcher.line_items(" c-002 ").unwrap();
        let codes: Vec<&str> = items.iter().map(|i| i.line_item_code.as_str()).collect();
        assert_eq!(codes, vec!["2110", "2120"]);

        let err = matcher.line_items("C-404").unwrap_err();
        assert_eq!(
            lookup_failure(err),
            LookupFailure::NoLineItems {
                contract: "C-404".to_string()
            }
        );
    }
}
