//! User-visible failure payload rendered in place of an unavailable unit.
//!
//! Modelled after a problem-details document: a fixed title, a per-kind
//! detail line and a machine-readable code, plus the remote and unit names.
//! Negotiation internals, sources and panic messages never appear here.

use serde::Serialize;

use crate::error::{FailureKind, LoadError};
use crate::view::Node;

pub const FAILURE_TITLE: &str = "Federated component unavailable";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[must_use]
pub struct FailureNotice {
    pub title: String,
    pub detail: String,
    pub code: String,
    pub remote: String,
    pub unit: String,
}

impl FailureNotice {
    pub fn new(kind: FailureKind) -> Self {
        Self {
            title: FAILURE_TITLE.to_owned(),
            detail: kind.message().to_owned(),
            code: kind.code().to_owned(),
            remote: String::new(),
            unit: String::new(),
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Notice for a load or render failure of `unit`.
    pub fn from_error(error: &LoadError, unit: &str) -> Self {
        Self::new(error.kind())
            .with_remote(error.remote())
            .with_unit(unit)
    }

    /// Fallback output shown where the unit would have rendered.
    #[must_use]
    pub fn to_node(&self) -> Node {
        Node::element("div")
            .attr("class", "federation-error")
            .attr("role", "alert")
            .attr("data-code", &self.code)
            .attr("data-remote", &self.remote)
            .attr("data-unit", &self.unit)
            .child(Node::element("strong").child(Node::text(&self.title)))
            .child(Node::element("p").child(Node::text(&self.detail)))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn notice_carries_kind_remote_and_unit() {
        let err = LoadError::UnknownRemote {
            remote: "billing".to_owned(),
        };
        let notice = FailureNotice::from_error(&err, "InvoiceList");

        assert_eq!(notice.code, "unknown_remote");
        assert_eq!(notice.remote, "billing");
        assert_eq!(notice.unit, "InvoiceList");
        assert_eq!(notice.detail, FailureKind::UnknownRemote.message());
    }

    #[test]
    fn detail_hides_internal_messages() {
        let err = LoadError::RenderFault {
            remote: "clinical".to_owned(),
            unit: "ClinicalFlagsWidget".to_owned(),
            message: "panicked: index out of bounds".to_owned(),
        };
        let node = FailureNotice::from_error(&err, "ClinicalFlagsWidget").to_node();

        let text = node.text_content();
        assert!(text.contains(FAILURE_TITLE));
        assert!(!text.contains("index out of bounds"));
        assert_eq!(node.attr_value("data-code"), Some("render_fault"));
    }

    #[test]
    fn serializes_as_flat_document() {
        let notice = FailureNotice::new(FailureKind::NetworkError).with_remote("clinical");
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["code"], "network_error");
        assert_eq!(json["remote"], "clinical");
    }
}
