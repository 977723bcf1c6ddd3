//! `ClinicalFlagsWidget`: a patient's clinical flags, or a name echo.
//!
//! Properties:
//! - `displayName` (string): when set, only the name is echoed back
//! - `patientId` (string)
//! - `flags` (list of [`ClinicalFlag`]); a sample list is shown when absent
//! - `activeFlag` (string): id of the flag the user picked; reported once per
//!   render through `onFlagClick`
//! - `onFlagClick` (callback): receives the picked flag as JSON

use std::sync::Arc;

use fedkit::{Node, Properties, Unit, UnitError};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PATIENT_ID: &str = "demo-patient-001";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagType {
    Critical,
    Warning,
    Info,
}

impl FlagType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalFlag {
    pub id: String,
    #[serde(rename = "type")]
    pub flag_type: FlagType,
    pub message: String,
    /// RFC 3339 timestamp
    pub timestamp: String,
    pub patient_id: String,
}

impl ClinicalFlag {
    fn new(id: &str, flag_type: FlagType, message: &str, timestamp: &str) -> Self {
        Self {
            id: id.to_owned(),
            flag_type,
            message: message.to_owned(),
            timestamp: timestamp.to_owned(),
            patient_id: DEFAULT_PATIENT_ID.to_owned(),
        }
    }
}

#[must_use]
pub fn sample_flags() -> Vec<ClinicalFlag> {
    vec![
        ClinicalFlag::new(
            "1",
            FlagType::Critical,
            "High blood pressure reading requires immediate attention",
            "2025-10-01T14:30:00Z",
        ),
        ClinicalFlag::new(
            "2",
            FlagType::Warning,
            "Patient has missed last 2 scheduled appointments",
            "2025-10-01T13:15:00Z",
        ),
        ClinicalFlag::new(
            "3",
            FlagType::Info,
            "New lab results available for review",
            "2025-10-01T12:00:00Z",
        ),
    ]
}

#[derive(Debug, Default)]
pub struct ClinicalFlagsWidget;

impl ClinicalFlagsWidget {
    /// Factory registered in the host's unit catalog.
    ///
    /// # Errors
    /// Never fails; the signature matches [`fedkit::UnitFactory`].
    #[allow(clippy::unnecessary_wraps)]
    pub fn create() -> Result<Arc<dyn Unit>, UnitError> {
        Ok(Arc::new(Self))
    }

    fn flags(props: &Properties) -> Result<Vec<ClinicalFlag>, UnitError> {
        match props.value("flags") {
            None => Ok(sample_flags()),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| UnitError::new(format!("invalid flags property: {e}"))),
        }
    }

    fn name_echo(display_name: &str) -> Node {
        Node::element("section")
            .attr("class", "clinical-flags-widget")
            .attr("aria-label", "Clinical Flags Communication Demo")
            .child(Node::element("h3").child(Node::text("Remote Widget")))
            .child(Node::element("p").child(Node::text("Display Name")))
            .child(
                Node::element("p")
                    .attr("data-testid", "display-name")
                    .child(Node::text(display_name)),
            )
    }

    fn flag_item(flag: &ClinicalFlag, active: bool) -> Node {
        let mut button = Node::element("button")
            .attr("type", "button")
            .attr("data-flag-id", &flag.id)
            .attr("data-flag-type", flag.flag_type.as_str())
            .attr(
                "aria-label",
                format!("Flag {}: {}", flag.flag_type.as_str(), flag.message),
            );
        if active {
            button = button.attr("aria-pressed", "true");
        }
        Node::element("li").child(
            button
                .child(Node::element("p").child(Node::text(&flag.message)))
                .child(
                    Node::element("time")
                        .attr("datetime", &flag.timestamp)
                        .child(Node::text(&flag.timestamp)),
                ),
        )
    }

    fn report_active(props: &Properties, flags: &[ClinicalFlag]) -> Result<Option<String>, UnitError> {
        let Some(active) = props.str("activeFlag") else {
            return Ok(None);
        };
        let Some(flag) = flags.iter().find(|flag| flag.id == active) else {
            return Err(UnitError::new(format!("active flag '{active}' is not listed")));
        };
        if let Some(callback) = props.callback("onFlagClick") {
            let payload = serde_json::to_value(flag)
                .map_err(|e| UnitError::new(format!("cannot encode flag: {e}")))?;
            callback.invoke(payload);
        }
        Ok(Some(flag.id.clone()))
    }
}

impl Unit for ClinicalFlagsWidget {
    fn render(&self, props: &Properties) -> Result<Node, UnitError> {
        if let Some(display_name) = props.str("displayName").filter(|name| !name.is_empty()) {
            return Ok(Self::name_echo(display_name));
        }

        let patient_id = props.str("patientId").unwrap_or(DEFAULT_PATIENT_ID);
        let flags = Self::flags(props)?;
        let active = Self::report_active(props, &flags)?;

        let header = Node::element("header")
            .child(Node::element("h3").child(Node::text("Clinical Flags")))
            .child(Node::element("p").child(Node::text(format!(
                "Patient {patient_id} - {} active",
                flags.len()
            ))));

        let body = if flags.is_empty() {
            Node::element("div")
                .attr("class", "clinical-flags-empty")
                .child(Node::text("No clinical flags."))
        } else {
            Node::element("ul")
                .attr("role", "list")
                .attr("aria-label", "Clinical flag list")
                .children(
                    flags
                        .iter()
                        .map(|flag| Self::flag_item(flag, active.as_deref() == Some(flag.id.as_str()))),
                )
        };

        Ok(Node::element("section")
            .attr("class", "clinical-flags-widget")
            .attr("aria-label", "Clinical Flags")
            .attr("data-patient-id", patient_id)
            .child(header)
            .child(body)
            .child(
                Node::element("footer")
                    .child(Node::text("Isolated micro-frontend component")),
            ))
    }
}
