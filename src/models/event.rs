use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PanelError, Result};
use crate::models::indicator::RecordHeader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    PressureInjury,
    CvcLoss,
    EnteralTube,
    CardiorespiratoryArrest,
    Fall,
    AccidentalExtubation,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PressureInjury => "PRESSURE_INJURY",
            EventType::CvcLoss => "CVC_LOSS",
            EventType::EnteralTube => "ENTERAL_TUBE",
            EventType::CardiorespiratoryArrest => "CARDIORESPIRATORY_ARREST",
            EventType::Fall => "FALL",
            EventType::AccidentalExtubation => "ACCIDENTAL_EXTUBATION",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PRESSURE_INJURY" => Ok(EventType::PressureInjury),
            "CVC_LOSS" => Ok(EventType::CvcLoss),
            "ENTERAL_TUBE" => Ok(EventType::EnteralTube),
            "CARDIORESPIRATORY_ARREST" => Ok(EventType::CardiorespiratoryArrest),
            "FALL" => Ok(EventType::Fall),
            "ACCIDENTAL_EXTUBATION" => Ok(EventType::AccidentalExtubation),
            other => Err(PanelError::Decode(format!("unknown event type: {}", other))),
        }
    }
}

/// An adverse event recorded against a period. Reports list these sorted by
/// `event_date`, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdverseEvent {
    #[serde(flatten)]
    pub header: RecordHeader,
    pub event_date: NaiveDate,
    pub event_type: EventType,
    pub description: String,
    pub quantity_cases: u32,
    pub quantity_notifications: u32,
}

impl AdverseEvent {
    pub fn validate(&self) -> Result<()> {
        if self.description.trim().is_empty() {
            return Err(PanelError::validation("adverse event description is required"));
        }
        Ok(())
    }
}

/// A notification filed within a period. The classification and the
/// professional category are references into external catalogues, each with
/// a free-text fallback when no catalogue entry fits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(flatten)]
    pub header: RecordHeader,
    pub classification_id: Option<Uuid>,
    pub classification_text: Option<String>,
    pub professional_category_id: Option<Uuid>,
    pub professional_category_text: Option<String>,
    pub description: String,
    pub quantity: u32,
}

impl Notification {
    pub fn validate(&self) -> Result<()> {
        if self.description.trim().is_empty() {
            return Err(PanelError::validation("notification description is required"));
        }
        if self.classification_id.is_none() && blank(&self.classification_text) {
            return Err(PanelError::validation(
                "notification needs a classification or a classification text",
            ));
        }
        Ok(())
    }
}

/// Narrows a period's notifications. Both criteria are optional; the
/// category matches case-insensitively anywhere in the category text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationFilter {
    pub classification_id: Option<Uuid>,
    pub category: Option<String>,
}

impl NotificationFilter {
    pub fn matches(&self, notification: &Notification) -> bool {
        if self.classification_id.is_some() && notification.classification_id != self.classification_id {
            return false;
        }
        match self.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(category) => notification
                .professional_category_text
                .as_deref()
                .is_some_and(|text| text.to_lowercase().contains(&category.to_lowercase())),
            None => true,
        }
    }
}

fn blank(text: &Option<String>) -> bool {
    text.as_deref().map(str::trim).unwrap_or_default().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn notification(classification_text: Option<&str>) -> Notification {
        Notification {
            header: RecordHeader::new(Uuid::new_v4(), Uuid::new_v4(), Utc::now()),
            classification_id: None,
            classification_text: classification_text.map(str::to_owned),
            professional_category_id: None,
            professional_category_text: Some("Nursing".into()),
            description: "Wrong patient label on sample".into(),
            quantity: 1,
        }
    }

    #[test]
    fn notification_needs_some_classification() {
        assert!(notification(Some("Identification")).validate().is_ok());
        assert!(notification(Some("  ")).validate().is_err());
        assert!(notification(None).validate().is_err());

        let mut by_reference = notification(None);
        by_reference.classification_id = Some(Uuid::new_v4());
        assert!(by_reference.validate().is_ok());
    }

    #[test]
    fn filter_matches_classification_and_category_fragment() {
        let classification = Uuid::new_v4();
        let mut filed = notification(Some("Identification"));
        filed.classification_id = Some(classification);

        assert!(NotificationFilter::default().matches(&filed));
        assert!(NotificationFilter {
            classification_id: Some(classification),
            category: Some("nurs".into()),
        }
        .matches(&filed));
        assert!(!NotificationFilter {
            classification_id: Some(Uuid::new_v4()),
            category: None,
        }
        .matches(&filed));
        assert!(!NotificationFilter {
            classification_id: None,
            category: Some("Pharmacy".into()),
        }
        .matches(&filed));

        filed.professional_category_text = None;
        assert!(!NotificationFilter { classification_id: None, category: Some("nurs".into()) }.matches(&filed));
    }

    #[test]
    fn event_type_text_matches_serde() {
        let json = serde_json::to_string(&EventType::CardiorespiratoryArrest).unwrap();
        assert_eq!(json, "\"CARDIORESPIRATORY_ARREST\"");
        assert_eq!("CVC_LOSS".parse::<EventType>().unwrap(), EventType::CvcLoss);
    }
}
