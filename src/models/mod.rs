pub mod event;
pub mod indicator;
pub mod period;
pub mod report;

pub use event::{AdverseEvent, EventType, Notification, NotificationFilter};
pub use indicator::{
    ComplianceIndicator, FallRiskAssessment, HandHygieneAssessment, Indicator, IndicatorKind,
    IndicatorRecord, MedicationCompliance, MetaCompliance, PressureInjuryRiskAssessment,
    RecordHeader, RiskCounts, RiskPercentages, RiskRecord, RiskScale, SelfNotification,
};
pub use period::{NewPeriod, Period, PeriodId, PeriodStatus, PeriodSummary, SectorId, UserId};
pub use report::{
    CumulativeReport, FallRiskSummary, HandHygieneSummary, PanelReport, PeriodReport,
    PressureInjurySummary, RiskSummary,
};
