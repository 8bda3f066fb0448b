use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The only `content_type` the metrics backends know how to filter on.
pub const SUPPORTED_CONTENT_TYPE: &str = "test";

/// Kind of alert rule.
///
/// Values that are not recognised are kept verbatim in [`AlertRuleType::Other`]
/// so that rows written by a newer deployment still load; the engine treats
/// them as unsupported instead of failing.
///
/// # Examples
///
/// ```
/// use revmon_common::types::AlertRuleType;
///
/// let rt: AlertRuleType = "traffic_spike".into();
/// assert_eq!(rt, AlertRuleType::TrafficSpike);
/// assert_eq!(rt.as_str(), "traffic_spike");
/// assert!(!AlertRuleType::from("cohort_decay").is_known());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AlertRuleType {
    ConversionDrop,
    RevenueDrop,
    RefundSpike,
    TrafficSpike,
    DataFreshnessFail,
    Other(String),
}

impl AlertRuleType {
    pub const KNOWN: [AlertRuleType; 5] = [
        AlertRuleType::ConversionDrop,
        AlertRuleType::RevenueDrop,
        AlertRuleType::RefundSpike,
        AlertRuleType::TrafficSpike,
        AlertRuleType::DataFreshnessFail,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::ConversionDrop => "conversion_drop",
            Self::RevenueDrop => "revenue_drop",
            Self::RefundSpike => "refund_spike",
            Self::TrafficSpike => "traffic_spike",
            Self::DataFreshnessFail => "data_freshness_fail",
            Self::Other(s) => s,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// Strict parse used when accepting new rule definitions.
    pub fn parse_known(s: &str) -> Option<Self> {
        let parsed = Self::from(s);
        parsed.is_known().then_some(parsed)
    }
}

impl From<&str> for AlertRuleType {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "conversion_drop" => Self::ConversionDrop,
            "revenue_drop" => Self::RevenueDrop,
            "refund_spike" => Self::RefundSpike,
            "traffic_spike" => Self::TrafficSpike,
            "data_freshness_fail" => Self::DataFreshnessFail,
            _ => Self::Other(s.trim().to_string()),
        }
    }
}

impl From<String> for AlertRuleType {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<AlertRuleType> for String {
    fn from(rt: AlertRuleType) -> Self {
        rt.as_str().to_string()
    }
}

impl std::fmt::Display for AlertRuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use revmon_common::types::Severity;
///
/// let sev: Severity = "warn".parse().unwrap();
/// assert_eq!(sev, Severity::Warn);
/// assert_eq!(sev.to_string(), "warn");
/// assert!(Severity::Critical > Severity::Info);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warn => write!(f, "warn"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warn" => Ok(Severity::Warn),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Lifecycle of an alert instance. Transitions only move forward:
/// `open -> acknowledged -> resolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }

    /// Re-applying the current status is allowed and is a no-op.
    pub fn can_transition_to(&self, next: InstanceStatus) -> bool {
        next >= *self
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "acknowledged" => Ok(Self::Acknowledged),
            "resolved" => Ok(Self::Resolved),
            _ => Err(format!("unknown alert status: {s}")),
        }
    }
}

/// Narrows a rule to a tenant and/or a single content item. `None` fields
/// widen the scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertScope {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub content_key: Option<String>,
}

impl AlertScope {
    /// Trims every field, turns blank strings into `None` and lower-cases
    /// `content_type`.
    pub fn normalized(&self) -> Self {
        Self {
            tenant_id: non_empty(self.tenant_id.as_deref()),
            content_type: non_empty(self.content_type.as_deref()).map(|s| s.to_lowercase()),
            content_key: non_empty(self.content_key.as_deref()),
        }
    }

    /// Normalization applied when a scope is written: a bare `content_key`
    /// implies the supported content type.
    pub fn normalized_for_storage(&self) -> Self {
        let mut scope = self.normalized();
        if scope.content_type.is_none() && scope.content_key.is_some() {
            scope.content_type = Some(SUPPORTED_CONTENT_TYPE.to_string());
        }
        scope
    }

    /// A scope naming a content type other than [`SUPPORTED_CONTENT_TYPE`]
    /// cannot be queried by any backend.
    pub fn is_supported(&self) -> bool {
        match self.content_type.as_deref() {
            None => true,
            Some(ct) => ct == SUPPORTED_CONTENT_TYPE,
        }
    }
}

/// Trims `value` and returns `None` when nothing is left.
pub fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// An alert rule definition as stored in `alert_rules`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub rule_type: AlertRuleType,
    pub scope: AlertScope,
    /// Free-form numeric tuning knobs, parsed into typed params at
    /// evaluation time.
    pub params: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A fired alert, joined with the owning rule's name and type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertInstance {
    pub id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub rule_type: AlertRuleType,
    pub status: InstanceStatus,
    pub severity: Severity,
    pub fired_at: DateTime<Utc>,
    /// Frozen snapshot of the metrics and thresholds that caused the fire.
    pub context_json: Value,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

/// An alert instance together with the scope and params of its rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertInstanceWithRule {
    #[serde(flatten)]
    pub instance: AlertInstance,
    pub scope: AlertScope,
    pub params: Map<String, Value>,
}

/// LLM-generated explanation of an alert instance (one per instance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertAiInsight {
    pub alert_instance_id: String,
    pub model: String,
    pub prompt_hash: String,
    pub insight_md: String,
    pub actions_json: Value,
    pub created_at: DateTime<Utc>,
}
