pub mod alert_ai_insight;
pub mod alert_instance;
pub mod alert_rule;
