use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_instances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub rule_id: String,
    pub status: String,
    pub severity: String,
    pub fired_at: DateTimeWithTimeZone,
    pub context_json: String,
    #[sea_orm(unique)]
    pub fingerprint: String,
    /// Copied from `context_json.tenant_id` so listings can filter by tenant.
    pub tenant_id: Option<String>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::alert_rule::Entity",
        from = "Column::RuleId",
        to = "super::alert_rule::Column::Id",
        on_delete = "Cascade"
    )]
    AlertRule,
    #[sea_orm(has_one = "super::alert_ai_insight::Entity")]
    AlertAiInsight,
}

impl Related<super::alert_rule::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AlertRule.def()
    }
}

impl Related<super::alert_ai_insight::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AlertAiInsight.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
