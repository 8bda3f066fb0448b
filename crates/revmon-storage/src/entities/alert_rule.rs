use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_rules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub rule_type: String,
    pub tenant_id: Option<String>,
    pub content_type: Option<String>,
    pub content_key: Option<String>,
    pub params_json: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::alert_instance::Entity")]
    AlertInstance,
}

impl Related<super::alert_instance::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AlertInstance.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
