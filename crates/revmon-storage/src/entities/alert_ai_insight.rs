use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_ai_insights")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub alert_instance_id: String,
    pub model: String,
    pub prompt_hash: String,
    pub insight_md: String,
    pub actions_json: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::alert_instance::Entity",
        from = "Column::AlertInstanceId",
        to = "super::alert_instance::Column::Id",
        on_delete = "Cascade"
    )]
    AlertInstance,
}

impl Related<super::alert_instance::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AlertInstance.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
