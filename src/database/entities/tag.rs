//! Tag entity

use crate::domain::tag::Tag;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tags")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = false)]
	pub guid: Uuid,
	pub name: String,
	#[sea_orm(indexed)]
	pub vts: String,
	#[sea_orm(indexed)]
	pub section: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(
		belongs_to = "super::section::Entity",
		from = "Column::Section",
		to = "super::section::Column::Name"
	)]
	Section,
}

impl Related<super::section::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::Section.def()
	}
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Tag> for ActiveModel {
	fn from(tag: &Tag) -> Self {
		use sea_orm::ActiveValue::Set;
		Self {
			guid: Set(tag.guid),
			name: Set(tag.name.clone()),
			vts: Set(tag.vts_name.clone()),
			section: Set(tag.section_name.clone()),
		}
	}
}

impl From<Model> for Tag {
	fn from(model: Model) -> Self {
		Tag {
			guid: model.guid,
			name: model.name,
			vts_name: model.vts,
			section_name: model.section,
		}
	}
}
