//! Section entity
//!
//! Path roots and filters are ordered lists, stored as JSON columns.

use crate::domain::section::Section;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sections")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = false)]
	pub name: String,
	#[sea_orm(column_type = "Json")]
	pub path: Json,
	#[sea_orm(column_type = "Json")]
	pub filters: Json,
	pub converters: String,
	pub read_only: bool,
	pub recursive: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(has_many = "super::tag::Entity")]
	Tag,
}

impl Related<super::tag::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::Tag.def()
	}
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
	/// Decode the JSON path column. Malformed rows decode as empty.
	pub fn paths(&self) -> Vec<String> {
		serde_json::from_value(self.path.clone()).unwrap_or_default()
	}

	pub fn filter_list(&self) -> Vec<String> {
		serde_json::from_value(self.filters.clone()).unwrap_or_default()
	}
}

impl From<&Section> for ActiveModel {
	fn from(section: &Section) -> Self {
		use sea_orm::ActiveValue::Set;
		Self {
			name: Set(section.name.clone()),
			path: Set(serde_json::json!(section.path)),
			filters: Set(serde_json::json!(section.filters)),
			converters: Set(section.converters.as_str().to_string()),
			read_only: Set(section.read_only),
			recursive: Set(section.recursive),
		}
	}
}

impl From<Model> for Section {
	fn from(model: Model) -> Self {
		Section {
			path: model.paths(),
			filters: model.filter_list(),
			converters: model.converters.into(),
			name: model.name,
			read_only: model.read_only,
			recursive: model.recursive,
		}
	}
}
