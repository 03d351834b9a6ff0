//! Deleted-tag entity
//!
//! Guids whose backing file vanished, kept so a file reappearing at the
//! identical resolved path recovers its old guid instead of minting a
//! new one.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "deleted_tags")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = false)]
	pub guid: Uuid,
	pub name: String,
	#[sea_orm(indexed)]
	pub vts: String,
	pub section: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
