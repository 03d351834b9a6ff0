//! Dirty-tag entity
//!
//! Write-ahead markers for guids whose in-memory buffer differs from the
//! last flushed disk copy. Drained at orderly shutdown; a non-empty
//! table at startup means the previous session crashed before flushing.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "dirty_tags")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = false)]
	pub guid: Uuid,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
