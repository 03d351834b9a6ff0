//! Catalog lookups for section filter expressions
//!
//! Translates a [`MatchMode`] plus one search root into the SQL LIKE
//! pattern the tag table is probed with. Patterns work on the alias-form
//! `vts` column, so the same expression matches regardless of where the
//! aliases point on this machine.

use crate::database::entities;
use crate::domain::section::MatchMode;
use crate::domain::tag::Tag;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder};

/// Build the LIKE pattern for one root. An empty filter widens to every
/// tag under the root.
pub(crate) fn vts_pattern(root: &str, filter: &str, mode: MatchMode) -> String {
	if filter.is_empty() {
		return format!("%{root}%");
	}
	match mode {
		MatchMode::Like => format!("%{root}/{filter}%"),
		// exact and override both pin the full path, differing only in
		// how the caller walks the roots
		MatchMode::Exact | MatchMode::Override => format!("{root}/{filter}.%"),
	}
}

/// Fetch the tags of one section matching `filter` under a single root,
/// ordered by path.
pub(crate) async fn tags_for_root<C: ConnectionTrait>(
	conn: &C,
	section_name: &str,
	root: &str,
	filter: &str,
	mode: MatchMode,
) -> Result<Vec<Tag>, DbErr> {
	let rows = entities::tag::Entity::find()
		.filter(entities::tag::Column::Section.eq(section_name))
		.filter(entities::tag::Column::Vts.like(vts_pattern(root, filter, mode)))
		.order_by_asc(entities::tag::Column::Vts)
		.all(conn)
		.await?;

	Ok(rows.into_iter().map(Tag::from).collect())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn like_pattern_is_containment() {
		assert_eq!(
			vts_pattern("$(Data)/shaders", "default", MatchMode::Like),
			"%$(Data)/shaders/default%"
		);
	}

	#[test]
	fn exact_pattern_pins_root_and_stem() {
		assert_eq!(
			vts_pattern("$(Data)/shaders", "default", MatchMode::Exact),
			"$(Data)/shaders/default.%"
		);
		assert_eq!(
			vts_pattern("$(Data)/shaders", "default", MatchMode::Override),
			"$(Data)/shaders/default.%"
		);
	}

	#[test]
	fn empty_filter_widens_to_root() {
		assert_eq!(
			vts_pattern("$(Data)/shaders", "", MatchMode::Exact),
			"%$(Data)/shaders%"
		);
	}
}
