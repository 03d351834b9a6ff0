//! Sections and section filter expressions
//!
//! A [`Section`] groups one or more search roots under a name, with glob
//! filters and a converter label shared by every tag inside it.
//! A [`SectionQuery`] is the caller-facing filter expression
//! `"<match-prefix><SectionName>@<Filter>"` used by the lookup and
//! request APIs.

use crate::domain::resolver::ConverterKind;
use crate::domain::tag::Tag;
use serde::{Deserialize, Serialize};

/// A configured section: named group of search roots sharing filters and
/// a converter type. Mutated only by configuration reload, never at
/// asset-load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
	/// Unique within the catalog.
	pub name: String,
	/// Ordered search roots, alias form. Later entries win in Override
	/// match mode.
	pub path: Vec<String>,
	/// Glob patterns, logically OR-ed during enumeration.
	pub filters: Vec<String>,
	/// Resolver label for every tag in this section.
	pub converters: ConverterKind,
	#[serde(default)]
	pub read_only: bool,
	#[serde(default = "default_recursive")]
	pub recursive: bool,
}

fn default_recursive() -> bool {
	true
}

/// How a query filter is matched against tag paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMode {
	/// Wildcard containment, aggregating matches across every path root.
	#[default]
	Like,
	/// The filter must match the full path suffix, still aggregating
	/// across roots.
	Exact,
	/// Scan roots most-recently-added first and return the first root
	/// yielding exactly one match. Last-registered root wins.
	Override,
}

impl MatchMode {
	/// The single-character prefix used in filter expressions.
	pub fn prefix(self) -> &'static str {
		match self {
			MatchMode::Like => "",
			MatchMode::Exact => "=",
			MatchMode::Override => ">",
		}
	}
}

/// A parsed section filter expression: `Name@Filter` with an optional
/// `=` (exact) or `>` (override) prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct SectionQuery {
	pub name: String,
	pub filter: String,
	pub match_mode: MatchMode,
}

impl SectionQuery {
	/// Parse `"<prefix><Name>@<Filter>"`. A match prefix is only honored
	/// when a filter is present; it is stripped from the name either way.
	pub fn parse(expression: &str) -> Self {
		let mut query = Self::default();

		let (name_part, filter_part) = match expression.split_once('@') {
			Some((name, filter)) => (name, Some(filter)),
			None => (expression, None),
		};

		// a prefix operator needs at least one name character after it
		let prefix_mode = if name_part.len() >= 2 {
			match name_part.as_bytes()[0] {
				b'=' => Some(MatchMode::Exact),
				b'>' => Some(MatchMode::Override),
				_ => None,
			}
		} else {
			None
		};

		query.name = match prefix_mode {
			Some(_) => name_part[1..].to_string(),
			None => name_part.to_string(),
		};

		if let Some(filter) = filter_part {
			query.filter = filter.to_string();
			if let Some(mode) = prefix_mode {
				if !query.filter.is_empty() {
					query.match_mode = mode;
				}
			}
		}

		query
	}
}

impl std::str::FromStr for SectionQuery {
	type Err = std::convert::Infallible;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self::parse(s))
	}
}

impl From<String> for SectionQuery {
	fn from(s: String) -> Self {
		Self::parse(&s)
	}
}

impl From<SectionQuery> for String {
	fn from(query: SectionQuery) -> Self {
		query.to_string()
	}
}

impl From<&Tag> for SectionQuery {
	fn from(tag: &Tag) -> Self {
		Self::parse(&format!("{}@{}", tag.section_name, tag.name))
	}
}

impl std::fmt::Display for SectionQuery {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.name.is_empty() {
			return Ok(());
		}
		write!(f, "{}{}", self.match_mode.prefix(), self.name)?;
		if !self.filter.is_empty() {
			write!(f, "@{}", self.filter)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_like_by_default() {
		let query = SectionQuery::parse("Shaders@default.fx");
		assert_eq!(query.name, "Shaders");
		assert_eq!(query.filter, "default.fx");
		assert_eq!(query.match_mode, MatchMode::Like);
	}

	#[test]
	fn parses_exact_and_override_prefixes() {
		let exact = SectionQuery::parse("=Shaders@default.fx");
		assert_eq!(exact.name, "Shaders");
		assert_eq!(exact.match_mode, MatchMode::Exact);

		let over = SectionQuery::parse(">Levels@intro");
		assert_eq!(over.name, "Levels");
		assert_eq!(over.match_mode, MatchMode::Override);
	}

	#[test]
	fn prefix_without_filter_falls_back_to_like() {
		let query = SectionQuery::parse(">Levels");
		assert_eq!(query.name, "Levels");
		assert_eq!(query.filter, "");
		assert_eq!(query.match_mode, MatchMode::Like);
	}

	#[test]
	fn round_trips_through_display() {
		for expr in ["Shaders@a.fx", "=Shaders@a.fx", ">Shaders@a.fx", "Shaders"] {
			assert_eq!(SectionQuery::parse(expr).to_string(), expr);
		}
	}

	#[test]
	fn one_character_section_keeps_its_filter() {
		let query = SectionQuery::parse("S@file.ext");
		assert_eq!(query.name, "S");
		assert_eq!(query.filter, "file.ext");
		assert_eq!(query.match_mode, MatchMode::Like);

		// too short to hold an operator plus a name
		let bare = SectionQuery::parse("=");
		assert_eq!(bare.name, "=");
		assert_eq!(bare.filter, "");
	}

	#[test]
	fn empty_filter_after_at_stays_like() {
		let query = SectionQuery::parse("=Shaders@");
		assert_eq!(query.name, "Shaders");
		assert_eq!(query.match_mode, MatchMode::Like);
	}
}
