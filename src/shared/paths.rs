//! Path alias expansion and normalization
//!
//! Catalog rows keep paths in their configured alias form
//! (`$(Assets)/shaders/default.fx`); expansion to a real filesystem path
//! happens only at the disk boundary.

use crate::config::Aliases;

/// Expand `$(Alias)` placeholders against the alias table.
///
/// Unknown aliases are left in place so the failure shows up verbatim in
/// logs instead of silently collapsing to an empty path. Output always
/// uses forward slashes.
pub fn expand_aliases(input: &str, aliases: &Aliases) -> String {
	let mut result = String::with_capacity(input.len());
	let mut rest = input;

	while let Some(start) = rest.find("$(") {
		result.push_str(&rest[..start]);
		let after = &rest[start + 2..];
		match after.find(')') {
			Some(end) => {
				let name = &after[..end];
				match aliases.get(name) {
					Some(value) => result.push_str(value),
					None => {
						result.push_str("$(");
						result.push_str(name);
						result.push(')');
					}
				}
				rest = &after[end + 1..];
			}
			None => {
				// unterminated placeholder, keep as-is
				result.push_str(&rest[start..]);
				rest = "";
			}
		}
	}

	result.push_str(rest);
	normalize(&result)
}

/// Normalize a path string: forward slashes, duplicate separators
/// collapsed.
pub fn normalize(path: &str) -> String {
	let mut result = String::with_capacity(path.len());
	let mut last_was_slash = false;

	for ch in path.chars() {
		let ch = if ch == '\\' { '/' } else { ch };
		if ch == '/' {
			if last_was_slash {
				continue;
			}
			last_was_slash = true;
		} else {
			last_was_slash = false;
		}
		result.push(ch);
	}

	result
}
