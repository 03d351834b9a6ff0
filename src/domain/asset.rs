//! Assets - shared in-memory representations of converted content
//!
//! Concrete asset forms (shader programs, level data, ...) live with
//! their subsystems; the VTS only deals in `Arc<dyn Asset>`. Ownership is
//! shared between the cache and any callers holding a reference, so
//! eviction never invalidates an asset someone is still using.

use crate::domain::tag::Tag;
use std::any::Any;
use std::sync::{Arc, RwLock};

/// Raw content bytes, cheaply cloneable and shared between the loader,
/// the cache and callers.
pub type Buffer = Arc<[u8]>;

/// The converted content of one tag.
///
/// Implementors embed [`AssetData`] and delegate to it; `into_any`
/// enables downcasting via [`asset_cast`].
pub trait Asset: Send + Sync + 'static {
	fn tag(&self) -> &Tag;
	fn buffer(&self) -> Buffer;
	/// Replace the buffer in place (explicit update only).
	fn replace_buffer(&self, buffer: Buffer);
	fn is_valid(&self) -> bool {
		true
	}
	fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Common state every asset carries: the owning tag plus the (swappable)
/// content buffer.
#[derive(Debug)]
pub struct AssetData {
	tag: Tag,
	buffer: RwLock<Buffer>,
}

impl AssetData {
	pub fn new(tag: Tag, buffer: Buffer) -> Self {
		Self {
			tag,
			buffer: RwLock::new(buffer),
		}
	}

	pub fn tag(&self) -> &Tag {
		&self.tag
	}

	pub fn buffer(&self) -> Buffer {
		self.buffer
			.read()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.clone()
	}

	pub fn replace_buffer(&self, buffer: Buffer) {
		*self
			.buffer
			.write()
			.unwrap_or_else(|poisoned| poisoned.into_inner()) = buffer;
	}
}

/// Pass-through asset: the raw file bytes, unconverted. The default
/// resolver output for sections whose content needs no processing.
#[derive(Debug)]
pub struct RawAsset {
	data: AssetData,
}

impl RawAsset {
	pub fn new(tag: Tag, buffer: Buffer) -> Arc<Self> {
		Arc::new(Self {
			data: AssetData::new(tag, buffer),
		})
	}
}

impl Asset for RawAsset {
	fn tag(&self) -> &Tag {
		self.data.tag()
	}

	fn buffer(&self) -> Buffer {
		self.data.buffer()
	}

	fn replace_buffer(&self, buffer: Buffer) {
		self.data.replace_buffer(buffer);
	}

	fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
		self
	}
}

/// Downcast a shared asset to its concrete type.
pub fn asset_cast<A: Asset>(asset: Arc<dyn Asset>) -> Option<Arc<A>> {
	asset.into_any().downcast::<A>().ok()
}

#[cfg(test)]
mod tests {
	use super::*;
	use uuid::Uuid;

	fn tag() -> Tag {
		Tag::new(Uuid::new_v4(), "thing", "$(A)/thing.bin", "Things")
	}

	#[test]
	fn buffer_replacement_is_visible_to_all_holders() {
		let asset = RawAsset::new(tag(), Buffer::from(&b"one"[..]));
		let other: Arc<dyn Asset> = asset.clone();

		asset.replace_buffer(Buffer::from(&b"two"[..]));
		assert_eq!(&*other.buffer(), b"two");
	}

	#[test]
	fn asset_cast_round_trips() {
		let asset: Arc<dyn Asset> = RawAsset::new(tag(), Buffer::from(&b"x"[..]));
		let raw = asset_cast::<RawAsset>(asset).expect("is a RawAsset");
		assert_eq!(&*raw.buffer(), b"x");
	}
}
