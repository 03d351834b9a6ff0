//! Request delivery and cache install semantics.

mod helpers;

use helpers::{raw_resolvers, section, Fixture};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vts_core::{
	asset_cast, Asset, AssetResolvers, Buffer, PendingCounter, RawAsset, SectionQuery, Vts,
};

fn counting_resolvers(invocations: Arc<AtomicUsize>) -> AssetResolvers {
	AssetResolvers::new().register("RAW", Arc::new(move |buffer, tag, _vts| {
		invocations.fetch_add(1, Ordering::SeqCst);
		let asset: Arc<dyn Asset> = RawAsset::new(tag.clone(), buffer);
		Some(asset)
	}))
}

#[tokio::test]
async fn load_assets_delivers_raw_bytes() {
	let fixture = Fixture::new();
	fixture.write("packs/data.pak", b"alpha");

	let config = fixture.config(vec![section("Packs", &["packs"], &["*.pak"])]);
	let vts = Vts::new(config, raw_resolvers()).await.unwrap();

	let tag = vts
		.get_tag(&SectionQuery::parse("Packs@data"))
		.await
		.unwrap()
		.unwrap();
	let assets = vts.load_assets(&[tag.clone()]).await.unwrap();

	assert_eq!(assets.len(), 1);
	assert_eq!(&*assets[0].buffer(), b"alpha");
	assert_eq!(assets[0].tag(), &tag);

	let raw = asset_cast::<RawAsset>(assets[0].clone()).expect("raw asset");
	assert_eq!(&*raw.buffer(), b"alpha");
}

#[tokio::test]
async fn concurrent_requests_install_at_most_once() {
	let fixture = Fixture::new();
	fixture.write("packs/shared.pak", b"shared");

	let invocations = Arc::new(AtomicUsize::new(0));
	let config = fixture.config(vec![section("Packs", &["packs"], &["*.pak"])]);
	let vts = Vts::new(config, counting_resolvers(invocations.clone()))
		.await
		.unwrap();

	let tag = vts
		.get_tag(&SectionQuery::parse("Packs@shared"))
		.await
		.unwrap()
		.unwrap();

	let delivered: Arc<Mutex<Vec<Arc<dyn Asset>>>> = Arc::new(Mutex::new(Vec::new()));
	let counter = PendingCounter::new();

	for _ in 0..8 {
		let sink = delivered.clone();
		vts.request_blob(
			std::slice::from_ref(&tag),
			Arc::new(move |asset| sink.lock().unwrap().push(asset)),
			Some(counter.clone()),
		)
		.unwrap();
	}

	assert!(counter.wait_zero_timeout(Duration::from_secs(5)).await);

	let delivered = delivered.lock().unwrap();
	assert_eq!(delivered.len(), 8);
	for asset in delivered.iter().skip(1) {
		// every caller sees the one installed asset
		assert!(Arc::ptr_eq(asset, &delivered[0]));
	}
	assert!(invocations.load(Ordering::SeqCst) >= 1);

	let cached = vts.find_asset(&tag).expect("installed");
	assert!(Arc::ptr_eq(&cached, &delivered[0]));
}

#[tokio::test]
async fn cache_hits_skip_the_resolver() {
	let fixture = Fixture::new();
	fixture.write("packs/warm.pak", b"warm");

	let invocations = Arc::new(AtomicUsize::new(0));
	let config = fixture.config(vec![section("Packs", &["packs"], &["*.pak"])]);
	let vts = Vts::new(config, counting_resolvers(invocations.clone()))
		.await
		.unwrap();

	let tag = vts
		.get_tag(&SectionQuery::parse("Packs@warm"))
		.await
		.unwrap()
		.unwrap();

	vts.load_assets(&[tag.clone()]).await.unwrap();
	let after_first = invocations.load(Ordering::SeqCst);

	let assets = vts.load_assets(&[tag]).await.unwrap();
	assert_eq!(assets.len(), 1);
	assert_eq!(invocations.load(Ordering::SeqCst), after_first);
}

#[tokio::test]
async fn counter_settles_on_mixed_success_and_failure() {
	let fixture = Fixture::new();
	fixture.write("packs/real.pak", b"real");

	let config = fixture.config(vec![section("Packs", &["packs"], &["*.pak"])]);
	let vts = Vts::new(config, raw_resolvers()).await.unwrap();

	let real = vts
		.get_tag(&SectionQuery::parse("Packs@real"))
		.await
		.unwrap()
		.unwrap();
	// minted but never written to disk, so its load fails
	let phantom = vts
		.assure_tag(&SectionQuery::parse("Packs@phantom.pak"))
		.await
		.unwrap();

	let delivered = Arc::new(AtomicUsize::new(0));
	let seen = delivered.clone();
	let counter = PendingCounter::new();

	vts.request_blob(
		&[real, phantom],
		Arc::new(move |_| {
			seen.fetch_add(1, Ordering::SeqCst);
		}),
		Some(counter.clone()),
	)
	.unwrap();

	assert!(counter.wait_zero_timeout(Duration::from_secs(5)).await);
	assert_eq!(delivered.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn request_section_dispatches_every_match() {
	let fixture = Fixture::new();
	fixture.write("packs/a.pak", b"a");
	fixture.write("packs/b.pak", b"b");

	let config = fixture.config(vec![section("Packs", &["packs"], &["*.pak"])]);
	let vts = Vts::new(config, raw_resolvers()).await.unwrap();

	let delivered = Arc::new(AtomicUsize::new(0));
	let seen = delivered.clone();
	let counter = PendingCounter::new();

	let dispatched = vts
		.request_section(
			&SectionQuery::parse("Packs"),
			Arc::new(move |_| {
				seen.fetch_add(1, Ordering::SeqCst);
			}),
			Some(counter.clone()),
		)
		.await
		.unwrap();

	assert_eq!(dispatched, 2);
	assert!(counter.wait_zero_timeout(Duration::from_secs(5)).await);
	assert_eq!(delivered.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn override_shadows_until_cleared() {
	let fixture = Fixture::new();
	fixture.write("packs/skin.pak", b"stock");

	let config = fixture.config(vec![section("Packs", &["packs"], &["*.pak"])]);
	let vts = Vts::new(config, raw_resolvers()).await.unwrap();

	let tag = vts
		.get_tag(&SectionQuery::parse("Packs@skin"))
		.await
		.unwrap()
		.unwrap();
	vts.load_assets(&[tag.clone()]).await.unwrap();

	let replacement: Arc<dyn Asset> =
		RawAsset::new(tag.clone(), Buffer::from(&b"modded"[..]));
	vts.add_override(replacement);

	let visible = vts.find_asset(&tag).expect("override");
	assert_eq!(&*visible.buffer(), b"modded");

	vts.clear_assets(std::slice::from_ref(&tag));
	assert!(vts.find_asset(&tag).is_none());
}
