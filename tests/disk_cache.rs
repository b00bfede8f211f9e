use makepad_map_page::disk_cache::TileDiskCache;
use makepad_map_page::tiles::TileCoord;

const TILE: TileCoord = TileCoord { x: 4, y: 7, z: 3 };

#[test]
fn saved_tiles_load_back_from_their_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = TileDiskCache::new(Some(dir.path().to_path_buf()), 1024 * 1024);

    cache.save("carto-voyager", &TILE, b"png bytes").unwrap();

    assert_eq!(cache.load("carto-voyager", &TILE).as_deref(), Some(&b"png bytes"[..]));
    assert_eq!(cache.load("mapbox-mapbox-streets-v11", &TILE), None);
    assert!(dir.path().join("carto-voyager/3/4/7.png").is_file());
    assert_eq!(cache.size(), 9);
}

#[test]
fn disabled_cache_stores_nothing() {
    let mut cache = TileDiskCache::disabled();

    cache.save("carto-voyager", &TILE, b"png bytes").unwrap();

    assert_eq!(cache.load("carto-voyager", &TILE), None);
    assert_eq!(cache.tile_path("carto-voyager", &TILE), None);
    assert_eq!(cache.size(), 0);
}

#[test]
fn eviction_brings_the_cache_under_its_cap() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = TileDiskCache::new(Some(dir.path().to_path_buf()), 250);

    for x in 0..5 {
        cache.save("carto-voyager", &TileCoord { x, y: 0, z: 2 }, &[0u8; 100]).unwrap();
    }
    assert_eq!(cache.size(), 500);

    let removed = cache.evict_if_needed();

    assert_eq!(removed, 300);
    assert!(cache.size() <= 250);
    assert_eq!(cache.evict_if_needed(), 0);
}

#[test]
fn clear_removes_every_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("tiles");
    let mut cache = TileDiskCache::new(Some(root.clone()), 1024 * 1024);

    cache.save("carto-voyager", &TILE, b"a").unwrap();
    cache.save("custom-0123456789abcdef", &TILE, b"b").unwrap();
    cache.clear();

    assert!(!root.exists());
    assert_eq!(cache.size(), 0);
    assert_eq!(cache.load("carto-voyager", &TILE), None);
}
