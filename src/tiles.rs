use makepad_widgets::*;
use makepad_widgets::image_cache::ImageBuffer;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::{AccessToken, MapPageConfig, TOKENLESS_STYLE};
use crate::disk_cache::{platform_cache_dir, TileDiskCache};
use crate::error::ConfigError;

const CARTO_VOYAGER: &str = "https://a.basemaps.cartocdn.com/rastertiles/voyager/{z}/{x}/{y}@2x.png";

/// Distinguishes tile requests from other HTTP traffic of the app
const TILE_REQUEST_CHANNEL: u64 = 0x7469_6c65;

/// Slippy-map tile coordinates
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoord {
    /// Fill a `{z}/{x}/{y}` url template
    pub fn tile_url(&self, template: &str) -> String {
        template
            .replace("{z}", &self.z.to_string())
            .replace("{x}", &self.x.to_string())
            .replace("{y}", &self.y.to_string())
    }

    pub fn parent(&self) -> Option<TileCoord> {
        (self.z > 0).then(|| TileCoord { x: self.x / 2, y: self.y / 2, z: self.z - 1 })
    }
}

/// Where raster tiles come from, resolved from a map style.
#[derive(Clone, Debug, PartialEq)]
pub struct TileSource {
    url_template: String,
    pub attribution: String,
    /// Disk cache directory name for this source
    pub namespace: String,
}

impl TileSource {
    /// Resolves a style into a raster tile source.
    ///
    /// Accepts `mapbox://styles/{owner}/{id}` (needs a token),
    /// `carto-voyager`, or an http(s) url template with `{z}`, `{x}`, `{y}`
    /// and an optional `{token}`.
    pub fn from_style(style: &str, token: Option<&AccessToken>) -> Result<Self, ConfigError> {
        let style = style.trim();

        if style == TOKENLESS_STYLE {
            return Ok(Self {
                url_template: CARTO_VOYAGER.to_string(),
                attribution: "\u{00A9} OpenStreetMap \u{00A9} CARTO".to_string(),
                namespace: TOKENLESS_STYLE.to_string(),
            });
        }

        if let Some(path) = style.strip_prefix("mapbox://styles/") {
            let (owner, id) = path
                .split_once('/')
                .filter(|(owner, id)| !owner.is_empty() && !id.is_empty() && !id.contains('/'))
                .ok_or_else(|| ConfigError::invalid("MAP_PAGE_STYLE", style, "expected mapbox://styles/{owner}/{id}"))?;
            let token = token.ok_or(ConfigError::MissingToken("Mapbox styles"))?;
            return Ok(Self {
                url_template: format!(
                    "https://api.mapbox.com/styles/v1/{owner}/{id}/tiles/256/{{z}}/{{x}}/{{y}}@2x?access_token={}",
                    token.expose()
                ),
                attribution: "\u{00A9} Mapbox \u{00A9} OpenStreetMap".to_string(),
                namespace: format!("mapbox-{owner}-{id}"),
            });
        }

        if style.starts_with("http://") || style.starts_with("https://") {
            if !["{z}", "{x}", "{y}"].iter().all(|p| style.contains(p)) {
                return Err(ConfigError::invalid("MAP_PAGE_STYLE", style, "tile url needs {z}, {x} and {y}"));
            }
            let url_template = if style.contains("{token}") {
                let token = token.ok_or(ConfigError::MissingToken("this tile url"))?;
                style.replace("{token}", token.expose())
            } else {
                style.to_string()
            };
            return Ok(Self {
                url_template,
                attribution: "\u{00A9} OpenStreetMap contributors".to_string(),
                // Hash the template before the token goes in
                namespace: format!("custom-{:016x}", fnv1a(style.as_bytes())),
            });
        }

        Err(ConfigError::invalid("MAP_PAGE_STYLE", style, "unsupported style"))
    }

    pub fn tile_url(&self, coord: &TileCoord) -> String {
        coord.tile_url(&self.url_template)
    }
}

impl Default for TileSource {
    fn default() -> Self {
        // The tokenless style always resolves
        Self {
            url_template: CARTO_VOYAGER.to_string(),
            attribution: "\u{00A9} OpenStreetMap \u{00A9} CARTO".to_string(),
            namespace: TOKENLESS_STYLE.to_string(),
        }
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ *b as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

/// Tiles kept in memory before the least recently drawn ones are dropped
const MEMORY_TILE_CAPACITY: usize = 256;

/// A failed tile is fetched again once this much time has passed
const TILE_RETRY_AFTER: Duration = Duration::from_secs(15);

/// State of a tile being loaded
#[derive(Clone)]
pub enum TileState {
    Loading,
    Loaded(Texture),
    Error { reason: String, at: Instant },
}

struct CachedTile {
    state: TileState,
    last_used: u64,
}

/// Memory tile cache in front of the disk cache and the network.
///
/// Holds at most a fixed number of tiles; tiles that were not drawn
/// recently give way first. In-flight tiles are never dropped.
pub struct TileCache {
    tiles: HashMap<TileCoord, CachedTile>,
    pending_requests: HashMap<LiveId, TileCoord>,
    request_counter: u64,
    use_clock: u64,
    capacity: usize,
    source: TileSource,
    disk: TileDiskCache,
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new(TileSource::default(), TileDiskCache::disabled())
    }
}

impl TileCache {
    pub fn new(source: TileSource, disk: TileDiskCache) -> Self {
        Self {
            tiles: HashMap::new(),
            pending_requests: HashMap::new(),
            request_counter: 0,
            use_clock: 0,
            capacity: MEMORY_TILE_CAPACITY,
            source,
            disk,
        }
    }

    /// Builds the cache a page configuration asks for
    pub fn from_config(config: &MapPageConfig) -> Result<Self, ConfigError> {
        let source = TileSource::from_style(&config.style, config.access_token.as_ref())?;
        let root = config.tile_cache_dir.clone().or_else(platform_cache_dir);
        Ok(Self::new(source, TileDiskCache::new(root, config.tile_cache_max_bytes)))
    }

    pub fn source(&self) -> &TileSource {
        &self.source
    }

    /// Marks `coord` as drawn now and tells whether it still has to be
    /// fetched: it is unknown, or it failed long enough ago.
    fn touch(&mut self, coord: TileCoord, now: Instant) -> bool {
        self.use_clock += 1;
        match self.tiles.get_mut(&coord) {
            Some(tile) => {
                tile.last_used = self.use_clock;
                matches!(&tile.state, TileState::Error { at, .. } if now.duration_since(*at) >= TILE_RETRY_AFTER)
            }
            None => true,
        }
    }

    fn insert(&mut self, coord: TileCoord, state: TileState) {
        let last_used = self.tiles.get(&coord).map_or(self.use_clock, |t| t.last_used);
        self.tiles.insert(coord, CachedTile { state, last_used });
    }

    /// Drops the least recently drawn settled tiles until the cache fits
    fn evict_excess(&mut self) {
        let excess = self.tiles.len().saturating_sub(self.capacity);
        if excess == 0 {
            return;
        }
        let mut settled: Vec<(u64, TileCoord)> = self
            .tiles
            .iter()
            .filter(|(_, tile)| !matches!(tile.state, TileState::Loading))
            .map(|(coord, tile)| (tile.last_used, *coord))
            .collect();
        settled.sort_unstable_by_key(|(last_used, _)| *last_used);
        for (_, coord) in settled.into_iter().take(excess) {
            self.tiles.remove(&coord);
        }
        tracing::trace!(tiles = self.tiles.len(), "evicted tiles from memory");
    }

    /// Request a tile unless it is loaded, loading, or failed recently
    pub fn request_tile(&mut self, cx: &mut Cx, coord: TileCoord) {
        if !self.touch(coord, Instant::now()) {
            return;
        }

        if let Some(data) = self.disk.load(&self.source.namespace, &coord) {
            match ImageBuffer::from_png(&data) {
                Ok(buffer) => {
                    let texture: Texture = buffer.into_new_texture(cx);
                    self.insert(coord, TileState::Loaded(texture));
                    self.evict_excess();
                    return;
                }
                Err(_) => {
                    tracing::debug!(?coord, "corrupt cached tile, fetching again");
                }
            }
        }

        self.request_counter += 1;
        let request_id = LiveId::from_num(TILE_REQUEST_CHANNEL, self.request_counter);

        let mut request = HttpRequest::new(self.source.tile_url(&coord), HttpMethod::GET);
        request.set_header("User-Agent".to_string(), "MakepadMapPage/0.1".to_string());
        cx.http_request(request_id, request);

        self.insert(coord, TileState::Loading);
        self.pending_requests.insert(request_id, coord);
        self.evict_excess();
    }

    /// Get a tile if it's already loaded
    pub fn get_tile(&self, coord: &TileCoord) -> Option<&Texture> {
        match self.tiles.get(coord).map(|t| &t.state) {
            Some(TileState::Loaded(texture)) => Some(texture),
            _ => None,
        }
    }

    /// Nearest loaded ancestor of `coord` within four levels, with the UV
    /// offset and scale of the part of it that covers `coord`.
    pub fn parent_fallback(&self, coord: &TileCoord) -> Option<(&Texture, Vec2, Vec2)> {
        let mut parent = *coord;
        for _ in 0..4 {
            parent = parent.parent()?;
            if let Some(texture) = self.get_tile(&parent) {
                let zoom_diff = coord.z - parent.z;
                let scale = 1.0 / (1u32 << zoom_diff) as f32;
                let offset_x = (coord.x % (1 << zoom_diff)) as f32 * scale;
                let offset_y = (coord.y % (1 << zoom_diff)) as f32 * scale;
                return Some((texture, vec2(offset_x, offset_y), vec2(scale, scale)));
            }
        }
        None
    }

    fn fail(&mut self, coord: TileCoord, reason: String) {
        self.insert(coord, TileState::Error { reason, at: Instant::now() });
    }

    /// Handle an HTTP response, returning true when a tile became drawable
    pub fn handle_response(&mut self, cx: &mut Cx, request_id: LiveId, response: &HttpResponse) -> bool {
        let Some(coord) = self.pending_requests.remove(&request_id) else {
            return false;
        };

        if response.status_code != 200 {
            tracing::debug!(?coord, status = response.status_code, "tile request failed");
            self.fail(coord, format!("HTTP {}", response.status_code));
            return false;
        }
        let Some(body) = &response.body else {
            self.fail(coord, "Empty response body".to_string());
            return false;
        };

        // Decode first so only valid PNGs reach the disk cache
        match ImageBuffer::from_png(body) {
            Ok(buffer) => {
                if let Err(err) = self.disk.save(&self.source.namespace, &coord, body) {
                    tracing::debug!(?coord, %err, "could not cache tile on disk");
                }
                let texture: Texture = buffer.into_new_texture(cx);
                self.insert(coord, TileState::Loaded(texture));
                self.evict_excess();
                true
            }
            Err(e) => {
                self.fail(coord, format!("PNG decode error: {:?}", e));
                false
            }
        }
    }

    /// Handle HTTP error
    pub fn handle_error(&mut self, request_id: LiveId, error: &HttpError) {
        if let Some(coord) = self.pending_requests.remove(&request_id) {
            tracing::debug!(?coord, ?error, "tile request error");
            self.fail(coord, format!("{:?}", error));
        }
    }
}
