//! Tile request URL generation.

use crate::config::TileConfig;

/// Path of the GeoWebCache WMTS endpoint below a GeoServer base URL.
const WMTS_PATH: &str = "/gwc/service/wmts";

/// Generates WMTS KVP request URLs for one server.
#[derive(Debug, Clone)]
pub struct TileUrlBuilder {
    wmts_base: String,
    tile: TileConfig,
}

impl TileUrlBuilder {
    /// Create a builder from a GeoServer base URL or a full WMTS endpoint URL.
    pub fn new(server_url: &str, tile: TileConfig) -> Self {
        let base = server_url.trim().trim_end_matches('/');
        let wmts_base = if base.ends_with(WMTS_PATH) {
            base.to_string()
        } else {
            format!("{}{}", base, WMTS_PATH)
        };
        Self { wmts_base, tile }
    }

    pub fn wmts_base(&self) -> &str {
        &self.wmts_base
    }

    /// GetTile URL for a layer at the configured tile.
    pub fn tile_url(&self, layer: &str, style: Option<&str>) -> String {
        let coord = self.tile.coord();
        format!(
            "{}?SERVICE=WMTS&REQUEST=GetTile&VERSION=1.0.0&LAYER={}&STYLE={}&TILEMATRIXSET={}&TILEMATRIX={}&TILEROW={}&TILECOL={}&FORMAT={}",
            self.wmts_base,
            layer,
            style.unwrap_or(""),
            self.tile.matrix_set,
            coord.z,
            coord.y,
            coord.x,
            self.tile.format
        )
    }

    /// GetCapabilities URL of the WMTS endpoint.
    pub fn capabilities_url(&self) -> String {
        format!(
            "{}?SERVICE=WMTS&REQUEST=GetCapabilities&VERSION=1.0.0",
            self.wmts_base
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_url() {
        let builder = TileUrlBuilder::new("https://example.org/geoserver/", TileConfig::default());
        assert_eq!(
            builder.tile_url("CAS:bkb_2024", None),
            "https://example.org/geoserver/gwc/service/wmts?SERVICE=WMTS&REQUEST=GetTile&VERSION=1.0.0&LAYER=CAS:bkb_2024&STYLE=&TILEMATRIXSET=WebMercatorQuad&TILEMATRIX=8&TILEROW=84&TILECOL=133&FORMAT=image/png"
        );
    }

    #[test]
    fn test_accepts_full_endpoint() {
        let builder = TileUrlBuilder::new(
            "https://example.org/geoserver/gwc/service/wmts",
            TileConfig::default(),
        );
        assert_eq!(builder.wmts_base(), "https://example.org/geoserver/gwc/service/wmts");
    }

    #[test]
    fn test_style_and_tile_overrides() {
        let tile = TileConfig {
            zoom: 3,
            row: 2,
            col: 5,
            ..Default::default()
        };
        let url = TileUrlBuilder::new("http://localhost:8080/geoserver", tile).tile_url("a", Some("dark"));
        assert!(url.contains("STYLE=dark"));
        assert!(url.contains("TILEMATRIX=3&TILEROW=2&TILECOL=5"));
    }

    #[test]
    fn test_capabilities_url() {
        let builder = TileUrlBuilder::new("http://localhost:8080/geoserver", TileConfig::default());
        assert_eq!(
            builder.capabilities_url(),
            "http://localhost:8080/geoserver/gwc/service/wmts?SERVICE=WMTS&REQUEST=GetCapabilities&VERSION=1.0.0"
        );
    }
}
