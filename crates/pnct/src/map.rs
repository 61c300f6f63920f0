//! Counting stations on a map.
//!
//! Markers come from rows with both coordinates. They are rendered as a
//! standalone Leaflet page or exported as `GeoJSON`.

use serde::Serialize;
use serde_json::{json, Value};

use crate::config::{DashboardConfig, DEFAULT_MAP_CENTER};
use crate::dataset::{Dataset, BR, LATITUDE, LONGITUDE, UF};
use crate::error::{Error, Result};
use crate::html;

const LEAFLET_VERSION: &str = "1.9.4";

/// One counting station on the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Popup text, e.g. `BR-101 | SC`.
    pub popup: String,
}

/// Build markers for every row with both coordinates.
///
/// # Errors
///
/// Returns [`Error::EmptyDataset`] for an empty dataset and
/// [`Error::MissingColumn`] when a coordinate, `br` or `uf` column is absent.
pub fn markers(dataset: &Dataset) -> Result<Vec<Marker>> {
    if dataset.is_empty() {
        return Err(Error::EmptyDataset);
    }
    dataset.require_column(LATITUDE)?;
    dataset.require_column(LONGITUDE)?;
    let br = dataset.require_column(BR)?;
    let uf = dataset.require_column(UF)?;

    Ok(dataset
        .rows()
        .iter()
        .filter_map(|row| {
            let (latitude, longitude) = dataset.coordinates(row)?;
            Some(Marker {
                latitude,
                longitude,
                popup: format!("BR-{} | {}", row[br], row[uf]),
            })
        })
        .collect())
}

/// Initial view of a map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapView {
    /// Center as (latitude, longitude).
    pub center: (f64, f64),
    /// Zoom level.
    pub zoom: u8,
}

impl Default for MapView {
    fn default() -> Self {
        Self {
            center: DEFAULT_MAP_CENTER,
            zoom: 4,
        }
    }
}

impl MapView {
    /// The view configured for the dashboard.
    #[must_use]
    pub fn from_config(config: &DashboardConfig) -> Self {
        Self {
            center: config.map_center,
            zoom: config.map_zoom,
        }
    }

    /// Render a standalone Leaflet page with one blue marker per station.
    ///
    /// # Errors
    ///
    /// Returns an error if the markers cannot be serialized.
    pub fn render_html(&self, title: &str, markers: &[Marker]) -> Result<String> {
        let head = format!(
            "<link rel=\"stylesheet\" href=\"https://unpkg.com/leaflet@{LEAFLET_VERSION}/dist/leaflet.css\">\n\
             <script src=\"https://unpkg.com/leaflet@{LEAFLET_VERSION}/dist/leaflet.js\"></script>\n\
             <style>html, body, #map {{ height: 100%; margin: 0; }}</style>"
        );
        let body = format!(
            "<div id=\"map\"></div>\n<script>\n\
             const markers = {markers};\n\
             const map = L.map('map').setView([{lat}, {lon}], {zoom});\n\
             L.tileLayer('https://{{s}}.tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png', {{\n\
               maxZoom: 19,\n\
               attribution: '&copy; OpenStreetMap contributors'\n\
             }}).addTo(map);\n\
             for (const m of markers) {{\n\
               const popup = document.createElement('span');\n\
               popup.textContent = m.popup;\n\
               L.marker([m.latitude, m.longitude], {{ title: m.popup }}).bindPopup(popup).addTo(map);\n\
             }}\n\
             </script>",
            markers = html::script_json(&markers)?,
            lat = self.center.0,
            lon = self.center.1,
            zoom = self.zoom,
        );
        Ok(html::page(title, &head, &body))
    }
}

/// Export markers as a `GeoJSON` `FeatureCollection` of points.
#[must_use]
pub fn to_geojson(markers: &[Marker]) -> Value {
    let features: Vec<Value> = markers
        .iter()
        .map(|marker| {
            json!({
                "type": "Feature",
                "geometry": {
                    "type": "Point",
                    // GeoJSON positions are [longitude, latitude]
                    "coordinates": [marker.longitude, marker.latitude],
                },
                "properties": { "popup": marker.popup },
            })
        })
        .collect();
    json!({ "type": "FeatureCollection", "features": features })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(csv: &[u8]) -> Dataset {
        Dataset::from_csv_bytes(csv).unwrap().normalize_coordinates()
    }

    #[test]
    fn test_markers() {
        let data = dataset(
            b"br;uf;latitude;longitude\n101;SC;-27.5;-48.5\n101;RS;-29.9;\n116;SP;-23.5;-46.6\n",
        );
        let markers = markers(&data).unwrap();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].popup, "BR-101 | SC");
        assert_eq!(markers[0].latitude, -27.5);
        assert_eq!(markers[1].popup, "BR-116 | SP");
    }

    #[test]
    fn test_markers_empty_dataset() {
        let data = dataset(b"br;uf;latitude;longitude\n");
        assert!(matches!(markers(&data), Err(Error::EmptyDataset)));
    }

    #[test]
    fn test_markers_missing_columns() {
        let no_coords = dataset(b"br;uf\n101;SC\n");
        assert!(matches!(
            markers(&no_coords),
            Err(Error::MissingColumn { .. })
        ));

        let no_uf = dataset(b"br;latitude;longitude\n101;-27.5;-48.5\n");
        let err = markers(&no_uf).unwrap_err();
        assert!(err.to_string().contains("uf"));
    }

    #[test]
    fn test_render_html() {
        let markers = vec![Marker {
            latitude: -27.5,
            longitude: -48.5,
            popup: "BR-101 | <SC>".to_string(),
        }];
        let html = MapView::default()
            .render_html("Mapa BR-101", &markers)
            .unwrap();
        assert!(html.contains("leaflet.js"));
        assert!(html.contains("setView([-15.788497, -47.879873], 4)"));
        assert!(html.contains("BR-101 | <SC>"));
        assert!(!html.contains("<SC></"));
        assert!(html.contains("<title>Mapa BR-101</title>"));
    }

    #[test]
    fn test_map_view_from_config() {
        let mut config = DashboardConfig::default();
        config.map_center = (-23.5, -46.6);
        config.map_zoom = 7;
        let view = MapView::from_config(&config);
        assert_eq!(view.center, (-23.5, -46.6));
        assert_eq!(view.zoom, 7);
    }

    #[test]
    fn test_to_geojson() {
        let markers = vec![Marker {
            latitude: -27.5,
            longitude: -48.5,
            popup: "BR-101 | SC".to_string(),
        }];
        let geojson = to_geojson(&markers);
        assert_eq!(geojson["type"], "FeatureCollection");
        assert_eq!(geojson["features"][0]["geometry"]["coordinates"][0], -48.5);
        assert_eq!(geojson["features"][0]["geometry"]["coordinates"][1], -27.5);
        assert_eq!(geojson["features"][0]["properties"]["popup"], "BR-101 | SC");
    }
}
