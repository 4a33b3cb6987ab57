use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

pub const STRIKE_NAME: &str = "Strike";
pub const LOCAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One line of an archived slice. Unknown fields are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RawStrikeRecord {
    pub lat: f64,
    pub lon: f64,
    /// Nanoseconds since the Unix epoch.
    pub time: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Point")]
pub struct PointGeometry {
    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureProperties {
    pub name: String,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct GeoFeature {
    pub geometry: PointGeometry,
    pub properties: FeatureProperties,
}

impl GeoFeature {
    pub fn longitude(&self) -> f64 {
        self.geometry.coordinates[0]
    }

    pub fn latitude(&self) -> f64 {
        self.geometry.coordinates[1]
    }
}

impl From<&RawStrikeRecord> for GeoFeature {
    fn from(record: &RawStrikeRecord) -> Self {
        Self {
            geometry: PointGeometry {
                coordinates: [record.lon, record.lat],
            },
            properties: FeatureProperties {
                name: STRIKE_NAME.to_string(),
                time: format_local_time(record.time),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection {
    pub features: Vec<GeoFeature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<GeoFeature>) -> Self {
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Epoch nanoseconds rendered in the local timezone, truncated to whole seconds.
pub fn format_local_time(nanos: i64) -> String {
    DateTime::from_timestamp_nanos(nanos)
        .with_timezone(&Local)
        .format(LOCAL_TIME_FORMAT)
        .to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn converts_record_with_lon_first() {
        let record: RawStrikeRecord = serde_json::from_str(
            r#"{"lat": 40.0, "lon": -73.0, "time": 1438403400000000000, "mds": 7}"#,
        )
        .unwrap();
        let feature = GeoFeature::from(&record);

        assert_eq!(feature.geometry.coordinates, [-73.0, 40.0]);
        assert_eq!(feature.properties.name, "Strike");
        let expected = Local
            .timestamp_opt(1_438_403_400, 0)
            .single()
            .unwrap()
            .format(LOCAL_TIME_FORMAT)
            .to_string();
        assert_eq!(feature.properties.time, expected);
    }

    #[test]
    fn sub_second_precision_is_truncated() {
        assert_eq!(
            format_local_time(1_438_403_400_999_999_999),
            format_local_time(1_438_403_400_000_000_000)
        );
    }

    #[test]
    fn serializes_geojson_shape() {
        let collection = FeatureCollection::new(vec![GeoFeature {
            geometry: PointGeometry {
                coordinates: [-73.0, 40.0],
            },
            properties: FeatureProperties {
                name: STRIKE_NAME.to_string(),
                time: "2015-08-01 04:30:00".to_string(),
            },
        }]);

        let value = serde_json::to_value(&collection).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "FeatureCollection",
                "features": [{
                    "type": "Feature",
                    "geometry": {"type": "Point", "coordinates": [-73.0, 40.0]},
                    "properties": {"name": "Strike", "time": "2015-08-01 04:30:00"}
                }]
            })
        );
    }

    #[test]
    fn record_without_time_is_rejected() {
        let result = serde_json::from_str::<RawStrikeRecord>(r#"{"lat": 1.0, "lon": 2.0}"#);
        assert!(result.is_err());
    }
}
