use serde::{Deserialize, Serialize};

// 公共数据结构
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}
