//! Model catalog: pricing and selectable generation options

use serde::Serialize;

/// Price of one generation
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ModelPrice {
    /// Clip length label, e.g. "4S"
    pub duration: &'static str,
    /// Resolution label, e.g. "720P"
    pub resolution: &'static str,
    /// Credits charged
    pub credits: u32,
    /// Price in account currency
    pub price: f64,
}

/// Pricing of a catalog model
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Pricing {
    /// One fixed configuration
    Single(ModelPrice),
    /// Priced per `<resolution>_<duration>` version key
    Versions(&'static [(&'static str, ModelPrice)]),
}

/// A model offered by the service
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ModelInfo {
    /// Model identifier sent to the API
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// Pricing table
    pub pricing: Pricing,
}

/// Options a UI may offer for a model
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ModelOptions {
    /// Model identifier
    pub name: &'static str,
    /// Display name
    pub display_name: &'static str,
    /// Clip lengths in seconds
    pub duration_options: &'static [u32],
    /// Resolutions
    pub resolution_options: &'static [&'static str],
    /// Aspect ratios
    pub aspect_ratio_options: &'static [&'static str],
    /// Whether reference-to-video is supported
    pub supports_reference: bool,
    /// Credits charged per generated second
    pub credits_per_second: f64,
}

const fn price(duration: &'static str, resolution: &'static str, credits: u32, price: f64) -> ModelPrice {
    ModelPrice {
        duration,
        resolution,
        credits,
        price,
    }
}

const CATALOG: &[ModelInfo] = &[
    ModelInfo {
        id: "viduq1",
        name: "Vidu Q1",
        pricing: Pricing::Single(price("5S", "1080p", 8, 0.4)),
    },
    ModelInfo {
        id: "vidu2.0",
        name: "Vidu 2.0",
        pricing: Pricing::Single(price("4S", "720p", 8, 0.4)),
    },
    ModelInfo {
        id: "vidu1.5",
        name: "Vidu 1.5",
        pricing: Pricing::Versions(&[
            ("360p_4s", price("4S", "360P", 8, 0.4)),
            ("720p_4s", price("4S", "720P", 20, 1.0)),
            ("1080p_4s", price("4S", "1080P", 40, 2.0)),
            ("720p_8s", price("8S", "720P", 40, 2.0)),
        ]),
    },
    ModelInfo {
        id: "vidu1.0",
        name: "Vidu 1.0",
        pricing: Pricing::Versions(&[
            ("360p_4s", price("4S", "360P", 8, 0.4)),
            ("360p_8s", price("8S", "360P", 16, 0.8)),
        ]),
    },
];

const OPTIONS: &[ModelOptions] = &[
    ModelOptions {
        name: "viduq1",
        display_name: "Vidu Q1",
        duration_options: &[5],
        resolution_options: &["1080p"],
        aspect_ratio_options: &["16:9"],
        supports_reference: true,
        credits_per_second: 1.6,
    },
    ModelOptions {
        name: "vidu2.0",
        display_name: "Vidu 2.0",
        duration_options: &[4],
        resolution_options: &["720p"],
        aspect_ratio_options: &["16:9", "9:16", "1:1"],
        supports_reference: true,
        credits_per_second: 2.0,
    },
    ModelOptions {
        name: "vidu1.5",
        display_name: "Vidu 1.5",
        duration_options: &[4, 8],
        resolution_options: &["360p", "720p", "1080p"],
        aspect_ratio_options: &["16:9", "9:16", "1:1"],
        supports_reference: true,
        credits_per_second: 2.0,
    },
    ModelOptions {
        name: "vidu1.0",
        display_name: "Vidu 1.0",
        duration_options: &[4, 8],
        resolution_options: &["360p"],
        aspect_ratio_options: &["16:9"],
        supports_reference: false,
        credits_per_second: 2.0,
    },
];

/// Every known model
pub fn catalog() -> &'static [ModelInfo] {
    CATALOG
}

/// Look up a model by id
pub fn model(id: &str) -> Option<&'static ModelInfo> {
    CATALOG.iter().find(|m| m.id == id)
}

/// Price of a generation
///
/// Single-configuration models ignore `resolution` and `duration`. Versioned
/// models are keyed by `<resolution>_<duration>` in lowercase, e.g. `720p_4s`.
pub fn model_price(id: &str, resolution: Option<&str>, duration: Option<&str>) -> Option<ModelPrice> {
    match model(id)?.pricing {
        Pricing::Single(p) => Some(p),
        Pricing::Versions(versions) => {
            let key = format!(
                "{}_{}",
                resolution.unwrap_or_default().to_lowercase(),
                duration.unwrap_or_default().to_lowercase()
            );
            versions.iter().find(|(k, _)| *k == key).map(|(_, p)| *p)
        }
    }
}

/// Selectable options for a model
pub fn model_options(id: &str) -> Option<&'static ModelOptions> {
    OPTIONS.iter().find(|o| o.name == id)
}
