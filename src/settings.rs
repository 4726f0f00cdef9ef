//! Effective form settings.
//!
//! Settings come from three places, in order of precedence: the page's query
//! string, the deployment's form defaults ("props"), and fixed fallbacks.
//! Country and lead source are forced regardless of input.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Country every lead is submitted under.
pub const FORCED_COUNTRY: &str = "AU";

/// Lead source every lead is submitted under.
pub const FORCED_LEAD_SOURCE: &str = "Business Loan Form";

/// Brand used when neither the query string nor the props name one.
pub const DEFAULT_BRAND: &str = "LoansOne iFrame";

/// Button label used when neither the query string nor the props name one.
pub const DEFAULT_BUTTON_TEXT: &str = "Submit";

/// Named colors accepted by the `color` query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorPalette {
    colors: HashMap<String, String>,
}

impl ColorPalette {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            colors: entries
                .into_iter()
                .map(|(name, hex)| (name.into().to_lowercase(), hex.into()))
                .collect(),
        }
    }

    /// Looks up a color name, ignoring case.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.colors.get(&name.to_lowercase()).map(String::as_str)
    }
}

impl Default for ColorPalette {
    fn default() -> Self {
        Self::new([
            ("red", "#FF0000"),
            ("orange", "#FFA500"),
            ("yellow", "#FFD700"),
            ("green", "#008000"),
            ("gold", "#FFD700"),
            ("blue", "#0000FF"),
            ("purple", "#800080"),
        ])
    }
}

/// Settings supplied by the deployment (the form's props).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SettingsProps {
    pub country: Option<String>,
    pub button_color: Option<String>,
    pub lead_source: Option<String>,
    pub brand: Option<String>,
    pub button_text: Option<String>,
}

/// Query parameters the page understands.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsQuery {
    pub color: Option<String>,
    pub brand: Option<String>,
    pub source: Option<String>,
    #[serde(rename = "buttonText")]
    pub button_text: Option<String>,
}

/// The single resolved configuration used to render and submit the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveSettings {
    pub country: String,
    pub button_color: Option<String>,
    pub lead_source: String,
    pub brand: String,
    pub button_text: String,
}

impl EffectiveSettings {
    /// Whether phone input should use New Zealand hints instead of Australian.
    pub fn is_nz(&self) -> bool {
        self.country == "NZ"
    }
}

/// Resolves the effective settings.
///
/// * `color` is looked up in `palette`; unknown names fall back to the prop.
/// * `brand` is `source`, then `brand`, then the prop, then [`DEFAULT_BRAND`].
/// * `button_text` is `buttonText`, then the prop, then [`DEFAULT_BUTTON_TEXT`].
///
/// Empty values count as absent at every step.
pub fn resolve_settings(
    props: &SettingsProps,
    query: &SettingsQuery,
    palette: &ColorPalette,
) -> EffectiveSettings {
    let prop_color = non_empty(props.button_color.as_deref()).map(str::to_string);
    let button_color = match non_empty(query.color.as_deref()) {
        Some(name) => palette
            .lookup(name)
            .map(str::to_string)
            .or(prop_color),
        None => prop_color,
    };

    let brand = query_text(&query.source)
        .or_else(|| query_text(&query.brand))
        .or_else(|| non_empty(props.brand.as_deref()).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_BRAND.to_string());

    let button_text = query_text(&query.button_text)
        .or_else(|| non_empty(props.button_text.as_deref()).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_BUTTON_TEXT.to_string());

    EffectiveSettings {
        country: FORCED_COUNTRY.to_string(),
        button_color,
        lead_source: FORCED_LEAD_SOURCE.to_string(),
        brand,
        button_text,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// `+` is a word separator in these parameters even when it arrives encoded.
fn query_text(value: &Option<String>) -> Option<String> {
    non_empty(value.as_deref()).map(|v| v.replace('+', " "))
}
