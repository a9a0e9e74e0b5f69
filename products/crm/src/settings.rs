//! Branding settings kept in a single row that is created on first access.

use std::collections::BTreeMap;

use chrono::Utc;
use entity::settings::{self, SINGLETON_ID};
use platform_api::{ApiError, ApiResult, FieldErrors};
use platform_db::{DbPool, db_error, is_unique_violation};
use sea_orm::{ActiveModelTrait, EntityTrait, Set, prelude::DateTimeWithTimeZone};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::validate;

pub const DEFAULT_PALETTE: &[(&str, &str)] = &[
    ("primary", "#4f46e5"),
    ("secondary", "#f59e0b"),
    ("accent", "#10b981"),
    ("background", "#ffffff"),
    ("text", "#111827"),
];

pub type Palette = BTreeMap<String, String>;

pub fn default_palette() -> Palette {
    DEFAULT_PALETTE
        .iter()
        .map(|(name, color)| (name.to_string(), color.to_string()))
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SettingsView {
    pub logo: Option<String>,
    pub colors: Palette,
    pub updated_at: DateTimeWithTimeZone,
}

impl From<settings::Model> for SettingsView {
    fn from(model: settings::Model) -> Self {
        let colors = serde_json::from_value(model.colors).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "stored palette unreadable; using defaults");
            default_palette()
        });
        Self {
            logo: model.logo,
            colors,
            updated_at: model.updated_at,
        }
    }
}

/// Omitted or empty `logo` keeps the stored logo; `colors` entries are merged
/// over the stored palette.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SettingsInput {
    pub logo: Option<String>,
    pub colors: Option<Palette>,
}

async fn load_or_create(db: &DbPool) -> ApiResult<settings::Model> {
    if let Some(model) = settings::Entity::find_by_id(SINGLETON_ID)
        .one(db)
        .await
        .map_err(db_error)?
    {
        return Ok(model);
    }
    let colors = serde_json::to_value(default_palette()).map_err(|err| ApiError::internal(err.into()))?;
    let inserted = settings::ActiveModel {
        id: Set(SINGLETON_ID),
        logo: Set(None),
        colors: Set(colors),
        updated_at: Set(Utc::now().into()),
    }
    .insert(db)
    .await;
    match inserted {
        Ok(model) => {
            tracing::info!("default settings created");
            Ok(model)
        }
        // Another request created the row first.
        Err(err) if is_unique_violation(&err) => settings::Entity::find_by_id(SINGLETON_ID)
            .one(db)
            .await
            .map_err(db_error)?
            .ok_or_else(|| ApiError::internal(anyhow::anyhow!("settings row vanished"))),
        Err(err) => Err(db_error(err)),
    }
}

#[instrument(skip(db))]
pub async fn get_settings(db: &DbPool) -> ApiResult<SettingsView> {
    load_or_create(db).await.map(SettingsView::from)
}

#[instrument(skip(db, input))]
pub async fn update_settings(db: &DbPool, input: SettingsInput) -> ApiResult<SettingsView> {
    let mut errors = FieldErrors::new();
    let logo = input
        .logo
        .as_deref()
        .map(str::trim)
        .filter(|logo| !logo.is_empty())
        .and_then(|logo| validate::http_url(&mut errors, "logo", logo));
    if let Some(colors) = &input.colors {
        for (name, color) in colors {
            let key = format!("colors.{name}");
            if name.trim().is_empty() || name.chars().count() > 32 {
                errors.add(key.clone(), "Color names must be 1 to 32 characters.");
            }
            if !validate::is_hex_color(color.trim()) {
                errors.add(key, "Enter a hex color such as #4f46e5.");
            }
        }
    }
    errors.into_result()?;

    let current = load_or_create(db).await?;
    let mut palette = SettingsView::from(current.clone()).colors;
    if let Some(colors) = input.colors {
        for (name, color) in colors {
            palette.insert(name.trim().to_string(), color.trim().to_lowercase());
        }
    }
    let colors = serde_json::to_value(&palette).map_err(|err| ApiError::internal(err.into()))?;

    let mut active: settings::ActiveModel = current.into();
    if let Some(logo) = logo {
        active.logo = Set(Some(logo));
    }
    active.colors = Set(colors);
    active.updated_at = Set(Utc::now().into());
    let model = active.update(db).await.map_err(db_error)?;
    tracing::info!("settings updated");
    Ok(model.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_palette_has_five_hex_colors() {
        let palette = default_palette();
        assert_eq!(palette.len(), 5);
        assert_eq!(palette["primary"], "#4f46e5");
        assert!(palette.values().all(|color| validate::is_hex_color(color)));
    }

    #[test]
    fn unreadable_palette_falls_back_to_defaults() {
        let view = SettingsView::from(settings::Model {
            id: SINGLETON_ID,
            logo: None,
            colors: serde_json::json!("not a map"),
            updated_at: Utc::now().into(),
        });
        assert_eq!(view.colors, default_palette());
    }
}
