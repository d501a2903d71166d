//! Request payloads: query strings, url-encoded forms and the multipart item form.

use actix_multipart::Multipart;
use chrono::{DateTime, NaiveDate, Utc};
use futures_util::TryStreamExt;
use serde::Deserialize;

use py_core::{
    calendar, DateBucket, FilterState, ImageUpload, ItemDraft, ItemId, ItemType, Location,
    LocationFilter, Tab,
};
use py_feed::{Confirmation, FeedSettings};

use crate::error::ApiError;

fn checked(flag: &Option<String>) -> bool {
    matches!(flag.as_deref(), Some("yes" | "on" | "true"))
}

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub q: Option<String>,
    pub location: Option<String>,
    pub date: Option<String>,
    pub mine: Option<String>,
    pub tab: Option<String>,
}

impl CatalogQuery {
    /// Unknown values fall back to the neutral criterion.
    pub fn filter(&self) -> FilterState {
        FilterState {
            search_term: self.q.as_deref().unwrap_or_default().trim().to_string(),
            location: self
                .location
                .as_deref()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(LocationFilter::All),
            date_bucket: self
                .date
                .as_deref()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(DateBucket::All),
            mine_only: checked(&self.mine),
            viewer_id: None,
        }
    }

    pub fn tab(&self) -> Tab {
        parse_tab(self.tab.as_deref())
    }
}

pub fn parse_tab(raw: Option<&str>) -> Tab {
    raw.and_then(|raw| raw.parse().ok()).unwrap_or_default()
}

#[derive(Debug, Deserialize)]
pub struct TabQuery {
    pub tab: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ItemQuery {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentForm {
    pub text: String,
    pub anonymous: Option<String>,
}

impl CommentForm {
    pub fn is_anonymous(&self) -> bool {
        checked(&self.anonymous)
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteForm {
    pub confirm: Option<String>,
}

impl DeleteForm {
    pub fn confirmation(&self) -> Confirmation {
        if checked(&self.confirm) {
            Confirmation::Confirmed
        } else {
            Confirmation::Declined
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Raw fields of the item form, before interpretation.
#[derive(Debug, Default)]
pub struct ItemFormData {
    pub id: String,
    pub name: String,
    pub description: String,
    pub location: String,
    pub item_type: String,
    pub date: String,
    pub anonymous: bool,
    pub image_url: String,
    pub image: Option<ImageUpload>,
}

/// Reads the multipart item form. File bytes beyond `max_file_bytes + 1`
/// are drained but not kept, so oversized uploads stay detectable.
pub async fn read_item_form(mut payload: Multipart, max_file_bytes: usize) -> Result<ItemFormData, ApiError> {
    let mut form = ItemFormData::default();
    let keep = max_file_bytes.saturating_add(1);

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|err| ApiError::Form(err.to_string()))?
    {
        let disposition = field.content_disposition();
        let name = disposition.get_name().unwrap_or_default().to_string();
        let file_name = disposition.get_filename().map(str::to_string);

        let mut data: Vec<u8> = Vec::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|err| ApiError::Form(err.to_string()))?
        {
            if data.len() < keep {
                let room = keep - data.len();
                data.extend_from_slice(&chunk[..chunk.len().min(room)]);
            }
        }

        if name == "image" {
            if let Some(file_name) = file_name.filter(|f| !f.is_empty()) {
                form.image = Some(ImageUpload::new(file_name, data));
            }
            continue;
        }

        let value = String::from_utf8(data).map_err(|_| ApiError::Form(format!("{name} is not UTF-8")))?;
        match name.as_str() {
            "id" => form.id = value,
            "name" => form.name = value,
            "description" => form.description = value,
            "location" => form.location = value,
            "type" => form.item_type = value,
            "date" => form.date = value,
            "anonymous" => form.anonymous = matches!(value.as_str(), "yes" | "on" | "true"),
            "image_url" => form.image_url = value,
            _ => {}
        }
    }
    Ok(form)
}

impl ItemFormData {
    /// Interprets the form. A report date of today means "now"; earlier dates
    /// start at local midnight.
    pub fn into_parts(
        self,
        now: DateTime<Utc>,
        settings: &FeedSettings,
    ) -> Result<(ItemDraft, Option<ImageUpload>), ApiError> {
        let item_type = match self.item_type.as_str() {
            "" => ItemType::Lost,
            raw => raw
                .parse()
                .map_err(|_| ApiError::Form("Tipo de objeto inválido".to_string()))?,
        };
        let location = match self.location.as_str() {
            "" => None,
            raw => Some(
                raw.parse::<Location>()
                    .map_err(|_| ApiError::Form("Ubicación inválida".to_string()))?,
            ),
        };

        let reported_at = match self.date.trim() {
            "" => None,
            raw => {
                let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|_| ApiError::Form("Fecha inválida".to_string()))?;
                if date == calendar::local_date(now, settings.utc_offset) {
                    None
                } else {
                    Some(calendar::local_midnight(date, settings.utc_offset))
                }
            }
        };

        let id = self.id.trim();
        let draft = ItemDraft {
            id: (!id.is_empty()).then(|| ItemId::new(id)),
            name: self.name,
            description: self.description,
            location,
            item_type,
            is_anonymous: self.anonymous,
            reported_at,
            image_url: (!self.image_url.is_empty()).then_some(self.image_url),
        };
        Ok((draft, self.image))
    }
}
