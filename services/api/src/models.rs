//! REST API Models
//!
//! Request and response bodies of the HTTP endpoints, annotated with `utoipa`
//! so they appear in the generated OpenAPI document.

use encyclopedia_core::page::{ContentPage, Section};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn default_image_mime_type() -> String {
    encyclopedia_core::page::DEFAULT_IMAGE_MIME_TYPE.to_string()
}

#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct GenerateRequest {
    #[schema(example = "Volcanoes")]
    pub topic: String,
    #[schema(example = "eruption types")]
    pub focus: Option<String>,
    /// When set, the page is also pushed to this session's content viewers.
    pub session_id: Option<String>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ImageBody {
    /// Base64 encoded image bytes.
    pub data: String,
    #[schema(example = "image/png")]
    pub mime_type: String,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct SectionBody {
    pub text: String,
    pub images: Vec<ImageBody>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct PageResponse {
    #[schema(example = "success")]
    pub status: String,
    #[serde(rename = "type")]
    #[schema(example = "encyclopedia_page")]
    pub kind: String,
    pub topic: String,
    pub focus: String,
    pub sections: Vec<SectionBody>,
}

impl From<&Section> for SectionBody {
    fn from(section: &Section) -> Self {
        use base64::Engine;
        Self {
            text: section.text.clone(),
            images: section
                .images
                .iter()
                .map(|image| ImageBody {
                    data: base64::engine::general_purpose::STANDARD.encode(&image.data),
                    mime_type: image.mime_type.clone(),
                })
                .collect(),
        }
    }
}

impl From<&ContentPage> for PageResponse {
    fn from(page: &ContentPage) -> Self {
        Self {
            status: "success".to_string(),
            kind: "encyclopedia_page".to_string(),
            topic: page.topic.clone(),
            focus: page.focus.clone(),
            sections: page.sections.iter().map(SectionBody::from).collect(),
        }
    }
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct VideoRequest {
    /// Base64 encoded still image to animate.
    pub image_data: String,
    #[serde(default = "default_image_mime_type")]
    #[schema(example = "image/png")]
    pub mime_type: String,
    #[serde(default)]
    #[schema(example = "Volcanoes")]
    pub topic: String,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct VideoResponse {
    #[schema(example = "success")]
    pub status: String,
    /// Base64 encoded MP4 bytes.
    pub video_data: String,
    #[schema(example = "video/mp4")]
    pub video_mime_type: String,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ErrorResponse {
    #[schema(example = "error")]
    pub status: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}
