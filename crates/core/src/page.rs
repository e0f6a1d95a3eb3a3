//! Content pages produced by the generation step.
//!
//! A page is assembled once from the generator's interleaved text and image
//! fragments and is immutable afterwards.

use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const DEFAULT_IMAGE_MIME_TYPE: &str = "image/png";

/// An inline illustration. Serialized with its bytes base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    #[serde(serialize_with = "to_base64", deserialize_with = "from_base64")]
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// A run of text followed by the images that illustrate it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Section {
    pub text: String,
    pub images: Vec<Image>,
}

impl Section {
    fn is_empty(&self) -> bool {
        self.text.is_empty() && self.images.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPage {
    pub topic: String,
    pub focus: String,
    pub sections: Vec<Section>,
}

/// One piece of the generator's output, in the order it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageFragment {
    Text(String),
    Image(Image),
}

impl ContentPage {
    /// Groups fragments into sections, preserving their interleaving.
    ///
    /// Consecutive text is concatenated. Text arriving after the current
    /// section already holds images starts a new section, so every section
    /// reads as text first, then its illustrations. Empty sections are never
    /// emitted.
    pub fn assemble(
        topic: impl Into<String>,
        focus: impl Into<String>,
        fragments: impl IntoIterator<Item = PageFragment>,
    ) -> Self {
        let mut sections = Vec::new();
        let mut current = Section::default();

        for fragment in fragments {
            match fragment {
                PageFragment::Text(text) => {
                    if text.is_empty() {
                        continue;
                    }
                    if !current.images.is_empty() {
                        sections.push(std::mem::take(&mut current));
                    }
                    current.text.push_str(&text);
                }
                PageFragment::Image(image) => current.images.push(image),
            }
        }
        if !current.is_empty() {
            sections.push(current);
        }

        Self {
            topic: topic.into(),
            focus: focus.into(),
            sections,
        }
    }

    pub fn image_count(&self) -> usize {
        self.sections.iter().map(|s| s.images.len()).sum()
    }
}

fn to_base64<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(data))
}

fn from_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(serde::de::Error::custom)
}
