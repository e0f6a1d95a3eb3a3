//! Tools exposed to the live agent.

use crate::{
    agent::{Tool, ToolContext},
    content_store::ContentStore,
    generator::{ContentGenerator, DEFAULT_ASPECT_RATIO, GenerationError},
    page::ContentPage,
    prompts::{self, DEFAULT_FOCUS},
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info, instrument};

pub const ENCYCLOPEDIA_TOOL_NAME: &str = "generate_encyclopedia_page";

/// Generates one page for `topic` and `focus`.
pub async fn generate_page(
    generator: &dyn ContentGenerator,
    topic: &str,
    focus: &str,
) -> Result<ContentPage, GenerationError> {
    let prompt = prompts::page_prompt(topic, focus);
    let fragments = generator
        .generate_interleaved(&prompt, DEFAULT_ASPECT_RATIO)
        .await?;
    Ok(ContentPage::assemble(topic, focus, fragments))
}

#[derive(Deserialize, Debug)]
struct PageArgs {
    topic: String,
    #[serde(default)]
    focus: Option<String>,
}

/// Builds an illustrated page and hands it to the viewers of the calling
/// session through the [`ContentStore`].
pub struct EncyclopediaPageTool {
    generator: Arc<dyn ContentGenerator>,
    store: Arc<ContentStore>,
}

impl EncyclopediaPageTool {
    pub fn new(generator: Arc<dyn ContentGenerator>, store: Arc<ContentStore>) -> Self {
        Self { generator, store }
    }
}

#[async_trait]
impl Tool for EncyclopediaPageTool {
    fn name(&self) -> &str {
        ENCYCLOPEDIA_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Generates an illustrated encyclopedia page with interleaved text and images about a \
         topic. Use it whenever the user asks about a subject or wants to see something."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "topic": {
                    "type": "STRING",
                    "description": "Main subject of the page, e.g. \"volcanoes\"."
                },
                "focus": {
                    "type": "STRING",
                    "description": "Optional aspect to emphasise, e.g. \"eruption types\"."
                }
            },
            "required": ["topic"]
        })
    }

    #[instrument(name = "encyclopedia_tool", skip_all, fields(session_id = %ctx.session_id))]
    async fn call(&self, args: Value, ctx: &ToolContext) -> Value {
        let args: PageArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => {
                return json!({
                    "status": "error",
                    "message": format!("Invalid arguments: {}", e),
                });
            }
        };
        let focus = args
            .focus
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FOCUS.to_string());

        let page = match generate_page(self.generator.as_ref(), &args.topic, &focus).await {
            Ok(page) => page,
            Err(e) => {
                error!(topic = %args.topic, error = %e, "Encyclopedia generation failed");
                return json!({
                    "status": "error",
                    "message": format!("Failed to generate encyclopedia page: {}", e),
                });
            }
        };

        let section_count = page.sections.len();
        let image_count = page.image_count();
        if !ctx.session_id.is_empty() {
            self.store.publish(&ctx.session_id, page);
        }
        info!(topic = %args.topic, section_count, image_count, "Encyclopedia page generated");

        json!({
            "status": "success",
            "topic": args.topic,
            "section_count": section_count,
            "image_count": image_count,
            "message": format!(
                "Encyclopedia page generated with {} sections and {} illustrations about {}.",
                section_count, image_count, args.topic
            ),
        })
    }
}
