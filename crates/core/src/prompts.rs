//! Prompt templates for the live agent and the page generator.

use crate::tools::ENCYCLOPEDIA_TOOL_NAME;

pub const DEFAULT_FOCUS: &str = "general overview";

/// Standing instruction for the live voice agent.
pub fn system_instruction() -> String {
    format!(
        r#"You are a friendly encyclopedia guide in the style of an illustrated reference book.
You talk with the user by voice and build visual encyclopedia pages for them.

When the user asks about a subject, call {tool} with the topic and any focus they mention.
Once the page is ready, give a short spoken summary of what it covers and offer to go deeper.
If the user asks to zoom in on part of a page, call the tool again with the narrower topic.
If they change subject, build a new page.

Keep spoken replies to two or three sentences; the page carries the detail.
Speak only words meant for the listener. Never describe your plan, the tools you use or
their arguments out loud, and never use markdown."#,
        tool = ENCYCLOPEDIA_TOOL_NAME
    )
}

const PAGE_TEMPLATE: &str = r#"Create an illustrated encyclopedia page about: {topic}
Focus on: {focus}

Interleave text and images in this order:
1. A detailed main illustration of the subject on a clean background.
2. An overview of two or three engaging paragraphs.
3. An explanatory diagram, cross-section or infographic.
4. Five to seven key facts with concrete numbers.
5. A comparison, scale or process illustration.
6. A deeper explanation of the most interesting mechanism or history.
7. A final illustration of a surprising aspect of the subject.
8. Three surprising "did you know" facts.

Every image must teach something. Write for curious readers of all ages and use specific
dates, measurements and comparisons."#;

/// Renders the page generation prompt for `topic` and `focus`.
pub fn page_prompt(topic: &str, focus: &str) -> String {
    PAGE_TEMPLATE
        .replace("{topic}", topic)
        .replace("{focus}", focus)
}

/// Prompt for animating one page illustration into a short clip.
pub fn animation_prompt(topic: &str) -> String {
    format!(
        "Gently animate this illustration about {}. Add subtle motion, parallax depth and \
         natural movement. Keep it smooth and educational.",
        topic
    )
}
