//! Image-to-video generation through Veo long-running operations.

use crate::{
    generator::{DEFAULT_ASPECT_RATIO, GeminiClient, GenerationError},
    page::Image,
};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const VIDEO_MIME_TYPE: &str = "video/mp4";
pub const VIDEO_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const VIDEO_MAX_WAIT: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoStatus {
    Pending,
    Ready(Vec<u8>),
    /// The operation finished without producing a video, usually because of
    /// content filtering.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoOutcome {
    Ready(Vec<u8>),
    NoVideo,
    TimedOut,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoGenerator: Send + Sync {
    /// Starts generation and returns the operation name to poll.
    async fn start_video(&self, prompt: &str, image: &Image) -> Result<String, GenerationError>;

    async fn poll_video(&self, operation: &str) -> Result<VideoStatus, GenerationError>;
}

/// Polls `operation` every `interval` until it settles or `max_wait` passes.
pub async fn wait_for_video(
    generator: &dyn VideoGenerator,
    operation: &str,
    interval: Duration,
    max_wait: Duration,
) -> Result<VideoOutcome, GenerationError> {
    let started = Instant::now();
    loop {
        match generator.poll_video(operation).await? {
            VideoStatus::Ready(bytes) => return Ok(VideoOutcome::Ready(bytes)),
            VideoStatus::Empty => return Ok(VideoOutcome::NoVideo),
            VideoStatus::Pending => {}
        }
        if started.elapsed() >= max_wait {
            warn!(operation, "Video generation timed out");
            return Ok(VideoOutcome::TimedOut);
        }
        tokio::time::sleep(interval).await;
    }
}

#[derive(Deserialize, Debug)]
struct StartedOperation {
    name: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct Operation {
    #[serde(default)]
    done: bool,
    error: Option<Value>,
    response: Option<OperationResponse>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Deserialize, Debug)]
struct GeneratedSample {
    video: Option<VideoRef>,
}

#[derive(Deserialize, Debug)]
struct VideoRef {
    uri: Option<String>,
}

impl Operation {
    fn video_uri(self) -> Option<String> {
        self.response?
            .generate_video_response?
            .generated_samples
            .into_iter()
            .find_map(|s| s.video.and_then(|v| v.uri))
    }
}

#[async_trait]
impl VideoGenerator for GeminiClient {
    async fn start_video(&self, prompt: &str, image: &Image) -> Result<String, GenerationError> {
        let url = format!(
            "{}/models/{}:predictLongRunning",
            self.base_url, self.video_model
        );
        let body = json!({
            "instances": [{
                "prompt": prompt,
                "image": {
                    "bytesBase64Encoded": base64::engine::general_purpose::STANDARD.encode(&image.data),
                    "mimeType": image.mime_type,
                },
            }],
            "parameters": {
                "aspectRatio": DEFAULT_ASPECT_RATIO,
                "personGeneration": "dont_allow",
                "sampleCount": 1,
            },
        });

        let started: StartedOperation =
            self.send(self.http.post(url).json(&body)).await?.json().await?;
        info!(operation = %started.name, model = %self.video_model, "Video generation started");
        Ok(started.name)
    }

    async fn poll_video(&self, operation: &str) -> Result<VideoStatus, GenerationError> {
        let url = format!("{}/{}", self.base_url, operation);
        let op: Operation = self.send(self.http.get(url)).await?.json().await?;
        if !op.done {
            debug!(operation, "Video generation still running");
            return Ok(VideoStatus::Pending);
        }
        if let Some(error) = &op.error {
            return Err(GenerationError::Operation(error.to_string()));
        }

        let Some(uri) = op.video_uri() else {
            return Ok(VideoStatus::Empty);
        };
        let bytes = self.send(self.http.get(uri)).await?.bytes().await?;
        info!(operation, bytes = bytes.len(), "Video downloaded");
        Ok(VideoStatus::Ready(bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;

    #[tokio::test]
    async fn test_wait_returns_video_after_pending_polls() {
        let mut generator = MockVideoGenerator::new();
        let mut seq = Sequence::new();
        generator
            .expect_poll_video()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(VideoStatus::Pending));
        generator
            .expect_poll_video()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(VideoStatus::Ready(vec![9, 9])));

        let outcome = wait_for_video(
            &generator,
            "operations/1",
            Duration::from_millis(1),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(outcome, VideoOutcome::Ready(vec![9, 9]));
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let mut generator = MockVideoGenerator::new();
        generator
            .expect_poll_video()
            .returning(|_| Ok(VideoStatus::Pending));

        let outcome = wait_for_video(
            &generator,
            "operations/1",
            Duration::from_millis(1),
            Duration::from_millis(5),
        )
        .await
        .unwrap();
        assert_eq!(outcome, VideoOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_wait_reports_filtered_output() {
        let mut generator = MockVideoGenerator::new();
        generator
            .expect_poll_video()
            .returning(|_| Ok(VideoStatus::Empty));

        let outcome = wait_for_video(
            &generator,
            "operations/1",
            Duration::from_millis(1),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(outcome, VideoOutcome::NoVideo);
    }

    #[test]
    fn test_operation_video_uri() {
        let raw = r#"{
            "done": true,
            "response": { "generateVideoResponse": { "generatedSamples": [
                { "video": { "uri": "https://example.com/v.mp4" } }
            ]}}
        }"#;
        let op: Operation = serde_json::from_str(raw).unwrap();
        assert!(op.done);
        assert_eq!(op.video_uri().as_deref(), Some("https://example.com/v.mp4"));

        let op: Operation = serde_json::from_str(r#"{"done":true,"response":{}}"#).unwrap();
        assert_eq!(op.video_uri(), None);
    }
}
