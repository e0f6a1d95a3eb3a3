//! In-memory collaborators shared by the service tests.

use crate::{config::Config, state::AppState};
use async_trait::async_trait;
use encyclopedia_core::{
    agent::{AgentEvent, AgentEventStream, AgentRunner, LiveRequest, LiveRequestReceiver},
    content_store::ContentStore,
    generator::{ContentGenerator, GenerationError},
    page::{Image, PageFragment},
    session::{InMemorySessionService, SessionHandle},
    video::{VideoGenerator, VideoStatus},
};
use futures::StreamExt;
use std::{path::PathBuf, sync::Mutex, time::Duration};
use tokio::sync::mpsc;

/// Agent runner that forwards every request it receives to the test and
/// replays a fixed list of events.
pub struct FakeRunner {
    script: Mutex<Vec<anyhow::Result<AgentEvent>>>,
    end_after_script: bool,
    fail: bool,
    forwarded: mpsc::UnboundedSender<LiveRequest>,
}

impl FakeRunner {
    /// With `end_after_script` unset the event stream stays open until the
    /// relay stops reading it.
    pub fn new(
        script: Vec<anyhow::Result<AgentEvent>>,
        end_after_script: bool,
    ) -> (Self, mpsc::UnboundedReceiver<LiveRequest>) {
        let (forwarded, rx) = mpsc::unbounded_channel();
        let runner = Self {
            script: Mutex::new(script),
            end_after_script,
            fail: false,
            forwarded,
        };
        (runner, rx)
    }

    pub fn failing() -> Self {
        let (mut runner, _) = Self::new(vec![], true);
        runner.fail = true;
        runner
    }
}

#[async_trait]
impl AgentRunner for FakeRunner {
    async fn run_live(
        &self,
        _session: SessionHandle,
        mut requests: LiveRequestReceiver,
    ) -> anyhow::Result<AgentEventStream> {
        if self.fail {
            anyhow::bail!("agent service unavailable");
        }

        let forwarded = self.forwarded.clone();
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                let closed = request == LiveRequest::Close;
                let _ = forwarded.send(request);
                if closed {
                    break;
                }
            }
        });

        let script = std::mem::take(&mut *self.script.lock().unwrap());
        let events = futures::stream::iter(script);
        if self.end_after_script {
            Ok(events.boxed())
        } else {
            Ok(events.chain(futures::stream::pending()).boxed())
        }
    }
}

/// Generator returning one text and one image fragment.
pub struct FakeGenerator {
    pub fail: bool,
}

#[async_trait]
impl ContentGenerator for FakeGenerator {
    async fn generate_interleaved(
        &self,
        _prompt: &str,
        _aspect_ratio: &str,
    ) -> Result<Vec<PageFragment>, GenerationError> {
        if self.fail {
            return Err(GenerationError::Empty);
        }
        Ok(vec![
            PageFragment::Text("Molten rock".to_string()),
            PageFragment::Image(Image {
                data: vec![1, 2, 3],
                mime_type: "image/png".to_string(),
            }),
        ])
    }
}

/// Video generator whose operation settles with `status`.
pub struct FakeVideo {
    pub status: VideoStatus,
}

#[async_trait]
impl VideoGenerator for FakeVideo {
    async fn start_video(&self, _prompt: &str, _image: &Image) -> Result<String, GenerationError> {
        Ok("operations/test".to_string())
    }

    async fn poll_video(&self, _operation: &str) -> Result<VideoStatus, GenerationError> {
        Ok(self.status.clone())
    }
}

pub fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        google_api_key: "test-key".to_string(),
        live_model: "live".to_string(),
        image_model: "image".to_string(),
        video_model: "video".to_string(),
        log_level: tracing::Level::INFO,
        frontend_dir: PathBuf::from("./frontend"),
        session_idle_timeout: Duration::from_secs(60),
        max_sessions: 8,
    }
}

pub fn app_state(generator: FakeGenerator, video: FakeVideo) -> AppState {
    let (runner, _) = FakeRunner::new(vec![], true);
    AppState {
        config: std::sync::Arc::new(test_config()),
        sessions: std::sync::Arc::new(InMemorySessionService::new(8)),
        agent: std::sync::Arc::new(runner),
        content_store: std::sync::Arc::new(ContentStore::new()),
        generator: std::sync::Arc::new(generator),
        video: std::sync::Arc::new(video),
    }
}
