//! The content channel: pushes every page published for a session to the
//! viewer connected on it.

use super::protocol::{ContentEvent, InboundError, decode_inbound, send_json};
use axum::extract::ws::Message;
use encyclopedia_core::content_store::ContentStore;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use tracing::{debug, info, instrument};

/// Streams pages to one viewer until it disconnects. The viewer's
/// subscription is removed before this returns.
#[instrument(name = "content_stream", skip_all, fields(session_id = %session_id))]
pub async fn stream_pages<Si, St>(store: &ContentStore, session_id: &str, mut sink: Si, mut stream: St)
where
    Si: Sink<Message> + Unpin + Send,
    Si::Error: Display,
    St: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    let mut subscription = store.subscribe(session_id);
    info!(
        viewers = store.subscriber_count(session_id),
        "Content viewer connected."
    );

    loop {
        tokio::select! {
            page = subscription.recv() => {
                let Some(page) = page else { break };
                if let Err(e) = send_json(&mut sink, &ContentEvent::EncyclopediaPage(&page)).await {
                    debug!(error = %e, "Viewer stopped accepting pages.");
                    break;
                }
                info!(topic = %page.topic, sections = page.sections.len(), "Page delivered.");
            }
            incoming = stream.next() => {
                // Viewers only listen; anything they send is ignored.
                if let Err(InboundError::Disconnected | InboundError::Transport(_)) = decode_inbound(incoming) {
                    break;
                }
            }
        }
    }

    store.unsubscribe(session_id, &subscription);
    let _ = sink.close().await;
    info!("Content viewer disconnected.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use encyclopedia_core::page::{ContentPage, PageFragment};
    use futures::channel::mpsc;
    use serde_json::Value;
    use std::sync::Arc;

    fn page(topic: &str) -> ContentPage {
        ContentPage::assemble(topic, "general overview", vec![PageFragment::Text("text".into())])
    }

    #[tokio::test]
    async fn test_pages_are_delivered_in_order_and_viewer_unsubscribes() {
        let store = Arc::new(ContentStore::new());
        let (client_tx, client_rx) = mpsc::unbounded::<Result<Message, axum::Error>>();
        let (server_tx, mut server_rx) = mpsc::unbounded::<Message>();

        let viewer = tokio::spawn({
            let store = store.clone();
            async move { stream_pages(&store, "s1", server_tx, client_rx).await }
        });

        while store.subscriber_count("s1") == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(store.publish("s1", page("Volcanoes")), 1);
        assert_eq!(store.publish("s1", page("Glaciers")), 1);

        let mut topics = Vec::new();
        for _ in 0..2 {
            let Some(Message::Text(text)) = server_rx.next().await else {
                panic!("expected a text frame");
            };
            let value: Value = serde_json::from_str(text.as_str()).unwrap();
            assert_eq!(value["type"], "encyclopedia_page");
            topics.push(value["topic"].as_str().unwrap().to_string());
        }
        assert_eq!(topics, vec!["Volcanoes", "Glaciers"]);

        drop(client_tx);
        viewer.await.unwrap();
        assert_eq!(store.subscriber_count("s1"), 0);
        assert_eq!(store.publish("s1", page("Ignored")), 0);
    }
}
