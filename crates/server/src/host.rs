//! Line-oriented event loop between the host and the controller.
//!
//! Every inbound line is handled on its own task, so a slow fetch never holds
//! up a sync signal behind it. Replies are funnelled through one writer and may
//! therefore arrive in a different order than their events; the `id` ties them
//! back together.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};

use crate::error::HostError;
use crate::lifecycle::LifecycleController;
use crate::wire::{self, Reply};

/// Serve frames from `reader` until EOF, then wait for in-flight events.
///
/// A line that is not UTF-8 gets an `INVALID_INPUT` reply like any other bad
/// frame. Returns the writer once every reply has been flushed.
pub async fn serve<R, W>(controller: Arc<LifecycleController>, mut reader: R, mut writer: W) -> std::io::Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let read = async move {
        let mut tasks = JoinSet::new();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            reap_finished(&mut tasks);

            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line.trim().to_string(),
                Err(e) => {
                    tracing::warn!(error = %e, "rejected frame");
                    let reply = Reply::err(None, HostError::MalformedFrame(format!("frame is not UTF-8: {e}")));
                    if tx.send(reply.to_line()).is_err() {
                        tracing::warn!("reply writer closed, dropping reply");
                    }
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }

            let controller = controller.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                let reply = wire::dispatch(&controller, &line).await;
                if tx.send(reply.to_line()).is_err() {
                    tracing::warn!("reply writer closed, dropping reply");
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }

        tracing::debug!("input closed");
        Ok::<_, std::io::Error>(())
    };

    let write = async {
        while let Some(line) = rx.recv().await {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    };

    let (read, write) = tokio::join!(read, write);
    read?;
    write?;

    Ok(writer)
}

/// Collect event tasks that have already completed without waiting on the rest.
fn reap_finished(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.try_join_next() {
        log_join(joined);
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "event task failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use swcache_client::mock::MockTransport;
    use swcache_core::{AppConfig, CacheDb};
    use url::Url;

    async fn controller(transport: MockTransport) -> Arc<LifecycleController> {
        let config = AppConfig { origin: "https://app.example".into(), ..Default::default() };
        let db = Arc::new(CacheDb::open_in_memory().await.unwrap());
        Arc::new(LifecycleController::from_config(&config, db, Arc::new(transport)).unwrap())
    }

    fn replies(output: Vec<u8>) -> Vec<Value> {
        let mut replies: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        replies.sort_by_key(|r| r["id"].as_u64().unwrap_or(u64::MAX));
        replies
    }

    #[tokio::test]
    async fn test_one_reply_per_frame() {
        let css = Url::parse("https://app.example/styles.css").unwrap();
        let controller = controller(MockTransport::new().respond(&css, 200, "body{}")).await;
        let input = [
            r#"{"id":1,"type":"install"}"#,
            "",
            r#"{"id":2,"type":"sync","tag":"raffle-action"}"#,
            r#"{"id":3,"type":"nonsense"}"#,
        ]
        .join("\n");

        let output = serve(controller, input.as_bytes(), Vec::new()).await.unwrap();
        let replies = replies(output);

        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0]["id"], json!(1));
        assert_eq!(replies[1]["id"], json!(2));
        assert_eq!(replies[2]["ok"], json!(false));
        assert_eq!(replies[2]["error"]["code"], json!("INVALID_INPUT"));
    }

    #[tokio::test]
    async fn test_fetch_round_trip_after_activation() {
        let css = Url::parse("https://app.example/styles.css").unwrap();
        let controller = controller(MockTransport::new().respond(&css, 200, "body{}")).await;
        controller.install().await.unwrap();
        controller.activate().await.unwrap();
        let input = r#"{"id":9,"type":"fetch","request":{"url":"/styles.css"}}"#;

        let output = serve(controller, input.as_bytes(), Vec::new()).await.unwrap();
        let replies = replies(output);

        assert_eq!(replies[0]["ok"], json!(true));
        assert_eq!(replies[0]["outcome"]["class"], json!("static"));
        assert_eq!(replies[0]["outcome"]["controlled"], json!(true));
        assert_eq!(replies[0]["outcome"]["response"]["body"], json!("body{}"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_rejected_and_serving_continues() {
        let controller = controller(MockTransport::new()).await;
        let mut input = br#"{"id":1,"type":"retire"}"#.to_vec();
        input.extend_from_slice(b"\n\xff\xfe\n");
        input.extend_from_slice(br#"{"id":2,"type":"retire"}"#);

        let output = serve(controller, &input[..], Vec::new()).await.unwrap();
        let replies = replies(output);

        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0]["id"], json!(1));
        assert_eq!(replies[0]["ok"], json!(true));
        assert_eq!(replies[1]["id"], json!(2));
        assert_eq!(replies[1]["ok"], json!(true));
        assert!(replies[2].get("id").is_none());
        assert_eq!(replies[2]["error"]["code"], json!("INVALID_INPUT"));
    }

    #[tokio::test]
    async fn test_reap_finished_drains_completed_tasks() {
        let mut tasks = JoinSet::new();
        for _ in 0..3 {
            tasks.spawn(async {});
        }

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while !tasks.is_empty() {
                reap_finished(&mut tasks);
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
