// ===============================
// src/recorder.rs
// ===============================
//
// Lightweight JSONL recorder:
// - every Event becomes one timestamped line, appended to the file
// - BufWriter to save syscalls, flushed every 1s and every 1000 events
// - parent directory created on demand
// - on a write error the file is reopened once and the event retried
//
// ENV: set `RECORD_FILE=/path/to/events.jsonl` to enable (see main.rs).
//
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info};

use crate::domain::Event;

const FLUSH_EVERY_N_EVENTS: u32 = 1000;

#[derive(Serialize)]
struct Record<'a> {
    ts: String,
    #[serde(flatten)]
    event: &'a Event,
}

/// One JSONL line (without the newline).
pub fn encode(event: &Event) -> serde_json::Result<String> {
    serde_json::to_string(&Record {
        ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        event,
    })
}

async fn open_writer(path: &str) -> std::io::Result<BufWriter<fs::File>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

async fn write_line(writer: &mut BufWriter<fs::File>, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await
}

/// Drain `rx` into `path` until every sender is dropped.
pub async fn run(mut rx: mpsc::Receiver<Event>, path: String) {
    let mut writer = match open_writer(&path).await {
        Ok(w) => w,
        Err(e) => {
            error!(?e, %path, "recorder: open failed, events will be dropped");
            // keep draining so senders never block on a full channel
            while rx.recv().await.is_some() {}
            return;
        }
    };
    info!(%path, "recorder: started");

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut since_last_flush: u32 = 0;

    loop {
        tokio::select! {
            maybe_ev = rx.recv() => {
                let Some(ev) = maybe_ev else {
                    let _ = writer.flush().await;
                    info!("recorder: channel closed, stopped");
                    break;
                };

                let line = match encode(&ev) {
                    Ok(s) => s,
                    Err(e) => {
                        error!(?e, "recorder: serialize error, skip event");
                        continue;
                    }
                };

                if let Err(e) = write_line(&mut writer, &line).await {
                    error!(?e, "recorder: write failed, attempting reopen");
                    match open_writer(&path).await {
                        Ok(w) => writer = w,
                        Err(e2) => {
                            error!(?e2, "recorder: reopen failed, drop event");
                            continue;
                        }
                    }
                    if let Err(e2) = write_line(&mut writer, &line).await {
                        error!(?e2, "recorder: write failed again after reopen, drop event");
                        continue;
                    }
                }

                since_last_flush += 1;
                if since_last_flush >= FLUSH_EVERY_N_EVENTS {
                    let _ = writer.flush().await;
                    since_last_flush = 0;
                }
            }

            _ = tick.tick() => {
                let _ = writer.flush().await;
                since_last_flush = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Category;

    #[test]
    fn events_are_flat_tagged_json() {
        let line = encode(&Event::Analyzed {
            symbol: "7203.T".into(),
            category: Category::Holding,
            judgment: "買い".into(),
            simplified: false,
            elapsed_ms: 12,
        })
        .unwrap();
        let v: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["kind"], "analyzed");
        assert_eq!(v["category"], "holding");
        assert_eq!(v["judgment"], "買い");
        assert!(v["ts"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn writes_one_line_per_event_and_flushes_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/events.jsonl");
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(run(rx, path.display().to_string()));

        tx.send(Event::Failed { symbol: "AAPL".into(), reason: "timeout".into() }).await.unwrap();
        tx.send(Event::Delivered { category: Category::Holding, reports: 3 }).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"kind\":\"failed\""));
        assert!(lines[1].contains("\"kind\":\"delivered\""));
        assert!(lines[1].contains("\"reports\":3"));
    }
}
