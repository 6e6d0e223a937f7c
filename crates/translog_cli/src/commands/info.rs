//! Info command implementation.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Summary of a log file.
#[derive(Debug, Serialize)]
pub struct InfoResult {
    /// Log path.
    pub path: String,
    /// File size in bytes.
    pub file_size: u64,
    /// Schema version recorded in the header.
    pub version: String,
    /// Number of messages.
    pub message_count: usize,
    /// Capture time of the oldest message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_time: Option<String>,
    /// Capture time of the newest message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_time: Option<String>,
    /// Per-topic breakdown.
    pub topics: Vec<TopicStats>,
}

/// Statistics for one topic/type pair.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TopicStats {
    /// Topic name.
    pub topic: String,
    /// Message type.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Number of messages.
    pub messages: usize,
    /// Total payload bytes.
    pub bytes: u64,
}

/// Runs the info command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = summarize(path)?;
    info!(path = %path.display(), messages = result.message_count, "inspected log");

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Reads the whole log once and summarizes it.
pub fn summarize(path: &Path) -> Result<InfoResult, Box<dyn std::error::Error>> {
    let log = super::open_log(path)?;
    let file_size = std::fs::metadata(path)?.len();

    let mut per_topic: BTreeMap<(String, String), (usize, u64)> = BTreeMap::new();
    let mut first_time = None;
    let mut last_time = None;
    let mut message_count = 0;

    for message in log.all_messages()? {
        let message = message?;
        let entry = per_topic
            .entry((message.topic().to_owned(), message.type_name().to_owned()))
            .or_default();
        entry.0 += 1;
        entry.1 += message.data().len() as u64;

        if first_time.is_none() {
            first_time = Some(message.time_received());
        }
        last_time = Some(message.time_received());
        message_count += 1;
    }

    Ok(InfoResult {
        path: path.display().to_string(),
        file_size,
        version: log.version().unwrap_or_default().to_owned(),
        message_count,
        first_time: first_time.map(|t| t.to_string()),
        last_time: last_time.map(|t| t.to_string()),
        topics: per_topic
            .into_iter()
            .map(|((topic, type_name), (messages, bytes))| TopicStats {
                topic,
                type_name,
                messages,
                bytes,
            })
            .collect(),
    })
}

fn print_text_output(result: &InfoResult) {
    println!("translog Log Info");
    println!("=================");
    println!();
    println!("Path:      {}", result.path);
    println!("Version:   {}", result.version);
    println!("Size:      {} bytes", result.file_size);
    println!("Messages:  {}", result.message_count);
    if let (Some(first), Some(last)) = (&result.first_time, &result.last_time) {
        println!("Start:     {first}");
        println!("End:       {last}");
    }
    println!();

    if result.topics.is_empty() {
        println!("No topics recorded.");
        return;
    }

    println!("Topics:");
    for topic in &result.topics {
        println!(
            "  {:30} {:30} {:>8} msgs {:>10} bytes",
            topic.topic, topic.type_name, topic.messages, topic.bytes
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use translog_core::{Log, OpenMode, Timestamp};

    #[test]
    fn summarizes_topics_and_span() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.tlog");
        {
            let mut log = Log::new();
            log.open(&path, OpenMode::ReadWrite).unwrap();
            log.insert_message(Timestamp::new(2, 0), "/a", "T", b"abc").unwrap();
            log.insert_message(Timestamp::new(1, 0), "/b", "U", b"de").unwrap();
            log.insert_message(Timestamp::new(3, 0), "/a", "T", b"f").unwrap();
        }

        let result = summarize(&path).unwrap();
        assert_eq!(result.version, "0.1.0");
        assert_eq!(result.message_count, 3);
        assert_eq!(result.first_time.as_deref(), Some("1.000000000"));
        assert_eq!(result.last_time.as_deref(), Some("3.000000000"));
        assert_eq!(
            result.topics,
            vec![
                TopicStats {
                    topic: "/a".into(),
                    type_name: "T".into(),
                    messages: 2,
                    bytes: 4,
                },
                TopicStats {
                    topic: "/b".into(),
                    type_name: "U".into(),
                    messages: 1,
                    bytes: 2,
                },
            ]
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(summarize(&dir.path().join("absent.tlog")).is_err());
    }
}
