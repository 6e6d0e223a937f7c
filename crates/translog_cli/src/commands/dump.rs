//! Dump command implementation.

use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use translog_core::{normalize_topic, Message, TimeRange, Timestamp, TopicFilter, TopicPattern};

/// Bytes of payload shown per message in text output.
const PREVIEW_LEN: usize = 32;

/// Which messages to dump.
#[derive(Debug, Default)]
pub struct DumpOptions {
    /// Exact topics; empty means every topic.
    pub topics: Vec<String>,
    /// Topic pattern, exclusive with `topics`.
    pub pattern: Option<String>,
    /// Inclusive lower time bound, as `sec[.frac]`.
    pub begin: Option<String>,
    /// Exclusive upper time bound, as `sec[.frac]`.
    pub end: Option<String>,
    /// Maximum number of messages.
    pub limit: Option<usize>,
}

/// Message representation for output.
#[derive(Debug, Serialize)]
pub struct MessageDump {
    /// Capture time.
    pub time: String,
    /// Topic name.
    pub topic: String,
    /// Message type.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Payload size in bytes.
    pub size: usize,
    /// Payload as text when it is UTF-8.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Payload hex-encoded when it is not UTF-8.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
}

impl From<Message> for MessageDump {
    fn from(message: Message) -> Self {
        let text = message.data_str().map(str::to_owned);
        let hex = if text.is_none() {
            Some(hex_encode(message.data()))
        } else {
            None
        };
        Self {
            time: message.time_received().to_string(),
            topic: message.topic().to_owned(),
            type_name: message.type_name().to_owned(),
            size: message.data().len(),
            text,
            hex,
        }
    }
}

/// Runs the dump command.
pub fn run(path: &Path, options: &DumpOptions, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let messages = collect(path, options)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&messages)?);
        }
        _ => {
            print_text_output(&messages);
        }
    }

    Ok(())
}

/// Runs the query described by `options`.
pub fn collect(
    path: &Path,
    options: &DumpOptions,
) -> Result<Vec<MessageDump>, Box<dyn std::error::Error>> {
    let filter = match (options.topics.is_empty(), &options.pattern) {
        (true, None) => TopicFilter::All,
        (false, None) => TopicFilter::Topics(
            options
                .topics
                .iter()
                .map(|t| normalize_topic(t).ok_or_else(|| format!("invalid topic name: {t:?}")))
                .collect::<Result<HashSet<_>, _>>()?,
        ),
        (true, Some(pattern)) => TopicFilter::Pattern(TopicPattern::new(pattern)?),
        (false, Some(_)) => return Err("--topic and --pattern cannot be combined".into()),
    };
    let range = TimeRange {
        begin: options.begin.as_deref().map(str::parse::<Timestamp>).transpose()?,
        end: options.end.as_deref().map(str::parse::<Timestamp>).transpose()?,
    };

    let log = super::open_log(path)?;
    let mut messages = Vec::new();
    for message in log
        .query(&filter, range)?
        .take(options.limit.unwrap_or(usize::MAX))
    {
        messages.push(MessageDump::from(message?));
    }
    Ok(messages)
}

fn print_text_output(messages: &[MessageDump]) {
    println!("Messages ({} total)", messages.len());
    println!("================");
    println!();

    for message in messages {
        print!(
            "[{}] {} ({}) {} bytes",
            message.time, message.topic, message.type_name, message.size
        );
        if let Some(text) = &message.text {
            let preview: String = text.chars().take(PREVIEW_LEN).collect();
            print!(" {preview:?}");
        } else if let Some(hex) = &message.hex {
            print!(" {}", &hex[..hex.len().min(PREVIEW_LEN * 2)]);
        }
        println!();
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
