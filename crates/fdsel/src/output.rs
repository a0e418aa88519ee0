use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One message as the CLI reports it.
#[derive(Debug)]
pub struct Message<'a> {
    /// Where the message came from, e.g. `client-3` or the socket path.
    pub peer: &'a str,
    pub payload: &'a [u8],
    /// Leading bytes read from each descriptor that arrived with the payload.
    pub descriptors: &'a [Vec<u8>],
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    peer: &'a str,
    payload_size: usize,
    payload: String,
    descriptors: Vec<DescriptorOutput>,
    timestamp: String,
}

#[derive(Serialize)]
struct DescriptorOutput {
    index: usize,
    size: usize,
    data: String,
}

pub fn print_message(message: &Message<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                peer: message.peer,
                payload_size: message.payload.len(),
                payload: preview(message.payload),
                descriptors: describe(message.descriptors),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PEER", "SIZE", "FDS", "PAYLOAD"])
                .add_row(vec![
                    message.peer.to_string(),
                    message.payload.len().to_string(),
                    message.descriptors.len().to_string(),
                    preview(message.payload),
                ]);
            for (index, data) in message.descriptors.iter().enumerate() {
                table.add_row(vec![
                    String::new(),
                    data.len().to_string(),
                    format!("#{index}"),
                    preview(data),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "peer={} size={} fds={} payload={:?}",
                message.peer,
                message.payload.len(),
                message.descriptors.len(),
                preview(message.payload)
            );
            for (index, data) in message.descriptors.iter().enumerate() {
                println!("  fd#{index} size={} data={:?}", data.len(), preview(data));
            }
        }
        OutputFormat::Raw => {
            print_raw(message.payload);
            for data in message.descriptors {
                print_raw(data);
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn describe(descriptors: &[Vec<u8>]) -> Vec<DescriptorOutput> {
    descriptors
        .iter()
        .enumerate()
        .map(|(index, data)| DescriptorOutput {
            index,
            size: data.len(),
            data: preview(data),
        })
        .collect()
}

fn preview(data: &[u8]) -> String {
    match std::str::from_utf8(data) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", data.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
