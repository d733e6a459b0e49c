use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::audio::AudioFormat;
use crate::cli::OutputFormat;
use crate::pipeline::LinkToolResult;
use crate::utils::{format_duration, format_file_size, sanitize_filename};

/// Render a link result for the console or a file
pub fn format_link_result(result: &LinkToolResult, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(result).context("Failed to serialize link result")
        }
        OutputFormat::Text => Ok(format_link_as_text(result)),
    }
}

fn format_link_as_text(result: &LinkToolResult) -> String {
    match result {
        LinkToolResult::Success(metadata) => {
            let mut lines = vec![
                format!("Title:    {}", metadata.title),
                format!("Author:   {}", metadata.author),
                format!("Video ID: {}", metadata.video_id),
            ];
            if let Some(seconds) = metadata.duration_seconds {
                lines.push(format!("Duration: {}", format_duration(seconds)));
            }
            if !metadata.cover_url.is_empty() {
                lines.push(format!("Cover:    {}", metadata.cover_url));
            }
            lines.push(format!("Download: {}", metadata.play_url));
            lines.join("\n")
        }
        LinkToolResult::Failure { error, message } => format!("{}: {}", message, error),
    }
}

/// Save rendered output to file
pub fn save_to_file(content: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs_err::create_dir_all(parent)?;
    }
    fs_err::write(path, content)?;
    Ok(())
}

/// Print rendered output to console
pub fn print_to_console(content: &str) {
    println!("{}", content);
}

/// File name a downloaded video is stored under
pub fn video_file_name(title: &str, video_id: &str, format: Option<AudioFormat>) -> String {
    let stem = sanitize_filename(title);
    let stem = if stem.is_empty() {
        format!("douyin_{}", video_id)
    } else {
        // Descriptions can be whole paragraphs
        stem.chars().take(80).collect::<String>().trim().to_string()
    };
    let ext = format.map(|f| f.as_str()).unwrap_or("mp4");
    format!("{}.{}", stem, ext)
}

/// Write downloaded media into `dir`, returning the final path
pub fn save_video(
    data: &[u8],
    dir: &Path,
    title: &str,
    video_id: &str,
    format: Option<AudioFormat>,
) -> Result<PathBuf> {
    fs_err::create_dir_all(dir)?;
    let path = dir.join(video_file_name(title, video_id, format));
    fs_err::write(&path, data)?;
    tracing::info!(
        "Saved {} to {}",
        format_file_size(data.len() as u64),
        path.display()
    );
    Ok(path)
}
