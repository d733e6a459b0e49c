//! Tool catalogue and `tools/call` dispatch

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::protocol::{error_codes, JsonRpcError};
use crate::pipeline::Pipeline;
use crate::ERROR_PREFIX;

pub const GET_DOWNLOAD_LINK: &str = "get_download_link";
pub const EXTRACT_TEXT: &str = "extract_text";

/// Names older clients still call the tools by
const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("get_douyin_download_link", GET_DOWNLOAD_LINK),
    ("extract_douyin_text", EXTRACT_TEXT),
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<Content>,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GetDownloadLinkArgs {
    share_link: String,
}

#[derive(Debug, Deserialize)]
struct ExtractTextArgs {
    share_link: String,
    #[serde(default)]
    model: Option<String>,
}

pub fn tool_names() -> [&'static str; 2] {
    [GET_DOWNLOAD_LINK, EXTRACT_TEXT]
}

/// Canonical tool name, accepting legacy aliases
pub fn canonical_name(name: &str) -> Option<&'static str> {
    tool_names()
        .into_iter()
        .find(|tool| *tool == name)
        .or_else(|| {
            LEGACY_ALIASES
                .iter()
                .find(|(alias, _)| *alias == name)
                .map(|(_, tool)| *tool)
        })
}

pub fn tool_definitions(default_model: &str) -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: GET_DOWNLOAD_LINK,
            description: "Resolve a Douyin share link (or text containing one) into the \
                          watermark-free video download URL together with title, author, \
                          cover and duration.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "share_link": {
                        "type": "string",
                        "description": "Douyin share link or the full share text copied from the app"
                    }
                },
                "required": ["share_link"]
            }),
        },
        ToolDefinition {
            name: EXTRACT_TEXT,
            description: "Download the audio of a Douyin video and return its spoken text. \
                          Requires a speech recognition API key.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "share_link": {
                        "type": "string",
                        "description": "Douyin share link or the full share text copied from the app"
                    },
                    "model": {
                        "type": "string",
                        "description": "Speech recognition model",
                        "default": default_model
                    }
                },
                "required": ["share_link"]
            }),
        },
    ]
}

fn arguments<T: for<'de> Deserialize<'de>>(tool: &str, arguments: Option<Value>) -> Result<T, JsonRpcError> {
    let arguments = arguments.unwrap_or_else(|| json!({}));
    serde_json::from_value(arguments)
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid arguments for {}: {}", tool, e)))
}

/// Run a tool. Tool-level failures come back as `isError` results, not JSON-RPC errors.
pub async fn call_tool(pipeline: &Pipeline, params: Option<Value>) -> Result<CallToolResult, JsonRpcError> {
    let params: CallToolParams = serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid tools/call params: {}", e)))?;

    let Some(tool) = canonical_name(&params.name) else {
        return Err(JsonRpcError::invalid_params(format!("Unknown tool: {}", params.name)));
    };

    match tool {
        GET_DOWNLOAD_LINK => {
            let args: GetDownloadLinkArgs = arguments(tool, params.arguments)?;
            let result = pipeline.get_download_link(&args.share_link).await;

            let structured = serde_json::to_value(&result)
                .map_err(|e| JsonRpcError::new(error_codes::INTERNAL_ERROR, e.to_string()))?;
            let text = serde_json::to_string_pretty(&structured)
                .map_err(|e| JsonRpcError::new(error_codes::INTERNAL_ERROR, e.to_string()))?;

            Ok(CallToolResult {
                content: vec![Content::Text { text }],
                is_error: result.is_error(),
                structured_content: Some(structured),
            })
        }
        _ => {
            let args: ExtractTextArgs = arguments(tool, params.arguments)?;
            let text = pipeline
                .extract_text(&args.share_link, args.model.as_deref())
                .await;

            Ok(CallToolResult {
                is_error: text.starts_with(ERROR_PREFIX),
                content: vec![Content::Text { text }],
                structured_content: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("get_download_link"), Some(GET_DOWNLOAD_LINK));
        assert_eq!(canonical_name("extract_douyin_text"), Some(EXTRACT_TEXT));
        assert_eq!(canonical_name("get_douyin_download_link"), Some(GET_DOWNLOAD_LINK));
        assert_eq!(canonical_name("parse_douyin_video_info"), None);
    }

    #[test]
    fn test_definitions_require_share_link() {
        let tools = tool_definitions("paraformer-v2");
        assert_eq!(tools.len(), 2);

        for tool in &tools {
            assert_eq!(tool.input_schema["required"], json!(["share_link"]));
        }

        let json = serde_json::to_value(&tools[1]).unwrap();
        assert_eq!(json["inputSchema"]["properties"]["model"]["default"], "paraformer-v2");
    }

    #[test]
    fn test_text_content_shape() {
        let result = CallToolResult {
            content: vec![Content::Text { text: "hi".into() }],
            is_error: false,
            structured_content: None,
        };
        let json = serde_json::to_value(result).unwrap();
        assert_eq!(json, json!({ "content": [{ "type": "text", "text": "hi" }], "isError": false }));
    }
}
