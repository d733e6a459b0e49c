use reqwest::header::LOCATION;
use reqwest::{redirect, Client};
use std::time::Duration;
use url::Url;

use super::{platform_client, transport_error, VideoId};
use crate::config::PlatformConfig;
use crate::PipelineError;

/// Query parameter some web URLs use instead of a path segment
const MODAL_ID_PARAM: &str = "modal_id";

/// Follows a share link's redirect chain until a URL carrying the video id shows up
pub struct RedirectResolver {
    client: Client,
    max_redirects: usize,
    timeout_secs: u64,
}

impl RedirectResolver {
    pub fn new(config: &PlatformConfig) -> crate::Result<Self> {
        // Redirects are followed by hand so the final page body is never fetched
        let client = platform_client(
            config,
            redirect::Policy::none(),
            Duration::from_secs(config.request_timeout_secs),
        )?;

        Ok(Self {
            client,
            max_redirects: config.max_redirects,
            timeout_secs: config.request_timeout_secs,
        })
    }

    /// Resolve a share link to the video id it points at
    pub async fn resolve(&self, share_url: &str) -> Result<VideoId, PipelineError> {
        let mut current = Url::parse(share_url).map_err(|e| {
            PipelineError::RedirectFailed(format!("invalid share URL {}: {}", share_url, e))
        })?;

        for hop in 0..self.max_redirects {
            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| {
                    transport_error(
                        e,
                        "redirect resolution",
                        self.timeout_secs,
                        PipelineError::RedirectFailed,
                    )
                })?;

            let status = response.status();

            if !status.is_redirection() {
                if status.is_client_error() || status.is_server_error() {
                    return Err(PipelineError::RedirectFailed(format!(
                        "HTTP {} from {}",
                        status, current
                    )));
                }

                // Every URL reached through a Location header was already checked for an id
                return Err(if hop == 0 {
                    PipelineError::NoRedirect(current.to_string())
                } else {
                    PipelineError::IdNotFound(current.to_string())
                });
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| {
                    PipelineError::NoRedirect(format!(
                        "HTTP {} without Location header from {}",
                        status, current
                    ))
                })?;

            let next = current.join(location).map_err(|e| {
                PipelineError::RedirectFailed(format!("invalid Location {}: {}", location, e))
            })?;

            tracing::debug!(hop = hop + 1, from = %current, to = %next, "Following share link redirect");

            if let Some(video_id) = video_id_from_url(&next) {
                return Ok(video_id);
            }

            current = next;
        }

        Err(PipelineError::RedirectFailed(format!(
            "gave up after {} redirects at {}",
            self.max_redirects, current
        )))
    }
}

/// Extract the numeric video id from a canonical video URL.
///
/// The id is the last all-digit path segment (`/share/video/7312…/`, `/video/123456`), with
/// the `modal_id` query parameter as a fallback.
pub fn video_id_from_url(url: &Url) -> Option<VideoId> {
    let from_path = url
        .path_segments()
        .and_then(|mut segments| segments.rfind(|segment| is_numeric_id(segment)))
        .map(VideoId::new);

    from_path.or_else(|| {
        url.query_pairs()
            .find(|(key, value)| key == MODAL_ID_PARAM && is_numeric_id(value))
            .map(|(_, value)| VideoId::new(value.into_owned()))
    })
}

fn is_numeric_id(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(url: &str) -> Option<String> {
        video_id_from_url(&Url::parse(url).unwrap()).map(|id| id.to_string())
    }

    #[test]
    fn test_id_from_share_page() {
        assert_eq!(
            id("https://www.iesdouyin.com/share/video/7312345678901234567/?region=CN&mid=1"),
            Some("7312345678901234567".to_string())
        );
    }

    #[test]
    fn test_id_from_plain_video_path() {
        assert_eq!(
            id("https://www.example.com/video/123456"),
            Some("123456".to_string())
        );
    }

    #[test]
    fn test_id_from_modal_query() {
        assert_eq!(
            id("https://www.douyin.com/discover?modal_id=7300000000000000001"),
            Some("7300000000000000001".to_string())
        );
    }

    #[test]
    fn test_no_id() {
        assert_eq!(id("https://www.douyin.com/login/"), None);
        assert_eq!(id("https://www.douyin.com/video/abc123"), None);
    }
}
