//! Meeting-notes service client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pipeline::{
    CapabilityError, FeatureBrief, FeatureRequest, MeetingRef, MeetingSource, Priority, Timestamp,
};
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::IntegrationError;

const SERVICE: &str = "meeting source";

/// Context used when the service returns no summary.
pub(crate) const DEFAULT_SUMMARY: &str = "Summary from meeting notes";

/// Reads feature requests captured for a meeting from an HTTP notes service.
#[derive(Debug, Clone)]
pub struct HttpMeetingSource {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpMeetingSource {
    /// # Errors
    ///
    /// [`IntegrationError::Misconfiguration`] if `base_url` is not an absolute
    /// HTTP(S) URL.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, IntegrationError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| IntegrationError::Misconfiguration(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(IntegrationError::Misconfiguration(format!(
                "{base_url} is not an HTTP(S) base URL"
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IntegrationError::Misconfiguration(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url,
            timeout,
        })
    }

    /// `{base}/meetings/{meeting}/features`, with the meeting reference
    /// encoded as a single path segment.
    fn features_url(&self, meeting: &MeetingRef) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["meetings", meeting.as_str(), "features"]);
        }
        url
    }
}

#[async_trait]
impl MeetingSource for HttpMeetingSource {
    #[instrument(skip_all, fields(meeting = %meeting))]
    async fn get_feature_brief(
        &self,
        meeting: &MeetingRef,
    ) -> Result<FeatureBrief, CapabilityError> {
        let url = self.features_url(meeting);
        debug!(%url, "Fetching meeting features");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| IntegrationError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IntegrationError::Status {
                service: SERVICE,
                status: status.as_u16(),
            }
            .into());
        }

        let body: MeetingFeatures = response.json().await.map_err(|e| IntegrationError::Parse {
            service: SERVICE,
            message: e.to_string(),
        })?;
        Ok(brief_from_response(meeting, body)?)
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MeetingFeatures {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    features: Vec<MeetingFeature>,
    #[serde(default)]
    quotes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MeetingFeature {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    priority: Option<String>,
}

fn meeting_date(raw: Option<&str>) -> Timestamp {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| Timestamp::from_utc(d.with_timezone(&Utc)))
        .unwrap_or_else(Timestamp::now)
}

fn brief_from_response(
    meeting: &MeetingRef,
    body: MeetingFeatures,
) -> Result<FeatureBrief, IntegrationError> {
    let features: Vec<FeatureRequest> = body
        .features
        .into_iter()
        .filter(|f| !f.title.trim().is_empty())
        .map(|f| FeatureRequest {
            id: Uuid::new_v4().to_string(),
            title: f.title,
            description: f.description,
            priority: f
                .priority
                .as_deref()
                .map(Priority::from_label)
                .unwrap_or_default(),
        })
        .collect();

    if features.is_empty() {
        return Err(IntegrationError::Parse {
            service: SERVICE,
            message: format!("meeting {meeting} has no titled features"),
        });
    }

    Ok(FeatureBrief {
        meeting_id: meeting.to_string(),
        meeting_date: meeting_date(body.date.as_deref()),
        context: body
            .summary
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
        features,
        supporting_quotes: body.quotes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meeting() -> MeetingRef {
        MeetingRef::new("mtg 42/a").unwrap()
    }

    #[test]
    fn url_encodes_meeting_as_one_segment() {
        let timeout = Duration::from_secs(5);
        let source = HttpMeetingSource::new("https://notes.example.test/api/", timeout).unwrap();
        assert_eq!(
            source.features_url(&meeting()).as_str(),
            "https://notes.example.test/api/meetings/mtg%2042%2Fa/features"
        );
    }

    #[test]
    fn non_http_base_urls_are_rejected() {
        assert!(matches!(
            HttpMeetingSource::new("mailto:someone@example.test", Duration::from_secs(5)),
            Err(IntegrationError::Misconfiguration(_))
        ));
        assert!(matches!(
            HttpMeetingSource::new("not a url", Duration::from_secs(5)),
            Err(IntegrationError::Misconfiguration(_))
        ));
    }

    #[test]
    fn response_maps_to_brief() {
        let body: MeetingFeatures = serde_json::from_str(
            r#"{
                "date": "2026-03-02T10:00:00Z",
                "summary": "Roadmap review",
                "features": [
                    {"title": "Dark mode", "description": "toggle", "priority": "high"},
                    {"title": "Export", "description": "csv"},
                    {"title": "  ", "description": "dropped"}
                ],
                "quotes": ["we need dark mode"]
            }"#,
        )
        .unwrap();

        let brief = brief_from_response(&meeting(), body).unwrap();
        assert_eq!(brief.meeting_id, "mtg 42/a");
        assert_eq!(brief.context, "Roadmap review");
        assert_eq!(brief.meeting_date.to_string(), "2026-03-02T10:00:00+00:00");
        assert_eq!(brief.features.len(), 2);
        assert_eq!(brief.features[0].priority, Priority::High);
        assert_eq!(brief.features[1].priority, Priority::Medium);
        assert_eq!(brief.supporting_quotes, vec!["we need dark mode".to_string()]);
    }

    #[test]
    fn missing_summary_and_bad_date_fall_back() {
        let body: MeetingFeatures =
            serde_json::from_str(r#"{"date": "last tuesday", "features": [{"title": "A"}]}"#)
                .unwrap();
        let before = Timestamp::now();
        let brief = brief_from_response(&meeting(), body).unwrap();
        assert_eq!(brief.context, DEFAULT_SUMMARY);
        assert!(brief.meeting_date >= before);
    }

    #[test]
    fn meeting_without_features_is_a_parse_error() {
        let body: MeetingFeatures = serde_json::from_str(r#"{"summary": "chit-chat"}"#).unwrap();
        assert!(matches!(
            brief_from_response(&meeting(), body),
            Err(IntegrationError::Parse { .. })
        ));
    }
}
