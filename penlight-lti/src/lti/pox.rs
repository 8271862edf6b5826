//! LTI Basic Outcomes POX codec
//!
//! **[LTI-POX-010]** Builds outbound `replaceResult` envelopes and parses
//! the LMS's acknowledgment, per the IMS LTI 1.1 Basic Outcomes binding.
//!
//! Outbound envelopes follow a fixed schema, so they are assembled directly
//! with escaped text nodes. Inbound responses come from arbitrary LMS
//! implementations and are parsed best-effort with quick-xml: missing or
//! unexpected nodes degrade to `None`, never to an error. A malformed
//! acknowledgment must not be treated worse than no acknowledgment.

use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

/// Namespace of the LTI 1.1 outcomes management service
pub const POX_NAMESPACE: &str = "http://www.imsglobal.org/services/ltiv1p1/xsd/imsoms_v1p0";

/// Optional result payload accompanying (or replacing) a score
///
/// A fixed struct rather than a free-form map: the serializer below is
/// exhaustive over exactly these three fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultData {
    pub url: Option<String>,
    pub text: Option<String>,
    pub launch_url: Option<String>,
}

impl ResultData {
    /// Result data carrying only a deep link back into the platform
    pub fn link(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.text.is_none() && self.launch_url.is_none()
    }
}

/// One outbound replaceResult envelope
#[derive(Debug, Clone)]
pub struct ReplaceResultRequest {
    /// LMS sourcedid identifying the gradable placement
    pub sourcedid: String,
    /// Unique imsx_messageIdentifier (from the persistent counter)
    pub message_id: String,
    /// Pre-formatted score string; absent for "needs grading" notifications
    pub score: Option<String>,
    pub result_data: Option<ResultData>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl ReplaceResultRequest {
    /// Serialize the envelope
    ///
    /// `resultScore` is present iff a score was supplied, `resultData` iff
    /// at least one of its fields is set, `submissionDetails` iff a
    /// submission timestamp was supplied.
    pub fn to_xml(&self) -> String {
        let mut xml = String::with_capacity(1024);
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push_str(&format!(r#"<imsx_POXEnvelopeRequest xmlns="{}">"#, POX_NAMESPACE));

        xml.push_str("<imsx_POXHeader><imsx_POXRequestHeaderInfo>");
        text_element(&mut xml, "imsx_version", "V1.0");
        text_element(&mut xml, "imsx_messageIdentifier", &self.message_id);
        xml.push_str("</imsx_POXRequestHeaderInfo></imsx_POXHeader>");

        xml.push_str("<imsx_POXBody><replaceResultRequest>");

        if let Some(submitted_at) = &self.submitted_at {
            xml.push_str("<submissionDetails>");
            text_element(
                &mut xml,
                "submittedAt",
                &submitted_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            );
            xml.push_str("</submissionDetails>");
        }

        xml.push_str("<resultRecord><sourcedGUID>");
        text_element(&mut xml, "sourcedId", &self.sourcedid);
        xml.push_str("</sourcedGUID>");

        let result_data = self.result_data.as_ref().filter(|d| !d.is_empty());
        if self.score.is_some() || result_data.is_some() {
            xml.push_str("<result>");
            if let Some(score) = &self.score {
                xml.push_str("<resultScore>");
                text_element(&mut xml, "language", "en");
                text_element(&mut xml, "textString", score);
                xml.push_str("</resultScore>");
            }
            if let Some(data) = result_data {
                xml.push_str("<resultData>");
                if let Some(url) = &data.url {
                    text_element(&mut xml, "url", url);
                }
                if let Some(text) = &data.text {
                    text_element(&mut xml, "text", text);
                }
                if let Some(launch_url) = &data.launch_url {
                    text_element(&mut xml, "ltiLaunchUrl", launch_url);
                }
                xml.push_str("</resultData>");
            }
            xml.push_str("</result>");
        }

        xml.push_str("</resultRecord></replaceResultRequest></imsx_POXBody>");
        xml.push_str("</imsx_POXEnvelopeRequest>");
        xml
    }
}

fn text_element(buf: &mut String, name: &str, value: &str) {
    buf.push('<');
    buf.push_str(name);
    buf.push('>');
    buf.push_str(&escape(value));
    buf.push_str("</");
    buf.push_str(name);
    buf.push('>');
}

/// Clamp a raw journal score and format it the way the LMS expects
///
/// Upper-clamped to 1.0; there is deliberately no lower clamp, so a
/// negative aggregate passes through unchanged (see the negative-score
/// test below before relying on that).
pub fn clamp_and_format_score(raw: f64) -> String {
    let clamped = raw.min(1.0);
    let mut formatted = format!("{}", clamped);
    if !formatted.contains('.') {
        formatted.push_str(".0");
    }
    formatted
}

/// Parsed imsx_statusInfo from an LMS response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoxStatus {
    pub code_major: Option<String>,
    pub severity: Option<String>,
    pub description: Option<String>,
}

impl PoxStatus {
    /// Best-effort extraction of imsx_codeMajor / imsx_severity /
    /// imsx_description; never fails
    pub fn parse(xml: &str) -> Self {
        #[derive(Clone, Copy)]
        enum Field {
            CodeMajor,
            Severity,
            Description,
        }

        let mut reader = Reader::from_str(xml);
        let mut status = PoxStatus::default();
        let mut current: Option<Field> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    current = match e.local_name().as_ref() {
                        b"imsx_codeMajor" => Some(Field::CodeMajor),
                        b"imsx_severity" => Some(Field::Severity),
                        b"imsx_description" => Some(Field::Description),
                        _ => None,
                    };
                }
                Ok(Event::Text(t)) => {
                    if let Some(field) = current {
                        if let Ok(text) = t.unescape() {
                            let text = text.trim();
                            if !text.is_empty() {
                                let value = Some(text.to_string());
                                match field {
                                    Field::CodeMajor => status.code_major = value,
                                    Field::Severity => status.severity = value,
                                    Field::Description => status.description = value,
                                }
                            }
                        }
                    }
                }
                Ok(Event::End(_)) => current = None,
                Ok(Event::Eof) => break,
                // Malformed XML: keep whatever was extracted so far
                Err(_) => break,
                Ok(_) => {}
            }
        }

        status
    }

    /// The single success discriminator used by the orchestrator
    pub fn is_success(&self) -> bool {
        self.code_major.as_deref() == Some("success")
    }

    pub fn description_or_default(&self) -> &str {
        self.description.as_deref().unwrap_or("not found")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_request() -> ReplaceResultRequest {
        ReplaceResultRequest {
            sourcedid: "abc:123".to_string(),
            message_id: "42".to_string(),
            score: None,
            result_data: None,
            submitted_at: None,
        }
    }

    #[test]
    fn envelope_has_fixed_header() {
        let xml = base_request().to_xml();
        assert!(xml.contains(r#"<imsx_POXEnvelopeRequest xmlns="http://www.imsglobal.org/services/ltiv1p1/xsd/imsoms_v1p0">"#));
        assert!(xml.contains("<imsx_version>V1.0</imsx_version>"));
        assert!(xml.contains("<imsx_messageIdentifier>42</imsx_messageIdentifier>"));
        assert!(xml.contains("<sourcedId>abc:123</sourcedId>"));
    }

    #[test]
    fn result_score_present_iff_score_supplied() {
        let mut request = base_request();
        assert!(!request.to_xml().contains("<resultScore>"));
        assert!(!request.to_xml().contains("<result>"));

        request.score = Some("0.5".to_string());
        let xml = request.to_xml();
        assert!(xml.contains("<resultScore><language>en</language><textString>0.5</textString></resultScore>"));
    }

    #[test]
    fn result_data_present_iff_any_field_supplied() {
        let mut request = base_request();
        request.result_data = Some(ResultData::default());
        // All-empty result data is treated as absent
        assert!(!request.to_xml().contains("<resultData>"));

        request.result_data = Some(ResultData::link("https://penlight.example/journals/1/entries/2"));
        let xml = request.to_xml();
        assert!(xml.contains("<resultData><url>https://penlight.example/journals/1/entries/2</url></resultData>"));
        assert!(!xml.contains("<ltiLaunchUrl>"));
    }

    #[test]
    fn submission_details_present_iff_timestamp_supplied() {
        let mut request = base_request();
        assert!(!request.to_xml().contains("<submissionDetails>"));

        request.submitted_at = Some(Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap());
        let xml = request.to_xml();
        assert!(xml.contains("<submissionDetails><submittedAt>2026-03-14T09:26:53Z</submittedAt></submissionDetails>"));
    }

    #[test]
    fn text_content_is_escaped() {
        let mut request = base_request();
        request.sourcedid = "a<b>&\"c\"".to_string();
        let xml = request.to_xml();
        assert!(xml.contains("<sourcedId>a&lt;b&gt;&amp;&quot;c&quot;</sourcedId>"));
    }

    #[test]
    fn score_clamped_to_one() {
        assert_eq!(clamp_and_format_score(1.3), "1.0");
        assert_eq!(clamp_and_format_score(1.0), "1.0");
        assert_eq!(clamp_and_format_score(0.5), "0.5");
        assert_eq!(clamp_and_format_score(0.0), "0.0");
    }

    #[test]
    fn negative_score_passes_through_unclamped() {
        // No lower clamp; pinning the current behavior
        assert_eq!(clamp_and_format_score(-0.5), "-0.5");
    }

    #[test]
    fn parses_success_response() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <imsx_POXEnvelopeResponse xmlns="http://www.imsglobal.org/services/ltiv1p1/xsd/imsoms_v1p0">
              <imsx_POXHeader>
                <imsx_POXResponseHeaderInfo>
                  <imsx_version>V1.0</imsx_version>
                  <imsx_messageIdentifier>4560</imsx_messageIdentifier>
                  <imsx_statusInfo>
                    <imsx_codeMajor>success</imsx_codeMajor>
                    <imsx_severity>status</imsx_severity>
                    <imsx_description>Score for abc:123 is now 1.0</imsx_description>
                  </imsx_statusInfo>
                </imsx_POXResponseHeaderInfo>
              </imsx_POXHeader>
              <imsx_POXBody><replaceResultResponse/></imsx_POXBody>
            </imsx_POXEnvelopeResponse>"#;

        let status = PoxStatus::parse(xml);
        assert_eq!(status.code_major.as_deref(), Some("success"));
        assert_eq!(status.severity.as_deref(), Some("status"));
        assert_eq!(status.description.as_deref(), Some("Score for abc:123 is now 1.0"));
        assert!(status.is_success());
    }

    #[test]
    fn parses_failure_response() {
        let xml = r#"<imsx_POXEnvelopeResponse>
              <imsx_statusInfo>
                <imsx_codeMajor>failure</imsx_codeMajor>
                <imsx_severity>error</imsx_severity>
              </imsx_statusInfo>
            </imsx_POXEnvelopeResponse>"#;

        let status = PoxStatus::parse(xml);
        assert_eq!(status.code_major.as_deref(), Some("failure"));
        assert!(!status.is_success());
        assert_eq!(status.description, None);
        assert_eq!(status.description_or_default(), "not found");
    }

    #[test]
    fn missing_tags_degrade_to_none() {
        let status = PoxStatus::parse("<imsx_POXEnvelopeResponse/>");
        assert_eq!(status, PoxStatus::default());
        assert!(!status.is_success());
    }

    #[test]
    fn garbage_input_never_panics() {
        let status = PoxStatus::parse("this is not xml <<<>>>");
        assert!(!status.is_success());

        let status = PoxStatus::parse("");
        assert_eq!(status, PoxStatus::default());
    }

    #[test]
    fn truncated_response_keeps_fields_seen_so_far() {
        let xml = "<imsx_statusInfo><imsx_codeMajor>success</imsx_codeMajor><imsx_sev";
        let status = PoxStatus::parse(xml);
        assert_eq!(status.code_major.as_deref(), Some("success"));
        assert_eq!(status.severity, None);
    }
}
