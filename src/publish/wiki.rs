//! Wiki connector (Confluence-style REST v2).
//!
//! Builds a storage-format page with the summary up top and the full
//! speaker-attributed transcript folded into an expand macro. Re-publishing
//! updates the existing page in place (version bump); a page deleted on the
//! wiki side is transparently re-created.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::{PublishConnector, PublishRef};
use crate::config::WikiConfig;
use crate::db::{MeetingRecord, SpeakerMapping};
use crate::error::{PipelineError, PipelineResult};
use crate::meeting::chat_view;

pub struct WikiConnector {
    client: reqwest::Client,
    site_url: String,
    user_email: String,
    api_token: String,
    space_key: String,
    parent_page_id: Option<String>,
}

impl WikiConnector {
    pub fn new(config: &WikiConfig, timeout: Duration) -> PipelineResult<Self> {
        if !config.is_configured() {
            return Err(PipelineError::Internal(anyhow::anyhow!(
                "wiki connector requires site_url, user_email, api_token, and space_key"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Internal(e.into()))?;

        Ok(Self {
            client,
            site_url: config.site_url.trim_end_matches('/').to_string(),
            user_email: config.user_email.clone(),
            api_token: config.api_token.clone(),
            space_key: config.space_key.clone(),
            parent_page_id: config.parent_page_id.clone(),
        })
    }

    fn api_url(&self) -> String {
        format!("{}/wiki/api/v2", self.site_url)
    }

    async fn request(&self, req: reqwest::RequestBuilder) -> PipelineResult<(reqwest::StatusCode, Value)> {
        let response = req
            .basic_auth(&self.user_email, Some(&self.api_token))
            .send()
            .await
            .map_err(|e| PipelineError::from_reqwest("wiki", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::from_reqwest("wiki", e))?;
        let value = serde_json::from_str(&body).unwrap_or(Value::Null);
        Ok((status, value))
    }

    async fn space_id(&self) -> PipelineResult<String> {
        let (status, body) = self
            .request(
                self.client
                    .get(format!("{}/spaces", self.api_url()))
                    .query(&[("keys", self.space_key.as_str())]),
            )
            .await?;

        if !status.is_success() {
            return Err(PipelineError::from_status("wiki", status, &body.to_string()));
        }

        body["results"][0]["id"]
            .as_str()
            .map(String::from)
            .or_else(|| body["results"][0]["id"].as_i64().map(|v| v.to_string()))
            .ok_or_else(|| {
                PipelineError::permanent(format!("wiki space '{}' not found", self.space_key))
            })
    }

    /// Current version number of a page, or None if it no longer exists.
    async fn page_version(&self, page_id: &str) -> PipelineResult<Option<i64>> {
        let (status, body) = self
            .request(self.client.get(format!("{}/pages/{page_id}", self.api_url())))
            .await?;

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(PipelineError::from_status("wiki", status, &body.to_string()));
        }

        Ok(Some(body["version"]["number"].as_i64().unwrap_or(1)))
    }

    async fn create_page(
        &self,
        space_id: &str,
        title: &str,
        content: &str,
    ) -> PipelineResult<PublishRef> {
        let mut body = json!({
            "spaceId": space_id,
            "status": "current",
            "title": title,
            "body": {
                "representation": "storage",
                "value": content,
            },
        });
        if let Some(parent_id) = &self.parent_page_id {
            body["parentId"] = json!(parent_id);
        }

        let (status, reply) = self
            .request(
                self.client
                    .post(format!("{}/pages", self.api_url()))
                    .json(&body),
            )
            .await?;

        if !status.is_success() {
            return Err(PipelineError::from_status("wiki", status, &reply.to_string()));
        }

        let page_id = reply["id"]
            .as_str()
            .map(String::from)
            .or_else(|| reply["id"].as_i64().map(|v| v.to_string()))
            .ok_or_else(|| {
                PipelineError::Internal(anyhow::anyhow!("wiki create response missing page id"))
            })?;

        Ok(PublishRef {
            external_location: format!(
                "{}/wiki/spaces/{}/pages/{}",
                self.site_url, space_id, page_id
            ),
            external_id: page_id,
        })
    }

    async fn update_page(
        &self,
        space_id: &str,
        page_id: &str,
        title: &str,
        content: &str,
        version: i64,
    ) -> PipelineResult<PublishRef> {
        let body = json!({
            "id": page_id,
            "status": "current",
            "title": title,
            "body": {
                "representation": "storage",
                "value": content,
            },
            "version": { "number": version + 1 },
        });

        let (status, reply) = self
            .request(
                self.client
                    .put(format!("{}/pages/{page_id}", self.api_url()))
                    .json(&body),
            )
            .await?;

        if !status.is_success() {
            return Err(PipelineError::from_status("wiki", status, &reply.to_string()));
        }

        Ok(PublishRef {
            external_id: page_id.to_string(),
            external_location: format!(
                "{}/wiki/spaces/{}/pages/{}",
                self.site_url, space_id, page_id
            ),
        })
    }
}

#[async_trait]
impl PublishConnector for WikiConnector {
    fn name(&self) -> &'static str {
        "wiki"
    }

    fn is_published(&self, record: &MeetingRecord) -> bool {
        !record.wiki_page_id.is_empty()
    }

    async fn publish(
        &self,
        record: &MeetingRecord,
        mappings: &[SpeakerMapping],
    ) -> PipelineResult<PublishRef> {
        let space_id = self.space_id().await?;
        let title = page_title(record);
        let content = page_content(record, mappings);

        if !record.wiki_page_id.is_empty() {
            // Re-publish: update in place when the page survived, re-create
            // when it was deleted on the wiki side.
            if let Some(version) = self.page_version(&record.wiki_page_id).await? {
                debug!(
                    "Updating wiki page {} (version {version})",
                    record.wiki_page_id
                );
                return self
                    .update_page(&space_id, &record.wiki_page_id, &title, &content, version)
                    .await;
            }
            info!(
                "Wiki page {} for meeting {} is gone, re-creating",
                record.wiki_page_id, record.id
            );
        }

        self.create_page(&space_id, &title, &content).await
    }
}

/// "[Minutes] MMDD <title>", matching how pages are scanned in a space.
fn page_title(record: &MeetingRecord) -> String {
    let date_short = record
        .meeting_at
        .get(5..10)
        .map(|md| md.replace('-', ""))
        .unwrap_or_default();
    format!("[Minutes] {} {}", date_short, record.title)
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Storage-format page: header block, summary, then the full transcript in a
/// collapsed expand macro, speaker-attributed via the chat view.
fn page_content(record: &MeetingRecord, mappings: &[SpeakerMapping]) -> String {
    let transcript_lines = if !record.corrected_segments.is_empty() {
        chat_view(&record.corrected_segments, mappings)
            .iter()
            .map(|line| {
                format!(
                    "<p><strong>{}:</strong> {}</p>",
                    xml_escape(&line.speaker),
                    xml_escape(&line.text)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    } else if !record.best_transcript().is_empty() {
        format!("<p>{}</p>", xml_escape(record.best_transcript()))
    } else {
        "<p>No transcript</p>".to_string()
    };

    let summary_storage = if record.summary.is_empty() {
        "<p>No summary</p>".to_string()
    } else {
        markdown_to_storage(&record.summary)
    };

    format!(
        "<h1>{title}</h1>\n\
         <p><strong>Meeting time:</strong> {meeting_at}</p>\n\
         <p><strong>Recorded by:</strong> {created_by}</p>\n\
         <hr/>\n\
         <h2>Summary</h2>\n\
         {summary}\n\
         <hr/>\n\
         <ac:structured-macro ac:name=\"expand\">\n\
         <ac:parameter ac:name=\"title\">Full transcript</ac:parameter>\n\
         <ac:rich-text-body>\n{transcript}\n</ac:rich-text-body>\n\
         </ac:structured-macro>",
        title = xml_escape(&record.title),
        meeting_at = xml_escape(&record.meeting_at),
        created_by = xml_escape(&record.created_by),
        summary = summary_storage,
        transcript = transcript_lines,
    )
}

/// Line-based markdown → storage-format conversion covering what the
/// summarizer emits: headings, bullet lists, checkbox action items, bold.
fn markdown_to_storage(markdown: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut list_open = false;

    let close_list = |out: &mut Vec<String>, list_open: &mut bool| {
        if *list_open {
            out.push("</ul>".to_string());
            *list_open = false;
        }
    };

    for line in markdown.lines() {
        let trimmed = line.trim();

        if let Some(text) = trimmed.strip_prefix("### ") {
            close_list(&mut out, &mut list_open);
            out.push(format!("<h3>{}</h3>", inline_markup(text)));
        } else if let Some(text) = trimmed.strip_prefix("## ") {
            close_list(&mut out, &mut list_open);
            out.push(format!("<h2>{}</h2>", inline_markup(text)));
        } else if let Some(text) = trimmed.strip_prefix("# ") {
            close_list(&mut out, &mut list_open);
            out.push(format!("<h1>{}</h1>", inline_markup(text)));
        } else if let Some(text) = trimmed
            .strip_prefix("- [ ] ")
            .or_else(|| trimmed.strip_prefix("- [x] "))
        {
            close_list(&mut out, &mut list_open);
            let status = if trimmed.starts_with("- [x]") {
                "complete"
            } else {
                "incomplete"
            };
            out.push(format!(
                "<ac:task-list><ac:task><ac:task-status>{status}</ac:task-status>\
                 <ac:task-body>{}</ac:task-body></ac:task></ac:task-list>",
                inline_markup(text)
            ));
        } else if let Some(text) = trimmed.strip_prefix("- ") {
            if !list_open {
                out.push("<ul>".to_string());
                list_open = true;
            }
            out.push(format!("<li>{}</li>", inline_markup(text)));
        } else if let Some(text) = numbered_item(trimmed) {
            if !list_open {
                out.push("<ul>".to_string());
                list_open = true;
            }
            out.push(format!("<li>{}</li>", inline_markup(text)));
        } else if trimmed.is_empty() {
            close_list(&mut out, &mut list_open);
            out.push("<p></p>".to_string());
        } else {
            close_list(&mut out, &mut list_open);
            out.push(format!("<p>{}</p>", inline_markup(trimmed)));
        }
    }
    close_list(&mut out, &mut list_open);

    out.join("\n")
}

/// "1. item" → Some("item")
fn numbered_item(line: &str) -> Option<&str> {
    let dot = line.find(". ")?;
    if line[..dot].chars().all(|c| c.is_ascii_digit()) && dot > 0 {
        Some(&line[dot + 2..])
    } else {
        None
    }
}

/// Escape, then convert `**bold**` pairs.
fn inline_markup(text: &str) -> String {
    let escaped = xml_escape(text);
    let mut out = String::with_capacity(escaped.len());
    let mut rest = escaped.as_str();
    let mut bold_open = false;
    while let Some(pos) = rest.find("**") {
        out.push_str(&rest[..pos]);
        out.push_str(if bold_open { "</strong>" } else { "<strong>" });
        bold_open = !bold_open;
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    if bold_open {
        // Unbalanced marker, close to keep the XML valid.
        out.push_str("</strong>");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meeting::MeetingStatus;
    use crate::transcription::seg;

    fn record() -> MeetingRecord {
        MeetingRecord {
            id: 7,
            team_id: "t".to_string(),
            created_by: "dana".to_string(),
            title: "Planning <sync>".to_string(),
            meeting_at: "2026-08-07T09:00:00Z".to_string(),
            audio_path: None,
            audio_expires_at: None,
            status: MeetingStatus::Completed,
            error_message: String::new(),
            transcript: "raw text".to_string(),
            raw_segments: vec![],
            corrected_transcript: "fixed text".to_string(),
            corrected_segments: vec![seg("Speaker 0", 0.0, 2.0, "let's start")],
            summary: "## Meeting Summary\n\n### Decisions\n- ship it\n\n- [ ] follow up - owner: **Speaker 0**".to_string(),
            wiki_page_id: String::new(),
            wiki_page_url: String::new(),
            chat_message_ts: String::new(),
            chat_channel: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_page_title_includes_short_date() {
        assert_eq!(page_title(&record()), "[Minutes] 0807 Planning <sync>");
    }

    #[test]
    fn test_page_content_escapes_and_structures() {
        let mapping = SpeakerMapping {
            id: 1,
            meeting_id: 7,
            speaker_label: "Speaker 0".to_string(),
            speaker_name: "Dana".to_string(),
            created_at: String::new(),
        };
        let content = page_content(&record(), &[mapping]);

        assert!(content.contains("<h1>Planning &lt;sync&gt;</h1>"));
        assert!(content.contains("<p><strong>Dana:</strong> let's start</p>"));
        assert!(content.contains("ac:structured-macro"));
        assert!(content.contains("<h2>Decisions</h2>"));
    }

    #[test]
    fn test_markdown_headings_and_lists() {
        let storage = markdown_to_storage("## Topics\n- one\n- two\n\nplain line");
        assert!(storage.contains("<h2>Topics</h2>"));
        assert!(storage.contains("<ul>\n<li>one</li>\n<li>two</li>\n</ul>"));
        assert!(storage.contains("<p>plain line</p>"));
    }

    #[test]
    fn test_markdown_checkboxes() {
        let storage = markdown_to_storage("- [ ] open item\n- [x] done item");
        assert!(storage.contains("<ac:task-status>incomplete</ac:task-status>"));
        assert!(storage.contains("<ac:task-status>complete</ac:task-status>"));
        assert!(storage.contains("<ac:task-body>open item</ac:task-body>"));
    }

    #[test]
    fn test_numbered_lists() {
        let storage = markdown_to_storage("1. first\n2. second");
        assert!(storage.contains("<li>first</li>"));
        assert!(storage.contains("<li>second</li>"));
    }

    #[test]
    fn test_inline_bold() {
        assert_eq!(inline_markup("a **b** c"), "a <strong>b</strong> c");
        assert_eq!(inline_markup("broken **b"), "broken <strong>b</strong>");
        assert_eq!(inline_markup("x < y"), "x &lt; y");
    }

    #[test]
    fn test_numbered_item_parser() {
        assert_eq!(numbered_item("1. hello"), Some("hello"));
        assert_eq!(numbered_item("12. hello"), Some("hello"));
        assert_eq!(numbered_item("a. hello"), None);
        assert_eq!(numbered_item("no dot"), None);
    }
}
