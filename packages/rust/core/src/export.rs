//! CSV export of leads (RFC 4180).

use std::fmt::Write;

use chrono::SecondsFormat;
use leadflow_shared::{Lead, Result};
use leadflow_storage::LeadFilter;
use tracing::{info, instrument};

use crate::pipeline::Pipeline;

const HEADER: &[&str] = &[
    "id",
    "company_name",
    "contact_name",
    "contact_title",
    "email",
    "phone",
    "website",
    "linkedin_url",
    "location",
    "status",
    "score",
    "is_hot",
    "source",
    "signal_type",
    "business_segment",
    "last_contacted_at",
    "created_at",
    "updated_at",
];

/// Render leads as CSV with a header row and CRLF line endings.
pub fn leads_to_csv(leads: &[Lead]) -> String {
    let mut out = String::new();
    write_row(&mut out, HEADER.iter().copied());

    for lead in leads {
        let id = lead.id.to_string();
        let score = lead.score.to_string();
        let last_contacted = lead
            .last_contacted_at
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();
        let created = lead.created_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        let updated = lead.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        let c = &lead.contact;

        write_row(
            &mut out,
            [
                id.as_str(),
                lead.company_name.as_str(),
                c.contact_name.as_deref().unwrap_or(""),
                c.contact_title.as_deref().unwrap_or(""),
                c.email.as_deref().unwrap_or(""),
                c.phone.as_deref().unwrap_or(""),
                c.website.as_deref().unwrap_or(""),
                c.linkedin_url.as_deref().unwrap_or(""),
                c.location.as_deref().unwrap_or(""),
                lead.status.as_str(),
                score.as_str(),
                if lead.is_hot { "true" } else { "false" },
                lead.source.as_str(),
                lead.signal_type.as_deref().unwrap_or(""),
                lead.business_segment.as_deref().unwrap_or(""),
                last_contacted.as_str(),
                created.as_str(),
                updated.as_str(),
            ],
        );
    }
    out
}

fn write_row<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_field(out, field);
    }
    out.push_str("\r\n");
}

/// Quote a field when it contains a delimiter, quote or line break.
fn push_field(out: &mut String, field: &str) {
    if field.contains([',', '"', '\r', '\n']) {
        let _ = write!(out, "\"{}\"", field.replace('"', "\"\""));
    } else {
        out.push_str(field);
    }
}

impl Pipeline {
    /// Export the leads matching `filter` as CSV. Read-only.
    #[instrument(skip_all)]
    pub async fn export_csv(&self, filter: &LeadFilter) -> Result<String> {
        let leads = self.storage.list_leads(filter).await?;
        info!(leads = leads.len(), "exporting leads");
        Ok(leads_to_csv(&leads))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_shared::LeadStatus;

    use crate::testing::{HarnessBuilder, contact_fields, seed_lead};

    #[test]
    fn header_only_for_no_leads() {
        let csv = leads_to_csv(&[]);
        assert!(csv.starts_with("id,company_name,contact_name,"));
        assert_eq!(csv.matches("\r\n").count(), 1);
    }

    #[test]
    fn fields_with_delimiters_are_quoted() {
        let mut lead = Lead::new("Acme, \"The\" Company", "signals", "acme|");
        lead.contact.location = Some("Berlin\nGermany".into());
        lead.is_hot = true;

        let csv = leads_to_csv(&[lead]);
        let row = csv.split("\r\n").nth(1).unwrap();
        assert!(row.contains(",\"Acme, \"\"The\"\" Company\","));
        assert!(csv.contains("\"Berlin\nGermany\""));
        assert!(row.contains(",new,0,true,signals,"));
    }

    #[tokio::test]
    async fn export_follows_filter() {
        let h = HarnessBuilder::new().build().await;
        seed_lead(&h.pipeline, LeadStatus::New, contact_fields()).await;
        seed_lead(&h.pipeline, LeadStatus::Qualified, contact_fields()).await;

        let csv = h
            .pipeline
            .export_csv(&LeadFilter {
                status: Some(LeadStatus::Qualified),
                ..Default::default()
            })
            .await
            .unwrap();

        let rows: Vec<&str> = csv.split("\r\n").filter(|r| !r.is_empty()).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[1].contains(",qualified,"));
        assert!(rows[1].contains("jane@acme.io"));
    }
}
