//! Grant Record Normalizer — pure transformation from a raw grant-modification
//! event body to a [`CanonicalGrant`]. No I/O; "today" is injected so status
//! derivation stays testable.

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

use crate::models::grant::{CanonicalGrant, OpportunityStatus};

/// Close date stored when the source opportunity has none.
pub const CLOSE_DATE_SENTINEL: &str = "2100-01-01";

#[derive(Debug, Error)]
pub enum MalformedEvent {
    #[error("event body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("event is missing detail.versions.new")]
    MissingNewVersion,

    #[error("event is missing opportunity.id")]
    MissingOpportunityId,
}

/// Modification type carried on the event envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Create,
    Update,
    Delete,
    Unknown,
}

impl EventKind {
    fn parse(s: Option<&str>) -> Self {
        match s {
            Some("create") => EventKind::Create,
            Some("update") => EventKind::Update,
            Some("delete") => EventKind::Delete,
            _ => EventKind::Unknown,
        }
    }
}

/// A fully parsed event: the envelope kind plus the normalized grant.
#[derive(Debug, Clone)]
pub struct ParsedEvent {
    pub kind: EventKind,
    pub grant: CanonicalGrant,
}

// ── Inbound wire shape ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    detail: Option<EventDetail>,
}

#[derive(Debug, Deserialize)]
struct EventDetail {
    #[serde(rename = "type")]
    kind: Option<String>,
    versions: Option<EventVersions>,
}

#[derive(Debug, Deserialize)]
struct EventVersions {
    /// Kept as raw JSON so `raw_body` preserves fields we do not model.
    #[serde(rename = "new")]
    new_version: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
struct OpportunitySource {
    opportunity: Option<Opportunity>,
    agency: Option<Agency>,
    award: Option<Award>,
    #[serde(default)]
    cost_sharing_or_matching_requirement: Option<bool>,
    #[serde(default)]
    cfda_numbers: Vec<String>,
    #[serde(default)]
    eligible_applicants: Vec<Applicant>,
    revision: Option<Revision>,
}

#[derive(Debug, Deserialize, Default)]
struct Opportunity {
    id: Option<String>,
    number: Option<String>,
    title: Option<String>,
    description: Option<String>,
    milestones: Option<Milestones>,
}

#[derive(Debug, Deserialize, Default)]
struct Milestones {
    post_date: Option<String>,
    close: Option<CloseMilestone>,
    archive_date: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CloseMilestone {
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Agency {
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Award {
    ceiling: Option<String>,
    floor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Applicant {
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Revision {
    id: Option<String>,
}

// ── Normalization ───────────────────────────────────────────────────────────

/// Normalizes a raw event body into a canonical grant row.
pub fn normalize(raw: &str) -> Result<CanonicalGrant, MalformedEvent> {
    parse_event(raw).map(|event| event.grant)
}

/// Like [`normalize`] but also surfaces the envelope's modification type so
/// callers can log `delete` events. Deletes are normalized the same way as any
/// other event; this pipeline never removes rows.
pub fn parse_event(raw: &str) -> Result<ParsedEvent, MalformedEvent> {
    parse_event_at(raw, chrono::Utc::now().date_naive())
}

fn parse_event_at(raw: &str, today: NaiveDate) -> Result<ParsedEvent, MalformedEvent> {
    let envelope: EventEnvelope = serde_json::from_str(raw)?;
    let detail = envelope.detail.ok_or(MalformedEvent::MissingNewVersion)?;
    let kind = EventKind::parse(detail.kind.as_deref());
    let new_version = detail
        .versions
        .and_then(|v| v.new_version)
        .ok_or(MalformedEvent::MissingNewVersion)?;

    let raw_body = new_version.to_string();
    let source: OpportunitySource = serde_json::from_value(new_version)?;

    let opportunity = source.opportunity.unwrap_or_default();
    let grant_id = opportunity
        .id
        .filter(|id| !id.is_empty())
        .ok_or(MalformedEvent::MissingOpportunityId)?;

    let milestones = opportunity.milestones.unwrap_or_default();
    let open_date = milestones.post_date.as_deref().and_then(parse_date);
    let close_date = milestones
        .close
        .and_then(|c| c.date)
        .as_deref()
        .and_then(parse_date)
        .unwrap_or_else(close_date_sentinel);
    let archive_date = milestones.archive_date.as_deref().and_then(parse_date);

    let (award_ceiling, award_floor) = match source.award {
        Some(award) => (
            award.ceiling.as_deref().and_then(parse_award),
            award.floor.as_deref().and_then(parse_award),
        ),
        None => (None, None),
    };

    let cost_sharing = match source.cost_sharing_or_matching_requirement {
        Some(true) => "Yes",
        _ => "No",
    };

    let eligibility_codes = source
        .eligible_applicants
        .iter()
        .filter_map(|a| a.code.as_deref())
        .collect::<Vec<_>>()
        .join(" ");

    Ok(ParsedEvent {
        kind,
        grant: CanonicalGrant {
            grant_id,
            revision_id: source.revision.and_then(|r| r.id),
            grant_number: opportunity.number,
            title: opportunity.title,
            description: opportunity.description,
            agency_code: source.agency.and_then(|a| a.code),
            award_ceiling,
            award_floor,
            cost_sharing: cost_sharing.to_string(),
            cfda_list: source.cfda_numbers.join(", "),
            open_date,
            close_date,
            opportunity_status: derive_status(archive_date, close_date, today),
            eligibility_codes,
            raw_body,
        },
    })
}

/// Archive check wins over close check; both use strict date-only comparison
/// against "today".
fn derive_status(
    archive_date: Option<NaiveDate>,
    close_date: NaiveDate,
    today: NaiveDate,
) -> OpportunityStatus {
    if archive_date.is_some_and(|d| d < today) {
        OpportunityStatus::Archived
    } else if close_date < today {
        OpportunityStatus::Closed
    } else {
        OpportunityStatus::Posted
    }
}

/// Awards parse as integers only when the source string parses cleanly;
/// anything else means the field is omitted, never coerced to zero.
fn parse_award(s: &str) -> Option<i64> {
    s.trim().parse::<i64>().ok()
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn close_date_sentinel() -> NaiveDate {
    // The constant is a valid date; parse cannot fail.
    NaiveDate::parse_from_str(CLOSE_DATE_SENTINEL, "%Y-%m-%d").unwrap()
}
