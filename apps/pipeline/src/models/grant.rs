use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Derived lifecycle status of a grant opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityStatus {
    Posted,
    Closed,
    Archived,
}

impl OpportunityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityStatus::Posted => "posted",
            OpportunityStatus::Closed => "closed",
            OpportunityStatus::Archived => "archived",
        }
    }
}

impl std::fmt::Display for OpportunityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The normalized row shape upserted into the grants table, independent of the
/// upstream event shape. `grant_id` is the natural key; re-ingesting the same
/// id overwrites all derived fields.
///
/// Fixed columns (`status = 'inbox'`, empty notes/search_terms/reviewer_name)
/// are applied by the upsert itself rather than carried here.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalGrant {
    pub grant_id: String,
    pub revision_id: Option<String>,
    pub grant_number: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub agency_code: Option<String>,
    /// Absent means "unknown", never zero. The upsert must not clobber a
    /// previously stored value with NULL.
    pub award_ceiling: Option<i64>,
    pub award_floor: Option<i64>,
    /// "Yes" | "No", derived from the source boolean.
    pub cost_sharing: String,
    /// Comma-space joined CFDA numbers, source order.
    pub cfda_list: String,
    pub open_date: Option<NaiveDate>,
    /// Defaults to the far-future sentinel `2100-01-01` when the source has no
    /// close date.
    pub close_date: NaiveDate,
    pub opportunity_status: OpportunityStatus,
    /// Space-joined eligible-applicant codes, source order.
    pub eligibility_codes: String,
    /// JSON string of the inbound `new` version, kept verbatim for audit.
    pub raw_body: String,
}
