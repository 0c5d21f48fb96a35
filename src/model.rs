//! Email and search-filter types shared by the session, pipeline and view.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Deserializer, Serialize};

/// An email row as returned by the search endpoint.
///
/// `category` and `reply` are both `None` until enrichment has been
/// attempted, then both `Some`. Missing or `null` text fields load as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Email {
    #[serde(deserialize_with = "null_as_empty")]
    pub account: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub folder: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub subject: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub from: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub to: String,
    /// ISO-8601 timestamp, kept verbatim.
    #[serde(deserialize_with = "null_as_empty")]
    pub date: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

impl Email {
    /// Whether enrichment has already been attempted for this email.
    pub fn is_enriched(&self) -> bool {
        self.category.is_some()
    }

    /// Return a copy carrying the given category and reply.
    pub fn with_enrichment(&self, enrichment: Enrichment) -> Self {
        Self {
            category: Some(enrichment.category),
            reply: Some(enrichment.reply),
            ..self.clone()
        }
    }

    /// Parse `date`, accepting RFC 3339 with or without an offset.
    ///
    /// Timestamps without an offset are read as local time.
    pub fn parsed_date(&self) -> Option<DateTime<FixedOffset>> {
        let raw = self.date.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt);
        }
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.fixed_offset())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Category and suggested reply attached to an email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub category: String,
    pub reply: String,
}

/// One of the four search filter fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Query,
    Account,
    To,
    From,
}

impl FilterField {
    /// Query-string parameter name sent to `/api/search`.
    pub const fn param(&self) -> &'static str {
        match self {
            Self::Query => "q",
            Self::Account => "account",
            Self::To => "to",
            Self::From => "from",
        }
    }

    /// Human-readable label.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Query => "Search keyword",
            Self::Account => "Account",
            Self::To => "To",
            Self::From => "From",
        }
    }

    pub const ALL: [FilterField; 4] = [Self::Query, Self::Account, Self::To, Self::From];
}

/// The four free-text search filters. Empty means "not filtered".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    pub query: String,
    pub account: String,
    pub to: String,
    pub from: String,
}

impl SearchFilters {
    pub fn get(&self, field: FilterField) -> &str {
        match field {
            FilterField::Query => &self.query,
            FilterField::Account => &self.account,
            FilterField::To => &self.to,
            FilterField::From => &self.from,
        }
    }

    /// Set a field. Returns `true` if the value changed.
    pub fn set(&mut self, field: FilterField, value: impl Into<String>) -> bool {
        let value = value.into();
        let slot = match field {
            FilterField::Query => &mut self.query,
            FilterField::Account => &mut self.account,
            FilterField::To => &mut self.to,
            FilterField::From => &mut self.from,
        };
        if *slot == value {
            return false;
        }
        *slot = value;
        true
    }

    /// Query parameters for the search request, omitting empty fields.
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        FilterField::ALL
            .iter()
            .map(|field| (field.param(), self.get(*field)))
            .filter(|(_, value)| !value.is_empty())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        FilterField::ALL.iter().all(|f| self.get(*f).is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_pairs_include_exactly_non_empty_fields() {
        // Every subset of the four fields.
        for mask in 0u8..16 {
            let mut filters = SearchFilters::default();
            let mut expected = Vec::new();
            for (bit, field) in FilterField::ALL.iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    filters.set(*field, format!("v{bit}"));
                    expected.push((field.param(), format!("v{bit}")));
                }
            }

            let pairs: Vec<(&str, String)> = filters
                .query_pairs()
                .into_iter()
                .map(|(k, v)| (k, v.to_string()))
                .collect();
            assert_eq!(pairs, expected, "mask {mask:04b}");
        }
    }

    #[test]
    fn set_reports_change() {
        let mut filters = SearchFilters::default();
        assert!(filters.set(FilterField::From, "a@x.com"));
        assert!(!filters.set(FilterField::From, "a@x.com"));
        assert!(filters.set(FilterField::From, ""));
        assert!(filters.is_empty());
    }

    #[test]
    fn sparse_email_json_deserializes() {
        let email: Email = serde_json::from_str(
            r#"{"subject":"Lunch?","from":"a@x.com","to":"b@x.com","date":"2024-01-01T10:00:00Z","text":"Let's grab lunch","uid":42}"#,
        )
        .unwrap();
        assert_eq!(email.subject, "Lunch?");
        assert_eq!(email.account, "");
        assert!(email.html.is_none());
        assert!(!email.is_enriched());
    }

    #[test]
    fn null_fields_load_as_empty() {
        let emails: Vec<Email> = serde_json::from_str(
            r#"[{"subject":"ok","text":"body"},{"subject":null,"from":"cal@x.com","text":null,"date":null,"category":null}]"#,
        )
        .unwrap();
        assert_eq!(emails.len(), 2);
        assert_eq!(emails[1].subject, "");
        assert_eq!(emails[1].text, "");
        assert_eq!(emails[1].from, "cal@x.com");
        assert!(!emails[1].is_enriched());
    }

    #[test]
    fn with_enrichment_sets_both_fields() {
        let email = Email {
            subject: "Lunch?".into(),
            ..Email::default()
        };
        let enriched = email.with_enrichment(Enrichment {
            category: "Meeting".into(),
            reply: "Sure".into(),
        });
        assert!(enriched.is_enriched());
        assert_eq!(enriched.category.as_deref(), Some("Meeting"));
        assert_eq!(enriched.reply.as_deref(), Some("Sure"));
        assert!(email.category.is_none());
    }

    #[test]
    fn parsed_date_variants() {
        let mut email = Email {
            date: "2024-01-01T10:00:00Z".into(),
            ..Email::default()
        };
        assert_eq!(email.parsed_date().unwrap().timestamp(), 1_704_103_200);

        email.date = "2024-01-01T10:00:00".into();
        let local = Local
            .with_ymd_and_hms(2024, 1, 1, 10, 0, 0)
            .earliest()
            .unwrap();
        assert_eq!(email.parsed_date().unwrap().timestamp(), local.timestamp());

        email.date = "yesterday".into();
        assert!(email.parsed_date().is_none());
    }
}
