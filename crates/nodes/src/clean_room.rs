//! Personal-data scrubber applied to a brief before anything leaves the
//! building.

use pipeline::FeatureBrief;
use regex::Regex;

/// Replacement text for every match.
pub const REDACTED: &str = "[REDACTED]";

/// Patterns every [`CleanRoom`] applies.
pub const STANDARD_PATTERNS: [&str; 3] = [
    // e-mail
    r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}",
    // SSN-like
    r"\b\d{3}-\d{2}-\d{4}\b",
    // phone
    r"\b\d{3}-\d{3}-\d{4}\b",
];

/// A compiled set of redaction patterns.
#[derive(Debug, Clone)]
pub struct CleanRoom {
    patterns: Vec<Regex>,
}

impl CleanRoom {
    /// The standard patterns only.
    pub fn standard() -> Result<Self, regex::Error> {
        Self::with_extra_patterns(&[])
    }

    /// The standard patterns followed by `extra`, applied in that order.
    pub fn with_extra_patterns(extra: &[String]) -> Result<Self, regex::Error> {
        let patterns = STANDARD_PATTERNS
            .iter()
            .copied()
            .chain(extra.iter().map(String::as_str))
            .map(Regex::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn scrub(&self, text: &str) -> String {
        self.patterns
            .iter()
            .fold(text.to_string(), |acc, re| re.replace_all(&acc, REDACTED).into_owned())
    }

    /// Scrubs every free-text field of a brief: context, titles,
    /// descriptions and quotes.
    pub fn scrub_brief(&self, brief: &FeatureBrief) -> FeatureBrief {
        let mut out = brief.clone();
        out.context = self.scrub(&brief.context);
        for feature in &mut out.features {
            feature.title = self.scrub(&feature.title);
            feature.description = self.scrub(&feature.description);
        }
        out.supporting_quotes = brief.supporting_quotes.iter().map(|q| self.scrub(q)).collect();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{FeatureRequest, Priority, Timestamp};

    #[test]
    fn redacts_emails_phones_and_ssns() {
        let room = CleanRoom::standard().unwrap();
        let out =
            room.scrub("mail jo.doe+x@corp.example.com or call 555-123-4567, ssn 123-45-6789");
        assert_eq!(out, "mail [REDACTED] or call [REDACTED], ssn [REDACTED]");
    }

    #[test]
    fn leaves_clean_text_alone() {
        let room = CleanRoom::standard().unwrap();
        assert_eq!(room.scrub("Add dark mode toggle"), "Add dark mode toggle");
    }

    #[test]
    fn extra_patterns_apply_after_standard_ones() {
        let room = CleanRoom::with_extra_patterns(&["ACME-\\d+".to_string()]).unwrap();
        assert_eq!(room.scrub("ticket ACME-42"), "ticket [REDACTED]");
        assert!(CleanRoom::with_extra_patterns(&["(".to_string()]).is_err());
    }

    #[test]
    fn scrubs_every_brief_text_field() {
        let room = CleanRoom::standard().unwrap();
        let brief = FeatureBrief {
            meeting_id: "m-1".into(),
            meeting_date: Timestamp::now(),
            context: "from ann@example.org".into(),
            features: vec![FeatureRequest {
                id: "f1".into(),
                title: "Call 555-000-1111".into(),
                description: "ssn 999-88-7777".into(),
                priority: Priority::High,
            }],
            supporting_quotes: vec!["ping bob@example.org".into()],
        };

        let out = room.scrub_brief(&brief);

        assert_eq!(out.context, "from [REDACTED]");
        assert_eq!(out.features[0].title, "Call [REDACTED]");
        assert_eq!(out.features[0].description, "ssn [REDACTED]");
        assert_eq!(out.supporting_quotes, vec!["ping [REDACTED]".to_string()]);
        assert_eq!(out.meeting_id, "m-1");
    }
}
