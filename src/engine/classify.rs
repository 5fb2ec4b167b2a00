//! Advisory taxonomy suggestions. Deterministic keyword tables per industry
//! profile, first match wins, always answers. Suggestions never gate any
//! booking decision.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::Suggestion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndustryProfile {
    Healthcare,
    Hospitality,
    ProfessionalServices,
    Manufacturing,
    #[default]
    Generic,
}

impl IndustryProfile {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "healthcare" => Some(Self::Healthcare),
            "hospitality" => Some(Self::Hospitality),
            "professional_services" => Some(Self::ProfessionalServices),
            "manufacturing" => Some(Self::Manufacturing),
            "generic" => Some(Self::Generic),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthcare => "healthcare",
            Self::Hospitality => "hospitality",
            Self::ProfessionalServices => "professional_services",
            Self::Manufacturing => "manufacturing",
            Self::Generic => "generic",
        }
    }
}

struct Rule {
    pattern: Regex,
    code: &'static str,
    confidence: f64,
    note: &'static str,
}

fn rule(pattern: &str, code: &'static str, confidence: f64, note: &'static str) -> Rule {
    Rule {
        // Table patterns are static and known-good.
        pattern: Regex::new(pattern).unwrap(),
        code,
        confidence,
        note,
    }
}

static HEALTHCARE: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(r"(?i)\b(dr\.?|doctor|physician|md)\b", "DOCTOR", 0.95, "physician title detected"),
        rule(r"(?i)\b(nurse|rn|np)\b", "NURSE", 0.9, "nursing title detected"),
        rule(r"(?i)\b(surg(ery|eon|ical)|theatre|operating room)\b", "SURGERY", 0.9, "surgical keyword"),
        rule(r"(?i)\b(exam|consult(ation)?)\b", "EXAM_ROOM", 0.85, "examination keyword"),
        rule(r"(?i)\b(lab(oratory)?|x-?ray|mri|ct|imaging)\b", "DIAGNOSTICS", 0.85, "diagnostic keyword"),
        rule(r"(?i)\b(thera(py|pist)|rehab)\b", "THERAPY", 0.8, "therapy keyword"),
        rule(r"(?i)\b(ward|bed)\b", "WARD", 0.7, "inpatient keyword"),
    ]
});

static HOSPITALITY: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(r"(?i)\b(suite|deluxe|king|twin)\b", "GUEST_ROOM", 0.9, "room category keyword"),
        rule(r"(?i)\b(ballroom|banquet|hall)\b", "EVENT_SPACE", 0.9, "event space keyword"),
        rule(r"(?i)\b(table|dining|restaurant)\b", "TABLE", 0.85, "dining keyword"),
        rule(r"(?i)\b(spa|massage|sauna)\b", "SPA", 0.85, "wellness keyword"),
        rule(r"(?i)\b(chef|waiter|concierge|housekeep)\w*", "STAFF", 0.8, "service role keyword"),
        rule(r"(?i)\broom\b", "GUEST_ROOM", 0.7, "generic room keyword"),
    ]
});

static PROFESSIONAL: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(r"(?i)\b(partner|attorney|lawyer|counsel)\b", "COUNSEL", 0.9, "legal title detected"),
        rule(r"(?i)\b(audit(or)?)\b", "AUDIT", 0.9, "audit keyword"),
        rule(r"(?i)\b(consult(ant|ing)?|advis(or|ory))\b", "CONSULTANT", 0.85, "advisory keyword"),
        rule(r"(?i)\b(board ?room|conference|meeting)\b", "MEETING_ROOM", 0.85, "meeting space keyword"),
        rule(r"(?i)\b(accountant|cpa|tax)\b", "ACCOUNTING", 0.8, "accounting keyword"),
    ]
});

static MANUFACTURING: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(r"(?i)\b(cnc|lathe|mill|press|welder?)\b", "MACHINE", 0.9, "machine tool keyword"),
        rule(r"(?i)\b(line|cell|assembly)\b", "PRODUCTION_LINE", 0.85, "production keyword"),
        rule(r"(?i)\b(maint(enance)?|repair|service bay)\b", "MAINTENANCE", 0.85, "maintenance keyword"),
        rule(r"(?i)\b(forklift|crane|agv)\b", "MATERIAL_HANDLING", 0.85, "handling equipment keyword"),
        rule(r"(?i)\b(inspect(ion|or)?|qa|qc)\b", "QUALITY", 0.8, "quality keyword"),
    ]
});

static GENERIC: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(r"(?i)\b(staff|employee|technician|operator)\b", "STAFF", 0.7, "staff keyword"),
        rule(r"(?i)\b(room|office|space)\b", "ROOM", 0.7, "space keyword"),
        rule(r"(?i)\b(equipment|machine|device|tool)\b", "EQUIPMENT", 0.7, "equipment keyword"),
        rule(r"(?i)\b(van|truck|car|vehicle)\b", "VEHICLE", 0.7, "vehicle keyword"),
    ]
});

fn table(profile: IndustryProfile) -> &'static [Rule] {
    match profile {
        IndustryProfile::Healthcare => &HEALTHCARE,
        IndustryProfile::Hospitality => &HOSPITALITY,
        IndustryProfile::ProfessionalServices => &PROFESSIONAL,
        IndustryProfile::Manufacturing => &MANUFACTURING,
        IndustryProfile::Generic => &GENERIC,
    }
}

/// Suggest a taxonomy code for free text. Profile tables run first, then
/// the generic table, then a catch-all so every input gets an answer.
pub fn classify(text: &str, profile: IndustryProfile) -> Suggestion {
    let tables: [&[Rule]; 2] = [table(profile), &GENERIC];
    for rules in tables {
        for rule in rules {
            if rule.pattern.is_match(text) {
                return Suggestion {
                    code: rule.code,
                    confidence: rule.confidence,
                    note: rule.note,
                };
            }
        }
    }
    Suggestion {
        code: "GENERAL",
        confidence: 0.5,
        note: "no rule matched, manual review recommended",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_parse_roundtrip() {
        for p in [
            IndustryProfile::Healthcare,
            IndustryProfile::Hospitality,
            IndustryProfile::ProfessionalServices,
            IndustryProfile::Manufacturing,
            IndustryProfile::Generic,
        ] {
            assert_eq!(IndustryProfile::parse(p.as_str()), Some(p));
        }
        assert_eq!(IndustryProfile::parse("retail"), None);
    }

    #[test]
    fn healthcare_titles_rank_high() {
        let s = classify("Dr. Sarah Chen", IndustryProfile::Healthcare);
        assert_eq!(s.code, "DOCTOR");
        assert!(s.confidence >= 0.9);

        let s = classify("Exam Room 3", IndustryProfile::Healthcare);
        assert_eq!(s.code, "EXAM_ROOM");
    }

    #[test]
    fn same_text_differs_by_profile() {
        let text = "Consultation Suite";
        let healthcare = classify(text, IndustryProfile::Healthcare);
        let hospitality = classify(text, IndustryProfile::Hospitality);
        assert_eq!(healthcare.code, "EXAM_ROOM");
        assert_eq!(hospitality.code, "GUEST_ROOM");
    }

    #[test]
    fn deterministic_across_calls() {
        let text = "CNC mill #4";
        let first = classify(text, IndustryProfile::Manufacturing);
        for _ in 0..10 {
            assert_eq!(classify(text, IndustryProfile::Manufacturing), first);
        }
        assert_eq!(first.code, "MACHINE");
    }

    #[test]
    fn generic_table_backstops_profiles() {
        let s = classify("Delivery van 2", IndustryProfile::Healthcare);
        assert_eq!(s.code, "VEHICLE");
        assert_eq!(s.confidence, 0.7);
    }

    #[test]
    fn unmatched_text_gets_low_confidence_fallback() {
        let s = classify("Zzyzx", IndustryProfile::Generic);
        assert_eq!(s.code, "GENERAL");
        assert_eq!(s.confidence, 0.5);
        assert!(s.note.contains("manual review"));
    }

    #[test]
    fn first_match_wins_within_table() {
        // Matches both DOCTOR and EXAM_ROOM patterns; table order decides.
        let s = classify("Doctor consultation", IndustryProfile::Healthcare);
        assert_eq!(s.code, "DOCTOR");
    }
}
