//! Raw forum records and their normalization into embedding-ready text.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

/// One scraped forum post as it appears in the corpus dump.
///
/// Every field degrades softly during deserialization: absent or `null`
/// strings become empty, and `age` accepts a number, a numeric string, or
/// garbage (which parses to 0). Malformed records never abort a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecord {
    /// Post title; may be empty.
    #[serde(default, deserialize_with = "string_or_empty")]
    pub title: String,
    /// Free-text symptom description; the primary embedding input.
    #[serde(default, deserialize_with = "string_or_empty")]
    pub detail_symptom: String,
    /// Reported gender.
    #[serde(default, deserialize_with = "string_or_empty")]
    pub gender: String,
    /// Reported age in years; 0 when missing or unparseable.
    #[serde(default, deserialize_with = "lenient_age")]
    pub age: u32,
    /// Post date as scraped (opaque string).
    #[serde(default, deserialize_with = "string_or_empty")]
    pub date: String,
    /// Comma-joined symptom badges attached to the post.
    #[serde(default, deserialize_with = "string_or_empty")]
    pub symptom_badge: String,
}

fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_age<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum AgeField {
        Int(i64),
        Float(f64),
        Text(String),
        Other(serde::de::IgnoredAny),
    }

    let age = match AgeField::deserialize(deserializer)? {
        AgeField::Int(value) => u32::try_from(value).unwrap_or(0),
        AgeField::Float(value) if value.is_finite() && value >= 0.0 => value as u32,
        AgeField::Float(_) => 0,
        AgeField::Text(value) => value.trim().parse().unwrap_or(0),
        AgeField::Other(_) => 0,
    };
    Ok(age)
}

/// Fixed ordinal age bands derived from the reported age.
///
/// The mapping is total: every non-negative age lands in exactly one band,
/// and everything above 80 falls into the terminal [`AgeGroup::Elderly`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgeGroup {
    /// 20 and under (also absorbs unparseable ages, which default to 0).
    Child,
    /// 21 through 45.
    YoungAdult,
    /// 46 through 60.
    Adult,
    /// 61 through 70.
    MiddleAged,
    /// 71 through 80.
    Senior,
    /// Above 80.
    Elderly,
}

impl AgeGroup {
    /// Buckets an age into its band.
    pub fn from_age(age: u32) -> Self {
        match age {
            0..=20 => Self::Child,
            21..=45 => Self::YoungAdult,
            46..=60 => Self::Adult,
            61..=70 => Self::MiddleAged,
            71..=80 => Self::Senior,
            _ => Self::Elderly,
        }
    }

    /// Human-readable label used in the canonical text suffix.
    pub fn label(self) -> &'static str {
        match self {
            Self::Child => "child",
            Self::YoungAdult => "young adult",
            Self::Adult => "adult",
            Self::MiddleAged => "middle-aged",
            Self::Senior => "senior",
            Self::Elderly => "elderly",
        }
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Metadata envelope carried by every chunk cut from a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Post title surfaced as the retrieval answer.
    pub title: String,
    /// Reported gender.
    pub gender: String,
    /// Parsed age (0 when unknown).
    pub age: u32,
    /// Derived age band.
    pub age_group: AgeGroup,
    /// Post date as scraped.
    pub date: String,
    /// Comma-joined symptom badges.
    pub symptom_badge: String,
}

/// A record rendered into its canonical embedding input plus metadata.
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    /// Symptom text augmented with the gender/age-group suffix.
    pub canonical_text: String,
    /// Metadata envelope shared by all chunks of this record.
    pub metadata: RecordMetadata,
}

/// Renders a raw record into canonical text and its metadata envelope.
///
/// Pure and total: the same record always yields the same output, and no
/// input can make it fail.
pub fn normalize(record: &RawRecord) -> NormalizedRecord {
    let age_group = AgeGroup::from_age(record.age);
    let canonical_text = format!(
        "{} (gender: {}, age group: {})",
        record.detail_symptom, record.gender, age_group
    );
    NormalizedRecord {
        canonical_text,
        metadata: RecordMetadata {
            title: record.title.clone(),
            gender: record.gender.clone(),
            age: record.age,
            age_group,
            date: record.date.clone(),
            symptom_badge: record.symptom_badge.clone(),
        },
    }
}

/// Reads a corpus dump (JSON array of record objects) from disk.
pub fn load_records(path: &Path) -> Result<Vec<RawRecord>> {
    let file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).with_context(|| format!("invalid records file {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn age_bands_cover_every_boundary() {
        let cases = [
            (0, AgeGroup::Child),
            (20, AgeGroup::Child),
            (21, AgeGroup::YoungAdult),
            (45, AgeGroup::YoungAdult),
            (46, AgeGroup::Adult),
            (60, AgeGroup::Adult),
            (61, AgeGroup::MiddleAged),
            (70, AgeGroup::MiddleAged),
            (71, AgeGroup::Senior),
            (80, AgeGroup::Senior),
            (81, AgeGroup::Elderly),
            (130, AgeGroup::Elderly),
        ];
        for (age, expected) in cases {
            assert_eq!(AgeGroup::from_age(age), expected, "age {}", age);
        }
    }

    #[test]
    fn malformed_fields_degrade_to_defaults() {
        let records: Vec<RawRecord> = serde_json::from_str(
            r#"[
                {"title": null, "detail_symptom": "fever", "age": "37"},
                {"detail_symptom": "cough", "age": "thirty"},
                {"detail_symptom": "rash", "age": null, "gender": null},
                {"detail_symptom": "ache", "age": -4}
            ]"#,
        )
        .expect("records parse");

        assert_eq!(records[0].title, "");
        assert_eq!(records[0].age, 37);
        assert_eq!(records[1].age, 0);
        assert_eq!(records[2].age, 0);
        assert_eq!(records[2].gender, "");
        assert_eq!(records[3].age, 0);
    }

    #[test]
    fn numeric_age_parses_directly() {
        let record: RawRecord =
            serde_json::from_str(r#"{"detail_symptom": "x", "age": 52}"#).expect("parse");
        assert_eq!(record.age, 52);
        assert_eq!(AgeGroup::from_age(record.age), AgeGroup::Adult);
    }

    #[test]
    fn canonical_text_renders_suffix() {
        let record = RawRecord {
            title: "Eczema flare".to_string(),
            detail_symptom: "itchy skin rash".to_string(),
            gender: "female".to_string(),
            age: 30,
            ..RawRecord::default()
        };
        let normalized = normalize(&record);
        assert_eq!(
            normalized.canonical_text,
            "itchy skin rash (gender: female, age group: young adult)"
        );
        assert_eq!(normalized.metadata.age_group, AgeGroup::YoungAdult);
        assert_eq!(normalized.metadata.title, "Eczema flare");
    }

    #[test]
    fn normalization_is_deterministic() {
        let record = RawRecord {
            detail_symptom: "dizzy".to_string(),
            age: 81,
            ..RawRecord::default()
        };
        assert_eq!(normalize(&record).canonical_text, normalize(&record).canonical_text);
        assert_eq!(normalize(&record).metadata.age_group, AgeGroup::Elderly);
    }
}
