//! Package document classification.
//!
//! A submission's files hold one or more YAML documents. Each document is
//! classified exactly once into a [`PackageDocument`]:
//! - `Package` when it carries a `group` key
//! - `Asset` when it carries an `assetId` key and no `group`
//!
//! The classified set also names the "main" package, the one whose
//! `group:name` equals the submission id. Everything downstream (title,
//! PR body) consumes the variants and never inspects raw keys again.

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::error::{PkgprError, Result};
use crate::domain::submission::SubmissionFile;

/// Descriptive block of a package document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageInfo {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub website: Option<String>,
}

/// A document describing a package (`group` + `name`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDoc {
    pub group: String,
    pub name: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub version: Option<String>,
    #[serde(default)]
    pub info: PackageInfo,
}

impl PackageDoc {
    /// `group:name`
    pub fn id(&self) -> String {
        format!("{}:{}", self.group, self.name)
    }
}

/// A document describing a downloadable asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDoc {
    #[serde(rename = "assetId")]
    pub asset_id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub version: Option<String>,
}

/// One classified YAML document.
#[derive(Debug, Clone, PartialEq)]
pub enum PackageDocument {
    Package(PackageDoc),
    Asset(AssetDoc),
}

/// Versions are often written unquoted (`version: 1.0`); accept any scalar.
fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_yaml::Value::Null) => None,
        Some(serde_yaml::Value::String(s)) => Some(s),
        Some(serde_yaml::Value::Number(n)) => Some(n.to_string()),
        Some(serde_yaml::Value::Bool(b)) => Some(b.to_string()),
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "expected a scalar version, got {other:?}"
            )))
        }
    })
}

/// Parse every document in `text`, classifying each one.
///
/// Empty documents (e.g. a trailing `---`) are skipped.
pub fn parse_documents(id: &str, source: &str, text: &str) -> Result<Vec<PackageDocument>> {
    let mut docs = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let value = serde_yaml::Value::deserialize(document).map_err(|e| {
            PkgprError::malformed(id, format!("{source}: document {index}: {e}"))
        })?;
        if value.is_null() {
            continue;
        }
        docs.push(classify_value(id, source, index, value)?);
    }
    Ok(docs)
}

fn classify_value(
    id: &str,
    source: &str,
    index: usize,
    value: serde_yaml::Value,
) -> Result<PackageDocument> {
    let mapping = value.as_mapping().ok_or_else(|| {
        PkgprError::malformed(id, format!("{source}: document {index} is not a mapping"))
    })?;
    let has = |key: &str| mapping.get(key).is_some_and(|v| !v.is_null());
    let invalid = |e: serde_yaml::Error| {
        PkgprError::malformed(id, format!("{source}: document {index}: {e}"))
    };

    if has("group") {
        let doc: PackageDoc = serde_yaml::from_value(value).map_err(invalid)?;
        Ok(PackageDocument::Package(doc))
    } else if has("assetId") {
        let doc: AssetDoc = serde_yaml::from_value(value).map_err(invalid)?;
        Ok(PackageDocument::Asset(doc))
    } else {
        Err(PkgprError::malformed(
            id,
            format!("{source}: document {index} has neither 'group' nor 'assetId'"),
        ))
    }
}

/// All documents of a submission, split by kind, with the main package singled out.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedDocuments {
    pub main: PackageDoc,
    /// Every package document, in file order (includes the main one).
    pub packages: Vec<PackageDoc>,
    pub assets: Vec<AssetDoc>,
}

impl ClassifiedDocuments {
    /// Classify every document in `files` for the submission `id`.
    pub fn from_files(id: &str, files: &[SubmissionFile]) -> Result<Self> {
        let mut packages = Vec::new();
        let mut assets = Vec::new();
        for file in files {
            for doc in parse_documents(id, &file.name, &file.text())? {
                match doc {
                    PackageDocument::Package(p) => packages.push(p),
                    PackageDocument::Asset(a) => assets.push(a),
                }
            }
        }
        let main = packages
            .iter()
            .find(|p| p.id() == id)
            .cloned()
            .ok_or_else(|| PkgprError::malformed(id, "no package document matches the id"))?;
        if main.version.as_deref().map_or(true, str::is_empty) {
            return Err(PkgprError::malformed(id, "main package has no version"));
        }
        Ok(Self {
            main,
            packages,
            assets,
        })
    }

    /// PR title and commit message: `` `<id>@<version>` ``.
    pub fn title(&self) -> String {
        format!(
            "`{}@{}`",
            self.main.id(),
            self.main.version.as_deref().unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVERSEASONAL: &str = r#"
group: smf-16
name: everseasonal
version: "1.0.3"
info:
  summary: Everseasonal
  images:
    - https://example.com/everseasonal.jpg

assets:
  - assetId: smf-16-everseasonal

---
assetId: smf-16-everseasonal
version: "1.0.3"
lastModified: "2024-12-21T21:40:00Z"
url: https://community.simtropolis.com/files/file/123-file/?do=download&r=456
"#;

    #[test]
    fn test_documents_are_classified_by_group_key() {
        let docs = parse_documents("smf-16:everseasonal", "a.yaml", EVERSEASONAL).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(matches!(&docs[0], PackageDocument::Package(p) if p.name == "everseasonal"));
        assert!(
            matches!(&docs[1], PackageDocument::Asset(a) if a.asset_id == "smf-16-everseasonal")
        );
    }

    #[test]
    fn test_main_document_and_title() {
        let files = vec![SubmissionFile::new("src/yaml/smf-16/everseasonal.yaml", EVERSEASONAL)];
        let classified = ClassifiedDocuments::from_files("smf-16:everseasonal", &files).unwrap();
        assert_eq!(classified.main.info.summary.as_deref(), Some("Everseasonal"));
        assert_eq!(classified.packages.len(), 1);
        assert_eq!(classified.assets.len(), 1);
        assert_eq!(classified.title(), "`smf-16:everseasonal@1.0.3`");
    }

    #[test]
    fn test_unquoted_version_is_accepted() {
        let text = "group: a\nname: b\nversion: 2\n";
        let files = vec![SubmissionFile::new("b.yaml", text)];
        let classified = ClassifiedDocuments::from_files("a:b", &files).unwrap();
        assert_eq!(classified.title(), "`a:b@2`");
    }

    #[test]
    fn test_missing_main_is_malformed() {
        let files = vec![SubmissionFile::new("x.yaml", "group: other\nname: pkg\nversion: '1'\n")];
        let err = ClassifiedDocuments::from_files("a:b", &files).unwrap_err();
        assert!(matches!(err, PkgprError::MalformedSubmission { .. }));
    }

    #[test]
    fn test_main_without_version_is_malformed() {
        let files = vec![SubmissionFile::new("x.yaml", "group: a\nname: b\n")];
        assert!(ClassifiedDocuments::from_files("a:b", &files).is_err());
    }

    #[test]
    fn test_unclassifiable_document_is_malformed() {
        let err = parse_documents("a:b", "x.yaml", "name: orphan\n").unwrap_err();
        assert!(err.to_string().contains("neither"));
    }

    #[test]
    fn test_invalid_yaml_is_malformed() {
        let err = parse_documents("a:b", "x.yaml", "group: [unclosed\n").unwrap_err();
        assert!(matches!(err, PkgprError::MalformedSubmission { .. }));
    }

    #[test]
    fn test_empty_trailing_document_is_skipped() {
        let docs = parse_documents("a:b", "x.yaml", "group: a\nname: b\n---\n").unwrap();
        assert_eq!(docs.len(), 1);
    }
}
