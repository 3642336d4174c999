//! Pull request body rendering.
//!
//! Pure: the same classified documents always render the same markdown.

use crate::documents::{AssetDoc, ClassifiedDocuments, PackageDoc};

/// Render the PR body for a classified submission.
///
/// Layout: summary heading, optional image, optional description, then a
/// `## Packages` list and an `## Assets` list.
pub fn render_body(docs: &ClassifiedDocuments) -> String {
    let info = &docs.main.info;
    let summary = info.summary.as_deref().unwrap_or(docs.main.name.as_str());

    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("# {summary}\n"));
    if let Some(image) = info.images.first() {
        lines.push(format!("![{summary}]({image})\n"));
    }
    if let Some(description) = info.description.as_deref().map(str::trim) {
        if !description.is_empty() {
            lines.push(format!("{description}\n"));
        }
    }

    lines.push("## Packages\n".to_string());
    lines.extend(docs.packages.iter().map(package_line));
    lines.push(String::new());

    lines.push("## Assets\n".to_string());
    lines.extend(docs.assets.iter().map(asset_line));
    lines.join("\n")
}

fn package_line(pkg: &PackageDoc) -> String {
    match &pkg.info.website {
        Some(website) => format!("- [{}]({website})", pkg.id()),
        None => format!("- {}", pkg.id()),
    }
}

fn asset_line(asset: &AssetDoc) -> String {
    match &asset.url {
        Some(url) => format!("- [{}]({url})", asset.asset_id),
        None => format!("- {}", asset.asset_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::PackageInfo;

    fn main_doc(info: PackageInfo) -> PackageDoc {
        PackageDoc {
            group: "smf-16".to_string(),
            name: "everseasonal".to_string(),
            version: Some("1.0.3".to_string()),
            info,
        }
    }

    #[test]
    fn test_minimal_body() {
        let main = main_doc(PackageInfo {
            summary: Some("Everseasonal".to_string()),
            ..PackageInfo::default()
        });
        let docs = ClassifiedDocuments {
            main: main.clone(),
            packages: vec![main],
            assets: vec![],
        };
        assert_eq!(
            render_body(&docs),
            "# Everseasonal\n\n## Packages\n\n- smf-16:everseasonal\n\n## Assets\n"
        );
    }

    #[test]
    fn test_website_and_description() {
        let main = main_doc(PackageInfo {
            summary: Some("Everseasonal".to_string()),
            description: Some("Seasonal trees.\n".to_string()),
            website: Some("https://example.com/trees".to_string()),
            ..PackageInfo::default()
        });
        let docs = ClassifiedDocuments {
            main: main.clone(),
            packages: vec![main],
            assets: vec![AssetDoc {
                asset_id: "smf-16-everseasonal".to_string(),
                url: None,
                version: None,
            }],
        };
        let body = render_body(&docs);
        assert!(body.contains("Seasonal trees.\n"));
        assert!(body.contains("- [smf-16:everseasonal](https://example.com/trees)"));
        assert!(body.ends_with("- smf-16-everseasonal"));
    }

    #[test]
    fn test_missing_summary_falls_back_to_name() {
        let main = main_doc(PackageInfo::default());
        let docs = ClassifiedDocuments {
            main: main.clone(),
            packages: vec![main],
            assets: vec![],
        };
        assert!(render_body(&docs).starts_with("# everseasonal\n"));
    }
}
