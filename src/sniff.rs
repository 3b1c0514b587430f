// Document type detection from response headers and HTML meta-refresh discovery
use crate::constants;
use regex::Regex;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::Url;
use std::sync::OnceLock;

/// Detect the document extension of a response.
///
/// `Content-Type` gives `pdf`, `html` or `docx`; a `Content-Disposition`
/// filename overrides it whenever it carries an extension. Returns an empty
/// string when nothing is recognised.
pub fn sniff_extension(headers: &HeaderMap) -> String {
    let header = |name| headers.get(name).and_then(|v| v.to_str().ok());
    extension_from(header(CONTENT_TYPE), header(CONTENT_DISPOSITION))
}

pub fn extension_from(content_type: Option<&str>, content_disposition: Option<&str>) -> String {
    let mut ext = match content_type {
        Some(constants::MIME_PDF) => "pdf".to_string(),
        Some(ct) if ct.starts_with(constants::MIME_HTML_PREFIX) => "html".to_string(),
        Some(constants::MIME_DOCX) => "docx".to_string(),
        _ => String::new(),
    };

    if let Some(disposition) = content_disposition {
        if let Some(from_name) = disposition_extension(disposition) {
            ext = from_name;
        }
    }
    ext
}

/// Extension of the `filename` parameter of a Content-Disposition value
fn disposition_extension(disposition: &str) -> Option<String> {
    // Servers leak HTML entity remnants (&#769; &#8230;) into file names
    let cleaned = disposition.replace("769;", "_").replace("8230;", "_");
    let mut found = None;
    for item in cleaned.split(';') {
        if !item.contains("filename") {
            continue;
        }
        let Some((_, file_name)) = item.split_once('=') else {
            continue;
        };
        let file_name = file_name.replace(" .", ".").to_lowercase();
        let ext = split_extension(&file_name)
            .replace('.', "")
            .replace("?=", "")
            .replace('"', "");
        found = Some(ext);
    }
    found.filter(|ext| !ext.is_empty())
}

/// Extension part of a file name, dot included (empty for dotfiles)
fn split_extension(file_name: &str) -> &str {
    let base = file_name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(file_name);
    let stem_start = base.len() - base.trim_start_matches('.').len();
    match base[stem_start..].rfind('.') {
        Some(idx) => &base[stem_start + idx..],
        None => "",
    }
}

fn meta_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?is)<meta\b[^>]*http-equiv\s*=\s*["']?refresh["']?[^>]*>"#)
            .expect("meta tag pattern is valid")
    })
}

fn content_attr_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?is)\bcontent\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("content attribute pattern is valid")
    })
}

/// Target of a `<meta http-equiv="refresh" content="N;url=...">` tag,
/// resolved against the page URL.
pub fn meta_refresh_target(body: &str, page_url: &Url) -> Option<Url> {
    let tag = meta_tag_pattern().find(body)?.as_str();
    let caps = content_attr_pattern().captures(tag)?;
    let content = caps.get(1).or_else(|| caps.get(2))?.as_str();

    let (_, target) = content.split_once(';')?;
    let target = target.trim();
    if !target.to_ascii_lowercase().starts_with("url=") {
        return None;
    }
    let target = target[4..].trim().replace('\'', "");
    log::debug!("Found meta refresh {}", target);
    page_url.join(&target).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_mapping() {
        assert_eq!(extension_from(Some("application/pdf"), None), "pdf");
        assert_eq!(extension_from(Some("text/html; charset=utf-8"), None), "html");
        assert_eq!(extension_from(Some(constants::MIME_DOCX), None), "docx");
        assert_eq!(extension_from(Some("application/octet-stream"), None), "");
        assert_eq!(extension_from(None, None), "");
    }

    #[test]
    fn test_disposition_overrides_content_type() {
        assert_eq!(
            extension_from(
                Some("application/octet-stream"),
                Some(r#"attachment; filename="Pliego Tecnico .ZIP""#)
            ),
            "zip"
        );
        assert_eq!(
            extension_from(Some("application/pdf"), Some("attachment; filename=memoria.docx?=")),
            "docx"
        );
        // No extension in the file name keeps the Content-Type guess
        assert_eq!(
            extension_from(Some("application/pdf"), Some("attachment; filename=memoria")),
            "pdf"
        );
    }

    #[test]
    fn test_entity_artifacts_are_neutralised() {
        assert_eq!(
            extension_from(None, Some("attachment; filename=anexo&#8230;final.xlsx")),
            "xlsx"
        );
    }

    #[test]
    fn test_meta_refresh() {
        let page = Url::parse("http://127.0.0.1:8080/docs/page").unwrap();
        let body = r#"<html><head><META HTTP-EQUIV="Refresh" CONTENT="0; URL='/files/a.pdf'"></head></html>"#;
        assert_eq!(
            meta_refresh_target(body, &page).unwrap().as_str(),
            "http://127.0.0.1:8080/files/a.pdf"
        );

        let reversed = r#"<meta content="5;url=https://other/b.pdf" http-equiv="refresh">"#;
        assert_eq!(
            meta_refresh_target(reversed, &page).unwrap().as_str(),
            "https://other/b.pdf"
        );

        assert!(meta_refresh_target("<meta http-equiv=\"refresh\" content=\"30\">", &page).is_none());
        assert!(meta_refresh_target("<p>plain</p>", &page).is_none());
    }
}
