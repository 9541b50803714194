//! Extraction key refresh.
//!
//! The video extraction tool reads its registration key from a settings file
//! line of the form `app_Key = "...";`. Before a video rip the current key can
//! be fetched and written into that file.

use log::{debug, info};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Anchor of the forum post that carries the current key
const KEY_POST_ANCHOR: &str = "post_content3548";

#[derive(Debug, Error)]
pub enum KeyRefreshError {
    #[error("Failed to fetch key page: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("No key found in page")]
    KeyNotFound,

    #[error("Failed to update settings file {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Source of the current extraction key
pub trait KeySource: Send + Sync {
    fn fetch_key(&self) -> Result<String, KeyRefreshError>;
}

/// Reads the key from the public forum thread it is posted in.
///
/// The blocking HTTP client is built per fetch; it must be created and dropped
/// outside any async context, and fetches only happen on blocking threads.
pub struct ForumKeySource {
    url: String,
    timeout: Duration,
}

impl ForumKeySource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl KeySource for ForumKeySource {
    fn fetch_key(&self) -> Result<String, KeyRefreshError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;
        let page = client
            .get(&self.url)
            .send()?
            .error_for_status()?
            .text()?;
        extract_key_from_page(&page).ok_or(KeyRefreshError::KeyNotFound)
    }
}

/// Text of the first `<code>` block after the key post's anchor
pub fn extract_key_from_page(page: &str) -> Option<String> {
    let post = &page[page.find(KEY_POST_ANCHOR)?..];
    let code_open = post.find("<code")?;
    let code = &post[code_open..];
    let body_start = code.find('>')? + 1;
    let body_end = code.find("</code>")?;
    if body_end <= body_start {
        return None;
    }
    let key = code[body_start..body_end].trim();
    (!key.is_empty()).then(|| key.to_string())
}

fn key_line_regex() -> &'static Regex {
    static KEY_LINE: OnceLock<Regex> = OnceLock::new();
    KEY_LINE.get_or_init(|| {
        Regex::new(r#"(?m)^app_Key\s*=\s*".*";[ \t]*$"#).expect("static regex is valid")
    })
}

/// Replace the `app_Key` line in `settings`, appending one when absent
pub fn replace_key_line(settings: &str, key: &str) -> String {
    let line = format!("app_Key = \"{}\";", key);
    let re = key_line_regex();
    if re.is_match(settings) {
        return re.replace_all(settings, regex::NoExpand(&line)).into_owned();
    }

    let mut updated = settings.to_string();
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(&line);
    updated.push('\n');
    updated
}

/// Rewrite the key line of the settings file. A missing file is created.
pub fn update_settings_key(settings_path: &Path, key: &str) -> Result<(), KeyRefreshError> {
    let settings_err = |source: std::io::Error| KeyRefreshError::Settings {
        path: settings_path.to_path_buf(),
        source,
    };

    let current = match fs::read_to_string(settings_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(settings_err(e)),
    };
    if let Some(parent) = settings_path.parent() {
        fs::create_dir_all(parent).map_err(settings_err)?;
    }
    fs::write(settings_path, replace_key_line(&current, key)).map_err(settings_err)
}

/// A key source bound to the settings file it updates
pub struct KeyRefresher {
    source: Box<dyn KeySource>,
    settings_path: PathBuf,
}

impl KeyRefresher {
    pub fn new(source: Box<dyn KeySource>, settings_path: PathBuf) -> Self {
        Self {
            source,
            settings_path,
        }
    }

    pub fn refresh(&self) -> Result<(), KeyRefreshError> {
        let key = self.source.fetch_key()?;
        debug!("Fetched extraction key ({} chars)", key.len());
        update_settings_key(&self.settings_path, &key)?;
        info!("Extraction key updated in {}", self.settings_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct FixedKey(&'static str);

    impl KeySource for FixedKey {
        fn fetch_key(&self) -> Result<String, KeyRefreshError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_extract_key_from_page() {
        let page = r#"<div id="post_content1"><code>not this</code></div>
<div id="post_content3548"><div class="content">Key:<br/><code>T-abcDEF123</code></div></div>"#;
        assert_eq!(extract_key_from_page(page), Some("T-abcDEF123".to_string()));
    }

    #[test]
    fn test_extract_key_missing_anchor() {
        assert_eq!(extract_key_from_page("<code>T-x</code>"), None);
        assert_eq!(extract_key_from_page(r#"<div id="post_content3548"><code></code>"#), None);
    }

    #[test]
    fn test_replace_existing_key_line() {
        let settings = "app_DataDir = \"/data\";\napp_Key = \"T-old\";\napp_ExpertMode = \"1\";\n";
        let updated = replace_key_line(settings, "T-new");
        assert_eq!(
            updated,
            "app_DataDir = \"/data\";\napp_Key = \"T-new\";\napp_ExpertMode = \"1\";\n"
        );
    }

    #[test]
    fn test_replace_appends_when_absent() {
        assert_eq!(
            replace_key_line("app_DataDir = \"/data\";", "T-new"),
            "app_DataDir = \"/data\";\napp_Key = \"T-new\";\n"
        );
        assert_eq!(replace_key_line("", "T-new"), "app_Key = \"T-new\";\n");
    }

    #[test]
    fn test_key_with_dollar_is_literal() {
        let updated = replace_key_line("app_Key = \"T-old\";\n", "T-$1x");
        assert_eq!(updated, "app_Key = \"T-$1x\";\n");
    }

    #[test]
    fn test_refresher_writes_settings_file() {
        let temp = TempDir::new().unwrap();
        let settings = temp.path().join(".MakeMKV").join("settings.conf");
        let refresher = KeyRefresher::new(Box::new(FixedKey("T-fresh")), settings.clone());

        refresher.refresh().unwrap();
        assert_eq!(fs::read_to_string(&settings).unwrap(), "app_Key = \"T-fresh\";\n");

        fs::write(&settings, "app_Key = \"T-stale\";\nother = \"1\";\n").unwrap();
        refresher.refresh().unwrap();
        assert_eq!(
            fs::read_to_string(&settings).unwrap(),
            "app_Key = \"T-fresh\";\nother = \"1\";\n"
        );
    }
}
