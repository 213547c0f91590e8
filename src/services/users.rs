//! Static credential table mapping each username to its upstream sources.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::config::ConfigError;

/// One configured account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub password: String,
    pub playlist_url: String,
    pub epg_url: Option<String>,
}

/// Shape of a users file entry; missing sources inherit the defaults
#[derive(Debug, Deserialize)]
struct UserFileEntry {
    password: String,
    #[serde(default)]
    playlist_url: Option<String>,
    #[serde(default)]
    epg_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: HashMap<String, UserEntry>,
}

fn validate_url(name: &str, value: &str) -> Result<String, ConfigError> {
    url::Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        name: name.to_string(),
        url: value.to_string(),
        source,
    })?;
    Ok(value.to_string())
}

impl UserDirectory {
    /// Build the directory from the inline `USERS` list and an optional JSON
    /// users file. File entries win over inline ones with the same name.
    pub fn load(
        inline: Option<&str>,
        file: Option<&Path>,
        default_playlist: Option<&str>,
        default_epg: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let mut directory = Self::default();

        if let Some(list) = inline {
            for pair in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let (username, password) = pair
                    .split_once(':')
                    .filter(|(u, p)| !u.trim().is_empty() && !p.is_empty())
                    .ok_or_else(|| ConfigError::InvalidUserEntry(pair.to_string()))?;
                directory.insert(
                    username.trim(),
                    password,
                    None,
                    None,
                    default_playlist,
                    default_epg,
                )?;
            }
        }

        if let Some(path) = file {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let entries: HashMap<String, UserFileEntry> =
                serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                    path: path.display().to_string(),
                    source,
                })?;

            for (username, entry) in entries {
                directory.insert(
                    &username,
                    &entry.password,
                    entry.playlist_url.as_deref(),
                    entry.epg_url.as_deref(),
                    default_playlist,
                    default_epg,
                )?;
            }
        }

        Ok(directory)
    }

    fn insert(
        &mut self,
        username: &str,
        password: &str,
        playlist_url: Option<&str>,
        epg_url: Option<&str>,
        default_playlist: Option<&str>,
        default_epg: Option<&str>,
    ) -> Result<(), ConfigError> {
        let playlist_url = playlist_url
            .or(default_playlist)
            .ok_or_else(|| ConfigError::MissingSource(username.to_string()))?;
        let epg_url = epg_url.or(default_epg);

        let entry = UserEntry {
            password: password.to_string(),
            playlist_url: validate_url(username, playlist_url)?,
            epg_url: epg_url.map(|url| validate_url(username, url)).transpose()?,
        };
        self.users.insert(username.to_string(), entry);
        Ok(())
    }

    /// Exact match on both username and password
    pub fn authenticate(&self, username: &str, password: &str) -> Option<&UserEntry> {
        self.users
            .get(username)
            .filter(|entry| entry.password == password)
    }

    /// All accounts sorted by username
    pub fn iter(&self) -> impl Iterator<Item = (&str, &UserEntry)> {
        let mut users: Vec<(&str, &UserEntry)> = self
            .users
            .iter()
            .map(|(name, entry)| (name.as_str(), entry))
            .collect();
        users.sort_by(|a, b| a.0.cmp(b.0));
        users.into_iter()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYLIST: &str = "http://upstream.example/list.m3u";

    #[test]
    fn test_inline_users_inherit_defaults() {
        let users = UserDirectory::load(
            Some("dad:devon, john:pass123"),
            None,
            Some(PLAYLIST),
            Some("http://upstream.example/epg.xml"),
        )
        .unwrap();

        assert_eq!(users.len(), 2);
        let dad = users.authenticate("dad", "devon").unwrap();
        assert_eq!(dad.playlist_url, PLAYLIST);
        assert_eq!(dad.epg_url.as_deref(), Some("http://upstream.example/epg.xml"));
    }

    #[test]
    fn test_authenticate_rejects_wrong_password() {
        let users = UserDirectory::load(Some("dad:devon"), None, Some(PLAYLIST), None).unwrap();

        assert!(users.authenticate("dad", "Devon").is_none());
        assert!(users.authenticate("mum", "devon").is_none());
        assert!(users.authenticate("", "").is_none());
    }

    #[test]
    fn test_password_may_contain_colon() {
        let users = UserDirectory::load(Some("ian:Oct:2025"), None, Some(PLAYLIST), None).unwrap();

        assert!(users.authenticate("ian", "Oct:2025").is_some());
    }

    #[test]
    fn test_malformed_inline_entry() {
        let err = UserDirectory::load(Some("dad"), None, Some(PLAYLIST), None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUserEntry(_)));
    }

    #[test]
    fn test_user_without_source_is_rejected() {
        let err = UserDirectory::load(Some("dad:devon"), None, None, None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSource(ref name) if name == "dad"));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let err = UserDirectory::load(Some("dad:devon"), None, Some("not a url"), None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));
    }

    #[test]
    fn test_users_file_overrides_inline() {
        let path = std::env::temp_dir().join(format!(
            "xtream-front-users-{}.json",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"{
                "dad": {"password": "newpass", "playlist_url": "http://other.example/dad.m3u"},
                "mark": {"password": "Sidmouth2025"}
            }"#,
        )
        .unwrap();

        let users =
            UserDirectory::load(Some("dad:devon"), Some(&path), Some(PLAYLIST), None).unwrap();
        let _ = std::fs::remove_file(&path);

        assert!(users.authenticate("dad", "devon").is_none());
        let dad = users.authenticate("dad", "newpass").unwrap();
        assert_eq!(dad.playlist_url, "http://other.example/dad.m3u");
        assert_eq!(users.authenticate("mark", "Sidmouth2025").unwrap().playlist_url, PLAYLIST);

        let names: Vec<&str> = users.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["dad", "mark"]);
    }
}
