use crate::acquire::FetchRequest;
use crate::booru::Post;
use crate::WallpaperError;
use chrono::Local;
use clap::ValueEnum;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const RECORD_FILE: &str = "current.json";

/// What `list` can print about the current wallpaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ListChoice {
    /// Every tag group
    All,
    Artist,
    Character,
    Copyright,
    General,
    /// Link to the post on the imageboard
    Page,
}

impl ListChoice {
    const TAG_GROUPS: [Self; 4] = [Self::Artist, Self::Character, Self::Copyright, Self::General];

    fn expand(choices: &[Self]) -> Vec<Self> {
        let mut expanded = Vec::new();
        for choice in choices {
            let group: &[Self] = if *choice == Self::All {
                &Self::TAG_GROUPS
            } else {
                std::slice::from_ref(choice)
            };
            for item in group {
                if !expanded.contains(item) {
                    expanded.push(*item);
                }
            }
        }
        expanded
    }

    const fn label(self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Artist => "Artist",
            Self::Character => "Character",
            Self::Copyright => "Copyright",
            Self::General => "General",
            Self::Page => "Page",
        }
    }
}

// Join words the way a sentence would: "a, b and c".
pub fn gram_join(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedImageRecord {
    pub post: Post,
    pub imageboard: String,
    pub tags: Vec<String>,
    pub url: String,
    pub page: String,
    pub path: PathBuf,
    pub accepted_at: String,
}

impl AcceptedImageRecord {
    pub fn new(post: Post, request: &FetchRequest, url: &Url, path: PathBuf) -> Self {
        let page = post.page_url(&request.endpoint).to_string();
        Self {
            post,
            imageboard: request.endpoint.to_string(),
            tags: request.tags.clone(),
            url: url.to_string(),
            page,
            path,
            accepted_at: Local::now().to_rfc3339(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), WallpaperError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let partial = path.with_extension("json.part");
        fs::write(&partial, serde_json::to_string_pretty(self)?)?;
        fs::rename(&partial, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, WallpaperError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(WallpaperError::NoRecord(
                    "There is no wallpaper to list data about. Please set some tags".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    fn group(&self, choice: ListChoice) -> &[String] {
        match choice {
            ListChoice::Artist => &self.post.artists,
            ListChoice::Character => &self.post.characters,
            ListChoice::Copyright => &self.post.copyrights,
            ListChoice::General => &self.post.general,
            ListChoice::All | ListChoice::Page => &[],
        }
    }

    pub fn list_lines(&self, choices: &[ListChoice]) -> Vec<(&'static str, String)> {
        ListChoice::expand(choices)
            .into_iter()
            .map(|choice| {
                let value = match choice {
                    ListChoice::Page => self.page.clone(),
                    _ => {
                        let joined = gram_join(self.group(choice));
                        if joined.is_empty() {
                            "(none)".to_string()
                        } else {
                            joined
                        }
                    }
                };
                (choice.label(), value)
            })
            .collect()
    }
}
