use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// Failure of a single query against the imageboard.
#[derive(Error, Debug)]
pub enum BooruError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { status: StatusCode, url: String },

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Malformed post: {0}")]
    MalformedPost(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Credentials {
    pub const fn is_empty(&self) -> bool {
        self.login.is_none() && self.api_key.is_none()
    }
}

// Wire shape of a post. Everything is optional here; `Post::try_from`
// decides what is actually required.
#[derive(Deserialize, Debug)]
struct RawPost {
    id: Option<u64>,
    image_height: Option<u32>,
    image_width: Option<u32>,
    file_url: Option<String>,
    file_ext: Option<String>,
    #[serde(default)]
    tag_string_artist: String,
    #[serde(default)]
    tag_string_character: String,
    #[serde(default)]
    tag_string_copyright: String,
    #[serde(default)]
    tag_string_general: String,
    rating: Option<String>,
    md5: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: u64,
    pub height: u32,
    pub width: u32,
    /// Download location, either absolute or relative to the imageboard.
    pub file_url: String,
    pub file_ext: String,
    pub artists: Vec<String>,
    pub characters: Vec<String>,
    pub copyrights: Vec<String>,
    pub general: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
}

fn split_tags(tag_string: &str) -> Vec<String> {
    tag_string.split_whitespace().map(str::to_string).collect()
}

fn required<T>(value: Option<T>, field: &str, id: Option<u64>) -> Result<T, BooruError> {
    value.ok_or_else(|| {
        let post = id.map_or_else(|| "post".to_string(), |id| format!("post #{}", id));
        BooruError::MalformedPost(format!("{} has no {}", post, field))
    })
}

// Extensions end up in a file name, so nothing but ASCII letters and digits
pub fn is_safe_extension(extension: &str) -> bool {
    !extension.is_empty() && extension.bytes().all(|b| b.is_ascii_alphanumeric())
}

impl TryFrom<RawPost> for Post {
    type Error = BooruError;

    fn try_from(raw: RawPost) -> Result<Self, Self::Error> {
        let id = required(raw.id, "id", None)?;
        let file_url = required(raw.file_url, "file_url", Some(id))?;
        if file_url.trim().is_empty() {
            return Err(BooruError::MalformedPost(format!(
                "post #{} has an empty file_url",
                id
            )));
        }

        // A missing extension is left empty and taken from the Content-Type later
        let file_ext = raw.file_ext.unwrap_or_default();
        if !file_ext.is_empty() && !is_safe_extension(&file_ext) {
            return Err(BooruError::MalformedPost(format!(
                "post #{} has an invalid file_ext {:?}",
                id, file_ext
            )));
        }

        Ok(Self {
            id,
            height: required(raw.image_height, "image_height", Some(id))?,
            width: required(raw.image_width, "image_width", Some(id))?,
            file_url,
            file_ext,
            artists: split_tags(&raw.tag_string_artist),
            characters: split_tags(&raw.tag_string_character),
            copyrights: split_tags(&raw.tag_string_copyright),
            general: split_tags(&raw.tag_string_general),
            rating: raw.rating,
            md5: raw.md5,
        })
    }
}

impl Post {
    /// Resolve the download location against the imageboard it came from.
    pub fn download_url(&self, endpoint: &Url) -> Result<Url, BooruError> {
        endpoint.join(&self.file_url).map_err(|e| {
            BooruError::MalformedPost(format!(
                "post #{} has an unusable file_url {:?}: {}",
                self.id, self.file_url, e
            ))
        })
    }

    pub fn page_url(&self, endpoint: &Url) -> Url {
        let mut url = endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("posts").push(&self.id.to_string());
        }
        url
    }

    /// Parse a `posts.json` body, returning its first post if any.
    pub fn first_from_listing(body: &str) -> Result<Option<Self>, BooruError> {
        let posts: Vec<RawPost> = serde_json::from_str(body)?;
        posts.into_iter().next().map(Self::try_from).transpose()
    }
}

// Parse an imageboard base URL, accepting only http(s).
pub fn parse_endpoint(endpoint: &str) -> Result<Url, String> {
    let trimmed = endpoint.trim();
    let mut url = Url::parse(trimmed).map_err(|e| format!("{:?} is not a valid URL: {}", trimmed, e))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("{:?} must be an http(s) URL", trimmed));
    }

    // A trailing slash keeps `Url::join` from dropping the last path segment
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);

    Ok(url)
}

pub fn posts_url(endpoint: &Url, tags: &[String], credentials: &Credentials) -> Url {
    let mut url = endpoint.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push("posts.json");
    }

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("limit", "1")
            .append_pair("tags", &tags.join(" "))
            .append_pair("random", "true");
        if let Some(login) = &credentials.login {
            query.append_pair("login", login);
        }
        if let Some(api_key) = &credentials.api_key {
            query.append_pair("api_key", api_key);
        }
    }

    url
}

/// Anything that can hand out one randomly selected post per call.
pub trait PostSource {
    /// `Ok(None)` means the query succeeded but nothing matched.
    fn random_post(&self, tags: &[String]) -> Result<Option<Post>, BooruError>;
}

#[derive(Debug, Clone)]
pub struct BooruClient {
    client: Client,
    endpoint: Url,
    credentials: Credentials,
}

impl BooruClient {
    pub fn new(endpoint: Url, credentials: Credentials, timeout: Duration) -> Result<Self, BooruError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(crate::USER_AGENT));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            credentials,
        })
    }

    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub const fn http(&self) -> &Client {
        &self.client
    }
}

impl PostSource for BooruClient {
    fn random_post(&self, tags: &[String]) -> Result<Option<Post>, BooruError> {
        let url = posts_url(&self.endpoint, tags, &self.credentials);
        // The query carries the api key; neither it nor errors may show the URL
        log::debug!("GET {}posts.json tags={:?}", self.endpoint, tags.join(" "));

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(reqwest::Error::without_url)?;

        let status = response.status();
        log::debug!("status = {}", status);
        if !status.is_success() {
            return Err(BooruError::Status {
                status,
                url: self.endpoint.to_string(),
            });
        }

        let body = response.text().map_err(reqwest::Error::without_url)?;
        Post::first_from_listing(&body)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const LISTING: &str = r#"[{
        "id": 4242,
        "image_height": 2160,
        "image_width": 3840,
        "file_url": "https://cdn.donmai.us/original/ab/cd/abcd.png",
        "file_ext": "png",
        "tag_string_artist": "some_artist",
        "tag_string_character": "hatsune_miku kagamine_rin",
        "tag_string_copyright": "vocaloid",
        "tag_string_general": "short_hair  blue_eyes smile",
        "rating": "g",
        "md5": "abcd",
        "score": 120
    }]"#;

    fn endpoint() -> Url {
        parse_endpoint("https://danbooru.donmai.us").unwrap()
    }

    #[test]
    fn test_parse_endpoint_normalizes_trailing_slash() {
        assert_eq!(endpoint().as_str(), "https://danbooru.donmai.us/");
        assert_eq!(
            parse_endpoint("https://example.test/booru").unwrap().as_str(),
            "https://example.test/booru/"
        );
        assert_eq!(
            parse_endpoint(" https://example.test/booru/?x=1 ").unwrap().as_str(),
            "https://example.test/booru/"
        );
    }

    #[test]
    fn test_parse_endpoint_rejects_non_http() {
        assert!(parse_endpoint("ftp://example.test").is_err());
        assert!(parse_endpoint("danbooru").is_err());
        assert!(parse_endpoint("").is_err());
    }

    #[test]
    fn test_posts_url_query() {
        let tags = vec!["short_hair".to_string(), "blue_eyes".to_string()];
        let url = posts_url(&endpoint(), &tags, &Credentials::default());

        assert_eq!(url.path(), "/posts.json");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("limit".to_string(), "1".to_string()),
                ("tags".to_string(), "short_hair blue_eyes".to_string()),
                ("random".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_posts_url_keeps_sub_path_and_credentials() {
        let base = parse_endpoint("https://example.test/booru").unwrap();
        let credentials = Credentials {
            login: Some("user".to_string()),
            api_key: Some("secret".to_string()),
        };
        let url = posts_url(&base, &[], &credentials);

        assert_eq!(url.path(), "/booru/posts.json");
        let query = url.query().unwrap();
        assert!(query.contains("tags=&"));
        assert!(query.contains("login=user"));
        assert!(query.contains("api_key=secret"));
    }

    #[test]
    fn test_first_from_listing_decodes_post() {
        let post = Post::first_from_listing(LISTING).unwrap().unwrap();

        assert_eq!(post.id, 4242);
        assert_eq!((post.height, post.width), (2160, 3840));
        assert_eq!(post.file_ext, "png");
        assert_eq!(post.artists, vec!["some_artist"]);
        assert_eq!(post.characters, vec!["hatsune_miku", "kagamine_rin"]);
        assert_eq!(post.general, vec!["short_hair", "blue_eyes", "smile"]);
        assert_eq!(post.rating.as_deref(), Some("g"));
    }

    #[test]
    fn test_first_from_listing_empty_array() {
        assert!(Post::first_from_listing("[]").unwrap().is_none());
    }

    #[test]
    fn test_first_from_listing_rejects_non_array() {
        let err = Post::first_from_listing(r#"{"success":false,"message":"too many tags"}"#)
            .unwrap_err();
        assert!(matches!(err, BooruError::Decode(_)));
    }

    #[test]
    fn test_missing_file_url_is_malformed() {
        let body = r#"[{"id": 7, "image_height": 10, "image_width": 10, "file_ext": "jpg"}]"#;
        let err = Post::first_from_listing(body).unwrap_err();
        match err {
            BooruError::MalformedPost(msg) => assert!(msg.contains("#7") && msg.contains("file_url")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_dimensions_is_malformed() {
        let body = r#"[{"id": 8, "file_url": "/data/x.jpg", "image_width": 10}]"#;
        assert!(matches!(
            Post::first_from_listing(body),
            Err(BooruError::MalformedPost(_))
        ));
    }

    #[test]
    fn test_unsafe_file_ext_is_malformed() {
        for ext in ["../x", "/a", "png/../..", "jp g", "png\\x"] {
            let body = format!(
                r#"[{{"id": 9, "image_height": 10, "image_width": 10, "file_url": "/data/9", "file_ext": {:?}}}]"#,
                ext
            );
            match Post::first_from_listing(&body) {
                Err(BooruError::MalformedPost(msg)) => assert!(msg.contains("file_ext"), "{}", msg),
                other => panic!("{:?} was accepted: {other:?}", ext),
            }
        }
    }

    #[test]
    fn test_missing_file_ext_is_left_empty() {
        let body = r#"[{"id": 9, "image_height": 10, "image_width": 10, "file_url": "/data/9"}]"#;
        let post = Post::first_from_listing(body).unwrap().unwrap();
        assert_eq!(post.file_ext, "");

        assert!(is_safe_extension("webp"));
        assert!(is_safe_extension("JPG"));
        assert!(!is_safe_extension(""));
        assert!(!is_safe_extension("tar.gz"));
    }

    #[test]
    fn test_download_url_relative_and_absolute() {
        let mut post = Post::first_from_listing(LISTING).unwrap().unwrap();
        assert_eq!(
            post.download_url(&endpoint()).unwrap().as_str(),
            "https://cdn.donmai.us/original/ab/cd/abcd.png"
        );

        post.file_url = "/data/abcd.png".to_string();
        let base = parse_endpoint("https://example.test/booru").unwrap();
        assert_eq!(
            post.download_url(&base).unwrap().as_str(),
            "https://example.test/data/abcd.png"
        );
    }

    #[test]
    fn test_page_url() {
        let post = Post::first_from_listing(LISTING).unwrap().unwrap();
        assert_eq!(
            post.page_url(&endpoint()).as_str(),
            "https://danbooru.donmai.us/posts/4242"
        );
    }

    #[test]
    fn test_credentials_is_empty() {
        assert!(Credentials::default().is_empty());
        assert!(!Credentials {
            login: Some("user".to_string()),
            api_key: None,
        }
        .is_empty());
    }
}
