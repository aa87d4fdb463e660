use crate::booru::{parse_endpoint, BooruError, Post, PostSource};
use crate::display::DisplayBounds;
use crate::WallpaperError;
use reqwest::Url;
use thiserror::Error;

/// Why the attempt budget ran out.
#[derive(Error, Debug)]
pub enum AcquireError {
    #[error("{endpoint} could not be queried in {attempts} attempt(s): {source}")]
    Unreachable {
        endpoint: String,
        attempts: u32,
        #[source]
        source: BooruError,
    },

    #[error("No posts matched [{tags}] in {attempts} attempt(s); try fewer or different tags")]
    NoMatches { tags: String, attempts: u32 },

    #[error(
        "Image wasn't big enough: none of {attempts} attempt(s) reached {min_width}x{min_height} \
         (largest was {best_width}x{best_height}); try a smaller size"
    )]
    TooSmall {
        attempts: u32,
        min_width: u32,
        min_height: u32,
        best_width: u32,
        best_height: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub tags: Vec<String>,
    pub endpoint: Url,
    pub max_attempts: u32,
    pub min_size_ratio: f64,
}

impl FetchRequest {
    pub fn new(
        tags: Vec<String>,
        endpoint: &str,
        max_attempts: u32,
        min_size_ratio: f64,
    ) -> Result<Self, WallpaperError> {
        if max_attempts == 0 {
            return Err(WallpaperError::Config(
                "at least one attempt is required".to_string(),
            ));
        }
        validate_size_ratio(min_size_ratio)?;
        let endpoint = parse_endpoint(endpoint).map_err(WallpaperError::Config)?;

        Ok(Self {
            tags,
            endpoint,
            max_attempts,
            min_size_ratio,
        })
    }

    /// Smallest (width, height) a candidate may have on `bounds`.
    pub fn minimum_size(&self, bounds: DisplayBounds) -> (u32, u32) {
        let scale = |pixels: u32| saturating_u32((f64::from(pixels) * self.min_size_ratio).ceil());
        (scale(bounds.width), scale(bounds.height))
    }
}

// Ratios are validated finite and non-negative before they get here
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn saturating_u32(value: f64) -> u32 {
    value.min(f64::from(u32::MAX)) as u32
}

pub fn validate_size_ratio(ratio: f64) -> Result<(), WallpaperError> {
    if ratio.is_finite() && ratio >= 0.0 {
        Ok(())
    } else {
        Err(WallpaperError::Config(format!(
            "size must be a non-negative number, got {}",
            ratio
        )))
    }
}

/// Whether a `width`x`height` image covers `ratio` of the display.
///
/// A ratio of zero accepts everything, including zero-sized images.
pub fn is_good_fit(height: u32, width: u32, bounds: DisplayBounds, ratio: f64) -> bool {
    f64::from(height) >= f64::from(bounds.height) * ratio
        && f64::from(width) >= f64::from(bounds.width) * ratio
}

pub fn acquire<S: PostSource + ?Sized>(
    source: &S,
    request: &FetchRequest,
    bounds: DisplayBounds,
) -> Result<Post, AcquireError> {
    let mut last_error = None;
    let mut empty_results = 0;
    // Largest rejected candidate, by area
    let mut best: Option<(u32, u32)> = None;

    for attempt in 1..=request.max_attempts {
        log::info!("Attempt {}/{}: Getting image...", attempt, request.max_attempts);

        match source.random_post(&request.tags) {
            Err(e) => {
                log::warn!("Attempt {} failed: {}", attempt, e);
                last_error = Some(e);
            }
            Ok(None) => {
                log::warn!("Attempt {}: no posts matched the tags", attempt);
                empty_results += 1;
            }
            Ok(Some(post)) => {
                if is_good_fit(post.height, post.width, bounds, request.min_size_ratio) {
                    log::debug!(
                        "Accepted post #{} ({}x{}) on attempt {}",
                        post.id,
                        post.width,
                        post.height,
                        attempt
                    );
                    return Ok(post);
                }

                log::info!(
                    "Post #{} is {}x{}, too small for {} at size {}",
                    post.id,
                    post.width,
                    post.height,
                    bounds,
                    request.min_size_ratio
                );
                let area = u64::from(post.width) * u64::from(post.height);
                if best.map_or(true, |(w, h)| area > u64::from(w) * u64::from(h)) {
                    best = Some((post.width, post.height));
                }
            }
        }
    }

    let attempts = request.max_attempts;
    if let Some((best_width, best_height)) = best {
        let (min_width, min_height) = request.minimum_size(bounds);
        Err(AcquireError::TooSmall {
            attempts,
            min_width,
            min_height,
            best_width,
            best_height,
        })
    } else if let (0, Some(source)) = (empty_results, last_error) {
        Err(AcquireError::Unreachable {
            endpoint: request.endpoint.to_string(),
            attempts,
            source,
        })
    } else {
        Err(AcquireError::NoMatches {
            tags: request.tags.join(" "),
            attempts,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    type Reply = Result<Option<Post>, BooruError>;

    // Replays canned replies and counts how often it was asked
    struct Scripted {
        replies: RefCell<VecDeque<Reply>>,
        calls: Cell<u32>,
    }

    impl Scripted {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                calls: Cell::new(0),
            }
        }
    }

    impl PostSource for Scripted {
        fn random_post(&self, tags: &[String]) -> Result<Option<Post>, BooruError> {
            assert_eq!(tags, ["short_hair"]);
            self.calls.set(self.calls.get() + 1);
            self.replies
                .borrow_mut()
                .pop_front()
                .expect("queried more often than scripted")
        }
    }

    fn post(id: u64, height: u32, width: u32) -> Reply {
        Ok(Some(Post {
            id,
            height,
            width,
            file_url: format!("/data/{}.jpg", id),
            file_ext: "jpg".to_string(),
            artists: vec![],
            characters: vec![],
            copyrights: vec![],
            general: vec!["short_hair".to_string()],
            rating: None,
            md5: None,
        }))
    }

    fn status_error() -> Reply {
        Err(BooruError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            url: "https://example.test/".to_string(),
        })
    }

    fn request(max_attempts: u32, ratio: f64) -> FetchRequest {
        FetchRequest::new(
            vec!["short_hair".to_string()],
            "https://example.test",
            max_attempts,
            ratio,
        )
        .unwrap()
    }

    const FULL_HD: DisplayBounds = DisplayBounds::new(1080, 1920);

    #[test]
    fn test_accepts_first_good_fit() {
        let source = Scripted::new(vec![post(1, 800, 1400), post(2, 1200, 2100), post(3, 900, 1500)]);

        let accepted = acquire(&source, &request(3, 0.5), FULL_HD).unwrap();

        assert_eq!(accepted.id, 2);
        assert_eq!(source.calls.get(), 2);
    }

    #[test]
    fn test_all_too_small() {
        let source = Scripted::new(vec![post(1, 500, 500), post(2, 500, 500), post(3, 500, 500)]);

        let err = acquire(&source, &request(3, 0.5), FULL_HD).unwrap_err();

        assert_eq!(source.calls.get(), 3);
        match err {
            AcquireError::TooSmall {
                attempts,
                min_width,
                min_height,
                best_width,
                best_height,
            } => {
                assert_eq!(attempts, 3);
                assert_eq!((min_width, min_height), (960, 540));
                assert_eq!((best_width, best_height), (500, 500));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_zero_ratio_accepts_anything() {
        let source = Scripted::new(vec![post(1, 0, 0)]);

        let accepted = acquire(&source, &request(3, 0.0), FULL_HD).unwrap();

        assert_eq!(accepted.id, 1);
        assert_eq!(source.calls.get(), 1);
    }

    #[test]
    fn test_zero_ratio_with_unknown_display() {
        let source = Scripted::new(vec![post(1, 10, 10)]);
        assert!(acquire(&source, &request(1, 0.0), DisplayBounds::default()).is_ok());
    }

    #[test]
    fn test_is_good_fit_boundaries() {
        assert!(is_good_fit(1080, 1920, FULL_HD, 1.0));
        assert!(!is_good_fit(1079, 1920, FULL_HD, 1.0));
        assert!(!is_good_fit(1080, 1919, FULL_HD, 1.0));
        assert!(is_good_fit(540, 960, FULL_HD, 0.5));
        assert!(!is_good_fit(4000, 4000, FULL_HD, 4.0));
        assert!(is_good_fit(0, 0, FULL_HD, 0.0));
    }

    #[test]
    fn test_empty_results_exhaust_budget() {
        let source = Scripted::new(vec![Ok(None), Ok(None), Ok(None), Ok(None)]);

        let err = acquire(&source, &request(4, 0.5), FULL_HD).unwrap_err();

        assert_eq!(source.calls.get(), 4);
        assert!(matches!(err, AcquireError::NoMatches { attempts: 4, .. }));
        assert!(err.to_string().contains("short_hair"));
    }

    #[test]
    fn test_transport_errors_consume_attempts() {
        let source = Scripted::new(vec![status_error(), status_error(), post(3, 2000, 3000)]);

        let accepted = acquire(&source, &request(3, 1.0), FULL_HD).unwrap();

        assert_eq!(accepted.id, 3);
        assert_eq!(source.calls.get(), 3);
    }

    #[test]
    fn test_only_transport_errors_is_unreachable() {
        let source = Scripted::new(vec![status_error(), status_error()]);

        let err = acquire(&source, &request(2, 1.0), FULL_HD).unwrap_err();

        assert_eq!(source.calls.get(), 2);
        match err {
            AcquireError::Unreachable {
                endpoint,
                attempts,
                source,
            } => {
                assert_eq!(endpoint, "https://example.test/");
                assert_eq!(attempts, 2);
                assert!(matches!(source, BooruError::Status { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_candidate_outranks_other_failures() {
        let source = Scripted::new(vec![status_error(), Ok(None), post(3, 10, 10)]);

        let err = acquire(&source, &request(3, 1.0), FULL_HD).unwrap_err();

        assert!(matches!(err, AcquireError::TooSmall { best_width: 10, .. }));
    }

    #[test]
    fn test_empty_outranks_transport_errors() {
        let source = Scripted::new(vec![Ok(None), status_error()]);

        let err = acquire(&source, &request(2, 1.0), FULL_HD).unwrap_err();

        assert!(matches!(err, AcquireError::NoMatches { .. }));
    }

    #[test]
    fn test_single_attempt_budget() {
        let source = Scripted::new(vec![post(1, 100, 100), post(2, 5000, 5000)]);

        assert!(acquire(&source, &request(1, 1.0), FULL_HD).is_err());
        assert_eq!(source.calls.get(), 1);
    }

    #[test]
    fn test_request_validation() {
        assert!(FetchRequest::new(vec![], "https://example.test", 0, 0.0).is_err());
        assert!(FetchRequest::new(vec![], "https://example.test", 1, -0.1).is_err());
        assert!(FetchRequest::new(vec![], "https://example.test", 1, f64::NAN).is_err());
        assert!(FetchRequest::new(vec![], "not a url", 1, 0.0).is_err());
        assert!(FetchRequest::new(vec![], "https://example.test", 1, 1.5).is_ok());
    }

    #[test]
    fn test_minimum_size_rounds_up() {
        let request = request(1, 0.333);
        assert_eq!(request.minimum_size(FULL_HD), (640, 360));
    }
}
