//! Share links for finished roasts.

use reqwest::Url;

use crate::error::CoreError;

/// Public address of the app, linked from shared posts.
pub const APP_URL: &str = "https://chook.app";

/// Canned text of a shared post.
pub const SHARE_TEXT: &str = "I just got my code roasted by \"Chook\" and I'm crying 🤣🔥. This thing is brutal.\n\n#ChookApp #NaijaTech";

const TWEET_INTENT_URL: &str = "https://twitter.com/intent/tweet";

/// Build the post-intent URL sharing [`SHARE_TEXT`] and `app_url`.
///
/// # Errors
///
/// Returns `CoreError::Other` if the intent URL cannot be built.
pub fn share_intent_url(app_url: &str) -> Result<Url, CoreError> {
    Url::parse_with_params(TWEET_INTENT_URL, &[("text", SHARE_TEXT), ("url", app_url)])
        .map_err(|e| CoreError::Other(anyhow::Error::from(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_encode_text_and_app_url() {
        let url = share_intent_url(APP_URL).expect("should build url");
        assert_eq!(url.host_str(), Some("twitter.com"));
        assert_eq!(url.path(), "/intent/tweet");

        let params: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            params,
            vec![
                ("text".to_owned(), SHARE_TEXT.to_owned()),
                ("url".to_owned(), APP_URL.to_owned()),
            ]
        );
        assert!(!url.as_str().contains('\n'));
    }
}
