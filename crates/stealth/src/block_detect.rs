use once_cell::sync::Lazy;

/// Phrases that mark a bot-detection or block page.
pub static CHALLENGE_PHRASES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "access denied",
        "robot check",
        "captcha",
        "unusual traffic",
        "verify you are human",
        "verify you're a human",
        "checking your browser",
        "ddos-guard",
        "please enable cookies",
        "sorry, you have been blocked",
        "403 forbidden",
        "just a moment",
        "press & hold",
    ]
});

/// Elements whose mere presence means a captcha widget is on the page.
pub static CAPTCHA_FRAME_SELECTORS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        r#"iframe[src*="captcha"]"#,
        r#"iframe[src*="recaptcha"]"#,
        r#"iframe[src*="hcaptcha"]"#,
        r#"[id*="captcha"]"#,
        r#"#px-captcha"#,
    ]
});

/// Bot-manager identity cookies. Dropped before every automated load so the
/// site sees a fresh device while login cookies survive.
pub static TRACKING_COOKIES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "_abck",
        "ak_bmsc",
        "bm_sv",
        "bm_sz",
        "bm_mi",
        "pxcts",
        "_pxvid",
        "__pxvid",
        "_px3",
        "_pxhd",
        "akavpau_p1",
        "akavpau_p2",
        "rxvt",
        "rxVisitor",
    ]
});

/// URL fragments that show a redirect to a block or verification page.
pub static BLOCKED_URL_MARKERS: Lazy<Vec<&'static str>> =
    Lazy::new(|| vec!["blocked", "captcha", "denied", "/challenge"]);

/// Number of body characters inspected for challenge phrases.
pub const CONTENT_SNIPPET_CHARS: usize = 3000;

/// Returns a short reason when title, url or the content snippet look like a
/// challenge page.
pub fn detect_challenge(title: &str, url: &str, body: &str) -> Option<String> {
    let url_lower = url.to_ascii_lowercase();
    if let Some(marker) = BLOCKED_URL_MARKERS
        .iter()
        .find(|marker| url_lower.contains(*marker))
    {
        return Some(format!("redirected to a '{marker}' page"));
    }

    let snippet: String = body.chars().take(CONTENT_SNIPPET_CHARS).collect();
    let haystack = format!("{} {} {}", title, url, snippet).to_lowercase();
    CHALLENGE_PHRASES
        .iter()
        .find(|phrase| haystack.contains(*phrase))
        .map(|phrase| format!("page shows '{phrase}'"))
}

pub fn is_tracking_cookie(name: &str) -> bool {
    TRACKING_COOKIES.iter().any(|candidate| *candidate == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_phrase_in_title() {
        let reason = detect_challenge("Robot Check", "https://www.shop.test/", "");
        assert_eq!(reason.unwrap(), "page shows 'robot check'");
    }

    #[test]
    fn detects_blocked_redirect() {
        let reason = detect_challenge("Shop", "https://www.shop.test/blocked?url=x", "");
        assert_eq!(reason.unwrap(), "redirected to a 'blocked' page");
    }

    #[test]
    fn only_inspects_snippet() {
        let mut body = "a".repeat(CONTENT_SNIPPET_CHARS);
        body.push_str(" captcha");
        assert!(detect_challenge("Shop", "https://www.shop.test/", &body).is_none());
    }

    #[test]
    fn ordinary_page_passes() {
        assert!(detect_challenge(
            "2% Milk | Shop",
            "https://www.shop.test/en/search?q=milk",
            "Results for milk. Add to cart"
        )
        .is_none());
    }

    #[test]
    fn tracking_cookie_lookup() {
        assert!(is_tracking_cookie("_abck"));
        assert!(!is_tracking_cookie("auth"));
    }
}
