//! Parameter and result types exchanged through the `Cdp` trait.

use serde::{Deserialize, Serialize};

/// Viewport-relative bounding box of a matched element.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Point at the given fractional offsets inside the box.
    pub fn point_at(&self, fx: f64, fy: f64) -> (f64, f64) {
        (self.x + self.width * fx, self.y + self.height * fy)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// One element matched by a selector query.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    /// Position among all matches of the query, used to address it again.
    pub index: usize,
    pub rect: Rect,
    pub visible: bool,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub href: Option<String>,
}

/// Cookie in the shape shared by `Network.setCookies`, `Storage.getCookies`
/// and the on-disk session state file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieParam {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

impl CookieParam {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }
}

/// Non-text keys the session engine needs to press.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyPress {
    Enter,
    Tab,
    Escape,
    Backspace,
    SelectAll,
}

impl KeyPress {
    /// `(key, code, windowsVirtualKeyCode, text)` for `Input.dispatchKeyEvent`.
    pub(crate) fn descriptor(&self) -> (&'static str, &'static str, u32, Option<&'static str>) {
        match self {
            KeyPress::Enter => ("Enter", "Enter", 13, Some("\r")),
            KeyPress::Tab => ("Tab", "Tab", 9, None),
            KeyPress::Escape => ("Escape", "Escape", 27, None),
            KeyPress::Backspace => ("Backspace", "Backspace", 8, None),
            KeyPress::SelectAll => ("a", "KeyA", 65, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_uses_camel_case_keys() {
        let mut cookie = CookieParam::new("auth", "abc");
        cookie.http_only = Some(true);
        cookie.same_site = Some("Lax".into());
        let value = serde_json::to_value(&cookie).unwrap();
        assert_eq!(value["httpOnly"], true);
        assert_eq!(value["sameSite"], "Lax");
        assert!(value.get("domain").is_none());
    }

    #[test]
    fn rect_points() {
        let rect = Rect {
            x: 10.0,
            y: 20.0,
            width: 100.0,
            height: 40.0,
        };
        assert_eq!(rect.center(), (60.0, 40.0));
        assert_eq!(rect.point_at(0.25, 0.75), (35.0, 50.0));
        assert!(!rect.is_empty());
    }
}
