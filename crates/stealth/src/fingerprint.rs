//! Fingerprint-masking script injected before any page script runs.

use serde_json::json;

use crate::config::StealthProfile;

/// Builds the init script for `profile`. Values are embedded as JSON so the
/// script never has to be escaped by hand.
pub fn init_script(profile: &StealthProfile) -> String {
    let viewport = profile.viewport.clone().unwrap_or_default();
    let webgl = profile.webgl.clone();
    let params = json!({
        "languages": profile.languages(),
        "platform": profile.platform.clone().unwrap_or_else(|| "MacIntel".into()),
        "hardwareConcurrency": profile.hardware_concurrency,
        "screenWidth": viewport.width,
        "screenHeight": viewport.height,
        // Dock / menu bar space a real desktop leaves out of availHeight.
        "availHeight": viewport.height.saturating_sub(40),
        "webglVendor": webgl.as_ref().map(|w| w.vendor.clone()),
        "webglRenderer": webgl.as_ref().map(|w| w.renderer.clone()),
        "canvasNoise": profile.canvas_noise,
    });

    SCRIPT_TEMPLATE.replace("__PARAMS__", &params.to_string())
}

const SCRIPT_TEMPLATE: &str = r#"(() => {
  const p = __PARAMS__;
  const define = (obj, key, value) => {
    try { Object.defineProperty(obj, key, { get: () => value, configurable: true }); } catch (e) {}
  };

  define(Navigator.prototype, 'webdriver', undefined);
  define(Navigator.prototype, 'languages', Object.freeze(p.languages.slice()));
  define(Navigator.prototype, 'language', p.languages[0]);
  define(Navigator.prototype, 'platform', p.platform);
  define(Navigator.prototype, 'hardwareConcurrency', p.hardwareConcurrency);

  define(Screen.prototype, 'width', p.screenWidth);
  define(Screen.prototype, 'height', p.screenHeight);
  define(Screen.prototype, 'availWidth', p.screenWidth);
  define(Screen.prototype, 'availHeight', p.availHeight);

  if (!window.chrome) { window.chrome = {}; }
  if (!window.chrome.runtime) { window.chrome.runtime = {}; }

  if (navigator.permissions && navigator.permissions.query) {
    const originalQuery = navigator.permissions.query.bind(navigator.permissions);
    navigator.permissions.query = (params) =>
      params && params.name === 'notifications'
        ? Promise.resolve({ state: Notification.permission, onchange: null })
        : originalQuery(params);
  }

  const patchWebGl = (proto) => {
    if (!proto || !p.webglVendor) { return; }
    const getParameter = proto.getParameter;
    proto.getParameter = function (param) {
      if (param === 37445) { return p.webglVendor; }
      if (param === 37446) { return p.webglRenderer; }
      return getParameter.call(this, param);
    };
  };
  patchWebGl(window.WebGLRenderingContext && WebGLRenderingContext.prototype);
  patchWebGl(window.WebGL2RenderingContext && WebGL2RenderingContext.prototype);

  if (p.canvasNoise && window.CanvasRenderingContext2D) {
    const fillText = CanvasRenderingContext2D.prototype.fillText;
    CanvasRenderingContext2D.prototype.fillText = function (text, x, y, maxWidth) {
      const dx = (Math.random() - 0.5) * 0.1;
      const dy = (Math.random() - 0.5) * 0.1;
      return maxWidth === undefined
        ? fillText.call(this, text, x + dx, y + dy)
        : fillText.call(this, text, x + dx, y + dy, maxWidth);
    };
  }
})();"#;
