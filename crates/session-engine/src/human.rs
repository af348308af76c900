//! Human-paced input built from page primitives and a [`Tempo`].

use std::time::Duration;

use cdp_adapter::{AdapterError, Anchor, Cdp, KeyPress};
use stealth::Tempo;
use tokio::time::sleep;

/// Where wheel events are dispatched: the middle of the default viewport.
const SCROLL_ORIGIN: (f64, f64) = (640.0, 450.0);

pub struct Human<'a> {
    cdp: &'a dyn Cdp,
    tempo: &'a Tempo,
}

impl<'a> Human<'a> {
    pub fn new(cdp: &'a dyn Cdp, tempo: &'a Tempo) -> Self {
        Self { cdp, tempo }
    }

    pub async fn pause(&self) {
        sleep(self.tempo.action_delay()).await;
    }

    pub async fn short_pause(&self) {
        sleep(self.tempo.short_delay()).await;
    }

    pub async fn pause_between(&self, min_ms: u64, max_ms: u64) {
        sleep(
            self.tempo
                .between(Duration::from_millis(min_ms), Duration::from_millis(max_ms)),
        )
        .await;
    }

    /// Scrolls the element into view, glides the pointer along a curved path
    /// to a point inside it and clicks with a short press.
    pub async fn click(&self, selector: &str, anchor: &Anchor) -> Result<(), AdapterError> {
        let rect = self
            .cdp
            .scroll_into_view(selector, anchor.index)
            .await?
            .filter(|rect| !rect.is_empty())
            .unwrap_or(anchor.rect);

        let target = self.tempo.click_point(&rect);
        for (x, y) in self.tempo.mouse_path(target) {
            self.cdp.mouse_move(x, y).await?;
        }
        self.pause_between(50, 180).await;
        self.cdp
            .mouse_click(target.0, target.1, self.tempo.press_hold())
            .await
    }

    /// Clicks the field, then enters `text` one character at a time.
    pub async fn type_into(
        &self,
        selector: &str,
        anchor: &Anchor,
        text: &str,
    ) -> Result<(), AdapterError> {
        self.click(selector, anchor).await?;
        self.pause_between(200, 500).await;
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            self.cdp.insert_text(ch.encode_utf8(&mut buf)).await?;
            sleep(self.tempo.key_delay()).await;
        }
        Ok(())
    }

    pub async fn press(&self, key: KeyPress) -> Result<(), AdapterError> {
        self.cdp.press_key(key).await
    }

    /// Scroll down a little, linger, drift back up.
    pub async fn scroll(&self) -> Result<(), AdapterError> {
        let plan = self.tempo.scroll_plan();
        let (x, y) = SCROLL_ORIGIN;
        self.cdp.mouse_wheel(x, y, plan.down_px).await?;
        sleep(plan.pause).await;
        self.cdp.mouse_wheel(x, y, -plan.up_px).await?;
        self.pause_between(200, 500).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePage;
    use stealth::config::TempoPlan;

    #[tokio::test(start_paused = true)]
    async fn click_lands_inside_the_element() {
        let page = FakePage::new();
        page.put("#buy", vec![FakePage::anchor(0, "Add to cart")]);
        let tempo = Tempo::new(TempoPlan {
            seed: Some(1),
            ..TempoPlan::default()
        });
        let human = Human::new(&page, &tempo);
        human
            .click("#buy", &FakePage::anchor(0, "Add to cart"))
            .await
            .unwrap();

        let click = page
            .events()
            .into_iter()
            .find(|e| e.starts_with("click:"))
            .unwrap();
        let coords: Vec<f64> = click["click:".len()..]
            .split(',')
            .map(|v| v.parse().unwrap())
            .collect();
        assert!((130.0..=190.0).contains(&coords[0]));
        assert!((108.0..=124.0).contains(&coords[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn typing_sends_each_character() {
        let page = FakePage::new();
        let tempo = Tempo::new(TempoPlan::instant());
        let human = Human::new(&page, &tempo);
        human
            .type_into("#postal", &FakePage::anchor(0, ""), "M5V")
            .await
            .unwrap();
        let typed: Vec<_> = page
            .events()
            .into_iter()
            .filter(|e| e.starts_with("text:"))
            .collect();
        assert_eq!(typed, vec!["text:M", "text:5", "text:V"]);
    }

    #[tokio::test(start_paused = true)]
    async fn scroll_goes_down_then_partly_back() {
        let page = FakePage::new();
        let tempo = Tempo::new(TempoPlan::default());
        Human::new(&page, &tempo).scroll().await.unwrap();
        let wheels: Vec<f64> = page
            .events()
            .iter()
            .filter_map(|e| e.strip_prefix("wheel:"))
            .map(|v| v.parse().unwrap())
            .collect();
        assert_eq!(wheels.len(), 2);
        assert!(wheels[0] > 0.0 && wheels[1] < 0.0 && wheels[0] > -wheels[1]);
    }
}
