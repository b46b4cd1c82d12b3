use ratatui::layout::Rect;
use ratatui::style::Color;
use ratatui::Frame;
use std::time::{Duration, Instant};
use tachyonfx::{fx, Effect, EffectRenderer, Interpolation, Motion};

/// Duration for animations in milliseconds
const EFFECT_DURATION_MS: u32 = 300;

/// Delay between each panel's animation in milliseconds
const STAGGER_DELAY_MS: u32 = 60;

/// Redraw interval while an animation runs
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Background color for slide animation
const SLIDE_BG: Color = Color::from_u32(0x1D2021);

/// Slides panels in when a page is first shown.
pub struct EffectsManager {
    effects: Vec<(Effect, Rect)>,
    last_frame: Instant,
    shown_page: Option<usize>,
}

impl EffectsManager {
    pub fn new() -> Self {
        Self {
            effects: Vec::new(),
            last_frame: Instant::now(),
            shown_page: None,
        }
    }

    fn slide(area: Rect, delay_ms: u32) -> Effect {
        let timer = (EFFECT_DURATION_MS, Interpolation::Linear);
        let slide = fx::slide_in(Motion::UpToDown, 10, 0, SLIDE_BG, timer).with_area(area);

        if delay_ms > 0 {
            fx::sequence(&[fx::sleep(delay_ms), slide])
        } else {
            slide
        }
    }

    /// Start a staggered slide over `panels` whenever the visible page
    /// differs from the one drawn last.
    pub fn on_page(&mut self, page: usize, panels: &[Rect]) {
        if self.shown_page == Some(page) {
            return;
        }
        self.shown_page = Some(page);
        self.effects.clear();

        let mut delay = 0;
        for area in panels.iter().filter(|a| !a.is_empty()) {
            self.effects.push((Self::slide(*area, delay), *area));
            delay += STAGGER_DELAY_MS;
        }
        self.last_frame = Instant::now();
    }

    /// Process and render all active effects on the frame
    pub fn process(&mut self, frame: &mut Frame) {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.last_frame).as_millis() as u32;
        self.last_frame = now;
        let elapsed = tachyonfx::Duration::from_millis(elapsed_ms);

        self.effects.retain_mut(|(effect, area)| {
            frame.render_effect(effect, *area, elapsed);
            effect.running()
        });
    }

    pub fn has_active_effects(&self) -> bool {
        !self.effects.is_empty()
    }
}

impl Default for EffectsManager {
    fn default() -> Self {
        Self::new()
    }
}
