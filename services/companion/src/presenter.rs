//! Terminal rendition of the chat bubbles.

use std::io::{self, Write};
use std::time::Duration;

use companion_core::Bubble;

#[derive(Debug, Clone, PartialEq)]
struct Shown {
    text: String,
    hide_at: Option<Duration>,
}

/// Prints bubbles as they appear and tracks when each one expires. Times
/// are on the avatar's frame clock.
pub struct Presenter<W> {
    out: W,
    thinking: Option<Shown>,
    text: Option<Shown>,
}

impl<W: Write> Presenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            thinking: None,
            text: None,
        }
    }

    fn slot(&mut self, bubble: Bubble) -> &mut Option<Shown> {
        match bubble {
            Bubble::Thinking => &mut self.thinking,
            Bubble::Text => &mut self.text,
        }
    }

    /// Shows `bubble`, replacing whatever it displayed before.
    pub fn show(
        &mut self,
        bubble: Bubble,
        text: &str,
        duration: Option<Duration>,
        now: Duration,
    ) -> io::Result<()> {
        *self.slot(bubble) = Some(Shown {
            text: text.to_string(),
            hide_at: duration.map(|d| now + d),
        });
        match bubble {
            Bubble::Thinking => writeln!(self.out, "  ... {text}")?,
            Bubble::Text => writeln!(self.out, "  > {text}")?,
        }
        self.out.flush()
    }

    pub fn hide(&mut self, bubble: Bubble) {
        *self.slot(bubble) = None;
    }

    /// Hides every bubble whose timeout has passed.
    pub fn tick(&mut self, now: Duration) {
        for bubble in [Bubble::Thinking, Bubble::Text] {
            let slot = self.slot(bubble);
            if slot
                .as_ref()
                .and_then(|shown| shown.hide_at)
                .is_some_and(|at| at <= now)
            {
                *slot = None;
            }
        }
    }

    pub fn visible(&self, bubble: Bubble) -> Option<&str> {
        match bubble {
            Bubble::Thinking => self.thinking.as_ref(),
            Bubble::Text => self.text.as_ref(),
        }
        .map(|shown| shown.text.as_str())
    }

    #[cfg(test)]
    fn output(&self) -> &W {
        &self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_bubble_expires() {
        let mut presenter = Presenter::new(Vec::new());

        presenter
            .show(Bubble::Text, "Hello!", Some(Duration::from_secs(4)), Duration::from_secs(1))
            .unwrap();
        presenter.tick(Duration::from_millis(4_999));
        assert_eq!(presenter.visible(Bubble::Text), Some("Hello!"));

        presenter.tick(Duration::from_secs(5));
        assert_eq!(presenter.visible(Bubble::Text), None);
    }

    #[test]
    fn untimed_bubble_stays_until_hidden() {
        let mut presenter = Presenter::new(Vec::new());

        presenter
            .show(Bubble::Thinking, "Thinking...", None, Duration::ZERO)
            .unwrap();
        presenter.tick(Duration::from_secs(600));
        assert_eq!(presenter.visible(Bubble::Thinking), Some("Thinking..."));

        presenter.hide(Bubble::Thinking);
        assert_eq!(presenter.visible(Bubble::Thinking), None);
        assert_eq!(
            String::from_utf8(presenter.output().clone()).unwrap(),
            "  ... Thinking...\n"
        );
    }

    #[test]
    fn newer_text_replaces_the_older_timeout() {
        let mut presenter = Presenter::new(Vec::new());

        presenter
            .show(Bubble::Text, "first", Some(Duration::from_secs(1)), Duration::ZERO)
            .unwrap();
        presenter
            .show(Bubble::Text, "second", Some(Duration::from_secs(10)), Duration::ZERO)
            .unwrap();
        presenter.tick(Duration::from_secs(2));

        assert_eq!(presenter.visible(Bubble::Text), Some("second"));
    }
}
