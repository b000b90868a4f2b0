use crate::card::RenderedCard;
use crate::window::LogicalSize;

/// Everything the card needs from the native side.
///
/// Implementations own the window, the audio device and the browser; the card
/// only ever asks. None of the calls report failure back: a clip that does
/// not load or a browser that does not open is the host's to log.
pub trait Host {
    /// Size of the card once laid out by the host's renderer.
    fn measure(&mut self, card: &RenderedCard) -> LogicalSize;

    fn resize(&mut self, size: LogicalSize);

    /// Starts playback and returns immediately.
    fn play_audio(&mut self, url: &str);

    fn open_url(&mut self, url: &str);

    /// Called only under [`ErrorPolicy::Surface`](crate::ErrorPolicy::Surface).
    fn report_error(&mut self, _message: &str) {}
}

impl<H: Host + ?Sized> Host for Box<H> {
    fn measure(&mut self, card: &RenderedCard) -> LogicalSize {
        (**self).measure(card)
    }

    fn resize(&mut self, size: LogicalSize) {
        (**self).resize(size)
    }

    fn play_audio(&mut self, url: &str) {
        (**self).play_audio(url)
    }

    fn open_url(&mut self, url: &str) {
        (**self).open_url(url)
    }

    fn report_error(&mut self, message: &str) {
        (**self).report_error(message)
    }
}

/// Host that records every request, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingHost {
    /// Height reported by `measure`; the width is fixed at 320.
    pub content_height: f64,
    pub resizes: Vec<LogicalSize>,
    pub played: Vec<String>,
    pub opened: Vec<String>,
    pub errors: Vec<String>,
}

#[cfg(test)]
impl RecordingHost {
    pub fn with_content_height(content_height: f64) -> Self {
        Self {
            content_height,
            ..Self::default()
        }
    }
}

#[cfg(test)]
impl Host for RecordingHost {
    fn measure(&mut self, _card: &RenderedCard) -> LogicalSize {
        LogicalSize::new(320.0, self.content_height)
    }

    fn resize(&mut self, size: LogicalSize) {
        self.resizes.push(size);
    }

    fn play_audio(&mut self, url: &str) {
        self.played.push(url.to_string());
    }

    fn open_url(&mut self, url: &str) {
        self.opened.push(url.to_string());
    }

    fn report_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }
}
