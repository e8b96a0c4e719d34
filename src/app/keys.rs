use std::time::{Duration, Instant};

/// Window within which a second press of the same key counts as a double press.
pub const DOUBLE_PRESS_DELAY: Duration = Duration::from_millis(300);

/// A key-down event as delivered by the surface shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPress {
    /// Key name as reported by the platform, e.g. `"Enter"`, `"d"`, `"3"`.
    pub key: String,
    pub ctrl: bool,
    pub meta: bool,
}

impl KeyPress {
    pub fn plain(key: &str) -> Self {
        KeyPress {
            key: key.to_string(),
            ctrl: false,
            meta: false,
        }
    }

    pub fn ctrl(key: &str) -> Self {
        KeyPress {
            ctrl: true,
            ..Self::plain(key)
        }
    }

    pub fn meta(key: &str) -> Self {
        KeyPress {
            meta: true,
            ..Self::plain(key)
        }
    }
}

/// Enter, or Ctrl/Cmd+D (the browser's own bookmark shortcut) closes the popup.
pub fn is_close_shortcut(press: &KeyPress) -> bool {
    if press.key == "Enter" {
        return true;
    }
    (press.ctrl || press.meta) && press.key.eq_ignore_ascii_case("d")
}

/// Detects two presses of the same watched key within [`DOUBLE_PRESS_DELAY`].
#[derive(Debug, Clone)]
pub struct DoublePressDetector {
    keys: Vec<String>,
    delay: Duration,
    last: Option<(String, Instant)>,
}

impl DoublePressDetector {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_delay(keys, DOUBLE_PRESS_DELAY)
    }

    pub fn with_delay<I, S>(keys: I, delay: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DoublePressDetector {
            keys: keys
                .into_iter()
                .map(|k| k.into().to_lowercase())
                .collect(),
            delay,
            last: None,
        }
    }

    /// Feed one key-down. Returns the key on the second press of a double
    /// press. Any key outside the watched set resets the detector.
    pub fn press(&mut self, key: &str, at: Instant) -> Option<String> {
        let key = key.to_lowercase();
        if !self.keys.contains(&key) {
            self.last = None;
            return None;
        }

        match self.last.take() {
            Some((last_key, last_at))
                if last_key == key && at.saturating_duration_since(last_at) < self.delay =>
            {
                Some(key)
            }
            _ => {
                self.last = Some((key, at));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digits() -> DoublePressDetector {
        DoublePressDetector::new(["1", "2", "3"])
    }

    #[test]
    fn close_shortcuts() {
        assert!(is_close_shortcut(&KeyPress::plain("Enter")));
        assert!(is_close_shortcut(&KeyPress::ctrl("d")));
        assert!(is_close_shortcut(&KeyPress::meta("D")));
        assert!(!is_close_shortcut(&KeyPress::plain("d")));
        assert!(!is_close_shortcut(&KeyPress::ctrl("s")));
    }

    #[test]
    fn same_key_within_delay_fires_once() {
        let mut detector = digits();
        let t0 = Instant::now();
        assert_eq!(detector.press("2", t0), None);
        assert_eq!(
            detector.press("2", t0 + Duration::from_millis(120)),
            Some("2".to_string())
        );
        // A third press starts a new sequence.
        assert_eq!(detector.press("2", t0 + Duration::from_millis(200)), None);
    }

    #[test]
    fn slow_second_press_does_not_fire() {
        let mut detector = digits();
        let t0 = Instant::now();
        assert_eq!(detector.press("1", t0), None);
        assert_eq!(detector.press("1", t0 + Duration::from_millis(300)), None);
        assert_eq!(
            detector.press("1", t0 + Duration::from_millis(400)),
            Some("1".to_string())
        );
    }

    #[test]
    fn other_key_resets() {
        let mut detector = digits();
        let t0 = Instant::now();
        detector.press("3", t0);
        detector.press("x", t0 + Duration::from_millis(10));
        assert_eq!(detector.press("3", t0 + Duration::from_millis(20)), None);

        detector.press("1", t0 + Duration::from_millis(500));
        assert_eq!(detector.press("2", t0 + Duration::from_millis(510)), None);
    }
}
