//! Parsing and building the `#switcher=<value>` fragment.

/// Fragment parameter carrying the transfer token.
pub const SWITCHER_PARAM: &str = "switcher";

/// What the URL fragment says about a handoff in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffMarker<'a> {
    /// No handoff requested
    Absent,
    /// `#switcher` without a value
    Bare,
    /// `#switcher=<value>`
    Token(&'a str),
}

impl<'a> HandoffMarker<'a> {
    /// Parse a fragment, with or without the leading `#`.
    /// The first `switcher` parameter wins.
    pub fn parse(fragment: &'a str) -> Self {
        let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
        for segment in fragment.split('&') {
            match segment.split_once('=') {
                Some((key, value)) if key == SWITCHER_PARAM => {
                    return if value.is_empty() {
                        HandoffMarker::Bare
                    } else {
                        HandoffMarker::Token(value)
                    };
                }
                None if segment == SWITCHER_PARAM => return HandoffMarker::Bare,
                _ => {}
            }
        }
        HandoffMarker::Absent
    }

    pub fn is_present(&self) -> bool {
        !matches!(self, HandoffMarker::Absent)
    }

    pub fn token(&self) -> Option<&'a str> {
        match self {
            HandoffMarker::Token(value) => Some(value),
            _ => None,
        }
    }
}

/// Fragment (without `#`) carrying `value`.
pub fn switcher_fragment(value: &str) -> String {
    format!("{}={}", SWITCHER_PARAM, value)
}

/// Accepts either a full URL or a bare fragment and returns the fragment part.
pub fn fragment_of(url_or_fragment: &str) -> &str {
    match url_or_fragment.split_once('#') {
        Some((_, fragment)) => fragment,
        None => url_or_fragment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token() {
        assert_eq!(HandoffMarker::parse("#switcher=abc-1"), HandoffMarker::Token("abc-1"));
        assert_eq!(HandoffMarker::parse("switcher=abc-1"), HandoffMarker::Token("abc-1"));
        assert_eq!(
            HandoffMarker::parse("#state=x&switcher=abc&other=1"),
            HandoffMarker::Token("abc")
        );
    }

    #[test]
    fn test_parse_bare_marker() {
        assert_eq!(HandoffMarker::parse("#switcher"), HandoffMarker::Bare);
        assert_eq!(HandoffMarker::parse("#switcher="), HandoffMarker::Bare);
        assert!(HandoffMarker::Bare.is_present());
        assert_eq!(HandoffMarker::Bare.token(), None);
    }

    #[test]
    fn test_parse_absent() {
        assert_eq!(HandoffMarker::parse(""), HandoffMarker::Absent);
        assert_eq!(HandoffMarker::parse("#"), HandoffMarker::Absent);
        assert_eq!(HandoffMarker::parse("#section-2"), HandoffMarker::Absent);
        assert_eq!(HandoffMarker::parse("#switchers=abc"), HandoffMarker::Absent);
        assert!(!HandoffMarker::Absent.is_present());
    }

    #[test]
    fn test_fragment_of_url() {
        assert_eq!(
            fragment_of("http://eservice.localhost/cpds/#switcher=abc"),
            "switcher=abc"
        );
        assert_eq!(fragment_of("#switcher=abc"), "switcher=abc");
        assert_eq!(fragment_of("switcher=abc"), "switcher=abc");
        assert_eq!(switcher_fragment("abc"), "switcher=abc");
    }
}
