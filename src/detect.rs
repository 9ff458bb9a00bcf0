//! Line framing and chat-command detection for the child's output stream
//!
//! The child prints chat as `<username> message`. A chat message whose text
//! starts with `/` is treated as a command and handed back to the child.
//! Console prompts echo typed input behind a leading `:`, which is removed
//! before matching.

/// A chat line that carries a slash command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedCommand {
    pub username: String,
    pub text: String,
}

impl DetectedCommand {
    pub fn new(username: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            text: text.into(),
        }
    }

    /// Whether this command asks the supervisor to shut down
    pub fn is_sentinel(&self, sentinel: &str) -> bool {
        self.text.starts_with(sentinel)
    }
}

/// Trim a completed line and drop a leading input-prompt prefix (`: `)
pub fn sterilize(line: &str) -> &str {
    let line = line.trim();
    match line.strip_prefix(':') {
        Some(rest) => rest.trim(),
        None => line,
    }
}

/// Parse `<username> /command` out of a sterilized line
///
/// The last `> ` marker ends the username so names containing `>` survive.
pub fn extract(line: &str) -> Option<DetectedCommand> {
    if !line.starts_with('<') {
        return None;
    }
    let close = line.rfind("> ")?;
    let username = &line[1..close];
    let text = line[close + 1..].trim();

    if text.starts_with('/') {
        Some(DetectedCommand::new(username, text))
    } else {
        None
    }
}

/// Inspect a completed output line for a chat command
pub fn detect(line: &str) -> Option<DetectedCommand> {
    // Most server log lines never contain '<'
    if !line.contains('<') {
        return None;
    }
    extract(sterilize(line))
}

/// Accumulates output bytes into lines terminated by an exact separator token
///
/// Also tracks whether the current partial line contains the backup marker,
/// which the output relay uses to slow itself down for the rest of that line.
#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    separator: Vec<u8>,
    marker: Vec<u8>,
    throttled: bool,
}

impl LineFramer {
    pub fn new(separator: &str, marker: &str) -> Self {
        Self {
            buf: Vec::with_capacity(256),
            separator: separator.as_bytes().to_vec(),
            marker: marker.as_bytes().to_vec(),
            throttled: false,
        }
    }

    /// Feed one byte; returns the completed line (separator removed) when the
    /// buffer now ends with the separator
    pub fn push(&mut self, byte: u8) -> Option<String> {
        self.buf.push(byte);

        if !self.separator.is_empty() && self.buf.ends_with(&self.separator) {
            let end = self.buf.len() - self.separator.len();
            let line = String::from_utf8_lossy(&self.buf[..end]).into_owned();
            self.buf.clear();
            self.throttled = false;
            return Some(line);
        }

        if !self.throttled && !self.marker.is_empty() && self.buf.len() >= self.marker.len() {
            let tail = &self.buf[self.buf.len() - self.marker.len()..];
            self.throttled = tail.eq_ignore_ascii_case(&self.marker);
        }

        None
    }

    /// Whether the current partial line contains the backup marker
    pub fn is_throttled(&self) -> bool {
        self.throttled
    }

    /// Take whatever is left when the stream ends without a final separator
    pub fn take_partial(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        self.throttled = false;
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_all(framer: &mut LineFramer, input: &[u8]) -> Vec<String> {
        input.iter().filter_map(|b| framer.push(*b)).collect()
    }

    #[test]
    fn test_lines_without_angle_bracket_are_ignored() {
        for line in [
            "Server started",
            "/say this looks like a command",
            ": /exit",
            "alice> /give all",
            "",
        ] {
            assert_eq!(detect(line), None, "line {line:?} should not match");
        }
    }

    #[test]
    fn test_extract_simple_command() {
        let cmd = detect("<alice> /say hi").expect("should detect command");
        assert_eq!(cmd, DetectedCommand::new("alice", "/say hi"));
    }

    #[test]
    fn test_extract_uses_last_marker() {
        let cmd = detect("<a>b> /cmd").expect("should detect command");
        assert_eq!(cmd.username, "a>b");
        assert_eq!(cmd.text, "/cmd");

        let cmd = detect("<x> y> /kick z").expect("should detect command");
        assert_eq!(cmd.username, "x> y");
        assert_eq!(cmd.text, "/kick z");
    }

    #[test]
    fn test_ordinary_chat_is_not_a_command() {
        assert_eq!(detect("<bob> hello"), None);
        assert_eq!(detect("<bob> hello /not-first"), None);
    }

    #[test]
    fn test_extract_requires_leading_bracket_and_marker() {
        assert_eq!(extract("x <bob> /cmd"), None);
        assert_eq!(extract("<bob>/cmd"), None);
        assert_eq!(extract("<bob>"), None);
    }

    #[test]
    fn test_sterilize() {
        assert_eq!(sterilize(": some text"), "some text");
        assert_eq!(sterilize("plain text"), "plain text");
        assert_eq!(sterilize("  padded \r"), "padded");
        assert_eq!(sterilize("  :  <root> /stop  "), "<root> /stop");
        // only the first ':' is removed
        assert_eq!(sterilize(":: twice"), ": twice");
    }

    #[test]
    fn test_detect_through_prompt_prefix() {
        let cmd = detect(": <root> /stop").expect("should detect through prompt");
        assert_eq!(cmd, DetectedCommand::new("root", "/stop"));
    }

    #[test]
    fn test_sentinel_is_prefix_match() {
        let sentinel = "/exit";
        assert!(DetectedCommand::new("op", "/exit").is_sentinel(sentinel));
        assert!(DetectedCommand::new("op", "/exit now").is_sentinel(sentinel));
        assert!(DetectedCommand::new("op", "/exitnow").is_sentinel(sentinel));
        assert!(!DetectedCommand::new("op", "/say /exit").is_sentinel(sentinel));
    }

    #[test]
    fn test_framer_splits_on_crlf_only() {
        let mut framer = LineFramer::new("\r\n", "");
        let lines = frame_all(&mut framer, b"one\r\ntwo\nstill two\r\nthree");
        assert_eq!(lines, vec!["one", "two\nstill two"]);
        assert_eq!(framer.take_partial().as_deref(), Some("three"));
        assert_eq!(framer.take_partial(), None);
    }

    #[test]
    fn test_framer_splits_on_lf() {
        let mut framer = LineFramer::new("\n", "");
        let lines = frame_all(&mut framer, b": <root> /stop\r\nnext\n");
        assert_eq!(lines, vec![": <root> /stop\r", "next"]);
        assert_eq!(detect(&lines[0]), Some(DetectedCommand::new("root", "/stop")));
    }

    #[test]
    fn test_framer_throttles_rest_of_line_after_marker() {
        let mut framer = LineFramer::new("\n", "BACKING UP WORLD FILE");

        frame_all(&mut framer, b"Backing up world ");
        assert!(!framer.is_throttled());

        frame_all(&mut framer, b"file");
        assert!(framer.is_throttled(), "marker match is case-insensitive");

        frame_all(&mut framer, b"...");
        assert!(framer.is_throttled());

        assert!(framer.push(b'\n').is_some());
        assert!(!framer.is_throttled(), "throttle resets with the line");
    }

    #[test]
    fn test_framer_handles_invalid_utf8() {
        let mut framer = LineFramer::new("\n", "");
        let lines = frame_all(&mut framer, b"<b\xffob> /x\n");
        assert_eq!(lines.len(), 1);
        let cmd = detect(&lines[0]).expect("lossy decoding keeps the command");
        assert_eq!(cmd.text, "/x");
    }
}
