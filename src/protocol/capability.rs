//! Terminal capability announcement payload.
//!
//! Sent by the client once after the handshake completes and again whenever
//! the local terminal is resized. Fixed-size record; field order and widths
//! are part of the wire contract shared with the browser client.

use crate::core::FramingError;

/// Wire size of an encoded capability record.
pub const CAPABILITY_WIRE_SIZE: usize = 156;

const TERM_TYPE_LEN: usize = 32;
const COLORTERM_LEN: usize = 32;
const PALETTE_LEN: usize = 64;

/// Capability bit: client can send video.
pub const CAP_VIDEO: u32 = 0x01;
/// Capability bit: client can send audio.
pub const CAP_AUDIO: u32 = 0x02;
/// Capability bit: terminal supports color output.
pub const CAP_COLOR: u32 = 0x04;
/// Capability bit: client wants frames stretched to fill the terminal.
pub const CAP_STRETCH: u32 = 0x08;

/// Terminal capability record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalCapability {
    /// Bitmask of `CAP_*` flags.
    pub capabilities: u32,
    /// Detected color level (none/16/256/truecolor enum value).
    pub color_level: u32,
    /// Actual color count (16, 256, 16777216).
    pub color_count: u32,
    /// Render mode (foreground/background/half-block enum value).
    pub render_mode: u32,
    /// Terminal width in characters.
    pub width: u16,
    /// Terminal height in characters.
    pub height: u16,
    /// `$TERM` value, for diagnostics.
    pub term_type: String,
    /// `$COLORTERM` value, for diagnostics.
    pub colorterm: String,
    /// True if the capability auto-detection methods were reliable.
    pub detection_reliable: bool,
    /// True if the terminal renders UTF-8.
    pub utf8_support: bool,
    /// Palette selector (0 = standard, 1 = custom).
    pub palette_type: u8,
    /// Custom palette characters when `palette_type` selects custom.
    pub palette_custom: String,
    /// Desired frame rate, 1-144.
    pub desired_fps: u8,
    /// Optional color filter selector (0 = none).
    pub color_filter: u8,
    /// True if the client wants frames padded rather than cropped.
    pub want_padding: bool,
}

impl TerminalCapability {
    /// A plain 80x24 monochrome capability, useful as a starting point.
    pub fn basic(width: u16, height: u16) -> Self {
        Self {
            capabilities: CAP_VIDEO,
            color_level: 0,
            color_count: 0,
            render_mode: 0,
            width,
            height,
            term_type: String::new(),
            colorterm: String::new(),
            detection_reliable: false,
            utf8_support: true,
            palette_type: 0,
            palette_custom: String::new(),
            desired_fps: 30,
            color_filter: 0,
            want_padding: false,
        }
    }

    /// Encode to the fixed wire layout.
    pub fn encode(&self) -> Result<Vec<u8>, FramingError> {
        let mut buf = Vec::with_capacity(CAPABILITY_WIRE_SIZE);
        buf.extend_from_slice(&self.capabilities.to_be_bytes());
        buf.extend_from_slice(&self.color_level.to_be_bytes());
        buf.extend_from_slice(&self.color_count.to_be_bytes());
        buf.extend_from_slice(&self.render_mode.to_be_bytes());
        buf.extend_from_slice(&self.width.to_be_bytes());
        buf.extend_from_slice(&self.height.to_be_bytes());
        push_fixed_str(&mut buf, &self.term_type, TERM_TYPE_LEN, "term_type")?;
        push_fixed_str(&mut buf, &self.colorterm, COLORTERM_LEN, "colorterm")?;
        buf.push(self.detection_reliable as u8);
        buf.push(self.utf8_support as u8);
        buf.push(self.palette_type);
        push_fixed_str(&mut buf, &self.palette_custom, PALETTE_LEN, "palette_custom")?;
        buf.push(self.desired_fps);
        buf.push(self.color_filter);
        buf.push(self.want_padding as u8);
        buf.push(0); // reserved
        buf.push(0); // reserved
        debug_assert_eq!(buf.len(), CAPABILITY_WIRE_SIZE);
        Ok(buf)
    }

    /// Decode from the fixed wire layout.
    pub fn decode(bytes: &[u8]) -> Result<Self, FramingError> {
        if bytes.len() < CAPABILITY_WIRE_SIZE {
            return Err(FramingError::MalformedPayload(format!(
                "capability record too short: {} bytes",
                bytes.len()
            )));
        }

        let mut at = 0usize;
        let mut take_u32 = |bytes: &[u8]| {
            let v = u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
            at += 4;
            v
        };
        let capabilities = take_u32(bytes);
        let color_level = take_u32(bytes);
        let color_count = take_u32(bytes);
        let render_mode = take_u32(bytes);

        let width = u16::from_be_bytes([bytes[16], bytes[17]]);
        let height = u16::from_be_bytes([bytes[18], bytes[19]]);

        let term_type = fixed_str(&bytes[20..20 + TERM_TYPE_LEN]);
        let colorterm = fixed_str(&bytes[52..52 + COLORTERM_LEN]);

        let detection_reliable = bytes[84] != 0;
        let utf8_support = bytes[85] != 0;
        let palette_type = bytes[86];
        let palette_custom = fixed_str(&bytes[87..87 + PALETTE_LEN]);
        let desired_fps = bytes[151];
        let color_filter = bytes[152];
        let want_padding = bytes[153] != 0;

        Ok(Self {
            capabilities,
            color_level,
            color_count,
            render_mode,
            width,
            height,
            term_type,
            colorterm,
            detection_reliable,
            utf8_support,
            palette_type,
            palette_custom,
            desired_fps,
            color_filter,
            want_padding,
        })
    }
}

fn push_fixed_str(
    buf: &mut Vec<u8>,
    value: &str,
    len: usize,
    field: &str,
) -> Result<(), FramingError> {
    let raw = value.as_bytes();
    if raw.len() > len {
        return Err(FramingError::MalformedPayload(format!(
            "{field} exceeds {len} bytes"
        )));
    }
    buf.extend_from_slice(raw);
    buf.extend(std::iter::repeat(0u8).take(len - raw.len()));
    Ok(())
}

fn fixed_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TerminalCapability {
        TerminalCapability {
            capabilities: CAP_VIDEO | CAP_AUDIO | CAP_COLOR,
            color_level: 3,
            color_count: 16_777_216,
            render_mode: 2,
            width: 120,
            height: 40,
            term_type: "xterm-256color".into(),
            colorterm: "truecolor".into(),
            detection_reliable: true,
            utf8_support: true,
            palette_type: 1,
            palette_custom: " .:-=+*#%@".into(),
            desired_fps: 60,
            color_filter: 0,
            want_padding: true,
        }
    }

    #[test]
    fn test_wire_size() {
        assert_eq!(sample().encode().unwrap().len(), CAPABILITY_WIRE_SIZE);
    }

    #[test]
    fn test_roundtrip() {
        let cap = sample();
        let wire = cap.encode().unwrap();
        let decoded = TerminalCapability::decode(&wire).unwrap();
        assert_eq!(decoded, cap);
    }

    #[test]
    fn test_roundtrip_basic() {
        let cap = TerminalCapability::basic(80, 24);
        let decoded = TerminalCapability::decode(&cap.encode().unwrap()).unwrap();
        assert_eq!(decoded.width, 80);
        assert_eq!(decoded.height, 24);
        assert_eq!(decoded, cap);
    }

    #[test]
    fn test_too_short_rejected() {
        let wire = sample().encode().unwrap();
        assert!(TerminalCapability::decode(&wire[..CAPABILITY_WIRE_SIZE - 1]).is_err());
    }

    #[test]
    fn test_oversized_string_rejected() {
        let mut cap = sample();
        cap.term_type = "x".repeat(33);
        assert!(cap.encode().is_err());
    }
}
