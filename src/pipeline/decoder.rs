use chrono::{DateTime, Local};

use crate::error::DecodeError;
use crate::types::{Channel, Sample};

/// Why a whole frame was thrown away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    TooFewFields,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedFrame {
    pub reason: RejectReason,
    /// Decoded, trimmed text of the frame.
    pub text: String,
    pub error: DecodeError,
}

/// A frame that produced a sample, possibly with some fields missing.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub text: String,
    pub sample: Sample,
    pub field_errors: Vec<DecodeError>,
}

/// Turns `"acc,vel[,...]"` text frames into samples.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    delimiter: char,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(',')
    }
}

impl FrameDecoder {
    pub fn new(delimiter: char) -> Self {
        Self { delimiter }
    }

    pub fn decode(&self, raw: &[u8]) -> Result<DecodedFrame, RejectedFrame> {
        self.decode_at(raw, Local::now())
    }

    pub fn decode_at(&self, raw: &[u8], observed_at: DateTime<Local>) -> Result<DecodedFrame, RejectedFrame> {
        // 非法UTF-8序列替换为U+FFFD，不会失败
        let text = String::from_utf8_lossy(raw).trim_matches(is_padding).to_string();

        let fields: Vec<&str> = text.split(self.delimiter).collect();
        if fields.len() < 2 {
            let error = DecodeError::TooFewFields { found: fields.len() };
            return Err(RejectedFrame {
                reason: RejectReason::TooFewFields,
                text,
                error,
            });
        }

        let mut field_errors = Vec::new();
        let mut parse = |channel: Channel| {
            let raw_field = fields[channel.index()];
            let value = parse_field(raw_field);
            if value.is_none() {
                field_errors.push(DecodeError::InvalidNumber {
                    channel,
                    raw: raw_field.to_string(),
                });
            }
            value
        };

        let acceleration = parse(Channel::Acceleration);
        let velocity = parse(Channel::Velocity);

        Ok(DecodedFrame {
            sample: Sample::new(acceleration, velocity, observed_at),
            text,
            field_errors,
        })
    }
}

/// Whitespace and the NUL terminator some firmwares append.
fn is_padding(c: char) -> bool {
    c.is_whitespace() || c == '\0'
}

/// Reads the leading number of the field and ignores any trailing unit
/// text, so `"1.5g"` is 1.5. `NaN` and infinities count as missing.
fn parse_field(field: &str) -> Option<f64> {
    let number = float_prefix(field.trim_matches(is_padding));
    if number.is_empty() {
        return None;
    }
    number.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Longest `[sign] digits [. digits] [e [sign] digits]` prefix of `s`.
/// Empty when `s` does not start with a number.
fn float_prefix(s: &str) -> &str {
    let bytes = s.as_bytes();
    let digits_from = |mut i: usize| {
        while bytes.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        i
    };

    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let int_end = digits_from(end);
    let mut has_digits = int_end > end;
    end = int_end;

    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        if frac_end > end + 1 {
            has_digits = true;
            end = frac_end;
        }
    }
    if !has_digits {
        return "";
    }

    // 指数部分必须有数字，否则不计入
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_start = end + 1;
        if matches!(bytes.get(exp_start), Some(b'+' | b'-')) {
            exp_start += 1;
        }
        let exp_end = digits_from(exp_start);
        if exp_end > exp_start {
            end = exp_end;
        }
    }
    &s[..end]
}
