//! Telemetry wire format spoken by the headset and tracking boards.
//!
//! Frame format, version 1 ([`FRAME_VERSION`]):
//! - ASCII frames terminated by `;` or `\n`. Whitespace around fields is ignored.
//! - Body is comma separated, first field is the tag:
//!   - `Q,w,x,y,z`: orientation quaternion, must have unit norm
//!   - `P,x,y,z`: position in the rig frame
//!   - `B,<line>,<0|1>`: level of a named digital line
//! - Optional `*HH` suffix: XOR of all body bytes before `*`, two hex digits.
//! - A body starting with `{` is a JSON orientation object
//!   `{"w":..,"x":..,"y":..,"z":..}`, one per line, as printed by the stock
//!   headset firmware. No checksum.
//!
//! Example: `Q,1,0,0,0;P,0.0,-1.0,0.0*7E;B,menu,1\n`

use crate::error::DecodeError;
use crate::types::{Quaternion, Sample, Vec3};
use serde::Deserialize;

pub const FRAME_VERSION: u8 = 1;

/// Frame terminators.
pub const DELIMITERS: [u8; 2] = [b';', b'\n'];

/// Longest body accepted before the decoder gives up and resyncs.
pub const MAX_FRAME_LEN: usize = 128;

/// Allowed deviation of |q| from 1.
pub const QUAT_NORM_TOLERANCE: f64 = 0.02;

pub const TAG_ORIENTATION: &str = "Q";
pub const TAG_POSITION: &str = "P";
pub const TAG_BUTTON: &str = "B";

/// Orientation line from the stock headset firmware.
#[derive(Debug, Deserialize)]
struct JsonOrientation {
    w: f64,
    x: f64,
    y: f64,
    z: f64,
}

fn is_delimiter(b: u8) -> bool {
    DELIMITERS.contains(&b)
}

/// XOR checksum over a frame body.
pub fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Encode a sample as a single terminated frame.
pub fn encode_frame(sample: &Sample, with_checksum: bool) -> String {
    let mut frame = match sample {
        Sample::Orientation(q) => format!("{},{},{},{},{}", TAG_ORIENTATION, q.w, q.x, q.y, q.z),
        Sample::Position(p) => format!("{},{},{},{}", TAG_POSITION, p.x, p.y, p.z),
        Sample::ButtonEdge { line, pressed } => {
            format!("{},{},{}", TAG_BUTTON, line, if *pressed { 1 } else { 0 })
        }
    };
    if with_checksum {
        let sum = checksum(frame.as_bytes());
        frame.push_str(&format!("*{:02X}", sum));
    }
    frame.push(';');
    frame
}

fn parse_number(field: &str) -> Result<f64, DecodeError> {
    match field.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(DecodeError::NotNumeric(field.to_string())),
    }
}

fn expect_fields(tag: char, fields: &[&str], expected: usize) -> Result<(), DecodeError> {
    let got = fields.len() - 1;
    if got != expected {
        return Err(DecodeError::FieldCount { tag, expected, got });
    }
    Ok(())
}

fn unit_orientation(q: Quaternion) -> Result<Sample, DecodeError> {
    let norm = q.norm();
    if (norm - 1.0).abs() > QUAT_NORM_TOLERANCE {
        return Err(DecodeError::NotUnit(norm));
    }
    Ok(Sample::Orientation(q))
}

fn parse_json_orientation(text: &str) -> Result<Sample, DecodeError> {
    let json: JsonOrientation = serde_json::from_str(text).map_err(|e| DecodeError::Json(e.to_string()))?;
    let q = Quaternion {
        w: json.w,
        x: json.x,
        y: json.y,
        z: json.z,
    };
    if [q.w, q.x, q.y, q.z].iter().any(|v| !v.is_finite()) {
        return Err(DecodeError::NotNumeric(text.to_string()));
    }
    unit_orientation(q)
}

/// Parse one frame body (delimiter already stripped).
///
/// Returns `Ok(None)` for blank frames, which are not errors.
pub fn parse_frame(frame: &[u8]) -> Result<Option<Sample>, DecodeError> {
    let text = std::str::from_utf8(frame).map_err(|_| DecodeError::NotText)?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    if text.starts_with('{') {
        return parse_json_orientation(text).map(Some);
    }

    let body = match text.rsplit_once('*') {
        Some((body, sum)) => {
            let sum = sum.trim();
            let expected = if sum.len() == 2 {
                u8::from_str_radix(sum, 16)
                    .map_err(|_| DecodeError::BadChecksumField(sum.to_string()))?
            } else {
                return Err(DecodeError::BadChecksumField(sum.to_string()));
            };
            let computed = checksum(body.as_bytes());
            if computed != expected {
                return Err(DecodeError::Checksum { expected, computed });
            }
            body
        }
        None => text,
    };

    let fields: Vec<&str> = body.split(',').map(str::trim).collect();
    match fields[0] {
        TAG_ORIENTATION => {
            expect_fields('Q', &fields, 4)?;
            let q = Quaternion {
                w: parse_number(fields[1])?,
                x: parse_number(fields[2])?,
                y: parse_number(fields[3])?,
                z: parse_number(fields[4])?,
            };
            Ok(Some(unit_orientation(q)?))
        }
        TAG_POSITION => {
            expect_fields('P', &fields, 3)?;
            Ok(Some(Sample::Position(Vec3 {
                x: parse_number(fields[1])?,
                y: parse_number(fields[2])?,
                z: parse_number(fields[3])?,
            })))
        }
        TAG_BUTTON => {
            expect_fields('B', &fields, 2)?;
            if fields[1].is_empty() {
                return Err(DecodeError::FieldCount {
                    tag: 'B',
                    expected: 2,
                    got: 1,
                });
            }
            let pressed = match fields[2] {
                "1" => true,
                "0" => false,
                other => return Err(DecodeError::BadLevel(other.to_string())),
            };
            Ok(Some(Sample::ButtonEdge {
                line: fields[1].to_string(),
                pressed,
            }))
        }
        other => Err(DecodeError::UnknownTag(other.to_string())),
    }
}

/// Incremental frame decoder for one link.
///
/// Works byte by byte, so the output never depends on how the input was
/// split across reads. The only state carried between calls is the partial
/// frame and the overflow flag.
#[derive(Debug, Default)]
pub struct TelemetryDecoder {
    pending: Vec<u8>,
    overflow: bool,
    frames_decoded: u64,
    decode_errors: u64,
}

impl TelemetryDecoder {
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(MAX_FRAME_LEN),
            ..Default::default()
        }
    }

    /// Feed raw bytes, returning every sample completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Sample> {
        let mut samples = Vec::new();

        for &b in bytes {
            if is_delimiter(b) {
                if self.overflow {
                    self.overflow = false;
                    self.reject(DecodeError::Overlong(MAX_FRAME_LEN));
                } else if !self.pending.is_empty() {
                    let result = parse_frame(&self.pending);
                    self.pending.clear();
                    match result {
                        Ok(Some(sample)) => {
                            self.frames_decoded += 1;
                            samples.push(sample);
                        }
                        Ok(None) => {}
                        Err(e) => self.reject(e),
                    }
                }
                continue;
            }

            if self.overflow {
                continue;
            }
            if self.pending.len() >= MAX_FRAME_LEN {
                self.pending.clear();
                self.overflow = true;
                continue;
            }
            self.pending.push(b);
        }

        samples
    }

    fn reject(&mut self, err: DecodeError) {
        self.decode_errors += 1;
        log::debug!("Dropped telemetry frame: {}", err);
    }

    /// Drop any partial frame. Called when the underlying link reopens.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.overflow = false;
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    /// Bytes held for an incomplete frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orientation(w: f64, x: f64, y: f64, z: f64) -> Sample {
        Sample::Orientation(Quaternion { w, x, y, z })
    }

    fn position(x: f64, y: f64, z: f64) -> Sample {
        Sample::Position(Vec3 { x, y, z })
    }

    #[test]
    fn test_decode_orientation_and_position() {
        let mut decoder = TelemetryDecoder::new();
        let samples = decoder.feed(b"Q,1,0,0,0;P,0.0,-1.0,0.0;");
        assert_eq!(
            samples,
            vec![orientation(1.0, 0.0, 0.0, 0.0), position(0.0, -1.0, 0.0)]
        );
        assert_eq!(decoder.frames_decoded(), 2);
        assert_eq!(decoder.decode_errors(), 0);
    }

    #[test]
    fn test_frame_split_across_reads() {
        let mut decoder = TelemetryDecoder::new();
        assert!(decoder.feed(b"Q,0.7071068,0.70").is_empty());
        assert_eq!(decoder.pending_len(), 16);
        let samples = decoder.feed(b"71068,0,0\nP,1");
        assert_eq!(samples, vec![orientation(0.7071068, 0.7071068, 0.0, 0.0)]);
        let samples = decoder.feed(b".5,2,3;");
        assert_eq!(samples, vec![position(1.5, 2.0, 3.0)]);
    }

    #[test]
    fn test_chunk_boundary_independence() {
        let mut stream = Vec::new();
        stream.extend_from_slice(b"Q,1,0,0,0;");
        stream.extend_from_slice(b"P,0.1,0.2,0.3*00;");
        stream.extend_from_slice(encode_frame(&position(4.0, 5.0, 6.0), true).as_bytes());
        stream.extend_from_slice(b"B,menu,1\r\nB,menu,0\n");
        stream.extend_from_slice(&[b'x'; MAX_FRAME_LEN + 10]);
        stream.extend_from_slice(b";Q,0,1,0,0;P,abc,1,2;;");
        stream.extend_from_slice(&[0xff, 0xfe, b';']);
        stream.extend_from_slice(b"P,7,8,9");

        let mut whole = TelemetryDecoder::new();
        let all_at_once = whole.feed(&stream);

        let mut bytewise = TelemetryDecoder::new();
        let mut one_by_one = Vec::new();
        for b in &stream {
            one_by_one.extend(bytewise.feed(std::slice::from_ref(b)));
        }

        assert_eq!(all_at_once, one_by_one);
        assert_eq!(whole.decode_errors(), bytewise.decode_errors());
        assert_eq!(whole.pending_len(), bytewise.pending_len());
        assert_eq!(all_at_once.len(), 5);
        assert_eq!(whole.decode_errors(), 4);
    }

    #[test]
    fn test_malformed_frames_dropped_in_isolation() {
        let bad_frames: &[&[u8]] = &[
            b"Q,1,0,0",
            b"Q,1,0,0,0,0",
            b"P,1,two,3",
            b"P,1,NaN,3",
            b"Q,2,0,0,0",
            b"Q,1,0,0,0*00",
            b"Q,1,0,0,0*Z1",
            b"X,1,2",
            b"B,menu,maybe",
            b"B,,1",
            &[0xc3, 0x28, b','],
        ];

        for bad in bad_frames {
            let mut decoder = TelemetryDecoder::new();
            let mut stream = b"P,1,1,1;".to_vec();
            stream.extend_from_slice(bad);
            stream.extend_from_slice(b";Q,0,0,1,0;");

            let samples = decoder.feed(&stream);
            assert_eq!(
                samples,
                vec![position(1.0, 1.0, 1.0), orientation(0.0, 0.0, 1.0, 0.0)],
                "frame {:?}",
                String::from_utf8_lossy(bad)
            );
            assert_eq!(decoder.decode_errors(), 1);
        }
    }

    #[test]
    fn test_checksum_accepted() {
        let frame = encode_frame(&orientation(1.0, 0.0, 0.0, 0.0), true);
        assert_eq!(frame, "Q,1,0,0,0*50;");
        let mut decoder = TelemetryDecoder::new();
        let samples = decoder.feed(frame.as_bytes());
        assert_eq!(samples, vec![orientation(1.0, 0.0, 0.0, 0.0)]);

        assert_eq!(
            parse_frame(b" P,0.1,0.2,0.3*52\r"),
            Ok(Some(position(0.1, 0.2, 0.3)))
        );
    }

    #[test]
    fn test_overlong_frame_resyncs() {
        let mut decoder = TelemetryDecoder::new();
        let mut stream = vec![b'7'; MAX_FRAME_LEN * 3];
        stream.extend_from_slice(b";P,1,2,3;");
        let samples = decoder.feed(&stream);
        assert_eq!(samples, vec![position(1.0, 2.0, 3.0)]);
        assert_eq!(decoder.decode_errors(), 1);
    }

    #[test]
    fn test_blank_frames_are_not_errors() {
        let mut decoder = TelemetryDecoder::new();
        assert!(decoder.feed(b";;\r\n \n\t;").is_empty());
        assert_eq!(decoder.decode_errors(), 0);
    }

    #[test]
    fn test_button_levels() {
        let mut decoder = TelemetryDecoder::new();
        let samples = decoder.feed(b"B, menu ,1;B,trigger,0;");
        assert_eq!(
            samples,
            vec![
                Sample::ButtonEdge {
                    line: "menu".into(),
                    pressed: true
                },
                Sample::ButtonEdge {
                    line: "trigger".into(),
                    pressed: false
                },
            ]
        );
    }

    #[test]
    fn test_reset_drops_partial_frame() {
        let mut decoder = TelemetryDecoder::new();
        decoder.feed(b"P,1,2");
        decoder.reset();
        assert_eq!(decoder.feed(b",3;Q,1,0,0,0;"), vec![orientation(1.0, 0.0, 0.0, 0.0)]);
        assert_eq!(decoder.decode_errors(), 1);
    }

    #[test]
    fn test_encoded_frames_decode() {
        let samples = vec![
            orientation(0.5, 0.5, 0.5, 0.5),
            position(-0.25, 1e-3, 12.0),
            Sample::ButtonEdge {
                line: "menu".into(),
                pressed: true,
            },
        ];
        let mut wire = String::new();
        for s in &samples {
            wire.push_str(&encode_frame(s, false));
        }
        let mut decoder = TelemetryDecoder::new();
        assert_eq!(decoder.feed(wire.as_bytes()), samples);
    }

    #[test]
    fn test_documented_example_decodes() {
        let mut decoder = TelemetryDecoder::new();
        let samples = decoder.feed(b"Q,1,0,0,0;P,0.0,-1.0,0.0*7E;B,menu,1\n");
        assert_eq!(decoder.decode_errors(), 0);
        assert_eq!(
            samples,
            vec![
                orientation(1.0, 0.0, 0.0, 0.0),
                position(0.0, -1.0, 0.0),
                Sample::ButtonEdge {
                    line: "menu".into(),
                    pressed: true,
                },
            ]
        );
    }

    #[test]
    fn test_json_orientation_lines() {
        let mut decoder = TelemetryDecoder::new();
        let samples = decoder.feed(b"{\"w\":1.0,\"x\":0.0,\"y\":0.0,\"z\":0.0}\n");
        assert_eq!(samples, vec![orientation(1.0, 0.0, 0.0, 0.0)]);
        assert_eq!(decoder.decode_errors(), 0);

        // CRLF line endings, key order and spacing do not matter.
        let samples = decoder.feed(b"{ \"x\": 0.0, \"y\": 1.0, \"z\": 0.0, \"w\": 0.0 }\r\n");
        assert_eq!(samples, vec![orientation(0.0, 0.0, 1.0, 0.0)]);

        // Missing field, non-unit quaternion, then a good text frame.
        let samples = decoder.feed(b"{\"w\":1.0,\"x\":0.0}\n{\"w\":2,\"x\":0,\"y\":0,\"z\":0}\nP,1,2,3\n");
        assert_eq!(samples, vec![position(1.0, 2.0, 3.0)]);
        assert_eq!(decoder.decode_errors(), 2);
        assert!(matches!(parse_frame(b"{\"w\":1.0,\"x\":0.0}"), Err(DecodeError::Json(_))));
    }
}
