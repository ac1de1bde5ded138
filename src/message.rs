/*! Message classifier.

Parses one frame into a [`Message`]. Frames look like
`16:<group>:<code>[:<value>[:<value>]]`, where `16` is the protocol header.

| Group | Meaning | Codes |
|-------|---------|-------|
| `0`   | Free text from the satellite | (rest of frame is the body) |
| `1`   | Temperature/humidity sensor | `-1`/`-2` error, `01` temperature, `02` humidity, `03` finalize with mean |
| `2`   | Servo | `-1` invalid, `0` angle |
| `3`   | Radar | `-1`/`-2` error, `0` servo angle and distance |

Classification never fails. Anything not understood becomes
[`Message::Unrecognized`], and is logged.
 */
use log::{debug, warn};

use crate::Float;

/// Protocol header, the first field of every frame.
pub const HEADER: &str = "16";

/// Why a radar sample is missing.
#[derive(Debug, Clone, PartialEq)]
pub enum RadarFault {
    /// The satellite reported a hardware error code.
    Hardware(i32),
    /// The frame was a radar sample, but the fields didn't parse.
    CorruptData,
}

/// A classified frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Free text.
    Text { body: String },

    /// Temperature/humidity sensor reported an error.
    SensorError { code: i32 },

    /// Temperature part of a sensor packet.
    Temperature { value: Float },

    /// Humidity part of a sensor packet.
    Humidity { value: Float },

    /// End of sensor packet. Carries the satellite's own mean, if it parsed.
    MeanFinalize { value: Option<Float> },

    /// Servo position is not valid.
    ServoInvalid,

    /// Servo position.
    ServoAngle { degrees: Float },

    /// Radar failed to produce a sample.
    RadarError { fault: RadarFault },

    /// One radar sample.
    RadarSample {
        servo_degrees: Float,
        distance_cm: Float,
    },

    /// Anything else.
    Unrecognized { raw: String },
}

/// Parse a numeric field. Non-finite values (`nan`, `inf`) are not data.
#[must_use]
pub fn parse_value(s: &str) -> Option<Float> {
    s.trim().parse::<Float>().ok().filter(|v| v.is_finite())
}

fn unrecognized(frame: &str, why: &str) -> Message {
    warn!("Unrecognized frame ({why}): {frame:?}");
    Message::Unrecognized {
        raw: frame.to_string(),
    }
}

/// Find where the next header starts inside a text body.
///
/// Two frames get glued together when a delimiter is lost on the link. The
/// second one then shows up as `16:<group>:` inside the first one's body.
fn embedded_header(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    body.match_indices(HEADER).map(|(i, _)| i).find(|&i| {
        let rest = &bytes[i + HEADER.len()..];
        rest.len() >= 3 && rest[0] == b':' && rest[1].is_ascii_digit() && rest[2] == b':'
    })
}

fn classify_text(frame: &str) -> Message {
    // "16:0:" is five bytes, checked by the caller.
    let body = &frame[HEADER.len() + 3..];
    let body = match embedded_header(body) {
        Some(pos) => {
            warn!("Text frame contains another header, truncating: {frame:?}");
            body[..pos].trim_end()
        }
        None => body,
    };
    Message::Text {
        body: body.to_string(),
    }
}

fn classify_sensor(frame: &str, fields: &[&str]) -> Option<Message> {
    let value = fields.get(3).copied();
    Some(match (fields[2], value) {
        (code @ ("-1" | "-2"), _) => Message::SensorError {
            code: code.parse().ok()?,
        },
        ("01", Some(v)) => match parse_value(v) {
            Some(value) => Message::Temperature { value },
            None => {
                warn!("Bad temperature value {v:?} in {frame:?}, dropping");
                return None;
            }
        },
        ("02", Some(v)) => match parse_value(v) {
            Some(value) => Message::Humidity { value },
            None => {
                warn!("Bad humidity value {v:?} in {frame:?}, dropping");
                return None;
            }
        },
        ("03", v) => {
            let value = v.and_then(parse_value);
            if value.is_none() {
                warn!("Bad or missing mean in {frame:?}, finalizing without it");
            }
            Message::MeanFinalize { value }
        }
        _ => return Some(unrecognized(frame, "sensor code")),
    })
}

fn classify_servo(frame: &str, fields: &[&str]) -> Option<Message> {
    Some(match (fields[2], fields.get(3)) {
        ("-1", _) => Message::ServoInvalid,
        ("0", Some(v)) => match parse_value(v) {
            Some(degrees) => Message::ServoAngle { degrees },
            None => {
                warn!("Bad servo angle {v:?} in {frame:?}, dropping");
                return None;
            }
        },
        // Motion commands echoed back. Not for us.
        _ => return Some(unrecognized(frame, "servo code")),
    })
}

fn classify_radar(frame: &str, fields: &[&str]) -> Message {
    match fields[2] {
        code @ ("-1" | "-2") => Message::RadarError {
            fault: RadarFault::Hardware(code.parse().unwrap_or(-1)),
        },
        "0" => {
            let angle = fields.get(3).and_then(|s| parse_value(s));
            let distance = fields.get(4).and_then(|s| parse_value(s));
            match (angle, distance) {
                (Some(servo_degrees), Some(distance_cm)) => Message::RadarSample {
                    servo_degrees,
                    distance_cm,
                },
                _ => {
                    warn!("Corrupt radar sample {frame:?}");
                    Message::RadarError {
                        fault: RadarFault::CorruptData,
                    }
                }
            }
        }
        _ => unrecognized(frame, "radar code"),
    }
}

/// Classify one frame.
///
/// Returns `None` when the frame was understood, but a field failed to
/// parse and the whole message must be dropped (temperature, humidity and
/// servo angle). Everything else yields a message.
#[must_use]
pub fn classify(frame: &str) -> Option<Message> {
    let fields: Vec<&str> = frame.split(':').collect();
    if fields.len() < 3 {
        return Some(unrecognized(frame, "too few fields"));
    }
    if fields[0] != HEADER {
        return Some(unrecognized(frame, "bad header"));
    }
    let msg = match fields[1] {
        "0" => Some(classify_text(frame)),
        "1" => classify_sensor(frame, &fields),
        "2" => classify_servo(frame, &fields),
        "3" => Some(classify_radar(frame, &fields)),
        _ => Some(unrecognized(frame, "unknown group")),
    };
    debug!("Classified {frame:?} as {msg:?}");
    msg
}
