//! Frame comparison records supplied by the analysis service

use serde::{Deserialize, Deserializer, Serialize};

/// Pose difference between one reference frame and one user frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameComparisonRecord {
    /// Position in the comparison, ascending from 0
    pub frame_index: u64,

    /// Frame index in the reference video
    pub reference_frame: u64,

    /// Frame index in the user video
    pub user_frame: u64,

    /// Seconds on the reference timeline
    pub timestamp: f64,

    /// `-1` without pose data. Poor pose extraction is reported as a
    /// non-finite value, which decodes as infinity.
    #[serde(deserialize_with = "deserialize_difference")]
    pub difference: f64,

    pub has_difference: bool,

    pub has_pose_data: bool,

    #[serde(default)]
    pub pose_quality_issue: bool,
}

fn deserialize_difference<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
}

/// Rewrite the bare `Infinity`, `-Infinity` and `NaN` tokens some JSON
/// encoders emit into `null`, leaving string contents untouched.
pub fn sanitize_non_finite(json: &str) -> String {
    const TOKENS: [&str; 3] = ["-Infinity", "Infinity", "NaN"];

    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = json;

    while let Some(c) = rest.chars().next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if let Some(token) = TOKENS.iter().find(|t| rest.starts_with(**t)) {
            out.push_str("null");
            rest = &rest[token.len()..];
            continue;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}
