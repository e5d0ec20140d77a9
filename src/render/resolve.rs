//! Output size resolution for the four fit modes.
//!
//! All arithmetic is done on `u64` so `target * source` cannot overflow for
//! any `u32` inputs, and integer division truncates toward zero.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// How the requested size relates to the source aspect ratio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// `MatchWidth` for landscape sources, `MatchHeight` otherwise.
    #[default]
    Auto,
    /// Keep the requested width, derive the height from the aspect ratio.
    MatchWidth,
    /// Keep the requested height, derive the width from the aspect ratio.
    MatchHeight,
    /// Use the requested size as-is, ignoring the aspect ratio.
    Stretch,
}

impl FitMode {
    /// All modes, in declaration order.
    pub const ALL: [FitMode; 4] = [
        FitMode::Auto,
        FitMode::MatchWidth,
        FitMode::MatchHeight,
        FitMode::Stretch,
    ];

    /// The name used in query strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            FitMode::Auto => "auto",
            FitMode::MatchWidth => "match_width",
            FitMode::MatchHeight => "match_height",
            FitMode::Stretch => "stretch",
        }
    }
}

impl fmt::Display for FitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FitMode {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FitMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| {
                RenderError::invalid(format!(
                    "unknown mode '{}' (expected auto, match_width, match_height or stretch)",
                    s
                ))
            })
    }
}

/// Compute the output size for a source image.
///
/// Zero targets are passed through unchanged; only a zero-sized source is an
/// error.
pub fn resolve_dimensions(
    source: (u32, u32),
    target: (u32, u32),
    mode: FitMode,
) -> Result<(u32, u32), RenderError> {
    let (source_w, source_h) = source;
    if source_w == 0 || source_h == 0 {
        return Err(RenderError::DegenerateSource {
            width: source_w,
            height: source_h,
        });
    }

    let (target_w, target_h) = target;
    let match_width = || (target_w, scale(target_w, source_h, source_w));
    let match_height = || (scale(target_h, source_w, source_h), target_h);

    let resolved = match mode {
        FitMode::Stretch => (target_w, target_h),
        FitMode::MatchWidth => match_width(),
        FitMode::MatchHeight => match_height(),
        FitMode::Auto if source_w > source_h => match_width(),
        FitMode::Auto => match_height(),
    };

    Ok(resolved)
}

/// `floor(value * numerator / denominator)`, saturated to `u32`.
#[inline]
fn scale(value: u32, numerator: u32, denominator: u32) -> u32 {
    let scaled = u64::from(value) * u64::from(numerator) / u64::from(denominator);
    u32::try_from(scaled).unwrap_or(u32::MAX)
}
