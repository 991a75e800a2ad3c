//! # Pattern Scanning
//!
//! Masked byte-sequence search over plain buffers ("AOB scan").
//!
//! A pattern is an ordered list of positions, each either a literal byte that
//! must match or a wildcard that matches anything. Patterns come from a byte
//! slice plus a mask string (`x` = literal, `?` = wildcard) or from IDA-style
//! signature text such as `"48 8B ?? ?? 89"`.
//!
//! The scanner never touches a live process. To search a target's memory,
//! read the region first or use [`memory::scan`](crate::memory::scan), which
//! does the chunked reads for you.
//!
//! ## Semantics
//!
//! - Candidate start offsets are tried in ascending order and the **first**
//!   (lowest) full match wins, so overlapping occurrences resolve to the lower offset.
//! - "Not found" is `Ok(None)`; a match at the first byte is `Ok(Some(0))`.
//! - A mask whose length differs from the pattern is a usage error
//!   (`MaskLengthMismatch`), reported before any scanning.
//!
//! ## Example
//!
//! ```rust
//! use remora_core::pattern::find_pattern;
//!
//! let region = [0x00, 0x11, 0xFF, 0x33, 0x44];
//! assert_eq!(find_pattern(&region, &[0x11, 0x22, 0x33], "x?x").unwrap(), Some(1));
//! assert_eq!(find_pattern(&region, &[0x11, 0x22, 0x33], "xxx").unwrap(), None);
//! assert!(find_pattern(&region, &[0x11, 0x22, 0x33], "x?").is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{RemoraError, Result};

/// Mask character for a position that must match
pub const MATCH: char = 'x';

/// Mask character for a position that matches any byte
pub const WILDCARD: char = '?';

/// A compiled, reusable byte pattern
///
/// `None` entries are wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern
{
    positions: Vec<Option<u8>>,
}

impl Pattern
{
    /// Build a pattern from data bytes and a mask of the same length
    ///
    /// `x`/`X` marks a literal position and `?` a wildcard. The byte under a
    /// wildcard is ignored.
    ///
    /// ## Errors
    ///
    /// - `MaskLengthMismatch` if the mask has a different number of characters than `bytes`
    /// - `InvalidArgument` if the mask contains any other character
    pub fn new(bytes: &[u8], mask: &str) -> Result<Self>
    {
        let mask_len = mask.chars().count();
        if mask_len != bytes.len() {
            return Err(RemoraError::MaskLengthMismatch {
                pattern: bytes.len(),
                mask: mask_len,
            });
        }

        let positions = bytes
            .iter()
            .zip(mask.chars())
            .enumerate()
            .map(|(index, (&byte, marker))| match marker {
                'x' | 'X' => Ok(Some(byte)),
                WILDCARD => Ok(None),
                other => Err(RemoraError::InvalidArgument(format!(
                    "mask character '{other}' at position {index} is neither '{MATCH}' nor '{WILDCARD}'"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { positions })
    }

    /// Build a pattern from IDA-style signature text
    ///
    /// Tokens are whitespace separated two-digit hex bytes; `?` and `??` are wildcards.
    ///
    /// ```rust
    /// use remora_core::pattern::Pattern;
    ///
    /// let pattern = Pattern::from_signature("48 8D 0D ?? ?? ?? ??").unwrap();
    /// assert_eq!(pattern.len(), 7);
    /// assert_eq!(pattern.to_mask(), "xxx????");
    /// ```
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` for an empty signature or a token that isn't a hex byte.
    pub fn from_signature(signature: &str) -> Result<Self>
    {
        let positions = signature
            .split_whitespace()
            .map(|token| match token {
                "?" | "??" => Ok(None),
                _ => u8::from_str_radix(token, 16)
                    .map(Some)
                    .map_err(|e| RemoraError::InvalidArgument(format!("invalid signature token '{token}': {e}"))),
            })
            .collect::<Result<Vec<_>>>()?;

        if positions.is_empty() {
            return Err(RemoraError::InvalidArgument("signature is empty".to_string()));
        }

        Ok(Self { positions })
    }

    /// Number of positions, wildcards included
    pub fn len(&self) -> usize
    {
        self.positions.len()
    }

    /// Whether the pattern has no positions
    pub fn is_empty(&self) -> bool
    {
        self.positions.is_empty()
    }

    /// The positions, `None` for wildcards
    pub fn positions(&self) -> &[Option<u8>]
    {
        &self.positions
    }

    /// Data bytes with wildcards rendered as `0x00`
    pub fn to_bytes(&self) -> Vec<u8>
    {
        self.positions.iter().map(|p| p.unwrap_or(0)).collect()
    }

    /// Mask string matching [`Pattern::to_bytes`]
    pub fn to_mask(&self) -> String
    {
        self.positions
            .iter()
            .map(|p| if p.is_some() { MATCH } else { WILDCARD })
            .collect()
    }

    /// IDA-style text, e.g. `"48 8B ?? 05"`
    pub fn to_signature(&self) -> String
    {
        self.positions
            .iter()
            .map(|p| match p {
                Some(value) => format!("{value:02X}"),
                None => "??".to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn matches(&self, window: &[u8]) -> bool
    {
        self.positions
            .iter()
            .zip(window)
            .all(|(expected, actual)| expected.map_or(true, |byte| byte == *actual))
    }

    /// Lowest offset in `region` where the pattern matches
    ///
    /// An empty pattern matches at offset 0. A region shorter than the
    /// pattern never matches.
    pub fn find_in(&self, region: &[u8]) -> Option<usize>
    {
        if self.positions.is_empty() {
            return Some(0);
        }
        region.windows(self.positions.len()).position(|window| self.matches(window))
    }

    /// Every offset in `region` where the pattern matches, ascending
    ///
    /// Occurrences may overlap.
    pub fn find_all_in(&self, region: &[u8]) -> Vec<usize>
    {
        if self.positions.is_empty() {
            return vec![0];
        }
        region
            .windows(self.positions.len())
            .enumerate()
            .filter(|(_, window)| self.matches(window))
            .map(|(offset, _)| offset)
            .collect()
    }
}

impl FromStr for Pattern
{
    type Err = RemoraError;

    fn from_str(s: &str) -> Result<Self>
    {
        Self::from_signature(s)
    }
}

impl fmt::Display for Pattern
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(&self.to_signature())
    }
}

/// Find the first occurrence of a masked pattern in a buffer
///
/// ## Parameters
///
/// - `region`: bytes to search, typically a dump of a module or section
/// - `pattern`: data bytes; bytes under a wildcard are ignored
/// - `mask`: one character per pattern byte, `x` literal or `?` wildcard
///
/// ## Returns
///
/// `Ok(Some(offset))` for the lowest matching offset, `Ok(None)` when there
/// is no match.
///
/// ## Errors
///
/// - `MaskLengthMismatch` if `mask` and `pattern` differ in length (checked first)
/// - `InvalidArgument` if `mask` contains a character other than `x`, `X` or `?`
pub fn find_pattern(region: &[u8], pattern: &[u8], mask: &str) -> Result<Option<usize>>
{
    Ok(Pattern::new(pattern, mask)?.find_in(region))
}
