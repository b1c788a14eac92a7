/*!
 # Animation command encoder

 This module builds the `NNXttCC,XttCC,...` animation commands understood by
 the controller and validates operator-supplied command payloads before they
 reach the device. It includes the device's palette table, addressed by
 index from inside animation chunks.
*/

use crate::{Error, Result};

/// Maximum number of chunks the device accepts in one animation command.
pub const MAX_CHUNKS: usize = 99;

/// Length in bytes of a static-color payload (`:RRR,GGG,BBB`).
pub const COLOR_PAYLOAD_LEN: usize = 12;

/// Minimum length of an animation payload: count plus a single chunk.
pub const MIN_ANIMATION_PAYLOAD_LEN: usize = 7;

/// Indices into the device's built-in color table
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    /// Red (0)
    pub red: u8,
    /// Blue (1)
    pub blue: u8,
    /// Green (2)
    pub green: u8,
    /// White (3)
    pub white: u8,
    /// Purple (4)
    pub purple: u8,
    /// Pink (5)
    pub pink: u8,
    /// Orange (6)
    pub orange: u8,
    /// Off (7)
    pub off: u8,
    /// Light blue (8)
    pub light_blue: u8,
    /// Dim blue (9)
    pub dim_blue: u8,
    /// Dim white (10)
    pub dim_white: u8,
    /// Movie orange (11)
    pub movie_orange: u8,
    /// Dim purple (12)
    pub dim_purple: u8,
    /// Dim green (13)
    pub dim_green: u8,
    /// Brown (14)
    pub brown: u8,
    /// Yellow (15)
    pub yellow: u8,
    /// Dim red (16)
    pub dim_red: u8,
    /// Blue, diabetes awareness (17)
    pub diabetes_blue: u8,
}

/// The palette table as programmed into the device firmware
pub const PALETTE: Palette = Palette {
    red: 0,
    blue: 1,
    green: 2,
    white: 3,
    purple: 4,
    pink: 5,
    orange: 6,
    off: 7,
    light_blue: 8,
    dim_blue: 9,
    dim_white: 10,
    movie_orange: 11,
    dim_purple: 12,
    dim_green: 13,
    brown: 14,
    yellow: 15,
    dim_red: 16,
    diabetes_blue: 17,
};

/// How one animation chunk transitions to its color and repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStyle {
    /// Fade to the color, repeating loop (`f`). Timing is milliseconds
    /// between fade steps.
    Fade,
    /// Switch instantly, repeating loop (`i`). Timing is hundreds of
    /// milliseconds to hold after switching.
    Instant,
    /// Fade to the color once, then stop (`s`)
    FadeOnce,
    /// Switch instantly once, then stop (`c`)
    InstantOnce,
}

impl ChunkStyle {
    fn code(self) -> u8 {
        match self {
            ChunkStyle::Fade => b'f',
            ChunkStyle::Instant => b'i',
            ChunkStyle::FadeOnce => b's',
            ChunkStyle::InstantOnce => b'c',
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            b'f' => Some(ChunkStyle::Fade),
            b'i' => Some(ChunkStyle::Instant),
            b's' => Some(ChunkStyle::FadeOnce),
            b'c' => Some(ChunkStyle::InstantOnce),
            _ => None,
        }
    }
}

/// One `XttCC` unit of an animation: style, timing value and palette index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    style: ChunkStyle,
    timing: u8,
    palette: u8,
}

impl Chunk {
    /// Builds a chunk. Timing and palette index are two-digit wire fields,
    /// so both are capped at 99.
    pub const fn new(style: ChunkStyle, timing: u8, palette: u8) -> Self {
        Self {
            style,
            timing: if timing > 99 { 99 } else { timing },
            palette: if palette > 99 { 99 } else { palette },
        }
    }

    fn encode_into(self, out: &mut Vec<u8>) {
        out.push(self.style.code());
        out.extend_from_slice(format!("{:02}{:02}", self.timing, self.palette).as_bytes());
    }
}

/// An ordered list of chunks forming one animation loop command
#[derive(Debug, Clone, Default)]
pub struct Animation {
    chunks: Vec<Chunk>,
}

impl Animation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an animation from a chunk list, rejecting oversized ones.
    pub fn from_chunks(chunks: Vec<Chunk>) -> Result<Self> {
        if chunks.len() > MAX_CHUNKS {
            return Err(Error::TooManyChunks(chunks.len(), MAX_CHUNKS));
        }
        Ok(Self { chunks })
    }

    /// Appends a chunk, rejecting growth past the device limit.
    pub fn push(&mut self, chunk: Chunk) -> Result<()> {
        if self.chunks.len() >= MAX_CHUNKS {
            return Err(Error::TooManyChunks(self.chunks.len() + 1, MAX_CHUNKS));
        }
        self.chunks.push(chunk);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Serializes into the wire form `NNXttCC,XttCC,...` where `NN` is the
    /// chunk count.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.chunks.len() * 6);
        out.extend_from_slice(format!("{:02}", self.chunks.len()).as_bytes());
        for (i, chunk) in self.chunks.iter().enumerate() {
            if i > 0 {
                out.push(b',');
            }
            chunk.encode_into(&mut out);
        }
        out
    }
}

/// Checks an operator-supplied static-color payload (`:RRR,GGG,BBB`).
/// Rejection leaves no trace; the payload is forwarded verbatim when valid.
pub fn validate_color_payload(payload: &[u8]) -> Result<()> {
    if payload.len() != COLOR_PAYLOAD_LEN {
        return Err(Error::Protocol(format!(
            "color payload must be {} bytes, got {}",
            COLOR_PAYLOAD_LEN,
            payload.len()
        )));
    }
    if payload[0] != b':' || payload[4] != b',' || payload[8] != b',' {
        return Err(Error::Protocol(
            "color payload must look like :RRR,GGG,BBB".into(),
        ));
    }
    for channel in [&payload[1..4], &payload[5..8], &payload[9..12]] {
        let text = std::str::from_utf8(channel)
            .map_err(|_| Error::Protocol("color channel is not ASCII".into()))?;
        let value: u16 = text
            .parse()
            .map_err(|_| Error::Protocol(format!("bad color channel {text:?}")))?;
        if value > 255 {
            return Err(Error::Protocol(format!("color channel {value} > 255")));
        }
    }
    Ok(())
}

/// Checks an operator-supplied animation payload: a two-digit chunk count
/// followed by that many well-formed comma-separated chunks.
pub fn validate_animation_payload(payload: &[u8]) -> Result<()> {
    if payload.len() < MIN_ANIMATION_PAYLOAD_LEN {
        return Err(Error::Protocol(format!(
            "animation payload must be at least {} bytes, got {}",
            MIN_ANIMATION_PAYLOAD_LEN,
            payload.len()
        )));
    }
    let count: usize = std::str::from_utf8(&payload[..2])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Protocol("animation payload must start with a 2-digit count".into()))?;
    if count == 0 || count > MAX_CHUNKS {
        return Err(Error::Protocol(format!(
            "animation chunk count {count} outside 1..={MAX_CHUNKS}"
        )));
    }
    let chunks: Vec<&[u8]> = payload[2..].split(|&b| b == b',').collect();
    if chunks.len() != count {
        return Err(Error::Protocol(format!(
            "animation declares {count} chunks but carries {}",
            chunks.len()
        )));
    }
    for chunk in chunks {
        let well_formed = chunk.len() == 5
            && ChunkStyle::from_code(chunk[0]).is_some()
            && chunk[1..].iter().all(u8::is_ascii_digit);
        if !well_formed {
            return Err(Error::Protocol(format!(
                "malformed animation chunk {:?}",
                String::from_utf8_lossy(chunk)
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_count_and_chunks() {
        let anim = Animation::from_chunks(vec![
            Chunk::new(ChunkStyle::Fade, 2, PALETTE.white),
            Chunk::new(ChunkStyle::Fade, 2, PALETTE.orange),
            Chunk::new(ChunkStyle::Fade, 8, PALETTE.movie_orange),
        ])
        .unwrap();
        assert_eq!(anim.encode(), b"03f0203,f0206,f0811");
    }

    #[test]
    fn chunk_fields_cap_at_two_digits() {
        let anim = Animation::from_chunks(vec![Chunk::new(ChunkStyle::Instant, 200, 150)]).unwrap();
        assert_eq!(anim.encode(), b"01i9999");
    }

    #[test]
    fn rejects_more_than_max_chunks() {
        let chunk = Chunk::new(ChunkStyle::Fade, 1, 0);
        assert!(matches!(
            Animation::from_chunks(vec![chunk; MAX_CHUNKS + 1]),
            Err(Error::TooManyChunks(100, MAX_CHUNKS))
        ));

        let mut anim = Animation::from_chunks(vec![chunk; MAX_CHUNKS]).unwrap();
        assert!(anim.push(chunk).is_err());
    }

    #[test]
    fn accepts_valid_color_payload() {
        assert!(validate_color_payload(b":200,000,050").is_ok());
    }

    #[test]
    fn rejects_bad_color_payloads() {
        assert!(validate_color_payload(b":200,000,05").is_err());
        assert!(validate_color_payload(b"200,000,0501").is_err());
        assert!(validate_color_payload(b":300,000,000").is_err());
        assert!(validate_color_payload(b":20a,000,000").is_err());
    }

    #[test]
    fn accepts_valid_animation_payload() {
        assert!(validate_animation_payload(b"01i0011").is_ok());
        assert!(validate_animation_payload(b"03f0203,f0206,f0811").is_ok());
    }

    #[test]
    fn rejects_bad_animation_payloads() {
        assert!(validate_animation_payload(b"1f0203").is_err());
        assert!(validate_animation_payload(b"02f0203").is_err());
        assert!(validate_animation_payload(b"01x0011").is_err());
        assert!(validate_animation_payload(b"01f00,1").is_err());
        assert!(validate_animation_payload(b"00").is_err());
    }
}
