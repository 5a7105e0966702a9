use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;

// Standard alphabet, padding required, trailing bits in the last quad ignored.
const PICTURE_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::RequireCanonical),
);

/// Decodes standard base64. Anything that is not a whole number of padded
/// quads of the standard alphabet decodes to nothing.
pub fn decode_base64(input: &str) -> Vec<u8> {
    if input.len() % 4 != 0 {
        return Vec::new();
    }
    PICTURE_BASE64.decode(input).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlacPicture {
    pub picture_type: u32,
    pub mime: String,
    pub description: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub colors: u32,
    pub data: Vec<u8>,
}

/// Parses a FLAC `METADATA_BLOCK_PICTURE` body. All integers are big-endian.
pub fn parse_flac_picture(block: &[u8]) -> Option<FlacPicture> {
    let mut reader = BlockReader { bytes: block };
    let picture_type = reader.u32()?;
    let mime_len = reader.u32()? as usize;
    let mime = String::from_utf8_lossy(reader.take(mime_len)?).into_owned();
    let desc_len = reader.u32()? as usize;
    let description = String::from_utf8_lossy(reader.take(desc_len)?).into_owned();
    let width = reader.u32()?;
    let height = reader.u32()?;
    let depth = reader.u32()?;
    let colors = reader.u32()?;
    let data_len = reader.u32()? as usize;
    let data = reader.take(data_len)?.to_vec();

    Some(FlacPicture {
        picture_type,
        mime,
        description,
        width,
        height,
        depth,
        colors,
        data,
    })
}

struct BlockReader<'a> {
    bytes: &'a [u8],
}

impl<'a> BlockReader<'a> {
    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        if self.bytes.len() < len {
            return None;
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Some(head)
    }

    fn u32(&mut self) -> Option<u32> {
        let raw = self.take(4)?;
        Some(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }
}

#[cfg(test)]
pub(crate) fn encode_flac_picture(picture_type: u32, mime: &str, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&picture_type.to_be_bytes());
    out.extend_from_slice(&(mime.len() as u32).to_be_bytes());
    out.extend_from_slice(mime.as_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    for value in [1u32, 1, 24, 0] {
        out.extend_from_slice(&value.to_be_bytes());
    }
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
    out
}
