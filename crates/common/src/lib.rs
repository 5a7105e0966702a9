use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

const FNV_OFFSET_BASIS: u64 = 14695981039346656037;
const FNV_PRIME: u64 = 1099511628211;
const ID_MASK: u64 = 0x7FFF_FFFF_FFFF_FFFF;
const KEY_SEP: char = '@';

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: u64,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: u64,
    pub title: String,
    pub artist_id: u64,
    pub artist_name: String,
    pub has_cover: bool,
    pub cover: Vec<u8>,
    pub cover_128: Vec<u8>,
    pub cover_256: Vec<u8>,
    pub cover_512: Vec<u8>,
    pub cover_1024: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: u64,
    pub title: String,
    pub album_id: u64,
    pub album: String,
    pub artist_id: u64,
    pub artist: String,
    pub track_number: u32,
    pub disc_number: u32,
    pub year: u32,
    pub duration_secs: u32,
    pub bitrate_kbps: u32,
    pub genre: String,
    pub container: ContainerType,
    pub filename: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password_hash: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerType {
    Mp3,
    Ogg,
}

impl ContainerType {
    /// Recognises a container from the file extension alone, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
        match ext.as_str() {
            "mp3" => Some(ContainerType::Mp3),
            "ogg" => Some(ContainerType::Ogg),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerType::Mp3 => "mp3",
            ContainerType::Ogg => "ogg",
        }
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 64-bit FNV-1a with the sign bit cleared, so ids fit signed 64-bit columns.
///
/// No normalization is applied: keys that differ only in case or whitespace
/// produce different ids.
pub fn derive_id(key: &str) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in key.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash & ID_MASK
}

pub fn composite_key(parts: &[&str]) -> String {
    let mut out = String::new();
    for (idx, part) in parts.iter().enumerate() {
        if idx > 0 {
            out.push(KEY_SEP);
        }
        out.push_str(part);
    }
    out
}

pub fn artist_id(album_artist: &str) -> u64 {
    derive_id(album_artist)
}

pub fn album_id(album: &str, album_artist: &str) -> u64 {
    derive_id(&composite_key(&[album, album_artist]))
}

pub fn song_id(
    track_number: u32,
    disc_number: u32,
    title: &str,
    album: &str,
    album_artist: &str,
) -> u64 {
    let track = track_number.to_string();
    let disc = disc_number.to_string();
    derive_id(&composite_key(&[&track, &disc, title, album, album_artist]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_id_is_deterministic() {
        let first = derive_id("Artist@Album");
        let second = derive_id("Artist@Album");
        assert_eq!(first, second);
        assert_ne!(first, derive_id("Artist@Album2"));
    }

    #[test]
    fn derive_id_matches_fnv1a_reference() {
        // Empty input hashes to the offset basis, masked.
        assert_eq!(derive_id(""), FNV_OFFSET_BASIS & ID_MASK);
        // FNV-1a 64 of "a" is 0xaf63dc4c8601ec8c.
        assert_eq!(derive_id("a"), 0xaf63dc4c8601ec8c & ID_MASK);
    }

    #[test]
    fn derive_id_stays_below_sign_bit() {
        for key in ["", "a", "foobar", "Daft Punk@Discovery", "\u{1F3B5}"] {
            assert!(derive_id(key) < 1u64 << 63, "{key}");
        }
    }

    #[test]
    fn derive_id_is_case_sensitive() {
        assert_ne!(derive_id("Abba"), derive_id("abba"));
        assert_ne!(derive_id("Abba"), derive_id("Abba "));
    }

    #[test]
    fn composite_ids_join_with_separator() {
        assert_eq!(composite_key(&["C", "B"]), "C@B");
        assert_eq!(album_id("C", "B"), derive_id("C@B"));
        assert_eq!(song_id(1, 1, "A", "C", "B"), derive_id("1@1@A@C@B"));
        assert_eq!(artist_id("B"), derive_id("B"));
    }

    #[test]
    fn container_type_from_extension() {
        assert_eq!(
            ContainerType::from_path(Path::new("a/b/Song.MP3")),
            Some(ContainerType::Mp3)
        );
        assert_eq!(
            ContainerType::from_path(Path::new("track.ogg")),
            Some(ContainerType::Ogg)
        );
        assert_eq!(ContainerType::from_path(Path::new("track.flac")), None);
        assert_eq!(ContainerType::from_path(Path::new("mp3")), None);
        assert_eq!(ContainerType::Ogg.to_string(), "ogg");
    }
}
