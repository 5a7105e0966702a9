//! Tag and cover-art extraction for MP3 and Ogg files.

mod artwork;
mod picture;
mod reader;
mod tags;

pub use artwork::{
    generate_thumbnails, scaled_dimensions, CoverSet, CoverStatus, ThumbnailSpec,
    DEFAULT_JPEG_QUALITY, DEFAULT_THUMBNAIL_SIZES,
};
pub use picture::{decode_base64, parse_flac_picture, FlacPicture};
pub use reader::{read_raw_tags, read_track, SkipReason};
pub use tags::{
    normalize, AudioProperties, EmbeddedPicture, FieldMap, FormatTag, GenericTag, RawTags,
    TrackMetadata,
};
