use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use common::{album_id, artist_id, song_id, Album, Artist, Song};
use metadata::{
    generate_thumbnails, CoverStatus, ThumbnailSpec, TrackMetadata,
    DEFAULT_THUMBNAIL_SIZES,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::{Catalog, CatalogError};

/// Serializes work per album id. An entry only lives while some caller is
/// inside `with_album` for that id.
#[derive(Default)]
pub struct AlbumLocks {
    inner: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl AlbumLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_album<R>(&self, album_id: u64, f: impl FnOnce() -> R) -> R {
        let lock = {
            let mut map = self.inner.lock();
            Arc::clone(map.entry(album_id).or_default())
        };
        let result = {
            let _guard = lock.lock();
            f()
        };
        let mut map = self.inner.lock();
        // The map and this call hold the only references: nobody is waiting.
        if Arc::strong_count(&lock) == 2 {
            map.remove(&album_id);
        }
        result
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.inner.lock().len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub album_created: bool,
    /// `None` when the album already existed and no image work was done.
    pub cover: Option<CoverStatus>,
}

pub struct CatalogWriter<'a> {
    catalog: &'a Catalog,
    thumbnails: ThumbnailSpec,
    locks: AlbumLocks,
}

impl<'a> CatalogWriter<'a> {
    pub fn new(catalog: &'a Catalog, jpeg_quality: u8) -> Self {
        Self {
            catalog,
            thumbnails: ThumbnailSpec {
                sizes: DEFAULT_THUMBNAIL_SIZES.to_vec(),
                jpeg_quality,
            },
            locks: AlbumLocks::new(),
        }
    }

    pub fn write_track(
        &self,
        track: &TrackMetadata,
        path: &Path,
    ) -> Result<WriteOutcome, CatalogError> {
        let artist_id = artist_id(&track.album_artist);
        let album_id = album_id(&track.album, &track.album_artist);
        let song_id = song_id(
            track.track_number,
            track.disc_number,
            &track.title,
            &track.album,
            &track.album_artist,
        );

        self.catalog.upsert_artist(&Artist {
            id: artist_id,
            name: track.album_artist.clone(),
        })?;

        let (album_created, cover) = self
            .locks
            .with_album(album_id, || self.ensure_album(track, album_id, artist_id))?;

        self.catalog.upsert_song(&Song {
            id: song_id,
            title: track.title.clone(),
            album_id,
            album: track.album.clone(),
            artist_id,
            artist: track.album_artist.clone(),
            track_number: track.track_number,
            disc_number: track.disc_number,
            year: track.year,
            duration_secs: track.duration_secs,
            bitrate_kbps: track.bitrate_kbps,
            genre: track.genre.clone(),
            container: track.container,
            filename: path.to_string_lossy().into_owned(),
        })?;

        Ok(WriteOutcome {
            album_created,
            cover,
        })
    }

    fn ensure_album(
        &self,
        track: &TrackMetadata,
        album_id: u64,
        artist_id: u64,
    ) -> Result<(bool, Option<CoverStatus>), CatalogError> {
        if self.catalog.album_exists(album_id)? {
            debug!("Album {:?} ({}) already catalogued", track.album, album_id);
            return Ok((false, None));
        }

        // Thumbnail slots follow DEFAULT_THUMBNAIL_SIZES order.
        let covers = generate_thumbnails(&track.cover, &self.thumbnails);
        let album = Album {
            id: album_id,
            title: track.album.clone(),
            artist_id,
            artist_name: track.album_artist.clone(),
            has_cover: covers.has_cover(),
            cover_128: covers.thumbnail(0),
            cover_256: covers.thumbnail(1),
            cover_512: covers.thumbnail(2),
            cover_1024: covers.thumbnail(3),
            cover: covers.original,
        };
        let inserted = self.catalog.insert_album_if_absent(&album)?;
        Ok((inserted, Some(covers.status)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{derive_id, ContainerType};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::thread;

    fn png(width: u32, height: u32, shade: u8) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([shade, shade, shade]));
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    fn track(title: &str, track_number: u32, cover: Vec<u8>) -> TrackMetadata {
        TrackMetadata {
            title: title.to_string(),
            artist: "Guest".to_string(),
            album: "C".to_string(),
            album_artist: "B".to_string(),
            genre: "Ambient".to_string(),
            container: ContainerType::Mp3,
            track_number,
            disc_number: 1,
            year: 2010,
            duration_secs: 200,
            bitrate_kbps: 256,
            cover,
        }
    }

    fn open_temp() -> (tempfile::TempDir, Catalog) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(&dir.path().join("catalog.redb")).unwrap();
        (dir, catalog)
    }

    #[test]
    fn writes_artist_album_and_song() {
        let (_dir, catalog) = open_temp();
        let writer = CatalogWriter::new(&catalog, 70);
        let outcome = writer
            .write_track(&track("A", 1, Vec::new()), Path::new("/music/a.mp3"))
            .unwrap();
        assert!(outcome.album_created);
        assert_eq!(outcome.cover, Some(CoverStatus::Absent));

        let artist = catalog.get_artist(derive_id("B")).unwrap().unwrap();
        assert_eq!(artist.name, "B");
        let album = catalog.get_album(derive_id("C@B")).unwrap().unwrap();
        assert!(!album.has_cover);
        assert_eq!(album.artist_id, derive_id("B"));
        let song = catalog.get_song(derive_id("1@1@A@C@B")).unwrap().unwrap();
        assert_eq!(song.artist, "B");
        assert_eq!(song.album_id, album.id);
        assert_eq!(song.filename, "/music/a.mp3");
        assert_eq!(song.container, ContainerType::Mp3);
    }

    #[test]
    fn first_cover_wins() {
        let (_dir, catalog) = open_temp();
        let writer = CatalogWriter::new(&catalog, 70);
        let first_cover = png(300, 300, 10);
        let second_cover = png(400, 200, 250);

        let first = writer
            .write_track(&track("A", 1, first_cover.clone()), Path::new("/m/1.mp3"))
            .unwrap();
        let second = writer
            .write_track(&track("D", 2, second_cover), Path::new("/m/2.mp3"))
            .unwrap();
        assert!(first.album_created);
        assert!(!second.album_created);
        assert_eq!(second.cover, None);

        let album = catalog.get_album(derive_id("C@B")).unwrap().unwrap();
        assert!(album.has_cover);
        assert_eq!(album.cover, first_cover);
        let small = image::load_from_memory(&album.cover_128).unwrap();
        assert_eq!((small.width(), small.height()), (128, 128));
        let thumb = image::load_from_memory(&album.cover_256).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (256, 256));
        assert!(album.cover_512.is_empty());
        assert!(album.cover_1024.is_empty());
        assert_eq!(catalog.stats().unwrap().songs, 2);
    }

    #[test]
    fn undecodable_cover_is_stored_as_no_cover() {
        let (_dir, catalog) = open_temp();
        let writer = CatalogWriter::new(&catalog, 70);
        let outcome = writer
            .write_track(&track("A", 1, b"garbage".to_vec()), Path::new("/m/1.mp3"))
            .unwrap();
        assert!(matches!(outcome.cover, Some(CoverStatus::DecodeFailed(_))));

        let album = catalog.get_album(derive_id("C@B")).unwrap().unwrap();
        assert!(!album.has_cover);
        assert!(album.cover.is_empty());
        assert!(album.cover_128.is_empty());
    }

    #[test]
    fn album_locks_are_released() {
        let locks = AlbumLocks::new();
        let value = locks.with_album(9, || {
            assert_eq!(locks.in_flight(), 1);
            42
        });
        assert_eq!(value, 42);
        assert_eq!(locks.in_flight(), 0);
    }

    #[test]
    fn concurrent_writers_create_album_once() {
        let (_dir, catalog) = open_temp();
        let writer = CatalogWriter::new(&catalog, 70);
        let cover = png(200, 200, 99);

        let created: usize = thread::scope(|scope| {
            let handles: Vec<_> = (0..4u32)
                .map(|n| {
                    let writer = &writer;
                    let cover = cover.clone();
                    scope.spawn(move || {
                        let path = format!("/m/{}.mp3", n);
                        writer
                            .write_track(&track("T", n + 1, cover), Path::new(&path))
                            .unwrap()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(|outcome| outcome.album_created)
                .count()
        });

        assert_eq!(created, 1);
        assert_eq!(catalog.stats().unwrap().albums, 1);
        assert_eq!(catalog.stats().unwrap().songs, 4);
    }
}
