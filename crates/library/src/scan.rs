use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::thread;

use common::ContainerType;
use metadata::{read_track, CoverStatus, DEFAULT_JPEG_QUALITY};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::writer::CatalogWriter;
use crate::Catalog;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Lazy depth-first walk below `root`, siblings in file-name order. Entries
/// that cannot be read are logged and left out.
pub fn walk_entries(root: &Path, follow_links: bool) -> impl Iterator<Item = WalkEntry> {
    WalkDir::new(root)
        .follow_links(follow_links)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(WalkEntry {
                is_dir: entry.file_type().is_dir(),
                path: entry.into_path(),
            }),
            Err(err) => {
                warn!("Skipping unreadable entry: {}", err);
                None
            }
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    pub workers: usize,
    pub follow_links: bool,
    pub jpeg_quality: u8,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            follow_links: false,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Files with a recognised container extension.
    pub files_seen: usize,
    pub tracks_written: usize,
    pub albums_created: usize,
    pub skipped: usize,
    pub skip_reasons: BTreeMap<String, usize>,
    /// Files whose rows could not be stored.
    pub failed: usize,
    pub decode_failures: usize,
}

impl ScanReport {
    fn merge(&mut self, other: ScanReport) {
        self.files_seen += other.files_seen;
        self.tracks_written += other.tracks_written;
        self.albums_created += other.albums_created;
        self.skipped += other.skipped;
        for (reason, count) in other.skip_reasons {
            *self.skip_reasons.entry(reason).or_default() += count;
        }
        self.failed += other.failed;
        self.decode_failures += other.decode_failures;
    }
}

pub struct Scanner<'a> {
    writer: CatalogWriter<'a>,
    options: ScanOptions,
}

impl<'a> Scanner<'a> {
    pub fn new(catalog: &'a Catalog, options: ScanOptions) -> Self {
        Self {
            writer: CatalogWriter::new(catalog, options.jpeg_quality),
            options,
        }
    }

    pub fn run(&self, root: &Path) -> ScanReport {
        info!("Scanning {:?} with {} worker(s)", root, self.options.workers.max(1));
        let entries = walk_entries(root, self.options.follow_links);

        let report = if self.options.workers <= 1 {
            let mut report = ScanReport::default();
            for entry in entries {
                self.scan_entry(&entry, &mut report);
            }
            report
        } else {
            let entries = Mutex::new(entries);
            thread::scope(|scope| {
                let handles: Vec<_> = (0..self.options.workers)
                    .map(|_| {
                        let entries = &entries;
                        scope.spawn(move || {
                            let mut report = ScanReport::default();
                            loop {
                                let next = entries.lock().next();
                                match next {
                                    Some(entry) => self.scan_entry(&entry, &mut report),
                                    None => break,
                                }
                            }
                            report
                        })
                    })
                    .collect();

                let mut report = ScanReport::default();
                for handle in handles {
                    match handle.join() {
                        Ok(partial) => report.merge(partial),
                        Err(_) => warn!("Scan worker panicked"),
                    }
                }
                report
            })
        };

        info!(
            "Scan finished: {} files, {} tracks, {} new albums, {} skipped, {} failed",
            report.files_seen,
            report.tracks_written,
            report.albums_created,
            report.skipped,
            report.failed
        );
        report
    }

    fn scan_entry(&self, entry: &WalkEntry, report: &mut ScanReport) {
        if entry.is_dir {
            return;
        }
        let Some(container) = ContainerType::from_path(&entry.path) else {
            return;
        };
        report.files_seen += 1;

        let track = match read_track(&entry.path, container) {
            Ok(track) => track,
            Err(reason) => {
                debug!("Skipping {:?}: {}", entry.path, reason);
                report.skipped += 1;
                *report
                    .skip_reasons
                    .entry(reason.label().to_string())
                    .or_default() += 1;
                return;
            }
        };

        match self.writer.write_track(&track, &entry.path) {
            Ok(outcome) => {
                report.tracks_written += 1;
                if outcome.album_created {
                    report.albums_created += 1;
                }
                if let Some(CoverStatus::DecodeFailed(_)) = outcome.cover {
                    report.decode_failures += 1;
                }
            }
            Err(err) => {
                warn!("Failed to store {:?}: {}", entry.path, err);
                report.failed += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::derive_id;
    use lofty::config::WriteOptions;
    use lofty::tag::{Accessor, ItemKey, Tag, TagExt, TagType};
    use std::fs;

    fn silent_mpeg_frames(count: usize) -> Vec<u8> {
        let mut out = Vec::new();
        for _ in 0..count {
            out.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x64]);
            out.extend(std::iter::repeat(0u8).take(413));
        }
        out
    }

    fn write_song(path: &Path, title: &str, album: &str, track: u32) {
        fs::write(path, silent_mpeg_frames(100)).unwrap();
        let mut tag = Tag::new(TagType::Id3v2);
        tag.set_title(title.to_string());
        tag.set_artist("B".to_string());
        tag.set_album(album.to_string());
        tag.set_track(track);
        tag.insert_text(ItemKey::DiscNumber, "1".to_string());
        tag.save_to_path(path, WriteOptions::default()).unwrap();
    }

    fn open_catalog(dir: &Path) -> Catalog {
        Catalog::open(&dir.join("catalog.redb")).unwrap()
    }

    #[test]
    fn scans_single_song() {
        let store = tempfile::tempdir().unwrap();
        let music = tempfile::tempdir().unwrap();
        let song_path = music.path().join("song.mp3");
        write_song(&song_path, "A", "C", 1);

        let catalog = open_catalog(store.path());
        let report = Scanner::new(&catalog, ScanOptions::default()).run(music.path());
        assert_eq!(report.files_seen, 1);
        assert_eq!(report.tracks_written, 1);
        assert_eq!(report.albums_created, 1);

        let artist = catalog.get_artist(derive_id("B")).unwrap().unwrap();
        assert_eq!(artist.name, "B");
        let album = catalog.get_album(derive_id("C@B")).unwrap().unwrap();
        assert_eq!(album.title, "C");
        assert!(!album.has_cover);
        let song = catalog.get_song(derive_id("1@1@A@C@B")).unwrap().unwrap();
        assert_eq!(song.title, "A");
        assert_eq!(song.track_number, 1);
        assert_eq!(song.disc_number, 1);
        assert_eq!(song.filename, song_path.to_string_lossy());
    }

    #[test]
    fn rescan_is_idempotent() {
        let store = tempfile::tempdir().unwrap();
        let music = tempfile::tempdir().unwrap();
        write_song(&music.path().join("01.mp3"), "A", "C", 1);
        write_song(&music.path().join("02.mp3"), "D", "C", 2);

        let catalog = open_catalog(store.path());
        let scanner = Scanner::new(&catalog, ScanOptions::default());
        scanner.run(music.path());
        let first = catalog.stats().unwrap();
        let songs_before = catalog.list_songs().unwrap();

        let second_report = scanner.run(music.path());
        assert_eq!(second_report.albums_created, 0);
        assert_eq!(catalog.stats().unwrap(), first);
        assert_eq!(catalog.list_songs().unwrap(), songs_before);
        assert_eq!(first.songs, 2);
        assert_eq!(first.albums, 1);
    }

    #[test]
    fn bad_files_do_not_stop_the_scan() {
        let store = tempfile::tempdir().unwrap();
        let music = tempfile::tempdir().unwrap();
        fs::write(music.path().join("a_broken.mp3"), b"nope").unwrap();
        fs::write(music.path().join("b_notes.txt"), b"liner notes").unwrap();
        fs::write(music.path().join("c_bare.mp3"), silent_mpeg_frames(50)).unwrap();
        write_song(&music.path().join("d_good.mp3"), "A", "C", 1);

        let catalog = open_catalog(store.path());
        let report = Scanner::new(&catalog, ScanOptions::default()).run(music.path());
        assert_eq!(report.files_seen, 3);
        assert_eq!(report.tracks_written, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.skip_reasons.values().sum::<usize>(), 2);
        assert_eq!(report.failed, 0);
        assert_eq!(catalog.stats().unwrap().songs, 1);
    }

    #[test]
    fn parallel_scan_creates_each_album_once() {
        let store = tempfile::tempdir().unwrap();
        let music = tempfile::tempdir().unwrap();
        for n in 1..=6 {
            let album = if n % 2 == 0 { "Even" } else { "Odd" };
            write_song(
                &music.path().join(format!("{:02}.mp3", n)),
                &format!("T{}", n),
                album,
                n,
            );
        }

        let catalog = open_catalog(store.path());
        let options = ScanOptions {
            workers: 4,
            ..ScanOptions::default()
        };
        let report = Scanner::new(&catalog, options).run(music.path());
        assert_eq!(report.files_seen, 6);
        assert_eq!(report.tracks_written, 6);
        assert_eq!(report.albums_created, 2);
        assert_eq!(catalog.stats().unwrap().albums, 2);
        assert_eq!(catalog.stats().unwrap().songs, 6);
    }

    #[test]
    fn walk_is_depth_first_and_sorted() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("b").join("inner")).unwrap();
        fs::create_dir_all(root.path().join("a")).unwrap();
        fs::write(root.path().join("b").join("inner").join("x.mp3"), b"").unwrap();
        fs::write(root.path().join("a").join("y.ogg"), b"").unwrap();
        fs::write(root.path().join("z.mp3"), b"").unwrap();

        let seen: Vec<(PathBuf, bool)> = walk_entries(root.path(), false)
            .map(|entry| {
                let rel = entry.path.strip_prefix(root.path()).unwrap().to_path_buf();
                (rel, entry.is_dir)
            })
            .collect();
        let expected = vec![
            (PathBuf::from("a"), true),
            (PathBuf::from("a/y.ogg"), false),
            (PathBuf::from("b"), true),
            (PathBuf::from("b/inner"), true),
            (PathBuf::from("b/inner/x.mp3"), false),
            (PathBuf::from("z.mp3"), false),
        ];
        assert_eq!(seen, expected);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_dirs_need_follow_links() {
        let target = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        fs::write(target.path().join("x.mp3"), b"").unwrap();
        std::os::unix::fs::symlink(target.path(), root.path().join("linked")).unwrap();

        let files = |follow: bool| {
            walk_entries(root.path(), follow)
                .filter(|entry| entry.path.ends_with("x.mp3"))
                .count()
        };
        assert_eq!(files(false), 0);
        assert_eq!(files(true), 1);
    }

    #[test]
    fn missing_root_yields_empty_report() {
        let store = tempfile::tempdir().unwrap();
        let catalog = open_catalog(store.path());
        let report = Scanner::new(&catalog, ScanOptions::default())
            .run(&store.path().join("does-not-exist"));
        assert_eq!(report, ScanReport::default());
    }
}
