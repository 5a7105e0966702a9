mod scan;
mod writer;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::{Album, Artist, Song, User};
use redb::{
    CommitError, Database, DatabaseError, ReadableTable, StorageError, TableDefinition, TableError,
    TransactionError,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

pub use scan::{walk_entries, ScanOptions, ScanReport, Scanner, WalkEntry};
pub use writer::{AlbumLocks, CatalogWriter, WriteOutcome};

pub use metadata::DEFAULT_JPEG_QUALITY;

const CATALOG_VERSION: u32 = 1;

const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
const ARTISTS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("artists");
const ALBUMS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("albums");
const SONGS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("songs");
const USERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

const META_VERSION_KEY: &str = "version";

/// Handle on the persistent catalog. Cloning shares the same database.
#[derive(Clone)]
pub struct Catalog {
    db: Arc<Database>,
}

impl Catalog {
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        let db = open_or_create_db(path)?;
        let catalog = Self { db: Arc::new(db) };
        catalog.init_tables()?;
        info!("Opened catalog at {:?}", path);
        Ok(catalog)
    }

    fn init_tables(&self) -> Result<(), CatalogError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut meta_table = write_txn.open_table(META_TABLE)?;
            let _ = write_txn.open_table(ARTISTS_TABLE)?;
            let _ = write_txn.open_table(ALBUMS_TABLE)?;
            let _ = write_txn.open_table(SONGS_TABLE)?;
            let _ = write_txn.open_table(USERS_TABLE)?;

            let stored: Option<u32> = match meta_table.get(META_VERSION_KEY)? {
                Some(value) => Some(decode_value(value.value())?),
                None => None,
            };
            match stored {
                Some(version) if version != CATALOG_VERSION => {
                    return Err(CatalogError::VersionMismatch(version));
                }
                Some(_) => {}
                None => {
                    let version_bytes = encode_value(&CATALOG_VERSION)?;
                    meta_table.insert(META_VERSION_KEY, version_bytes.as_slice())?;
                }
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn upsert_artist(&self, artist: &Artist) -> Result<(), CatalogError> {
        self.upsert(ARTISTS_TABLE, artist.id, artist)
    }

    pub fn upsert_song(&self, song: &Song) -> Result<(), CatalogError> {
        self.upsert(SONGS_TABLE, song.id, song)
    }

    pub fn album_exists(&self, album_id: u64) -> Result<bool, CatalogError> {
        self.exists(ALBUMS_TABLE, album_id)
    }

    /// Check and insert happen in one write transaction; an existing row is
    /// left untouched and `false` is returned.
    pub fn insert_album_if_absent(&self, album: &Album) -> Result<bool, CatalogError> {
        let album_bytes = encode_value(album)?;
        let write_txn = self.db.begin_write()?;
        let inserted = {
            let mut table = write_txn.open_table(ALBUMS_TABLE)?;
            if table.get(album.id)?.is_some() {
                false
            } else {
                table.insert(album.id, album_bytes.as_slice())?;
                true
            }
        };
        if inserted {
            write_txn.commit()?;
        } else {
            write_txn.abort()?;
        }
        Ok(inserted)
    }

    pub fn get_artist(&self, artist_id: u64) -> Result<Option<Artist>, CatalogError> {
        self.get(ARTISTS_TABLE, artist_id)
    }

    pub fn get_album(&self, album_id: u64) -> Result<Option<Album>, CatalogError> {
        self.get(ALBUMS_TABLE, album_id)
    }

    pub fn get_song(&self, song_id: u64) -> Result<Option<Song>, CatalogError> {
        self.get(SONGS_TABLE, song_id)
    }

    pub fn list_artists(&self) -> Result<Vec<Artist>, CatalogError> {
        self.list(ARTISTS_TABLE)
    }

    pub fn list_albums(&self) -> Result<Vec<Album>, CatalogError> {
        self.list(ALBUMS_TABLE)
    }

    pub fn list_songs(&self) -> Result<Vec<Song>, CatalogError> {
        self.list(SONGS_TABLE)
    }

    pub fn stats(&self) -> Result<CatalogStats, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let artists = read_txn.open_table(ARTISTS_TABLE)?.len()?;
        let albums = read_txn.open_table(ALBUMS_TABLE)?.len()?;
        let songs = read_txn.open_table(SONGS_TABLE)?.len()?;
        Ok(CatalogStats {
            artists: artists as usize,
            albums: albums as usize,
            songs: songs as usize,
        })
    }

    pub fn add_user(&self, username: &str, password: &str) -> Result<User, CatalogError> {
        let user = User {
            username: username.to_string(),
            password_hash: hash_password(password),
        };
        let user_bytes = encode_value(&user)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(USERS_TABLE)?;
            if table.get(username)?.is_some() {
                drop(table);
                write_txn.abort()?;
                return Err(CatalogError::UserExists(username.to_string()));
            }
            table.insert(username, user_bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(user)
    }

    pub fn remove_user(&self, username: &str) -> Result<bool, CatalogError> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(USERS_TABLE)?;
            let removed = table.remove(username)?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    pub fn get_user(&self, username: &str) -> Result<Option<User>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS_TABLE)?;
        let user = match table.get(username)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(user)
    }

    fn upsert<T: Serialize>(
        &self,
        table: TableDefinition<u64, &[u8]>,
        key: u64,
        record: &T,
    ) -> Result<(), CatalogError> {
        let bytes = encode_value(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(table)?;
            table.insert(key, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn exists(&self, table: TableDefinition<u64, &[u8]>, key: u64) -> Result<bool, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        let found = table.get(key)?.is_some();
        Ok(found)
    }

    fn get<T: DeserializeOwned>(
        &self,
        table: TableDefinition<u64, &[u8]>,
        key: u64,
    ) -> Result<Option<T>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        let record = match table.get(key)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(record)
    }

    fn list<T: DeserializeOwned>(
        &self,
        table: TableDefinition<u64, &[u8]>,
    ) -> Result<Vec<T>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        let mut items = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            items.push(decode_value(entry.1.value())?);
        }
        Ok(items)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub artists: usize,
    pub albums: usize,
    pub songs: usize,
}

#[derive(Debug)]
pub enum CatalogError {
    Io(std::io::Error),
    Redb(redb::Error),
    Bincode(Box<bincode::ErrorKind>),
    VersionMismatch(u32),
    UserExists(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Io(err) => write!(f, "io error: {}", err),
            CatalogError::Redb(err) => write!(f, "db error: {}", err),
            CatalogError::Bincode(err) => write!(f, "bincode error: {}", err),
            CatalogError::VersionMismatch(version) => {
                write!(f, "catalog version mismatch: {}", version)
            }
            CatalogError::UserExists(username) => write!(f, "user already exists: {}", username),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Io(err)
    }
}

impl From<redb::Error> for CatalogError {
    fn from(err: redb::Error) -> Self {
        CatalogError::Redb(err)
    }
}

impl From<DatabaseError> for CatalogError {
    fn from(err: DatabaseError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<TableError> for CatalogError {
    fn from(err: TableError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<TransactionError> for CatalogError {
    fn from(err: TransactionError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<StorageError> for CatalogError {
    fn from(err: StorageError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<CommitError> for CatalogError {
    fn from(err: CommitError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<Box<bincode::ErrorKind>> for CatalogError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        CatalogError::Bincode(err)
    }
}

fn open_or_create_db(path: &Path) -> Result<Database, CatalogError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    if path.exists() {
        Ok(Database::open(path)?)
    } else {
        Ok(Database::create(path)?)
    }
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, CatalogError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CatalogError> {
    Ok(bincode::deserialize(bytes)?)
}

fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password);
    format!("{:x}", hasher.finalize())
}
