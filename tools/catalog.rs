mod config;

use std::env;
use std::path::Path;
use std::process::ExitCode;

use library::{Catalog, CatalogError, ScanOptions, Scanner};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{config_path_from_env, load_config, CatalogConfig};

const USAGE: &str = "usage:
  catalog scan <dbfile> <musicdir>
  catalog useradd <dbfile> <user> <pass>
  catalog userdel <dbfile> <user>";

enum Command {
    Scan { db: String, music_dir: String },
    UserAdd { db: String, username: String, password: String },
    UserDel { db: String, username: String },
}

impl Command {
    fn parse(args: &[String]) -> Option<Self> {
        match args {
            [action, db, music_dir, ..] if action == "scan" => Some(Command::Scan {
                db: db.clone(),
                music_dir: music_dir.clone(),
            }),
            [action, db, username, password, ..] if action == "useradd" => {
                Some(Command::UserAdd {
                    db: db.clone(),
                    username: username.clone(),
                    password: password.clone(),
                })
            }
            [action, db, username, ..] if action == "userdel" => Some(Command::UserDel {
                db: db.clone(),
                username: username.clone(),
            }),
            _ => None,
        }
    }

    fn db_path(&self) -> &str {
        match self {
            Command::Scan { db, .. } | Command::UserAdd { db, .. } | Command::UserDel { db, .. } => {
                db
            }
        }
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = Command::parse(&args) else {
        eprintln!("{}", USAGE);
        return ExitCode::from(1);
    };

    let config_path = config_path_from_env();
    let config = match load_config(&config_path) {
        Ok((config, true)) => {
            info!("Loaded config from {:?}", config_path);
            config
        }
        Ok((config, false)) => config,
        Err(err) => {
            warn!("Ignoring config at {:?}: {}", config_path, err);
            CatalogConfig::default()
        }
    };

    let catalog = match Catalog::open(Path::new(command.db_path())) {
        Ok(catalog) => catalog,
        Err(err) => {
            error!("Failed to open catalog {:?}: {}", command.db_path(), err);
            return ExitCode::from(1);
        }
    };

    let result = run(&catalog, &command, &config);
    drop(catalog);
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::from(1)
        }
    }
}

fn run(catalog: &Catalog, command: &Command, config: &CatalogConfig) -> Result<(), CatalogError> {
    match command {
        Command::Scan { music_dir, .. } => {
            let options = ScanOptions {
                workers: config.workers,
                follow_links: config.follow_links,
                jpeg_quality: config.jpeg_quality,
            };
            let report = Scanner::new(catalog, options).run(Path::new(music_dir));
            let stats = catalog.stats()?;
            println!(
                "Scanned {} files ({} skipped, {} failed); catalog holds {} artists, {} albums, {} songs",
                report.files_seen,
                report.skipped,
                report.failed,
                stats.artists,
                stats.albums,
                stats.songs
            );
            Ok(())
        }
        Command::UserAdd {
            username, password, ..
        } => {
            catalog.add_user(username, password)?;
            info!("Added user {}", username);
            Ok(())
        }
        Command::UserDel { username, .. } => {
            if catalog.remove_user(username)? {
                info!("Removed user {}", username);
            } else {
                warn!("No such user: {}", username);
            }
            Ok(())
        }
    }
}
