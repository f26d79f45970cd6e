use std::path::Path;

use anyhow::Result;
use doclassify::DirectoryScanner;

use super::{open_database, GlobalOptions};

pub fn run(options: &GlobalOptions, dir: &Path, recursive: bool) -> Result<bool> {
    let config = options.load_config()?;
    let db = open_database(&config)?;

    let summary = DirectoryScanner::new(dir).recursive(recursive).register(&db)?;
    println!(
        "Found {} documents: {} registered, {} already tracked",
        summary.discovered, summary.registered, summary.already_tracked
    );
    Ok(true)
}
