use log::info;
use std::{fs, io, path::Path};

pub fn create_folder(root_path: &str) -> io::Result<()> {
    let path = Path::new(root_path);
    if path.is_dir() {
        info!("folder already exists: {}", root_path);
        return Ok(());
    }

    fs::create_dir_all(path)?;
    info!("folder created: {}", root_path);
    Ok(())
}
