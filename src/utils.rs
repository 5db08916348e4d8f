use std::{fs, io, path::Path};

pub fn create_folder_if_not_exists(dir: &Path) -> io::Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}
