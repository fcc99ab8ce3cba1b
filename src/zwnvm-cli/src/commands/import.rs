//! Import: JSON snapshot in, NVM image out.

use std::path::Path;

use anyhow::Result;
use zwnvm::{Format, Report};

use crate::file_io;

pub fn run(format: Format, src: &Path, dst: &Path) -> Result<()> {
    let doc = file_io::read_json(src)?;

    let mut report = Report::new();
    let image = format.import(&doc, &mut report)?;
    println!("got nvm buffer size = {}", image.len());
    println!("Saving NVM image to {}...", dst.display());
    file_io::write_image(dst, &image)
}
