//! Export: NVM image in, JSON snapshot out.

use std::path::Path;

use anyhow::{bail, Result};
use zwnvm::{Format, Report};

use crate::file_io;

pub fn run(format: Format, src: &Path, dst: &Path) -> Result<()> {
    let image = file_io::read_image(src)?;

    let mut report = Report::new();
    if !format.validate(&image, &mut report) {
        bail!("{} is not a valid {} NVM image", src.display(), format);
    }
    println!("Bin image identified as: {format}");
    println!("Using converter: {}", format.converter_id());

    let doc = format.export(&image, &mut report)?;
    println!("Saving JSON to {}...", dst.display());
    file_io::write_json(dst, &doc)
}
