//! Gzip compression of finished exports

use crate::error::{ExportError, Result};
use flate2::{Compression, GzBuilder};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

/// Compress `source` into `target`
///
/// The gzip header records the source file's base name. Returns the number
/// of uncompressed bytes read.
///
/// # Examples
///
/// ```no_run
/// use sqlsheet::gzip::gzip_file;
///
/// let bytes = gzip_file("export.xlsx", "export.xlsx.gz")?;
/// println!("compressed {} bytes", bytes);
/// # Ok::<(), sqlsheet::ExportError>(())
/// ```
pub fn gzip_file<P: AsRef<Path>, Q: AsRef<Path>>(source: P, target: Q) -> Result<u64> {
    let source = source.as_ref();
    let target = target.as_ref();

    let input = File::open(source).map_err(gzip_error(source))?;
    let output = File::create(target).map_err(gzip_error(target))?;

    let mut builder = GzBuilder::new();
    if let Some(name) = source.file_name() {
        builder = builder.filename(name.to_string_lossy().into_owned());
    }
    let mut encoder = builder.write(BufWriter::new(output), Compression::default());

    let copied = io::copy(&mut BufReader::new(input), &mut encoder).map_err(gzip_error(source))?;
    encoder
        .finish()
        .and_then(|mut out| out.flush())
        .map_err(gzip_error(target))?;

    log::debug!(
        "gzipped {} ({} bytes) to {}",
        source.display(),
        copied,
        target.display()
    );
    Ok(copied)
}

fn gzip_error(path: &Path) -> impl FnOnce(io::Error) -> ExportError + '_ {
    move |source| ExportError::Gzip {
        path: path.to_path_buf(),
        source,
    }
}
